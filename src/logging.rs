//! Per-device diagnostic wire logs.
//!
//! Each non-remote connection gets its own [`DeviceLog`] so that the raw
//! command/reply traffic of one device never interleaves with another's.
//! The supervisor passes the handle into
//! [`TelescopeClient::perform_tick`](crate::core::TelescopeClient::perform_tick)
//! explicitly; there is no global "current log" to switch.
//!
//! When wire logging is disabled the handle is a no-op sink, so clients can
//! write unconditionally.

use anyhow::{Context, Result};
use chrono::Utc;
use log::warn;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A wire-traffic log for one device: either a buffered file or a no-op
/// sink when logging is disabled or the file could not be created.
#[derive(Debug, Default)]
pub struct DeviceLog {
    writer: Option<BufWriter<File>>,
}

impl DeviceLog {
    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { writer: None }
    }

    /// Opens (truncating) a log file for the given device id inside
    /// `directory`. Falls back to a disabled sink with a warning if the
    /// file cannot be created.
    pub fn create(directory: &Path, id: &str) -> Self {
        match Self::try_create(directory, id) {
            Ok(log) => log,
            Err(e) => {
                warn!("Unable to create a wire log for '{}': {:#}", id, e);
                Self::disabled()
            }
        }
    }

    fn try_create(directory: &Path, id: &str) -> Result<Self> {
        let path = directory.join(format!("device_log_{id}.txt"));
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Appends one timestamped line. Write failures disable the log rather
    /// than propagating.
    pub fn line(&mut self, message: &str) {
        if let Some(w) = self.writer.as_mut() {
            let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
            if writeln!(w, "{stamp} {message}").is_err() {
                self.writer = None;
            }
        }
    }

    /// Flushes any buffered lines (called on detach).
    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }

    /// Whether this handle writes anywhere.
    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }
}
