//! Saving and loading the connection registry.
//!
//! The connections file is a JSON object with a top-level `version` string
//! and one object per connection keyed by id. Loading is deliberately
//! forgiving: every failure mode degrades to an empty document with a
//! warning so that startup never aborts:
//!
//! - missing file: empty, not even a warning (a normal first run)
//! - unreadable or unparseable file: empty, warned
//! - version mismatch: the file is renamed to a timestamped backup and an
//!   empty document is returned; if the rename itself fails, that is
//!   logged and the outcome is the same
//!
//! Saving always writes the current [`FORMAT_VERSION`] and overwrites in
//! place; the file is a user-editable local document, so no atomic-rename
//! ceremony is attempted.

use anyhow::{Context, Result};
use chrono::Local;
use log::{debug, warn};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::{AppResult, MountError};
use crate::registry::{ConnectionDraft, ConnectionRegistry};

/// Compiled-in format version written to (and expected from) the
/// connections file and the device-model catalog.
pub const FORMAT_VERSION: &str = "1.4";

/// Timestamped backup name for an incompatible file, next to the original.
pub(crate) fn backup_file_name(path: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y-%m-%d-%H-%M-%S");
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".backup.{stamp}"));
    PathBuf::from(name)
}

/// Writes the registry to `path` as a versioned JSON document.
pub fn save_connections(path: &Path, registry: &ConnectionRegistry) -> AppResult<()> {
    let mut document = Map::new();
    document.insert("version".to_string(), Value::String(FORMAT_VERSION.to_string()));
    for config in registry.entries() {
        let value = serde_json::to_value(config)
            .map_err(|e| MountError::Persistence(e.to_string()))?;
        document.insert(config.id.clone(), value);
    }
    let text = serde_json::to_string_pretty(&Value::Object(document))
        .map_err(|e| MountError::Persistence(e.to_string()))?;
    std::fs::write(path, text)?;
    debug!("Saved {} connection(s) to {}", registry.len(), path.display());
    Ok(())
}

/// Reads the connections file and returns one draft per entry, ready for
/// registry validation. Never fails: every problem degrades to an empty
/// list with a warning (see the module docs).
pub fn load_connections(path: &Path) -> Vec<ConnectionDraft> {
    if !path.exists() {
        // A normal occurrence on first run.
        return Vec::new();
    }

    let document = match read_document(path) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("No connections loaded from {}: {:#}", path.display(), e);
            return Vec::new();
        }
    };

    let version = document
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("0.0.0");
    if version != FORMAT_VERSION {
        warn!(
            "The existing connections file is not compatible with this version (found {:?}, expected {:?})",
            version, FORMAT_VERSION
        );
        let backup = backup_file_name(path);
        match std::fs::rename(path, &backup) {
            Ok(()) => warn!("The file has been backed up as {}", backup.display()),
            Err(e) => warn!("The file cannot be backed up: {}", e),
        }
        return Vec::new();
    }

    let mut drafts = Vec::new();
    for (key, value) in document {
        if key == "version" {
            continue;
        }
        match serde_json::from_value::<ConnectionDraft>(value) {
            Ok(mut draft) => {
                // The map key is authoritative for the id.
                draft.id = key;
                drafts.push(draft);
            }
            Err(e) => warn!("Skipping connection entry '{}': {}", key, e),
        }
    }
    drafts
}

fn read_document(path: &Path) -> Result<Map<String, Value>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Unable to open for reading {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("Unable to parse {}", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("Document root is not an object"),
    }
}
