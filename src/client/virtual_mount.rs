//! In-process simulated mount.
//!
//! No I/O at all: the simulator echoes goto targets back as its known
//! position on the next communication tick. Used for testing and demos.

use chrono::{DateTime, Utc};

use crate::core::{EquatorialPos, TelescopeClient, MAX_FOV_CIRCLES};
use crate::logging::DeviceLog;

/// A telescope client without a telescope behind it.
pub struct VirtualMount {
    name: String,
    position: Option<EquatorialPos>,
    queued_target: Option<EquatorialPos>,
    fov_circles: Vec<f64>,
}

impl VirtualMount {
    /// Creates a simulator with an unknown initial position.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: None,
            queued_target: None,
            fov_circles: Vec::new(),
        }
    }
}

impl TelescopeClient for VirtualMount {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn has_known_position(&self) -> bool {
        self.position.is_some()
    }

    fn current_position(&self, _when: DateTime<Utc>) -> Option<EquatorialPos> {
        self.position
    }

    fn fov_circles(&self) -> &[f64] {
        &self.fov_circles
    }

    fn add_fov_circle(&mut self, diameter_deg: f64) {
        if self.fov_circles.len() < MAX_FOV_CIRCLES {
            self.fov_circles.push(diameter_deg);
        }
    }

    fn request_goto(&mut self, target_j2000: EquatorialPos) {
        self.queued_target = Some(target_j2000.normalized());
    }

    fn prepare_tick(&mut self) -> bool {
        true
    }

    fn perform_tick(&mut self, wire_log: &mut DeviceLog) {
        if let Some(target) = self.queued_target.take() {
            let (ra, dec) = target.to_ra_dec();
            wire_log.line(&format!(
                "virtual slew to ra={:.6} rad dec={:.6} rad",
                ra, dec
            ));
            self.position = Some(target);
        }
    }
}
