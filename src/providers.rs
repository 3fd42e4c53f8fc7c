//! Collaborator interfaces consumed by the connection core.
//!
//! The core depends on the host application only through these narrow read
//! accessors: what is currently selected, where the view points, and which
//! external-driver device/driver pairs exist. The host implements them; the
//! core never sees the host's internal state.

use crate::core::EquatorialPos;

/// Supplies the position of the currently selected observable object, if
/// any, so "slew to selection" can read its coordinates.
pub trait SelectionProvider {
    /// J2000 position of the selected object, or `None` when nothing is
    /// selected.
    fn selected_position(&self) -> Option<EquatorialPos>;
}

/// Supplies the current boresight direction for "slew to view center".
pub trait ViewDirectionProvider {
    /// Current view direction as a J2000 unit vector.
    fn view_direction(&self) -> EquatorialPos;
}

/// Enumerates the device/driver pairs available on the external driver
/// bus, used to validate external-driver connection definitions.
pub trait DriverCatalog {
    /// Whether the exact `(device_model, driver_id)` pair is known.
    fn has_device(&self, device_model: &str, driver_id: &str) -> bool;
}

/// A catalog with no devices; useful where no driver bus is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyDriverCatalog;

impl DriverCatalog for EmptyDriverCatalog {
    fn has_device(&self, _device_model: &str, _driver_id: &str) -> bool {
        false
    }
}
