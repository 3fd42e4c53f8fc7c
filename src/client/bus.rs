//! Shared external driver bus and the telescope client that rides on it.
//!
//! Several connections can use one bus process: one connection starts a
//! driver (or connects to a remote bus server) and pointer connections
//! reference devices the bus has already defined. The bus is therefore held
//! behind a shared non-owning [`BusHandle`]; the supervisor polls it once
//! per tick and routes its events, so individual clients never block on it.

use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::rc::Rc;

use crate::core::{EquatorialPos, TelescopeClient, MAX_FOV_CIRCLES};
use crate::error::AppResult;
use crate::logging::DeviceLog;

/// Asynchronous notification from the driver bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusEvent {
    /// A device has appeared on the bus.
    DeviceDefined {
        /// Bus device name.
        device: String,
    },
    /// A device has published its first coordinate set and is usable.
    CoordinatesDefined {
        /// Bus device name.
        device: String,
    },
}

/// Driver-bus backend. Implementations talk to an external driver process
/// or a remote bus server; [`MockBus`] scripts one for tests.
pub trait DriverBus {
    /// Launches a local driver and defines `device` on the bus.
    fn start_device(&mut self, device: &str, driver_id: &str) -> AppResult<()>;

    /// Removes a device from the bus. Unknown devices are ignored.
    fn stop_device(&mut self, device: &str);

    /// Attaches the bus to a remote bus server.
    fn connect_remote(&mut self, host: &str, port: u16) -> AppResult<()>;

    /// Forwards a slew request to a device.
    fn request_goto(&mut self, device: &str, target: EquatorialPos);

    /// Drains pending bus notifications.
    fn poll_events(&mut self) -> Vec<BusEvent>;

    /// Whether the device is present and reachable.
    fn is_device_connected(&self, device: &str) -> bool;

    /// Last coordinates the device published, if any.
    fn device_position(&self, device: &str) -> Option<EquatorialPos>;

    /// Tears the bus down. Called when its last connection stops.
    fn shutdown(&mut self);
}

/// Shared handle to the bus. Connections hold clones; nobody owns the bus
/// exclusively, so a stopping connection cannot invalidate the others.
pub type BusHandle = Rc<RefCell<dyn DriverBus>>;

/// Telescope client for one device on the driver bus. Holds no transport
/// state of its own: position and reachability live on the bus, which the
/// supervisor polls separately.
pub struct BusMount {
    name: String,
    device: String,
    bus: BusHandle,
    fov_circles: Vec<f64>,
}

impl BusMount {
    /// Binds a client to a bus device.
    pub fn new(name: impl Into<String>, device: impl Into<String>, bus: BusHandle) -> Self {
        Self {
            name: name.into(),
            device: device.into(),
            bus,
            fov_circles: Vec::new(),
        }
    }

    /// The bus device this client is bound to.
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl TelescopeClient for BusMount {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.bus.borrow().is_device_connected(&self.device)
    }

    fn has_known_position(&self) -> bool {
        self.bus.borrow().device_position(&self.device).is_some()
    }

    fn current_position(&self, _when: DateTime<Utc>) -> Option<EquatorialPos> {
        self.bus.borrow().device_position(&self.device)
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
        self.bus
            .borrow_mut()
            .request_goto(&self.device, target_j2000.normalized());
    }

    fn prepare_tick(&mut self) -> bool {
        // The supervisor polls the bus itself; there is no per-client wire
        // traffic to pace.
        true
    }

    fn perform_tick(&mut self, _wire_log: &mut DeviceLog) {}
}

// =============================================================================
// Mock bus
// =============================================================================

#[derive(Default)]
struct MockDevice {
    connected: bool,
    position: Option<EquatorialPos>,
}

/// Scriptable in-memory bus. Tests define devices and publish coordinates
/// by hand and inspect what the supervisor asked the bus to do.
#[derive(Default)]
pub struct MockBus {
    devices: std::collections::HashMap<String, MockDevice>,
    events: Vec<BusEvent>,
    started: Vec<(String, String)>,
    remotes: Vec<(String, u16)>,
    gotos: Vec<(String, EquatorialPos)>,
    fail_start: bool,
    shut_down: bool,
}

impl MockBus {
    /// Creates an idle mock bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `start_device` call fail.
    pub fn fail_next_start(&mut self) {
        self.fail_start = true;
    }

    /// Defines a device and queues the corresponding event.
    pub fn define_device(&mut self, device: &str) {
        self.devices.insert(
            device.to_string(),
            MockDevice {
                connected: true,
                position: None,
            },
        );
        self.events.push(BusEvent::DeviceDefined {
            device: device.to_string(),
        });
    }

    /// Publishes coordinates for a device and queues the event.
    pub fn publish_position(&mut self, device: &str, position: EquatorialPos) {
        if let Some(entry) = self.devices.get_mut(device) {
            entry.position = Some(position);
            self.events.push(BusEvent::CoordinatesDefined {
                device: device.to_string(),
            });
        }
    }

    /// Flips a device's reachability.
    pub fn set_connected(&mut self, device: &str, connected: bool) {
        if let Some(entry) = self.devices.get_mut(device) {
            entry.connected = connected;
        }
    }

    /// Devices started through [`DriverBus::start_device`].
    pub fn started_devices(&self) -> &[(String, String)] {
        &self.started
    }

    /// Remote bus servers connected through [`DriverBus::connect_remote`].
    pub fn remote_connections(&self) -> &[(String, u16)] {
        &self.remotes
    }

    /// Slew requests forwarded to the bus.
    pub fn goto_requests(&self) -> &[(String, EquatorialPos)] {
        &self.gotos
    }

    /// Whether [`DriverBus::shutdown`] ran.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl DriverBus for MockBus {
    fn start_device(&mut self, device: &str, driver_id: &str) -> AppResult<()> {
        if self.fail_start {
            self.fail_start = false;
            return Err(crate::error::MountError::Transport(format!(
                "mock bus refused to start {device}"
            )));
        }
        self.started
            .push((device.to_string(), driver_id.to_string()));
        Ok(())
    }

    fn stop_device(&mut self, device: &str) {
        self.devices.remove(device);
    }

    fn connect_remote(&mut self, host: &str, port: u16) -> AppResult<()> {
        self.remotes.push((host.to_string(), port));
        Ok(())
    }

    fn request_goto(&mut self, device: &str, target: EquatorialPos) {
        self.gotos.push((device.to_string(), target));
    }

    fn poll_events(&mut self) -> Vec<BusEvent> {
        std::mem::take(&mut self.events)
    }

    fn is_device_connected(&self, device: &str) -> bool {
        self.devices.get(device).is_some_and(|d| d.connected)
    }

    fn device_position(&self, device: &str) -> Option<EquatorialPos> {
        self.devices.get(device).and_then(|d| d.position)
    }

    fn shutdown(&mut self) {
        self.devices.clear();
        self.events.clear();
        self.shut_down = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_mount_reflects_bus_state() {
        let bus = Rc::new(RefCell::new(MockBus::new()));
        let handle: BusHandle = bus.clone();
        let mut mount = BusMount::new("Ptr", "Telescope Simulator", handle);

        assert!(!mount.is_connected());
        assert!(!mount.has_known_position());

        bus.borrow_mut().define_device("Telescope Simulator");
        assert!(mount.is_connected());

        let pos = EquatorialPos::from_ra_dec(1.0, 0.5);
        bus.borrow_mut()
            .publish_position("Telescope Simulator", pos);
        assert!(mount.has_known_position());

        mount.request_goto(pos);
        assert_eq!(bus.borrow().goto_requests().len(), 1);
        assert_eq!(bus.borrow().goto_requests()[0].0, "Telescope Simulator");
    }

    #[test]
    fn test_mock_bus_events_drain_once() {
        let mut bus = MockBus::new();
        bus.define_device("Scope");
        bus.publish_position("Scope", EquatorialPos::from_ra_dec(0.0, 0.0));
        assert_eq!(bus.poll_events().len(), 2);
        assert!(bus.poll_events().is_empty());
    }
}
