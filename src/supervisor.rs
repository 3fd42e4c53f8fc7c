//! Live-client supervision: start/stop, tick multiplexing and events.
//!
//! The [`ConnectionSupervisor`] owns the registry, the live clients and the
//! shared driver bus. The host drives it by calling [`tick`] periodically
//! from one thread; clients are polled in stable insertion order and one
//! client's fault never aborts the pass. State changes are reported through
//! a queued [`ConnectionEvent`] stream drained by the host, so no observer
//! can re-enter the supervisor mid-tick.
//!
//! [`tick`]: ConnectionSupervisor::tick

use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use crate::client::bus::{BusEvent, BusHandle};
use crate::client::build_client;
use crate::core::{InterfaceKind, TelescopeClient};
use crate::logging::DeviceLog;
use crate::models::DeviceModelCatalog;
use crate::persistence;
use crate::providers::{DriverCatalog, SelectionProvider, ViewDirectionProvider};
use crate::registry::{
    ConnectionConfig, ConnectionDraft, ConnectionRegistry, RejectReason, ValidationContext,
};

/// Lifecycle notification for one connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A client went live.
    Connected {
        /// Connection id.
        id: String,
    },
    /// A live client was stopped.
    Disconnected {
        /// Connection id.
        id: String,
    },
}

/// Builds the driver bus on first use. Installed by the host; without one,
/// external-driver connections cannot start.
pub type BusFactory = Box<dyn Fn() -> BusHandle>;

/// Owns every live client and the resources they share.
///
/// Single-threaded by contract: construct, mutate and tick the supervisor
/// from one thread only.
pub struct ConnectionSupervisor {
    registry: ConnectionRegistry,
    device_models: DeviceModelCatalog,
    driver_catalog: Box<dyn DriverCatalog>,
    live: HashMap<String, Box<dyn TelescopeClient>>,
    live_order: Vec<String>,
    /// Ids usable as goto targets. Bus connections join only after their
    /// device publishes coordinates.
    telescopes: Vec<String>,
    /// Bus connections waiting for their device's first coordinate set.
    staged: Vec<String>,
    bus: Option<BusHandle>,
    bus_factory: Option<BusFactory>,
    logs: HashMap<String, DeviceLog>,
    log_directory: Option<PathBuf>,
    events: VecDeque<ConnectionEvent>,
    selection: Option<String>,
}

impl ConnectionSupervisor {
    /// Creates a supervisor with no connections.
    pub fn new(driver_catalog: Box<dyn DriverCatalog>, device_models: DeviceModelCatalog) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            device_models,
            driver_catalog,
            live: HashMap::new(),
            live_order: Vec::new(),
            telescopes: Vec::new(),
            staged: Vec::new(),
            bus: None,
            bus_factory: None,
            logs: HashMap::new(),
            log_directory: None,
            events: VecDeque::new(),
            selection: None,
        }
    }

    /// Enables per-device wire logs, written as `device_log_<id>.txt` under
    /// `directory` for non-remote connections.
    pub fn set_wire_log_directory(&mut self, directory: Option<PathBuf>) {
        self.log_directory = directory;
    }

    /// Installs the constructor for the shared driver bus.
    pub fn set_bus_factory(&mut self, factory: BusFactory) {
        self.bus_factory = Some(factory);
    }

    // =========================================================================
    // Registry surface
    // =========================================================================

    /// Validates a draft and stores it. Does not start a client.
    pub fn add_connection(&mut self, draft: ConnectionDraft) -> Result<(), RejectReason> {
        let live = &self.live;
        let ctx = ValidationContext {
            driver_catalog: self.driver_catalog.as_ref(),
            device_models: &self.device_models,
            is_live: &|id| live.contains_key(id),
        };
        self.registry.validate_and_insert(draft, &ctx)
    }

    /// Stops the connection if live, then removes its definition.
    pub fn remove_connection(&mut self, id: &str) -> bool {
        self.stop(id);
        self.registry.remove(id)
    }

    /// Stops everything and wipes the registry.
    pub fn remove_all(&mut self) {
        self.stop_all();
        self.registry.clear();
    }

    /// A stored connection definition.
    pub fn connection(&self, id: &str) -> Option<&ConnectionConfig> {
        self.registry.get(id)
    }

    /// Stored connection ids, in insertion order.
    pub fn list_connection_ids(&self) -> Vec<String> {
        self.registry.ids().map(String::from).collect()
    }

    /// Shortcut slots currently bound to a connection.
    pub fn used_shortcut_slots(&self) -> Vec<u8> {
        self.registry.used_slots()
    }

    /// The device-model presets available for native serial connections.
    pub fn device_models(&self) -> &DeviceModelCatalog {
        &self.device_models
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the client for a stored connection. Returns false when the
    /// definition is missing or malformed, a client for the id is already
    /// running, the transport cannot be brought up, or the client reports
    /// itself uninitialized.
    pub fn start(&mut self, id: &str) -> bool {
        if self.live.contains_key(id) {
            warn!("A client already exists for connection '{id}'");
            return false;
        }
        let Some(config) = self.registry.get(id).cloned() else {
            warn!("Cannot start unknown connection '{id}'");
            return false;
        };
        if !config.is_well_formed() {
            warn!("Connection '{id}' is missing required fields; not starting");
            return false;
        }

        let bus = match config.interface {
            InterfaceKind::ExternalDriver => {
                let Some(bus) = self.ensure_bus() else {
                    warn!("Connection '{id}' needs the driver bus, but none is available");
                    return false;
                };
                let brought_up = if config.is_remote {
                    match (config.host.as_deref(), config.tcp_port) {
                        (Some(host), Some(port)) => bus.borrow_mut().connect_remote(host, port),
                        _ => Err(crate::error::MountError::Configuration(format!(
                            "'{id}' is remote but has no host/port"
                        ))),
                    }
                } else {
                    match config.driver_id.as_deref() {
                        Some(driver) => bus.borrow_mut().start_device(id, driver),
                        None => Err(crate::error::MountError::Configuration(format!(
                            "'{id}' has no driver id"
                        ))),
                    }
                };
                if let Err(e) = brought_up {
                    warn!("Driver bus refused connection '{id}': {e}");
                    self.shutdown_bus_if_unused();
                    return false;
                }
                Some(bus)
            }
            InterfaceKind::ExternalDriverPointer => {
                let Some(bus) = self.bus.clone() else {
                    warn!("Connection '{id}' points at the driver bus, but it is not running");
                    return false;
                };
                Some(bus)
            }
            _ => None,
        };

        let mut client = match build_client(&config, bus.as_ref()) {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to start connection '{id}': {e}");
                self.shutdown_bus_if_unused();
                return false;
            }
        };
        if !client.is_initialized() {
            warn!("Client for connection '{id}' failed to initialize; discarding");
            self.shutdown_bus_if_unused();
            return false;
        }
        for &diameter in &config.fov_circles {
            client.add_fov_circle(diameter);
        }

        let wire_log = match (&self.log_directory, config.is_remote) {
            (Some(directory), false) => DeviceLog::create(directory, id),
            _ => DeviceLog::disabled(),
        };
        self.logs.insert(id.to_string(), wire_log);
        self.live.insert(id.to_string(), client);
        self.live_order.push(id.to_string());
        match config.interface {
            InterfaceKind::ExternalDriver | InterfaceKind::ExternalDriverPointer => {
                self.staged.push(id.to_string());
            }
            _ => self.telescopes.push(id.to_string()),
        }
        info!("Connection '{id}' is live ({})", config.interface.as_str());
        self.events.push_back(ConnectionEvent::Connected { id: id.to_string() });
        true
    }

    /// Stops a connection's client. Idempotent; returns true even for ids
    /// that were never live. The definition stays in the registry.
    pub fn stop(&mut self, id: &str) -> bool {
        let was_live = self.live.remove(id).is_some();
        self.live_order.retain(|o| o != id);
        self.staged.retain(|o| o != id);
        self.telescopes.retain(|o| o != id);
        if self.selection.as_deref() == Some(id) {
            self.selection = None;
        }
        if let Some(mut wire_log) = self.logs.remove(id) {
            wire_log.flush();
        }
        if was_live {
            // Only the connection that started a local bus device stops it;
            // pointer entries never owned theirs.
            let owns_device = self
                .registry
                .get(id)
                .is_some_and(|c| c.interface == InterfaceKind::ExternalDriver && !c.is_remote);
            if owns_device {
                if let Some(bus) = &self.bus {
                    bus.borrow_mut().stop_device(id);
                }
            }
            self.shutdown_bus_if_unused();
            info!("Connection '{id}' stopped");
            self.events
                .push_back(ConnectionEvent::Disconnected { id: id.to_string() });
        }
        true
    }

    /// Stops every live connection.
    pub fn stop_all(&mut self) {
        for id in self.live_order.clone() {
            self.stop(&id);
        }
    }

    /// Tears the bus down once no live connection uses it.
    fn shutdown_bus_if_unused(&mut self) {
        let in_use = self.live.keys().any(|id| {
            matches!(
                self.registry.get(id).map(|c| c.interface),
                Some(InterfaceKind::ExternalDriver | InterfaceKind::ExternalDriverPointer)
            )
        });
        if !in_use {
            if let Some(bus) = self.bus.take() {
                debug!("Last driver-bus connection gone; shutting the bus down");
                bus.borrow_mut().shutdown();
            }
        }
    }

    fn ensure_bus(&mut self) -> Option<BusHandle> {
        if self.bus.is_none() {
            self.bus = Some(self.bus_factory.as_ref()?());
        }
        self.bus.clone()
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// One communication pass. Routes pending driver-bus events, then polls
    /// every live client in insertion order. Client faults degrade that
    /// client's connected flag and never abort the pass.
    pub fn tick(&mut self) {
        let bus_events = match &self.bus {
            Some(bus) => bus.borrow_mut().poll_events(),
            None => Vec::new(),
        };
        for event in bus_events {
            match event {
                BusEvent::DeviceDefined { device } => {
                    debug!("Driver bus defined device '{device}'");
                }
                BusEvent::CoordinatesDefined { device } => self.promote_staged(&device),
            }
        }

        for id in self.live_order.clone() {
            let Some(client) = self.live.get_mut(&id) else {
                continue;
            };
            if !client.prepare_tick() {
                continue;
            }
            let mut fallback = DeviceLog::disabled();
            let wire_log = self.logs.get_mut(&id).unwrap_or(&mut fallback);
            client.perform_tick(wire_log);
        }
    }

    /// Moves staged bus connections bound to `device` into the telescope
    /// roster. Promotion happens at most once per connection.
    fn promote_staged(&mut self, device: &str) {
        let promoted: Vec<String> = self
            .staged
            .iter()
            .filter(|id| {
                self.registry
                    .get(id)
                    .and_then(bus_device_name)
                    .is_some_and(|d| d == device)
            })
            .cloned()
            .collect();
        for id in promoted {
            self.staged.retain(|o| o != &id);
            if !self.telescopes.contains(&id) {
                info!("Bus device '{device}' published coordinates; '{id}' is a telescope now");
                self.telescopes.push(id);
            }
        }
    }

    /// Drains the queued lifecycle events.
    pub fn drain_events(&mut self) -> Vec<ConnectionEvent> {
        self.events.drain(..).collect()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Whether a live client exists for this id.
    pub fn client_exists(&self, id: &str) -> bool {
        self.live.contains_key(id)
    }

    /// Whether the live client currently reports its transport healthy.
    pub fn is_connection_connected(&self, id: &str) -> bool {
        self.live.get(id).is_some_and(|c| c.is_connected())
    }

    /// Ids usable as goto targets, in promotion order.
    pub fn list_live_telescope_ids(&self) -> Vec<String> {
        self.telescopes.clone()
    }

    /// Read access to a live client.
    pub fn client(&self, id: &str) -> Option<&dyn TelescopeClient> {
        self.live.get(id).map(Box::as_ref)
    }

    // =========================================================================
    // Selection and goto dispatch
    // =========================================================================

    /// Marks a live connection as the active one. Returns false when no
    /// live client exists for the id.
    pub fn select(&mut self, id: &str) -> bool {
        if !self.live.contains_key(id) {
            return false;
        }
        self.selection = Some(id.to_string());
        true
    }

    /// The active connection, if any.
    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    /// Clears the active connection.
    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Requests a slew. Only connections in the telescope roster accept
    /// goto commands; the request is queued on the client and hits the wire
    /// on its next tick.
    pub fn request_goto(&mut self, id: &str, target_j2000: crate::core::EquatorialPos) -> bool {
        if !self.telescopes.iter().any(|t| t == id) {
            warn!("Connection '{id}' is not ready for goto commands");
            return false;
        }
        let Some(client) = self.live.get_mut(id) else {
            warn!("No live client for connection '{id}'");
            return false;
        };
        client.request_goto(target_j2000);
        true
    }

    /// Slews the telescope bound to a shortcut slot to the host's current
    /// object selection. No-op when the slot is unbound or nothing is
    /// selected.
    pub fn slew_to_selection(&mut self, slot: u8, provider: &dyn SelectionProvider) -> bool {
        let Some(target) = provider.selected_position() else {
            debug!("No selection to slew to");
            return false;
        };
        let Some(id) = self.registry.slot_binding(slot).map(String::from) else {
            debug!("No connection bound to shortcut slot {slot}");
            return false;
        };
        self.request_goto(&id, target)
    }

    /// Slews the telescope bound to a shortcut slot to the center of view.
    pub fn slew_to_view_direction(
        &mut self,
        slot: u8,
        provider: &dyn ViewDirectionProvider,
    ) -> bool {
        let target = provider.view_direction();
        let Some(id) = self.registry.slot_binding(slot).map(String::from) else {
            debug!("No connection bound to shortcut slot {slot}");
            return false;
        };
        self.request_goto(&id, target)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Writes the registry to the connections file.
    pub fn save_connections(&self, path: &Path) -> crate::error::AppResult<()> {
        persistence::save_connections(path, &self.registry)
    }

    /// Replaces the registry with the connections file's content, then
    /// starts every entry flagged `connect_at_startup`. Individual start
    /// failures are tolerated.
    pub fn load_connections(&mut self, path: &Path) {
        self.stop_all();
        self.registry.clear();
        for draft in persistence::load_connections(path) {
            let id = draft.id.clone();
            if let Err(reason) = self.add_connection(draft) {
                warn!("Skipping stored connection '{id}': {reason}");
            }
        }
        let autostart: Vec<String> = self
            .registry
            .entries()
            .filter(|c| c.connect_at_startup)
            .map(|c| c.id.clone())
            .collect();
        for id in autostart {
            if !self.start(&id) {
                warn!("Could not auto-start connection '{id}'");
            }
        }
    }

    #[cfg(test)]
    fn inject_client(&mut self, id: &str, client: Box<dyn TelescopeClient>) {
        self.logs.insert(id.to_string(), DeviceLog::disabled());
        self.live.insert(id.to_string(), client);
        self.live_order.push(id.to_string());
        self.telescopes.push(id.to_string());
    }
}

/// The bus device a connection is bound to, when it is a bus connection.
fn bus_device_name(config: &ConnectionConfig) -> Option<String> {
    match config.interface {
        InterfaceKind::ExternalDriver => Some(config.id.clone()),
        InterfaceKind::ExternalDriverPointer => config.bus_device.clone(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::bus::MockBus;
    use crate::core::EquatorialPos;
    use crate::providers::EmptyDriverCatalog;
    use chrono::{DateTime, Utc};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct AllowAllCatalog;

    impl DriverCatalog for AllowAllCatalog {
        fn has_device(&self, _device_model: &str, _driver_id: &str) -> bool {
            true
        }
    }

    fn supervisor() -> ConnectionSupervisor {
        ConnectionSupervisor::new(
            Box::new(EmptyDriverCatalog),
            DeviceModelCatalog::embedded_default(),
        )
    }

    fn bus_supervisor() -> (ConnectionSupervisor, Rc<RefCell<MockBus>>) {
        let bus = Rc::new(RefCell::new(MockBus::new()));
        let mut supervisor = ConnectionSupervisor::new(
            Box::new(AllowAllCatalog),
            DeviceModelCatalog::embedded_default(),
        );
        let factory_bus = bus.clone();
        supervisor.set_bus_factory(Box::new(move || factory_bus.clone()));
        (supervisor, bus)
    }

    /// Client that records tick order and optionally degrades itself.
    struct RecordingClient {
        name: String,
        record: Rc<RefCell<Vec<String>>>,
        fail_on_tick: bool,
        connected: bool,
    }

    impl TelescopeClient for RecordingClient {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn has_known_position(&self) -> bool {
            false
        }

        fn current_position(&self, _when: DateTime<Utc>) -> Option<EquatorialPos> {
            None
        }

        fn fov_circles(&self) -> &[f64] {
            &[]
        }

        fn add_fov_circle(&mut self, _diameter_deg: f64) {}

        fn request_goto(&mut self, _target_j2000: EquatorialPos) {}

        fn prepare_tick(&mut self) -> bool {
            true
        }

        fn perform_tick(&mut self, _wire_log: &mut DeviceLog) {
            self.record.borrow_mut().push(self.name.clone());
            if self.fail_on_tick {
                self.connected = false;
            }
        }
    }

    #[test]
    fn test_tick_order_and_fault_isolation() {
        let mut supervisor = supervisor();
        let record = Rc::new(RefCell::new(Vec::new()));
        for (name, fail) in [("A", false), ("B", true), ("C", false)] {
            supervisor.inject_client(
                name,
                Box::new(RecordingClient {
                    name: name.to_string(),
                    record: record.clone(),
                    fail_on_tick: fail,
                    connected: true,
                }),
            );
        }

        supervisor.tick();
        assert_eq!(*record.borrow(), vec!["A", "B", "C"]);
        assert!(!supervisor.is_connection_connected("B"));
        assert!(supervisor.is_connection_connected("C"));

        // A degraded client stays live until an explicit stop.
        supervisor.tick();
        assert_eq!(record.borrow().len(), 6);
        assert!(supervisor.client_exists("B"));
    }

    #[test]
    fn test_start_stop_event_flow() {
        let mut supervisor = supervisor();
        supervisor
            .add_connection(ConnectionDraft::new("Scope1", InterfaceKind::Virtual))
            .unwrap();

        assert!(supervisor.start("Scope1"));
        assert!(supervisor.client_exists("Scope1"));
        // A second start on a running id is rejected and leaves the
        // existing client untouched.
        assert!(!supervisor.start("Scope1"));
        assert!(supervisor.client_exists("Scope1"));
        assert_eq!(
            supervisor.drain_events(),
            vec![ConnectionEvent::Connected {
                id: "Scope1".into()
            }]
        );

        assert!(supervisor.stop("Scope1"));
        assert!(!supervisor.client_exists("Scope1"));
        assert!(supervisor.connection("Scope1").is_some());
        // Stop is idempotent and quiet the second time.
        assert!(supervisor.stop("Scope1"));
        assert!(supervisor.stop("NeverSeen"));
        assert_eq!(
            supervisor.drain_events(),
            vec![ConnectionEvent::Disconnected {
                id: "Scope1".into()
            }]
        );
    }

    #[test]
    fn test_stop_clears_selection() {
        let mut supervisor = supervisor();
        supervisor
            .add_connection(ConnectionDraft::new("Scope1", InterfaceKind::Virtual))
            .unwrap();
        supervisor.start("Scope1");
        assert!(supervisor.select("Scope1"));
        assert_eq!(supervisor.selection(), Some("Scope1"));
        supervisor.stop("Scope1");
        assert_eq!(supervisor.selection(), None);
    }

    #[test]
    fn test_unknown_connection_does_not_start() {
        let mut supervisor = supervisor();
        assert!(!supervisor.start("Ghost"));
        assert!(supervisor.drain_events().is_empty());
    }

    fn bus_draft(id: &str) -> ConnectionDraft {
        let mut draft = ConnectionDraft::new(id, InterfaceKind::ExternalDriver);
        draft.driver_id = Some("telescope_simulator".into());
        draft.device_model = Some("Telescope Simulator".into());
        draft
    }

    #[test]
    fn test_bus_promotion_exactly_once() {
        let (mut supervisor, bus) = bus_supervisor();
        supervisor.add_connection(bus_draft("Indi1")).unwrap();
        assert!(supervisor.start("Indi1"));
        assert_eq!(bus.borrow().started_devices(), &[(
            "Indi1".to_string(),
            "telescope_simulator".to_string()
        )]);

        // Staged until the device publishes coordinates.
        assert!(supervisor.list_live_telescope_ids().is_empty());
        assert!(!supervisor.request_goto("Indi1", EquatorialPos::from_ra_dec(1.0, 0.0)));

        bus.borrow_mut().define_device("Indi1");
        bus.borrow_mut()
            .publish_position("Indi1", EquatorialPos::from_ra_dec(1.0, 0.5));
        supervisor.tick();
        assert_eq!(supervisor.list_live_telescope_ids(), vec!["Indi1"]);

        // A second coordinate set does not promote again.
        bus.borrow_mut()
            .publish_position("Indi1", EquatorialPos::from_ra_dec(2.0, 0.5));
        supervisor.tick();
        assert_eq!(supervisor.list_live_telescope_ids(), vec!["Indi1"]);

        assert!(supervisor.request_goto("Indi1", EquatorialPos::from_ra_dec(1.0, 0.0)));
        assert_eq!(bus.borrow().goto_requests().len(), 1);
    }

    #[test]
    fn test_last_bus_connection_shuts_bus_down() {
        let (mut supervisor, bus) = bus_supervisor();
        supervisor.add_connection(bus_draft("Indi1")).unwrap();
        supervisor.start("Indi1");

        let mut pointer = ConnectionDraft::new("Ptr", InterfaceKind::ExternalDriverPointer);
        pointer.bus_device = Some("Indi1".into());
        pointer.bus_connection = Some("Indi1".into());
        supervisor.add_connection(pointer).unwrap();
        assert!(supervisor.start("Ptr"));

        supervisor.stop("Ptr");
        assert!(!bus.borrow().is_shut_down());
        supervisor.stop("Indi1");
        assert!(bus.borrow().is_shut_down());
    }

    #[test]
    fn test_bus_start_failure_is_contained() {
        let (mut supervisor, bus) = bus_supervisor();
        supervisor.add_connection(bus_draft("Indi1")).unwrap();
        bus.borrow_mut().fail_next_start();
        assert!(!supervisor.start("Indi1"));
        assert!(!supervisor.client_exists("Indi1"));
        assert!(supervisor.drain_events().is_empty());
    }

    struct FixedSelection(Option<EquatorialPos>);

    impl SelectionProvider for FixedSelection {
        fn selected_position(&self) -> Option<EquatorialPos> {
            self.0
        }
    }

    #[test]
    fn test_slew_to_selection_via_slot() {
        let mut supervisor = supervisor();
        let mut draft = ConnectionDraft::new("Scope1", InterfaceKind::Virtual);
        draft.shortcut_slot = Some(2);
        supervisor.add_connection(draft).unwrap();
        supervisor.start("Scope1");

        let target = EquatorialPos::from_ra_dec(1.5, -0.2);
        assert!(!supervisor.slew_to_selection(2, &FixedSelection(None)));
        assert!(!supervisor.slew_to_selection(5, &FixedSelection(Some(target))));
        assert!(supervisor.slew_to_selection(2, &FixedSelection(Some(target))));

        // The request hits the virtual mount on its next tick and the
        // position is reported the tick after.
        supervisor.tick();
        supervisor.tick();
        let reported = supervisor
            .client("Scope1")
            .unwrap()
            .current_position(Utc::now())
            .unwrap();
        assert!(reported.dot(&target.normalized()) > 0.999_999);
    }

    #[test]
    fn test_vendor_automation_start_fails_with_warning() {
        let mut supervisor = supervisor();
        let mut draft = ConnectionDraft::new("Ascom1", InterfaceKind::VendorAutomation);
        draft.driver_id = Some("Vendor.Telescope".into());
        supervisor.add_connection(draft).unwrap();
        assert!(!supervisor.start("Ascom1"));
        assert!(supervisor.connection("Ascom1").is_some());
    }
}
