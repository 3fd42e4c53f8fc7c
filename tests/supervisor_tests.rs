//! End-to-end supervisor flows over the public API.

use chrono::Utc;
use mountlink::core::{EquatorialPos, InterfaceKind};
use mountlink::models::DeviceModelCatalog;
use mountlink::providers::EmptyDriverCatalog;
use mountlink::registry::ConnectionDraft;
use mountlink::supervisor::{ConnectionEvent, ConnectionSupervisor};

fn supervisor() -> ConnectionSupervisor {
    let _ = env_logger::builder().is_test(true).try_init();
    ConnectionSupervisor::new(
        Box::new(EmptyDriverCatalog),
        DeviceModelCatalog::embedded_default(),
    )
}

#[test]
fn test_virtual_mount_goto_round_trip() {
    let mut supervisor = supervisor();
    supervisor
        .add_connection(ConnectionDraft::new("Scope1", InterfaceKind::Virtual))
        .unwrap();
    assert!(supervisor.start("Scope1"));
    assert!(supervisor.is_connection_connected("Scope1"));

    let target = EquatorialPos::from_ra_dec(2.1, 0.7);
    assert!(supervisor.request_goto("Scope1", target));
    supervisor.tick();

    let client = supervisor.client("Scope1").unwrap();
    assert!(client.has_known_position());
    let reported = client.current_position(Utc::now()).unwrap();
    assert!(reported.dot(&target.normalized()) > 0.999_999);
    assert!(client.is_connected());
}

#[test]
fn test_fov_circles_carried_from_config() {
    let mut supervisor = supervisor();
    let mut draft = ConnectionDraft::new("Scope1", InterfaceKind::Virtual);
    draft.fov_circles = Some(vec![serde_json::json!(0.5), serde_json::json!(1.25)]);
    supervisor.add_connection(draft).unwrap();
    supervisor.start("Scope1");

    let client = supervisor.client("Scope1").unwrap();
    assert_eq!(client.fov_circles(), &[0.5, 1.25]);
}

#[test]
fn test_connect_at_startup_tolerates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("connections.json");

    let mut first = supervisor();
    let mut auto = ConnectionDraft::new("Auto", InterfaceKind::Virtual);
    auto.connect_at_startup = Some(true);
    first.add_connection(auto).unwrap();

    let mut manual = ConnectionDraft::new("Manual", InterfaceKind::Virtual);
    manual.connect_at_startup = Some(false);
    first.add_connection(manual).unwrap();

    // VendorAutomation persists but cannot start here; the load pass must
    // shrug it off.
    let mut vendor = ConnectionDraft::new("Vendor", InterfaceKind::VendorAutomation);
    vendor.driver_id = Some("Vendor.Telescope".into());
    vendor.connect_at_startup = Some(true);
    first.add_connection(vendor).unwrap();

    first.save_connections(&path).unwrap();

    let mut second = supervisor();
    second.load_connections(&path);
    assert_eq!(second.list_connection_ids().len(), 3);
    assert!(second.client_exists("Auto"));
    assert!(!second.client_exists("Manual"));
    assert!(!second.client_exists("Vendor"));
}

#[test]
fn test_stop_all_and_remove_all() {
    let mut supervisor = supervisor();
    for id in ["A", "B"] {
        supervisor
            .add_connection(ConnectionDraft::new(id, InterfaceKind::Virtual))
            .unwrap();
        supervisor.start(id);
    }
    supervisor.drain_events();

    supervisor.stop_all();
    assert!(!supervisor.client_exists("A"));
    assert!(!supervisor.client_exists("B"));
    assert_eq!(supervisor.list_connection_ids().len(), 2);
    let events = supervisor.drain_events();
    assert_eq!(
        events,
        vec![
            ConnectionEvent::Disconnected { id: "A".into() },
            ConnectionEvent::Disconnected { id: "B".into() },
        ]
    );

    supervisor.remove_all();
    assert!(supervisor.list_connection_ids().is_empty());
}

#[test]
fn test_restart_after_stop() {
    let mut supervisor = supervisor();
    supervisor
        .add_connection(ConnectionDraft::new("Scope1", InterfaceKind::Virtual))
        .unwrap();
    assert!(supervisor.start("Scope1"));
    assert!(supervisor.stop("Scope1"));
    assert!(supervisor.start("Scope1"));
    assert!(supervisor.is_connection_connected("Scope1"));
}

#[test]
fn test_events_drain_once() {
    let mut supervisor = supervisor();
    supervisor
        .add_connection(ConnectionDraft::new("Scope1", InterfaceKind::Virtual))
        .unwrap();
    supervisor.start("Scope1");
    assert_eq!(supervisor.drain_events().len(), 1);
    assert!(supervisor.drain_events().is_empty());
}
