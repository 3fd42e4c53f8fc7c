//! Registry validation flows over the public API.

use mountlink::core::{InterfaceKind, DEFAULT_DELAY_US};
use mountlink::models::DeviceModelCatalog;
use mountlink::providers::EmptyDriverCatalog;
use mountlink::registry::{ConnectionDraft, RejectReason};
use mountlink::supervisor::ConnectionSupervisor;

fn supervisor() -> ConnectionSupervisor {
    ConnectionSupervisor::new(
        Box::new(EmptyDriverCatalog),
        DeviceModelCatalog::embedded_default(),
    )
}

fn remote_draft(id: &str) -> ConnectionDraft {
    let mut draft = ConnectionDraft::new(id, InterfaceKind::NativeSerial);
    draft.is_remote = Some(true);
    draft
}

#[test]
fn test_two_remote_connections_get_distinct_reserved_ports() {
    let mut supervisor = supervisor();
    supervisor.add_connection(remote_draft("Remote1")).unwrap();
    supervisor.add_connection(remote_draft("Remote2")).unwrap();

    let first = supervisor.connection("Remote1").unwrap();
    let second = supervisor.connection("Remote2").unwrap();
    assert_eq!(first.tcp_port, Some(10001));
    assert_eq!(second.tcp_port, Some(10002));
    assert_eq!(first.host.as_deref(), Some("localhost"));
}

#[test]
fn test_removed_connection_frees_its_port_and_slot() {
    let mut supervisor = supervisor();
    let mut draft = remote_draft("Remote1");
    draft.shortcut_slot = Some(4);
    supervisor.add_connection(draft).unwrap();
    assert_eq!(supervisor.used_shortcut_slots(), vec![4]);

    assert!(supervisor.remove_connection("Remote1"));
    assert!(supervisor.used_shortcut_slots().is_empty());

    // The freed port is handed out again.
    supervisor.add_connection(remote_draft("Remote2")).unwrap();
    assert_eq!(
        supervisor.connection("Remote2").unwrap().tcp_port,
        Some(10001)
    );
}

#[test]
fn test_duplicate_id_rejected_without_side_effects() {
    let mut supervisor = supervisor();
    supervisor
        .add_connection(ConnectionDraft::new("Scope1", InterfaceKind::Virtual))
        .unwrap();
    let result = supervisor.add_connection(remote_draft("Scope1"));
    assert!(matches!(result, Err(RejectReason::DuplicateId(_))));
    // The rejected draft must not have claimed a port.
    supervisor.add_connection(remote_draft("Remote1")).unwrap();
    assert_eq!(
        supervisor.connection("Remote1").unwrap().tcp_port,
        Some(10001)
    );
}

#[test]
fn test_out_of_bounds_delay_replaced_with_default() {
    let mut supervisor = supervisor();
    let mut draft = remote_draft("Remote1");
    draft.delay_us = Some(99_000_000);
    supervisor.add_connection(draft).unwrap();
    assert_eq!(
        supervisor.connection("Remote1").unwrap().delay_us,
        Some(DEFAULT_DELAY_US)
    );

    // The virtual kind carries no delay at all.
    let draft = ConnectionDraft::new("Sim", InterfaceKind::Virtual);
    supervisor.add_connection(draft).unwrap();
    assert_eq!(supervisor.connection("Sim").unwrap().delay_us, None);
}

#[test]
fn test_driver_catalog_gates_external_driver_entries() {
    let mut supervisor = supervisor();
    let mut draft = ConnectionDraft::new("Indi1", InterfaceKind::ExternalDriver);
    draft.driver_id = Some("telescope_simulator".into());
    draft.device_model = Some("Telescope Simulator".into());
    // EmptyDriverCatalog knows no devices.
    assert_eq!(
        supervisor.add_connection(draft),
        Err(RejectReason::UnknownBusDevice)
    );
}
