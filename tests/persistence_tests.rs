//! Connections-file round trips and the backup-and-fallback policy.

use mountlink::core::{Equinox, InterfaceKind};
use mountlink::models::DeviceModelCatalog;
use mountlink::persistence::FORMAT_VERSION;
use mountlink::providers::EmptyDriverCatalog;
use mountlink::registry::ConnectionDraft;
use mountlink::supervisor::ConnectionSupervisor;
use std::fs;
use std::path::Path;

fn supervisor() -> ConnectionSupervisor {
    ConnectionSupervisor::new(
        Box::new(EmptyDriverCatalog),
        DeviceModelCatalog::embedded_default(),
    )
}

fn backup_files(dir: &Path, stem: &str) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(&format!("{stem}.backup.")))
        .collect()
}

#[test]
fn test_save_load_round_trip_preserves_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("connections.json");

    let mut first = supervisor();
    let mut virtual_draft = ConnectionDraft::new("Scope1", InterfaceKind::Virtual);
    virtual_draft.fov_circles = Some(vec![serde_json::json!(0.5), serde_json::json!(2.0)]);
    virtual_draft.shortcut_slot = Some(7);
    first.add_connection(virtual_draft).unwrap();

    let mut remote_draft = ConnectionDraft::new("Remote1", InterfaceKind::NativeSerial);
    remote_draft.is_remote = Some(true);
    remote_draft.host = Some("observatory.local".into());
    remote_draft.tcp_port = Some(10005);
    remote_draft.equinox = Some("JNow".into());
    remote_draft.delay_us = Some(1_000_000);
    first.add_connection(remote_draft).unwrap();

    first.save_connections(&path).unwrap();

    let mut second = supervisor();
    second.load_connections(&path);
    // The file is a JSON object sorted by key, so reload order is
    // alphabetical.
    assert_eq!(second.list_connection_ids(), vec!["Remote1", "Scope1"]);

    let scope = second.connection("Scope1").unwrap();
    assert_eq!(scope.fov_circles, vec![0.5, 2.0]);
    assert_eq!(scope.shortcut_slot, Some(7));

    let remote = second.connection("Remote1").unwrap();
    assert_eq!(remote.host.as_deref(), Some("observatory.local"));
    assert_eq!(remote.tcp_port, Some(10005));
    assert_eq!(remote.equinox, Some(Equinox::JNow));
    assert_eq!(remote.delay_us, Some(1_000_000));
}

#[test]
fn test_version_mismatch_backs_up_and_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("connections.json");
    let document = serde_json::json!({
        "version": "0.0.0",
        "Scope1": { "interface": "Virtual" }
    });
    fs::write(&path, serde_json::to_string_pretty(&document).unwrap()).unwrap();

    let mut supervisor = supervisor();
    supervisor.load_connections(&path);
    assert!(supervisor.list_connection_ids().is_empty());
    assert!(!path.exists());
    assert_eq!(backup_files(dir.path(), "connections.json").len(), 1);
}

#[test]
fn test_unparseable_file_loads_empty_and_stays_put() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("connections.json");
    fs::write(&path, "{ not json").unwrap();

    let mut supervisor = supervisor();
    supervisor.load_connections(&path);
    assert!(supervisor.list_connection_ids().is_empty());
    // An unparseable file is left alone; only a version mismatch is
    // backed up.
    assert!(path.exists());
    assert!(backup_files(dir.path(), "connections.json").is_empty());
}

#[test]
fn test_missing_file_loads_empty_silently() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("connections.json");

    let mut supervisor = supervisor();
    supervisor.load_connections(&path);
    assert!(supervisor.list_connection_ids().is_empty());
    assert!(!path.exists());
}

#[test]
fn test_saved_document_carries_current_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("connections.json");

    let mut supervisor = supervisor();
    supervisor
        .add_connection(ConnectionDraft::new("Scope1", InterfaceKind::Virtual))
        .unwrap();
    supervisor.save_connections(&path).unwrap();

    let document: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(document["version"], FORMAT_VERSION);
    assert_eq!(document["Scope1"]["interface"], "Virtual");
    // Virtual entries persist without the polling fields.
    assert!(document["Scope1"].get("delay_us").is_none());
    assert!(document["Scope1"].get("equinox").is_none());
}

#[test]
fn test_invalid_stored_entries_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("connections.json");
    let document = serde_json::json!({
        "version": FORMAT_VERSION,
        "Good": { "interface": "Virtual" },
        "Bad": { "interface": "Teleporter" }
    });
    fs::write(&path, serde_json::to_string_pretty(&document).unwrap()).unwrap();

    let mut supervisor = supervisor();
    supervisor.load_connections(&path);
    assert_eq!(supervisor.list_connection_ids(), vec!["Good"]);
}
