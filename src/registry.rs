//! Persisted connection definitions and their validation.
//!
//! The [`ConnectionRegistry`] maps connection ids to validated
//! [`ConnectionConfig`] entries. Raw input (user dialogs or the
//! connections file) arrives as a permissive [`ConnectionDraft`] and goes
//! through a fixed validation pipeline (`validate_and_insert`); the first
//! failing check wins and nothing is partially inserted. On success the
//! TCP port (if any) is claimed in the [`TcpPortPool`] before the entry
//! becomes visible.
//!
//! Entries are never mutated field-by-field: the only ways in and out are
//! insert, remove, and clear.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::core::{
    is_valid_delay, Equinox, InterfaceKind, DEFAULT_DELAY_US, MAX_FOV_CIRCLES, MAX_SHORTCUT_SLOT,
    MIN_SHORTCUT_SLOT,
};
use crate::models::DeviceModelCatalog;
use crate::providers::DriverCatalog;

/// Serial device name prefix enforced for native non-remote connections.
#[cfg(unix)]
pub const SERIAL_PORT_PREFIX: &str = "/dev/";
/// Serial device name prefix enforced for native non-remote connections.
#[cfg(windows)]
pub const SERIAL_PORT_PREFIX: &str = "COM";

/// First candidate of the reserved low port range.
const RESERVED_PORT_FIRST: u16 = 10001;
/// One past the last candidate of the reserved low port range.
const RESERVED_PORT_END: u16 = 10010;
/// First port of the dynamic/private range scanned after the reserved one.
const DYNAMIC_PORT_FIRST: u16 = 49152;

// =============================================================================
// Drafts and validated entries
// =============================================================================

/// Unvalidated connection definition, as it arrives from user input or the
/// connections file. Every field is optional or loosely typed so that a
/// malformed document still deserializes and gets a specific rejection.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionDraft {
    /// Unique connection identifier.
    pub id: String,
    /// Interface kind name (see [`InterfaceKind::as_str`]).
    pub interface: Option<String>,
    /// Whether the device is reached over TCP.
    pub is_remote: Option<bool>,
    /// Remote host name.
    pub host: Option<String>,
    /// Remote TCP port; auto-allocated when missing or invalid.
    pub tcp_port: Option<u32>,
    /// Driver identifier (embedded serial protocol or bus driver).
    pub driver_id: Option<String>,
    /// Device model preset name.
    pub device_model: Option<String>,
    /// Serial port device name (native non-remote connections).
    pub serial_port: Option<String>,
    /// Sub-device id on the driver bus (pointer entries).
    pub bus_device: Option<String>,
    /// Parent driver-bus connection id (pointer entries).
    pub bus_connection: Option<String>,
    /// Coordinate frame name ("J2000" or "JNow").
    pub equinox: Option<String>,
    /// Poll delay in microseconds.
    pub delay_us: Option<u32>,
    /// Whether to start the client when the registry is loaded.
    pub connect_at_startup: Option<bool>,
    /// Field-of-view circle diameters; non-numeric entries are dropped.
    pub fov_circles: Option<Vec<serde_json::Value>>,
    /// Goto shortcut slot (1-9).
    pub shortcut_slot: Option<i64>,
}

impl ConnectionDraft {
    /// Convenience constructor for programmatic drafts.
    pub fn new(id: impl Into<String>, interface: InterfaceKind) -> Self {
        Self {
            id: id.into(),
            interface: Some(interface.as_str().to_string()),
            ..Self::default()
        }
    }
}

/// A validated, normalized connection definition as held by the registry
/// and written to the connections file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Unique connection identifier.
    pub id: String,
    /// Transport kind.
    pub interface: InterfaceKind,
    /// Whether the device is reached over TCP.
    pub is_remote: bool,
    /// Remote host name (present iff remote).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Claimed TCP port (present iff remote).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_port: Option<u16>,
    /// Driver identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    /// Device model preset name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_model: Option<String>,
    /// Serial port device name (present iff native serial, non-remote).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_port: Option<String>,
    /// Sub-device id on the driver bus (pointer entries).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_device: Option<String>,
    /// Parent driver-bus connection id (pointer entries).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_connection: Option<String>,
    /// Coordinate frame for positions exchanged with the device. Absent
    /// for virtual entries, which exchange nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equinox: Option<Equinox>,
    /// Poll delay in microseconds. Absent for virtual entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_us: Option<u32>,
    /// Whether to start the client when the registry is loaded.
    pub connect_at_startup: bool,
    /// Field-of-view circle diameters in degrees.
    pub fov_circles: Vec<f64>,
    /// Goto shortcut slot, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortcut_slot: Option<u8>,
}

impl ConnectionConfig {
    /// Defense-in-depth shape check restated at start time: required
    /// transport fields must still be present for the entry's kind.
    pub fn is_well_formed(&self) -> bool {
        match self.interface {
            InterfaceKind::Virtual => true,
            InterfaceKind::NativeSerial => {
                if self.is_remote {
                    self.host.as_deref().is_some_and(|h| !h.is_empty())
                        && self.tcp_port.is_some()
                } else {
                    self.driver_id.is_some() && self.serial_port.is_some()
                }
            }
            InterfaceKind::ExternalDriver => {
                if self.is_remote {
                    self.host.as_deref().is_some_and(|h| !h.is_empty())
                        && self.tcp_port.is_some()
                } else {
                    self.driver_id.is_some() && self.device_model.is_some()
                }
            }
            InterfaceKind::ExternalDriverPointer => {
                self.bus_device.is_some() && self.bus_connection.is_some()
            }
            InterfaceKind::VendorAutomation => self.driver_id.is_some(),
        }
    }
}

/// Why a draft was rejected. The first failing check in the validation
/// pipeline wins.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// No id given.
    #[error("no connection id specified")]
    EmptyId,
    /// The id contains a backslash or double quote.
    #[error("the id contains invalid characters (\\ or \"): {0}")]
    InvalidIdCharacters(String),
    /// An entry with this id already exists.
    #[error("the id is already in use: {0}")]
    DuplicateId(String),
    /// The interface kind is not one of the known set.
    #[error("invalid interface kind: {0:?}")]
    UnknownInterface(Option<String>),
    /// No usable driver specified for the interface kind.
    #[error("no driver specified")]
    MissingDriver,
    /// The driver does not name an embedded serial protocol.
    #[error("no embedded protocol driver named {0}")]
    UnknownServer(String),
    /// No serial port given, or it does not match the platform prefix.
    #[error("no valid serial port specified: {0:?}")]
    InvalidSerialPort(Option<String>),
    /// The device/driver pair is not in the driver catalog.
    #[error("device model/driver pair not found in the driver catalog")]
    UnknownBusDevice,
    /// Pointer entry without a sub-device id.
    #[error("no driver-bus device id specified")]
    MissingBusDevice,
    /// Pointer entry without a parent connection id.
    #[error("no parent driver-bus connection id specified")]
    MissingBusConnection,
    /// The referenced parent connection is not live.
    #[error("parent connection is not live: {0}")]
    NoLiveParentConnection(String),
    /// Remote entry with an empty host name.
    #[error("no host name specified")]
    MissingHost,
    /// Unparseable equinox value.
    #[error("invalid equinox value: {0}")]
    InvalidEquinox(String),
}

// =============================================================================
// TCP port pool
// =============================================================================

/// The set of TCP ports currently claimed by remote connections.
/// Allocation scans a small reserved low range, then the dynamic/private
/// range, and never hands out a claimed port. Several entries may name the
/// same explicit port, so claims are counted: the port stays unavailable
/// until its last holder releases it.
#[derive(Debug, Default)]
pub struct TcpPortPool {
    used: HashMap<u16, u32>,
}

impl TcpPortPool {
    /// Whether `port` is in IANA's registered/dynamic range.
    pub fn is_valid_port(port: u32) -> bool {
        (1024..=65535).contains(&port)
    }

    /// Marks a port as in use once more.
    pub fn claim(&mut self, port: u16) {
        *self.used.entry(port).or_insert(0) += 1;
    }

    /// Drops one claim on a port; the port becomes allocatable again only
    /// when no claims remain. Unknown ports are ignored.
    pub fn release(&mut self, port: u16) {
        if let Some(count) = self.used.get_mut(&port) {
            *count -= 1;
            if *count == 0 {
                self.used.remove(&port);
            }
        }
    }

    /// Whether a port is currently claimed by anyone.
    pub fn is_claimed(&self, port: u16) -> bool {
        self.used.contains_key(&port)
    }

    /// Picks a free port: first from the reserved low range, then from the
    /// dynamic range. When both are exhausted, returns the first reserved
    /// candidate anyway; that port may already be bound elsewhere, so the
    /// fallback is logged as a warning rather than silently succeeding.
    pub fn allocate(&self) -> u16 {
        for port in RESERVED_PORT_FIRST..RESERVED_PORT_END {
            if !self.used.contains_key(&port) {
                return port;
            }
        }
        for port in DYNAMIC_PORT_FIRST..=u16::MAX {
            if !self.used.contains_key(&port) {
                return port;
            }
        }
        warn!(
            "No free TCP port in the tracked ranges; falling back to {} which may collide",
            RESERVED_PORT_FIRST
        );
        RESERVED_PORT_FIRST
    }
}

// =============================================================================
// Validation context and registry
// =============================================================================

/// External state consulted during validation: the driver catalog for
/// external-driver entries, the device-model presets for native serial
/// entries, and a view of which connections are currently live (pointer
/// entries must reference a live parent).
pub struct ValidationContext<'a> {
    /// Device/driver pairs available on the external driver bus.
    pub driver_catalog: &'a dyn DriverCatalog,
    /// Named device-model presets for native serial connections.
    pub device_models: &'a DeviceModelCatalog,
    /// Returns whether the given connection id has a live client.
    pub is_live: &'a dyn Fn(&str) -> bool,
}

/// The mapping from connection id to persisted configuration, plus the
/// port pool and shortcut-slot bindings those configurations claim.
///
/// Single-threaded by contract: the registry must only be touched from the
/// host's cooperative thread (see the crate-level concurrency notes).
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: HashMap<String, ConnectionConfig>,
    order: Vec<String>,
    ports: TcpPortPool,
    slots: HashMap<u8, String>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a draft and inserts the normalized entry. The checks run
    /// in a fixed order and the first failure wins; on failure the
    /// registry, port pool and slot bindings are unchanged.
    pub fn validate_and_insert(
        &mut self,
        draft: ConnectionDraft,
        ctx: &ValidationContext<'_>,
    ) -> Result<(), RejectReason> {
        // 1. Identifier
        let id = draft.id.trim().to_string();
        if id.is_empty() {
            return Err(RejectReason::EmptyId);
        }
        if id.contains('\\') || id.contains('"') {
            return Err(RejectReason::InvalidIdCharacters(id));
        }
        if self.entries.contains_key(&id) {
            return Err(RejectReason::DuplicateId(id));
        }

        // 2. Interface kind
        let interface = match draft.interface.as_deref() {
            Some("Virtual") => InterfaceKind::Virtual,
            Some("NativeSerial") => InterfaceKind::NativeSerial,
            Some("ExternalDriver") => InterfaceKind::ExternalDriver,
            Some("ExternalDriverPointer") => InterfaceKind::ExternalDriverPointer,
            Some("VendorAutomation") => InterfaceKind::VendorAutomation,
            other => return Err(RejectReason::UnknownInterface(other.map(String::from))),
        };

        let is_remote = match interface {
            InterfaceKind::Virtual => false,
            _ => draft.is_remote.unwrap_or(false),
        };

        // 3. Transport-specific required fields
        let mut driver_id = draft.driver_id.filter(|d| !d.is_empty());
        let mut device_model = draft.device_model.filter(|m| !m.is_empty());
        let mut serial_port = None;
        let mut bus_device = None;
        let mut bus_connection = None;
        match interface {
            InterfaceKind::Virtual => {
                driver_id = None;
                device_model = None;
            }
            InterfaceKind::NativeSerial if !is_remote => {
                // The device-model preset, when known, decides the driver.
                if let Some(model) = device_model
                    .as_deref()
                    .and_then(|m| ctx.device_models.get(m))
                {
                    driver_id = Some(model.server.clone());
                } else {
                    device_model = None;
                }
                match driver_id.as_deref() {
                    None => return Err(RejectReason::MissingDriver),
                    Some(d) if !crate::models::is_embedded_server(d) => {
                        return Err(RejectReason::UnknownServer(d.to_string()));
                    }
                    Some(_) => {}
                }
                match draft.serial_port.as_deref() {
                    Some(p) if p.starts_with(SERIAL_PORT_PREFIX) => {
                        serial_port = Some(p.to_string());
                    }
                    other => {
                        return Err(RejectReason::InvalidSerialPort(other.map(String::from)));
                    }
                }
            }
            InterfaceKind::NativeSerial => {}
            InterfaceKind::ExternalDriver if !is_remote => {
                let (model, driver) = match (device_model.as_deref(), driver_id.as_deref()) {
                    (Some(m), Some(d)) => (m, d),
                    _ => return Err(RejectReason::MissingDriver),
                };
                if !ctx.driver_catalog.has_device(model, driver) {
                    return Err(RejectReason::UnknownBusDevice);
                }
            }
            InterfaceKind::ExternalDriver => {}
            InterfaceKind::ExternalDriverPointer => {
                bus_device = match draft.bus_device.filter(|d| !d.is_empty()) {
                    Some(d) => Some(d),
                    None => return Err(RejectReason::MissingBusDevice),
                };
                let parent = match draft.bus_connection.filter(|c| !c.is_empty()) {
                    Some(c) => c,
                    None => return Err(RejectReason::MissingBusConnection),
                };
                if !(ctx.is_live)(&parent) {
                    return Err(RejectReason::NoLiveParentConnection(parent));
                }
                bus_connection = Some(parent);
            }
            InterfaceKind::VendorAutomation => {
                if driver_id.is_none() {
                    return Err(RejectReason::MissingDriver);
                }
            }
        }

        // 4. Remote host and port
        let mut host = None;
        let mut tcp_port = None;
        if is_remote {
            let h = draft.host.unwrap_or_else(|| "localhost".to_string());
            if h.is_empty() {
                return Err(RejectReason::MissingHost);
            }
            host = Some(h);
            let port = match draft.tcp_port {
                Some(p) if TcpPortPool::is_valid_port(p) => p as u16,
                _ => self.ports.allocate(),
            };
            tcp_port = Some(port);
        }

        // 5/6. Equinox and poll delay. Both are meaningless for the
        // virtual kind and stay out of its persisted form entirely; for
        // the other kinds an invalid equinox rejects while an
        // out-of-bounds delay is replaced, not rejected.
        let (equinox, delay_us) = if interface == InterfaceKind::Virtual {
            (None, None)
        } else {
            let equinox = match draft.equinox.as_deref() {
                None | Some("J2000") => Equinox::J2000,
                Some("JNow") => Equinox::JNow,
                Some(other) => return Err(RejectReason::InvalidEquinox(other.to_string())),
            };
            let delay_us = match draft.delay_us {
                Some(d) if is_valid_delay(d) => d,
                _ => DEFAULT_DELAY_US,
            };
            (Some(equinox), Some(delay_us))
        };

        // 7. FOV circles: drop non-numeric entries, cap the count.
        let mut fov_circles: Vec<f64> = draft
            .fov_circles
            .unwrap_or_default()
            .iter()
            .filter_map(serde_json::Value::as_f64)
            .collect();
        fov_circles.truncate(MAX_FOV_CIRCLES);

        // 8. Shortcut slot: first registrant of a slot wins; later
        // duplicates keep the field but are not bound.
        let shortcut_slot = match draft.shortcut_slot {
            Some(n) if (i64::from(MIN_SHORTCUT_SLOT)..=i64::from(MAX_SHORTCUT_SLOT))
                .contains(&n) =>
            {
                Some(n as u8)
            }
            _ => None,
        };

        // All checks passed: claim shared resources, then publish.
        if let Some(port) = tcp_port {
            self.ports.claim(port);
        }
        if let Some(slot) = shortcut_slot {
            self.slots.entry(slot).or_insert_with(|| id.clone());
        }
        let config = ConnectionConfig {
            id: id.clone(),
            interface,
            is_remote,
            host,
            tcp_port,
            driver_id,
            device_model,
            serial_port,
            bus_device,
            bus_connection,
            equinox,
            delay_us,
            connect_at_startup: draft.connect_at_startup.unwrap_or(false),
            fov_circles,
            shortcut_slot,
        };
        debug!("Registered connection '{}' ({})", id, interface.as_str());
        self.entries.insert(id.clone(), config);
        self.order.push(id);
        Ok(())
    }

    /// Looks up a validated entry.
    pub fn get(&self, id: &str) -> Option<&ConnectionConfig> {
        self.entries.get(id)
    }

    /// Whether an entry exists for this id.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Removes an entry, releasing its TCP port and shortcut binding.
    /// Idempotent: removing an unknown id returns false and changes
    /// nothing.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(config) = self.entries.remove(id) else {
            return false;
        };
        if let Some(port) = config.tcp_port {
            self.ports.release(port);
        }
        self.slots.retain(|_, bound| bound != id);
        self.order.retain(|o| o != id);
        true
    }

    /// Removes everything (used before a full reload).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.ports = TcpPortPool::default();
        self.slots.clear();
    }

    /// Connection ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &ConnectionConfig> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The connection bound to a shortcut slot, if any.
    pub fn slot_binding(&self, slot: u8) -> Option<&str> {
        self.slots.get(&slot).map(String::as_str)
    }

    /// Shortcut slots currently bound to a connection.
    pub fn used_slots(&self) -> Vec<u8> {
        let mut slots: Vec<u8> = self.slots.keys().copied().collect();
        slots.sort_unstable();
        slots
    }

    /// Read access to the port pool (for diagnostics and tests).
    pub fn port_pool(&self) -> &TcpPortPool {
        &self.ports
    }
}
