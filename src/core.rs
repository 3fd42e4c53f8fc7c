//! Core traits and data types for telescope connection management.
//!
//! This module defines the foundational abstractions shared by the rest of
//! the crate:
//!
//! - [`TelescopeClient`]: the uniform contract every transport-specific
//!   client implements, so the host never needs to know which transport a
//!   given mount uses
//! - [`EquatorialPos`]: an equatorial direction as a unit vector, with
//!   RA/Dec conversions used by the wire protocols
//! - [`InterfaceKind`] and [`Equinox`]: the closed enums persisted in
//!   connection definitions
//! - Protocol-wide constants (shortcut-slot range, FOV circle cap, poll
//!   delay bounds)
//!
//! # Threading
//!
//! The whole crate uses a single-threaded cooperative model: the host calls
//! [`ConnectionSupervisor::tick`](crate::supervisor::ConnectionSupervisor::tick)
//! once per frame/interval and every client exchanges bytes inside that
//! call with short timeouts. Nothing here is `Send`/`Sync` and nothing
//! spawns threads; touching these types from more than one thread is a
//! contract violation, not a recoverable error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::logging::DeviceLog;

// =============================================================================
// Constants
// =============================================================================

/// Lowest valid goto-shortcut slot number.
pub const MIN_SHORTCUT_SLOT: u8 = 1;
/// Highest valid goto-shortcut slot number.
pub const MAX_SHORTCUT_SLOT: u8 = 9;

/// Maximum number of field-of-view circles kept per device. Further
/// additions are accepted but dropped.
pub const MAX_FOV_CIRCLES: usize = 10;

/// Default poll delay in microseconds (0.5 s).
pub const DEFAULT_DELAY_US: u32 = 500_000;
/// Upper bound for a valid poll delay in microseconds (10 s).
pub const MAX_DELAY_US: u32 = 10_000_000;

/// Returns whether a poll delay (in microseconds) is within bounds.
pub fn is_valid_delay(delay_us: u32) -> bool {
    delay_us > 0 && delay_us <= MAX_DELAY_US
}

// =============================================================================
// Basic Data Types
// =============================================================================

/// Reference frame for coordinates exchanged with a device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Equinox {
    /// Fixed J2000.0 epoch.
    #[default]
    J2000,
    /// Equinox of date.
    JNow,
}

/// The transport kind of a connection. Dispatch over this enum replaces the
/// interface-name string comparisons of older designs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceKind {
    /// In-process simulator, no I/O. Used for testing and demos.
    Virtual,
    /// Direct serial link speaking a device-specific grammar (LX200,
    /// NexStar), or a TCP relay when the connection is remote.
    NativeSerial,
    /// Device hosted on the external driver bus.
    ExternalDriver,
    /// Pointer to a sub-device of an already-open driver-bus connection.
    ExternalDriverPointer,
    /// Third-party vendor automation bridge (platform dependent).
    VendorAutomation,
}

impl InterfaceKind {
    /// Stable name used in persisted documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceKind::Virtual => "Virtual",
            InterfaceKind::NativeSerial => "NativeSerial",
            InterfaceKind::ExternalDriver => "ExternalDriver",
            InterfaceKind::ExternalDriverPointer => "ExternalDriverPointer",
            InterfaceKind::VendorAutomation => "VendorAutomation",
        }
    }
}

/// An equatorial direction stored as a (nominally unit) vector in the
/// J2000 frame, the same representation the wire protocols convert to and
/// from right ascension / declination.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EquatorialPos {
    /// Towards RA 0h, Dec 0.
    pub x: f64,
    /// Towards RA 6h, Dec 0.
    pub y: f64,
    /// Towards the north celestial pole.
    pub z: f64,
}

impl EquatorialPos {
    /// Builds a unit vector from right ascension and declination in radians.
    pub fn from_ra_dec(ra_rad: f64, dec_rad: f64) -> Self {
        let cos_dec = dec_rad.cos();
        Self {
            x: cos_dec * ra_rad.cos(),
            y: cos_dec * ra_rad.sin(),
            z: dec_rad.sin(),
        }
    }

    /// Returns `(ra, dec)` in radians, with RA normalized to `[0, 2π)`.
    pub fn to_ra_dec(&self) -> (f64, f64) {
        let len = self.length();
        if len == 0.0 {
            return (0.0, 0.0);
        }
        let mut ra = self.y.atan2(self.x);
        if ra < 0.0 {
            ra += std::f64::consts::TAU;
        }
        let dec = (self.z / len).asin();
        (ra, dec)
    }

    /// Euclidean length.
    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Dot product with another direction.
    pub fn dot(&self, other: &EquatorialPos) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Returns the direction scaled to unit length (zero vector unchanged).
    pub fn normalized(&self) -> Self {
        let len = self.length();
        if len == 0.0 {
            return *self;
        }
        Self {
            x: self.x / len,
            y: self.y / len,
            z: self.z / len,
        }
    }
}

// =============================================================================
// Client Contract
// =============================================================================

/// The uniform capability set every transport-specific client implements.
///
/// A client is constructed already attempting its handshake; construction
/// can fail, signalled by [`TelescopeClient::is_initialized`] returning
/// false. The supervisor checks this immediately after construction and
/// discards uninitialized instances; a half-initialized client is never
/// added to the live set.
///
/// # Failure policy
///
/// [`TelescopeClient::perform_tick`] must not panic or propagate transport
/// faults past this boundary: internal I/O failures degrade
/// [`TelescopeClient::is_connected`] to false instead. Clients are removed
/// only by an explicit supervisor stop, never by self-destruction on error,
/// so the user-visible roster stays stable.
pub trait TelescopeClient {
    /// Display name of the device (the connection id).
    fn name(&self) -> &str;

    /// Whether construction-time initialization succeeded. Checked once by
    /// the supervisor; defaults to true for clients that cannot fail early.
    fn is_initialized(&self) -> bool {
        true
    }

    /// Whether the device link is currently believed healthy.
    fn is_connected(&self) -> bool;

    /// Whether a position report has been received yet. "Unknown" is a
    /// valid state for a freshly started client.
    fn has_known_position(&self) -> bool;

    /// Last reported equatorial position (J2000 unit vector), if known.
    /// `when` is the observation time of the caller's frame; clients that
    /// do not interpolate may ignore it.
    fn current_position(&self, when: DateTime<Utc>) -> Option<EquatorialPos>;

    /// Field-of-view circle diameters in degrees, in insertion order.
    fn fov_circles(&self) -> &[f64];

    /// Adds a field-of-view circle diameter. Additions beyond
    /// [`MAX_FOV_CIRCLES`] are accepted but dropped.
    fn add_fov_circle(&mut self, diameter_deg: f64);

    /// Requests a slew to the given J2000 target. The command is enqueued
    /// and consumed on the next communication tick.
    fn request_goto(&mut self, target_j2000: EquatorialPos);

    /// Returns whether a send/receive pass should run this tick. Allows
    /// per-device rate limiting without the supervisor knowing transport
    /// internals.
    fn prepare_tick(&mut self) -> bool;

    /// Exchanges bytes/messages with the device. Wire traffic goes to
    /// `wire_log`; faults degrade the connected flag and never escape.
    fn perform_tick(&mut self, wire_log: &mut DeviceLog);
}

/// Rate limiter shared by the polling clients: gates one send/receive pass
/// per configured delay.
#[derive(Debug)]
pub struct TickGate {
    delay: Duration,
    last_pass: Option<Instant>,
}

impl TickGate {
    /// Creates a gate from a poll delay in microseconds.
    pub fn new(delay_us: u32) -> Self {
        Self {
            delay: Duration::from_micros(u64::from(delay_us)),
            last_pass: None,
        }
    }

    /// Returns true (and arms the next interval) when a pass is due. The
    /// first call always passes.
    pub fn due(&mut self) -> bool {
        let now = Instant::now();
        match self.last_pass {
            Some(last) if now.duration_since(last) < self.delay => false,
            _ => {
                self.last_pass = Some(now);
                true
            }
        }
    }
}
