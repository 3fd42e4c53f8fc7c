//! Connection management and slew relay for GoTo telescope mounts.
//!
//! `mountlink` keeps a registry of telescope connection definitions, brings
//! the corresponding protocol clients up and down, and relays goto commands
//! and position reports between the host application and each device. The
//! supported transports are an in-process virtual mount, direct serial
//! links speaking the LX200 or NexStar grammars, a TCP relay to a telescope
//! server, and a shared external driver bus hosting multiple sub-devices.
//!
//! The entry point is [`supervisor::ConnectionSupervisor`]: the host stores
//! validated connection definitions through it, starts and stops clients,
//! and drives all device I/O by calling
//! [`tick`](supervisor::ConnectionSupervisor::tick) periodically.
//! Connection definitions persist across restarts via
//! [`persistence`].
//!
//! # Concurrency
//!
//! The crate is single-threaded by contract. There are no internal threads
//! and no async runtime; serial and TCP I/O never block a tick. Construct,
//! mutate and tick the supervisor from one thread only.
//!
//! # Faults
//!
//! Transport faults are absorbed: a failing device degrades its client's
//! `is_connected` flag and is skipped over, but never aborts a tick or
//! removes the connection. Recovery is an explicit stop/start.

pub mod client;
pub mod core;
pub mod error;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod providers;
pub mod registry;
pub mod supervisor;

pub use error::{AppResult, MountError};
