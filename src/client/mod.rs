//! Protocol clients for the supported transports.
//!
//! Every client implements [`TelescopeClient`](crate::core::TelescopeClient)
//! and is built from a validated [`ConnectionConfig`] by [`build_client`].
//! Direct serial clients share the [`link::SerialLink`] seam; driver-bus
//! clients share a [`bus::BusHandle`] owned by the supervisor.

pub mod bus;
pub mod link;
pub mod lx200;
pub mod nexstar;
pub mod tcp;
pub mod virtual_mount;

use crate::core::{InterfaceKind, TelescopeClient, DEFAULT_DELAY_US};
use crate::error::{AppResult, MountError};
use crate::registry::ConnectionConfig;

use bus::{BusHandle, BusMount};
#[cfg(feature = "native_serial")]
use lx200::Lx200Mount;
#[cfg(feature = "native_serial")]
use nexstar::NexStarMount;
use tcp::TcpMount;
use virtual_mount::VirtualMount;

/// Builds the client for a validated connection. Driver-bus kinds need the
/// shared bus handle; the other kinds ignore it.
pub fn build_client(
    config: &ConnectionConfig,
    bus: Option<&BusHandle>,
) -> AppResult<Box<dyn TelescopeClient>> {
    match config.interface {
        InterfaceKind::Virtual => Ok(Box::new(VirtualMount::new(&config.id))),
        InterfaceKind::NativeSerial if config.is_remote => {
            let (host, port) = remote_endpoint(config)?;
            Ok(Box::new(TcpMount::connect(
                &config.id,
                host,
                port,
                config.delay_us.unwrap_or(DEFAULT_DELAY_US),
            )?))
        }
        InterfaceKind::NativeSerial => build_serial_client(config),
        InterfaceKind::ExternalDriver => {
            let bus = require_bus(config, bus)?;
            Ok(Box::new(BusMount::new(&config.id, &config.id, bus.clone())))
        }
        InterfaceKind::ExternalDriverPointer => {
            let bus = require_bus(config, bus)?;
            let device = config.bus_device.as_deref().ok_or_else(|| {
                MountError::Configuration(format!("'{}' has no bus device", config.id))
            })?;
            Ok(Box::new(BusMount::new(&config.id, device, bus.clone())))
        }
        InterfaceKind::VendorAutomation => Err(MountError::UnsupportedInterface(
            InterfaceKind::VendorAutomation.as_str().to_string(),
        )),
    }
}

fn remote_endpoint(config: &ConnectionConfig) -> AppResult<(&str, u16)> {
    match (config.host.as_deref(), config.tcp_port) {
        (Some(host), Some(port)) => Ok((host, port)),
        _ => Err(MountError::Configuration(format!(
            "'{}' is remote but has no host/port",
            config.id
        ))),
    }
}

fn require_bus<'a>(config: &ConnectionConfig, bus: Option<&'a BusHandle>) -> AppResult<&'a BusHandle> {
    bus.ok_or_else(|| {
        MountError::Configuration(format!(
            "'{}' needs the driver bus, but it is not running",
            config.id
        ))
    })
}

#[cfg(feature = "native_serial")]
fn build_serial_client(config: &ConnectionConfig) -> AppResult<Box<dyn TelescopeClient>> {
    let port = config.serial_port.as_deref().ok_or_else(|| {
        MountError::Configuration(format!("'{}' has no serial port", config.id))
    })?;
    let link = Box::new(link::SerialPortLink::open(port)?);
    let delay_us = config.delay_us.unwrap_or(DEFAULT_DELAY_US);
    match config.driver_id.as_deref() {
        Some("Lx200") => Ok(Box::new(Lx200Mount::new(&config.id, link, delay_us))),
        Some("NexStar") => Ok(Box::new(NexStarMount::new(&config.id, link, delay_us))),
        other => Err(MountError::Configuration(format!(
            "'{}' names no embedded protocol driver: {other:?}",
            config.id
        ))),
    }
}

#[cfg(not(feature = "native_serial"))]
fn build_serial_client(_config: &ConnectionConfig) -> AppResult<Box<dyn TelescopeClient>> {
    Err(MountError::SerialFeatureDisabled)
}
