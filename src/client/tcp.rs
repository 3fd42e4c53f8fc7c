//! Client for remote telescope servers over TCP.
//!
//! ## Wire format
//!
//! Little-endian length-prefixed frames. Every frame starts with a `u16`
//! total length (header included) and a `u16` message type.
//!
//! Inbound `CurrentPosition` (type 0, 24 bytes): `u64` microsecond
//! timestamp, `u32` right ascension, `i32` declination, `i32` status.
//! Outbound `Goto` (type 0, 20 bytes): `u64` microsecond timestamp,
//! `u32` right ascension, `i32` declination.
//!
//! Angles are fixed point: `0x80000000` in the RA field is twelve hours,
//! `0x40000000` in the Dec field is ninety degrees.
//!
//! The socket is non-blocking; partial frames stay buffered across ticks.
//! A closed socket, an I/O error or an out-of-range frame length degrades
//! the connected flag.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::core::{EquatorialPos, TelescopeClient, TickGate, MAX_FOV_CIRCLES};
use crate::error::{AppResult, MountError};
use crate::logging::DeviceLog;

const TAU: f64 = 2.0 * std::f64::consts::PI;
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const MESSAGE_CURRENT_POSITION: u16 = 0;
const MESSAGE_GOTO: u16 = 0;
const MIN_FRAME_LEN: usize = 4;
const MAX_FRAME_LEN: usize = 120;

/// Telescope client exchanging binary frames with a remote server.
pub struct TcpMount<S: Read + Write = TcpStream> {
    name: String,
    stream: S,
    gate: TickGate,
    connected: bool,
    position: Option<EquatorialPos>,
    queued_target: Option<EquatorialPos>,
    fov_circles: Vec<f64>,
    rx: Vec<u8>,
}

impl TcpMount<TcpStream> {
    /// Connects to `host:port` and switches the socket to non-blocking.
    pub fn connect(name: impl Into<String>, host: &str, port: u16, delay_us: u32) -> AppResult<Self> {
        let name = name.into();
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| MountError::Transport(format!("resolving {host}:{port}: {e}")))?
            .next()
            .ok_or_else(|| MountError::Transport(format!("no address for {host}:{port}")))?;
        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .map_err(|e| MountError::Transport(format!("connecting to {addr}: {e}")))?;
        stream
            .set_nodelay(true)
            .and_then(|()| stream.set_nonblocking(true))
            .map_err(|e| MountError::Transport(format!("configuring socket: {e}")))?;
        debug!("[{name}] connected to {addr}");
        Ok(Self::from_stream(name, stream, delay_us))
    }
}

impl<S: Read + Write> TcpMount<S> {
    /// Wraps an already-connected non-blocking stream.
    pub fn from_stream(name: impl Into<String>, stream: S, delay_us: u32) -> Self {
        Self {
            name: name.into(),
            stream,
            gate: TickGate::new(delay_us),
            connected: true,
            position: None,
            queued_target: None,
            fov_circles: Vec::new(),
            rx: Vec::new(),
        }
    }

    fn degrade(&mut self, wire_log: &mut DeviceLog, why: &str) {
        warn!("[{}] degrading to disconnected: {}", self.name, why);
        wire_log.line(&format!("! {why}"));
        self.connected = false;
        self.rx.clear();
    }

    /// Drains the socket into the frame buffer. Returns false on loss.
    fn fill_buffer(&mut self, wire_log: &mut DeviceLog) -> bool {
        let mut chunk = [0u8; 512];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.degrade(wire_log, "connection closed by peer");
                    return false;
                }
                Ok(n) => self.rx.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return true,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.degrade(wire_log, &format!("read failed: {e}"));
                    return false;
                }
            }
        }
    }

    /// Consumes every complete frame in the buffer.
    fn consume_frames(&mut self, wire_log: &mut DeviceLog) {
        while self.rx.len() >= 2 {
            let len = usize::from(u16::from_le_bytes([self.rx[0], self.rx[1]]));
            if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&len) {
                self.degrade(wire_log, &format!("frame length {len} out of range"));
                return;
            }
            if self.rx.len() < len {
                break;
            }
            let frame: Vec<u8> = self.rx.drain(..len).collect();
            let message_type = u16::from_le_bytes([frame[2], frame[3]]);
            if message_type == MESSAGE_CURRENT_POSITION && len >= 24 {
                let ra_int = u32::from_le_bytes([frame[12], frame[13], frame[14], frame[15]]);
                let dec_int = i32::from_le_bytes([frame[16], frame[17], frame[18], frame[19]]);
                let status = i32::from_le_bytes([frame[20], frame[21], frame[22], frame[23]]);
                let (ra, dec) = angles_from_wire(ra_int, dec_int);
                wire_log.line(&format!(
                    "< position ra {ra_int:#010x} dec {dec_int} status {status}"
                ));
                self.position = Some(EquatorialPos::from_ra_dec(ra, dec));
            } else {
                debug!(
                    "[{}] ignoring message type {} of {} bytes",
                    self.name, message_type, len
                );
            }
        }
    }

    fn send_goto(&mut self, wire_log: &mut DeviceLog, target: EquatorialPos) {
        let (ra, dec) = target.to_ra_dec();
        let (ra_int, dec_int) = angles_to_wire(ra, dec);
        let frame = encode_goto(ra_int, dec_int);
        wire_log.line(&format!("> goto ra {ra_int:#010x} dec {dec_int}"));
        if let Err(e) = self.stream.write_all(&frame) {
            self.degrade(wire_log, &format!("write failed: {e}"));
        }
    }
}

impl<S: Read + Write> TelescopeClient for TcpMount<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn has_known_position(&self) -> bool {
        self.position.is_some()
    }

    fn current_position(&self, _when: DateTime<Utc>) -> Option<EquatorialPos> {
        self.position
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
        self.queued_target = Some(target_j2000.normalized());
    }

    fn prepare_tick(&mut self) -> bool {
        self.gate.due()
    }

    fn perform_tick(&mut self, wire_log: &mut DeviceLog) {
        if !self.connected {
            return;
        }
        if !self.fill_buffer(wire_log) {
            return;
        }
        self.consume_frames(wire_log);
        if !self.connected {
            return;
        }
        if let Some(target) = self.queued_target.take() {
            self.send_goto(wire_log, target);
        }
    }
}

fn angles_from_wire(ra_int: u32, dec_int: i32) -> (f64, f64) {
    let ra = f64::from(ra_int) / 4_294_967_296.0 * TAU;
    let dec = f64::from(dec_int) / 1_073_741_824.0 * std::f64::consts::FRAC_PI_2;
    (ra, dec)
}

fn angles_to_wire(ra_rad: f64, dec_rad: f64) -> (u32, i32) {
    let ra = (ra_rad.rem_euclid(TAU) / TAU * 4_294_967_296.0).round() as i64;
    let dec = (dec_rad / std::f64::consts::FRAC_PI_2 * 1_073_741_824.0).round() as i64;
    (ra as u32, dec as i32)
}

fn encode_goto(ra_int: u32, dec_int: i32) -> [u8; 20] {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0);
    let mut frame = [0u8; 20];
    frame[0..2].copy_from_slice(&20u16.to_le_bytes());
    frame[2..4].copy_from_slice(&MESSAGE_GOTO.to_le_bytes());
    frame[4..12].copy_from_slice(&micros.to_le_bytes());
    frame[12..16].copy_from_slice(&ra_int.to_le_bytes());
    frame[16..20].copy_from_slice(&dec_int.to_le_bytes());
    frame
}
