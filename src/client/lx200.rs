//! Direct serial client for the Meade LX200 command set.
//!
//! ## Protocol
//!
//! ASCII commands framed as `:<cmd>#`. The client polls position with
//! `:GR#` (right ascension, reply `HH:MM:SS#` or `HH:MM.T#`) and `:GD#`
//! (declination, reply `sDD*MM#` or `sDD*MM'SS#`; some firmware sends the
//! high-bit degree character instead of `*`). A slew is the sequence
//! `:SrHH:MM:SS#`, `:SdsDD*MM:SS#`, `:MS#`; the first two answer a single
//! `0`/`1` byte, `:MS#` answers `0` on success or a digit followed by a
//! `#`-terminated message.
//!
//! Replies are buffered across ticks; a malformed or timed-out reply
//! degrades the connected flag without terminating anything. Goto requests
//! are enqueued and consumed on the next communication tick.

use chrono::{DateTime, Utc};
use log::warn;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::client::link::SerialLink;
use crate::core::{EquatorialPos, TelescopeClient, TickGate, MAX_FOV_CIRCLES};
use crate::logging::DeviceLog;

/// What the next inbound bytes are expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// `#`-terminated right ascension reply.
    Ra,
    /// `#`-terminated declination reply.
    Dec,
    /// Single `0`/`1` byte acknowledging `:Sr`/`:Sd`.
    SetAck,
    /// `:MS#` result byte; anything but `0` is a refusal followed by a
    /// `#`-terminated message.
    SlewAck,
    /// `#`-terminated text to discard.
    Discard,
}

/// Telescope client speaking the LX200 grammar over a serial link.
pub struct Lx200Mount {
    name: String,
    link: Box<dyn SerialLink>,
    gate: TickGate,
    reply_timeout: Duration,
    connected: bool,
    position: Option<EquatorialPos>,
    queued_target: Option<EquatorialPos>,
    fov_circles: Vec<f64>,
    rx: Vec<u8>,
    expects: VecDeque<Expect>,
    last_send: Option<Instant>,
    pending_ra: Option<f64>,
}

impl Lx200Mount {
    /// Wraps an already-open serial link.
    pub fn new(name: impl Into<String>, link: Box<dyn SerialLink>, delay_us: u32) -> Self {
        Self {
            name: name.into(),
            link,
            gate: TickGate::new(delay_us),
            reply_timeout: reply_timeout(delay_us),
            connected: true,
            position: None,
            queued_target: None,
            fov_circles: Vec::new(),
            rx: Vec::new(),
            expects: VecDeque::new(),
            last_send: None,
            pending_ra: None,
        }
    }

    fn degrade(&mut self, wire_log: &mut DeviceLog, why: &str) {
        warn!("[{}] degrading to disconnected: {}", self.name, why);
        wire_log.line(&format!("! {why}"));
        self.connected = false;
        self.expects.clear();
        self.rx.clear();
    }

    /// Removes and returns the next `#`-terminated token, if complete.
    fn take_token(&mut self) -> Option<String> {
        let end = self.rx.iter().position(|&b| b == b'#')?;
        // Some firmware sends the 8-bit degree character.
        let token: String = self.rx[..end]
            .iter()
            .map(|&b| if b == 0xDF { '*' } else { b as char })
            .collect();
        self.rx.drain(..=end);
        Some(token)
    }

    fn send(&mut self, wire_log: &mut DeviceLog, command: &str) -> bool {
        wire_log.line(&format!("> {command}"));
        if let Err(e) = self.link.write_all(command.as_bytes()) {
            self.degrade(wire_log, &e.to_string());
            return false;
        }
        true
    }

    /// Consumes buffered replies against the expectation queue. Returns
    /// false when a reply was malformed.
    fn consume_replies(&mut self, wire_log: &mut DeviceLog) -> bool {
        while let Some(expect) = self.expects.front().copied() {
            match expect {
                Expect::Ra => {
                    let Some(token) = self.take_token() else { break };
                    wire_log.line(&format!("< {token}#"));
                    let Some(ra) = parse_ra(&token) else {
                        self.degrade(wire_log, &format!("malformed RA reply: {token:?}"));
                        return false;
                    };
                    self.pending_ra = Some(ra);
                    self.expects.pop_front();
                }
                Expect::Dec => {
                    let Some(token) = self.take_token() else { break };
                    wire_log.line(&format!("< {token}#"));
                    let Some(dec) = parse_dec(&token) else {
                        self.degrade(wire_log, &format!("malformed Dec reply: {token:?}"));
                        return false;
                    };
                    if let Some(ra) = self.pending_ra.take() {
                        self.position = Some(EquatorialPos::from_ra_dec(ra, dec));
                    }
                    self.expects.pop_front();
                }
                Expect::SetAck => {
                    if self.rx.is_empty() {
                        break;
                    }
                    let byte = self.rx.remove(0);
                    wire_log.line(&format!("< ack {}", byte as char));
                    self.expects.pop_front();
                }
                Expect::SlewAck => {
                    if self.rx.is_empty() {
                        break;
                    }
                    let byte = self.rx.remove(0);
                    wire_log.line(&format!("< slew {}", byte as char));
                    self.expects.pop_front();
                    if byte != b'0' {
                        self.expects.push_front(Expect::Discard);
                    }
                }
                Expect::Discard => {
                    let Some(token) = self.take_token() else { break };
                    wire_log.line(&format!("< {token}#"));
                    self.expects.pop_front();
                }
            }
        }
        true
    }
}

impl TelescopeClient for Lx200Mount {
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
        if let Err(e) = self.link.read_available(&mut self.rx) {
            self.degrade(wire_log, &e.to_string());
            return;
        }
        if !self.consume_replies(wire_log) {
            return;
        }
        if !self.expects.is_empty() {
            // Still waiting on a reply from a previous pass.
            if self
                .last_send
                .is_some_and(|sent| sent.elapsed() > self.reply_timeout)
            {
                self.degrade(wire_log, "reply timed out");
            }
            return;
        }

        if let Some(target) = self.queued_target.take() {
            let (ra, dec) = target.to_ra_dec();
            let set_ra = format!(":Sr{}#", format_ra(ra));
            let set_dec = format!(":Sd{}#", format_dec(dec));
            if self.send(wire_log, &set_ra)
                && self.send(wire_log, &set_dec)
                && self.send(wire_log, ":MS#")
            {
                self.expects
                    .extend([Expect::SetAck, Expect::SetAck, Expect::SlewAck]);
                self.last_send = Some(Instant::now());
            }
        } else if self.send(wire_log, ":GR#") && self.send(wire_log, ":GD#") {
            self.expects.extend([Expect::Ra, Expect::Dec]);
            self.last_send = Some(Instant::now());
        }
    }
}

fn reply_timeout(delay_us: u32) -> Duration {
    Duration::from_micros(u64::from(delay_us) * 4).max(Duration::from_secs(1))
}

/// Parses `HH:MM:SS` or `HH:MM.T` into radians.
fn parse_ra(token: &str) -> Option<f64> {
    let mut parts = token.split(':');
    let hours: f64 = parts.next()?.trim().parse().ok()?;
    let rest = parts.next()?;
    let total_hours = if let Some(third) = parts.next() {
        let minutes: f64 = rest.trim().parse().ok()?;
        let seconds: f64 = third.trim().parse().ok()?;
        hours + minutes / 60.0 + seconds / 3600.0
    } else {
        let minutes: f64 = rest.trim().parse().ok()?;
        hours + minutes / 60.0
    };
    if !(0.0..24.0).contains(&total_hours) {
        return None;
    }
    Some(total_hours * std::f64::consts::PI / 12.0)
}

/// Parses `sDD*MM`, `sDD*MM:SS` or `sDD*MM'SS` into radians.
fn parse_dec(token: &str) -> Option<f64> {
    let token = token.trim();
    let (sign, rest) = match token.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, token.strip_prefix('+').unwrap_or(token)),
    };
    let (deg_str, rest) = rest.split_once('*')?;
    let degrees: f64 = deg_str.trim().parse().ok()?;
    let (minutes, seconds): (f64, f64) = match rest.split_once([':', '\'']) {
        Some((m, s)) => (m.trim().parse().ok()?, s.trim().parse().ok()?),
        None => (rest.trim().parse().ok()?, 0.0),
    };
    let total = degrees + minutes / 60.0 + seconds / 3600.0;
    if total > 90.0 {
        return None;
    }
    Some(sign * total * std::f64::consts::PI / 180.0)
}

/// Formats radians as `HH:MM:SS`.
fn format_ra(ra_rad: f64) -> String {
    let mut total = (ra_rad * 12.0 / std::f64::consts::PI * 3600.0).round() as i64;
    total = total.rem_euclid(24 * 3600);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total / 60) % 60,
        total % 60
    )
}

/// Formats radians as `sDD*MM:SS`.
fn format_dec(dec_rad: f64) -> String {
    let clamped = dec_rad.clamp(
        -std::f64::consts::FRAC_PI_2,
        std::f64::consts::FRAC_PI_2,
    );
    let total = (clamped.abs() * 180.0 / std::f64::consts::PI * 3600.0).round() as i64;
    let sign = if clamped < 0.0 { '-' } else { '+' };
    format!(
        "{}{:02}*{:02}:{:02}",
        sign,
        total / 3600,
        (total / 60) % 60,
        total % 60
    )
}
