//! Direct serial client for the Celestron NexStar hand-controller set.
//!
//! ## Protocol
//!
//! Single-letter commands, `#`-terminated replies. The client polls with
//! `E`; the controller answers `RRRR,DDDD#` where each field is a 16-bit
//! hexadecimal fraction of a full revolution (0x8000 equals twelve hours
//! of right ascension). A slew is `R` followed by the same ten-character
//! payload and is acknowledged with a bare `#`.
//!
//! Declination fractions above 0x8000 wrap negative. Replies are buffered
//! across ticks; malformed or timed-out replies degrade the connected flag.

use chrono::{DateTime, Utc};
use log::warn;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::client::link::SerialLink;
use crate::core::{EquatorialPos, TelescopeClient, TickGate, MAX_FOV_CIRCLES};
use crate::logging::DeviceLog;

const REVOLUTION: f64 = 65536.0;
const TAU: f64 = 2.0 * std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// `RRRR,DDDD#` position reply.
    Position,
    /// Bare `#` slew acknowledgement.
    Ack,
}

/// Telescope client speaking the NexStar grammar over a serial link.
pub struct NexStarMount {
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
}

impl NexStarMount {
    /// Wraps an already-open serial link.
    pub fn new(name: impl Into<String>, link: Box<dyn SerialLink>, delay_us: u32) -> Self {
        Self {
            name: name.into(),
            link,
            gate: TickGate::new(delay_us),
            reply_timeout: Duration::from_micros(u64::from(delay_us) * 4)
                .max(Duration::from_secs(1)),
            connected: true,
            position: None,
            queued_target: None,
            fov_circles: Vec::new(),
            rx: Vec::new(),
            expects: VecDeque::new(),
            last_send: None,
        }
    }

    fn degrade(&mut self, wire_log: &mut DeviceLog, why: &str) {
        warn!("[{}] degrading to disconnected: {}", self.name, why);
        wire_log.line(&format!("! {why}"));
        self.connected = false;
        self.expects.clear();
        self.rx.clear();
    }

    fn take_token(&mut self) -> Option<String> {
        let end = self.rx.iter().position(|&b| b == b'#')?;
        let token = String::from_utf8_lossy(&self.rx[..end]).into_owned();
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

    fn consume_replies(&mut self, wire_log: &mut DeviceLog) -> bool {
        while let Some(expect) = self.expects.front().copied() {
            let Some(token) = self.take_token() else { break };
            wire_log.line(&format!("< {token}#"));
            match expect {
                Expect::Position => {
                    let Some((ra, dec)) = parse_position(&token) else {
                        self.degrade(wire_log, &format!("malformed position reply: {token:?}"));
                        return false;
                    };
                    self.position = Some(EquatorialPos::from_ra_dec(ra, dec));
                }
                Expect::Ack => {}
            }
            self.expects.pop_front();
        }
        true
    }
}

impl TelescopeClient for NexStarMount {
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
            let command = format!("R{}", format_position(ra, dec));
            if self.send(wire_log, &command) {
                self.expects.push_back(Expect::Ack);
                self.last_send = Some(Instant::now());
            }
        } else if self.send(wire_log, "E") {
            self.expects.push_back(Expect::Position);
            self.last_send = Some(Instant::now());
        }
    }
}

/// Parses `RRRR,DDDD` into (ra, dec) radians.
fn parse_position(token: &str) -> Option<(f64, f64)> {
    let (ra_hex, dec_hex) = token.trim().split_once(',')?;
    let ra_frac = u32::from_str_radix(ra_hex.trim(), 16).ok()?;
    let dec_frac = u32::from_str_radix(dec_hex.trim(), 16).ok()?;
    if ra_frac > 0xFFFF || dec_frac > 0xFFFF {
        return None;
    }
    let ra = f64::from(ra_frac) / REVOLUTION * TAU;
    // Fractions past the half revolution are south of the equator.
    let dec_signed = if dec_frac >= 0x8000 {
        i64::from(dec_frac) - 0x10000
    } else {
        i64::from(dec_frac)
    };
    let dec = dec_signed as f64 / REVOLUTION * TAU;
    Some((ra, dec))
}

/// Formats (ra, dec) radians as `RRRR,DDDD`.
fn format_position(ra_rad: f64, dec_rad: f64) -> String {
    let ra_frac = ((ra_rad.rem_euclid(TAU) / TAU * REVOLUTION).round() as u32) & 0xFFFF;
    let dec_frac = ((dec_rad / TAU * REVOLUTION).round() as i64).rem_euclid(0x10000) as u32;
    format!("{ra_frac:04X},{dec_frac:04X}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::link::MockLink;
    use chrono::Utc;

    fn mount() -> (NexStarMount, crate::client::link::MockLinkHandle) {
        let (link, handle) = MockLink::create();
        (NexStarMount::new("Nex", Box::new(link), 0), handle)
    }

    #[test]
    fn test_parse_position() {
        let (ra, dec) = parse_position("8000,4000").unwrap();
        assert!((ra - std::f64::consts::PI).abs() < 1e-9);
        assert!((dec - std::f64::consts::FRAC_PI_2).abs() < 1e-9);

        // Wrapped negative declination.
        let (_, dec) = parse_position("0000,E000").unwrap();
        assert!((dec + std::f64::consts::FRAC_PI_4).abs() < 1e-9);

        assert!(parse_position("nope").is_none());
        assert!(parse_position("12345,0000").is_none());
    }

    #[test]
    fn test_format_position() {
        assert_eq!(
            format_position(std::f64::consts::PI, -std::f64::consts::FRAC_PI_4),
            "8000,E000"
        );
    }

    #[test]
    fn test_poll_updates_position() {
        let (mut mount, handle) = mount();
        let mut log = DeviceLog::disabled();

        mount.perform_tick(&mut log);
        assert_eq!(handle.written(), "E");

        handle.push_reply(b"4000,2000#");
        mount.perform_tick(&mut log);
        let (ra, dec) = mount.current_position(Utc::now()).unwrap().to_ra_dec();
        assert!((ra - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
        assert!((dec - std::f64::consts::FRAC_PI_4).abs() < 1e-9);
    }

    #[test]
    fn test_goto_then_resume_polling() {
        let (mut mount, handle) = mount();
        let mut log = DeviceLog::disabled();

        mount.request_goto(EquatorialPos::from_ra_dec(std::f64::consts::PI, 0.0));
        mount.perform_tick(&mut log);
        assert_eq!(handle.written(), "R8000,0000");

        handle.push_reply(b"#");
        handle.clear_written();
        mount.perform_tick(&mut log);
        mount.perform_tick(&mut log);
        assert_eq!(handle.written(), "E");
    }

    #[test]
    fn test_malformed_reply_degrades() {
        let (mut mount, handle) = mount();
        let mut log = DeviceLog::disabled();

        mount.perform_tick(&mut log);
        handle.push_reply(b"zz,zz#");
        mount.perform_tick(&mut log);
        assert!(!mount.is_connected());
    }
}
