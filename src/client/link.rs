//! Byte-level serial link seam.
//!
//! The direct-serial clients talk through [`SerialLink`] so that the
//! protocol logic can be tested against an in-memory [`MockLink`] and run
//! in production against a real port ([`SerialPortLink`], behind the
//! `native_serial` feature). Reads never block the caller: a link reports
//! what is available right now and the clients buffer partial replies
//! across ticks.

use crate::error::AppResult;

/// A bidirectional byte stream with non-blocking reads.
pub trait SerialLink {
    /// Writes the whole buffer to the device.
    fn write_all(&mut self, data: &[u8]) -> AppResult<()>;

    /// Appends whatever bytes are available right now to `buf` and returns
    /// how many were read. Returns `Ok(0)` when nothing is pending.
    fn read_available(&mut self, buf: &mut Vec<u8>) -> AppResult<usize>;
}

#[cfg(feature = "native_serial")]
pub use real::SerialPortLink;

#[cfg(feature = "native_serial")]
mod real {
    use super::SerialLink;
    use crate::error::{AppResult, MountError};
    use anyhow::Context;
    use log::debug;
    use std::io::Read;
    use std::time::Duration;

    /// Default baud rate for the embedded mount protocols.
    const BAUD_RATE: u32 = 9600;

    /// A [`SerialLink`] over a real serial port.
    pub struct SerialPortLink {
        port: Box<dyn serialport::SerialPort>,
    }

    impl SerialPortLink {
        /// Opens the named port. The internal timeout is short; reads only
        /// ever fetch bytes the driver already buffered.
        pub fn open(port_name: &str) -> AppResult<Self> {
            let port = serialport::new(port_name, BAUD_RATE)
                .timeout(Duration::from_millis(10))
                .open()
                .with_context(|| {
                    format!("Failed to open serial port '{port_name}' at {BAUD_RATE} baud")
                })
                .map_err(|e| MountError::Transport(format!("{e:#}")))?;
            debug!("Serial port '{}' opened at {} baud", port_name, BAUD_RATE);
            Ok(Self { port })
        }
    }

    impl SerialLink for SerialPortLink {
        fn write_all(&mut self, data: &[u8]) -> AppResult<()> {
            std::io::Write::write_all(&mut self.port, data)
                .map_err(|e| MountError::Transport(format!("serial write failed: {e}")))?;
            self.port
                .flush()
                .map_err(|e| MountError::Transport(format!("serial flush failed: {e}")))
        }

        fn read_available(&mut self, buf: &mut Vec<u8>) -> AppResult<usize> {
            let pending = self
                .port
                .bytes_to_read()
                .map_err(|e| MountError::Transport(format!("serial status failed: {e}")))?;
            if pending == 0 {
                return Ok(0);
            }
            let mut chunk = vec![0u8; pending as usize];
            let n = self
                .port
                .read(&mut chunk)
                .map_err(|e| MountError::Transport(format!("serial read failed: {e}")))?;
            buf.extend_from_slice(&chunk[..n]);
            Ok(n)
        }
    }
}

pub use mock::{MockLink, MockLinkHandle};

mod mock {
    use super::SerialLink;
    use crate::error::{AppResult, MountError};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct MockState {
        /// Bytes queued for the client to read.
        rx: VecDeque<u8>,
        /// Everything the client has written.
        tx: Vec<u8>,
        /// When set, the next I/O call fails.
        fail: bool,
    }

    /// In-memory [`SerialLink`] for tests: replies are scripted, writes are
    /// recorded, and failures can be injected.
    #[derive(Default)]
    pub struct MockLink {
        state: Rc<RefCell<MockState>>,
    }

    /// Test-side view of a [`MockLink`], usable after the link itself has
    /// been handed to a client.
    #[derive(Clone)]
    pub struct MockLinkHandle {
        state: Rc<RefCell<MockState>>,
    }

    impl MockLink {
        /// Creates a link and the handle that scripts/inspects it.
        pub fn create() -> (Self, MockLinkHandle) {
            let state = Rc::new(RefCell::new(MockState::default()));
            (
                Self {
                    state: Rc::clone(&state),
                },
                MockLinkHandle { state },
            )
        }
    }

    impl MockLinkHandle {
        /// Queues bytes for the client to read on its next tick.
        pub fn push_reply(&self, bytes: &[u8]) {
            self.state.borrow_mut().rx.extend(bytes.iter().copied());
        }

        /// Everything written so far, as a lossy string.
        pub fn written(&self) -> String {
            String::from_utf8_lossy(&self.state.borrow().tx).into_owned()
        }

        /// Clears the write record.
        pub fn clear_written(&self) {
            self.state.borrow_mut().tx.clear();
        }

        /// Makes the next I/O call fail.
        pub fn fail_next(&self) {
            self.state.borrow_mut().fail = true;
        }
    }

    impl SerialLink for MockLink {
        fn write_all(&mut self, data: &[u8]) -> AppResult<()> {
            let mut state = self.state.borrow_mut();
            if state.fail {
                state.fail = false;
                return Err(MountError::Transport("injected write failure".into()));
            }
            state.tx.extend_from_slice(data);
            Ok(())
        }

        fn read_available(&mut self, buf: &mut Vec<u8>) -> AppResult<usize> {
            let mut state = self.state.borrow_mut();
            if state.fail {
                state.fail = false;
                return Err(MountError::Transport("injected read failure".into()));
            }
            let n = state.rx.len();
            buf.extend(state.rx.drain(..));
            Ok(n)
        }
    }
}
