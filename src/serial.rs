//! Blocking serial I/O with hardware control lines.
//!
//! The RPLidar drivers depend on this as an external collaborator (see
//! spec.md §2): blocking byte I/O plus DTR control to switch the lidar
//! motor on and off. [`SerialPort`] is the minimal trait both drivers need;
//! [`SystemSerialPort`] wraps the `serialport` crate, and
//! [`MockSerialPort`] is an in-memory test double.

use std::io::{Read, Write};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("failed to open serial port {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parity configuration for [`SystemSerialPort::open`], per spec.md §6
/// ("8-N-1 or 7-E-1 / 7-O-1 depending on parity").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Blocking byte I/O with DTR/RTS control lines, matching the shape the
/// RPLidar drivers depend on.
pub trait SerialPort: Send {
    fn set_dtr(&mut self);
    fn clear_dtr(&mut self);

    /// True if at least one byte can be read without blocking.
    fn readable(&mut self) -> bool;

    /// Blocks until one byte is available.
    fn getc(&mut self) -> i8;

    fn putc(&mut self, value: u8);
}

/// A real serial port, opened with hardware flow control disabled and a
/// 1 s read timeout (spec.md §6).
pub struct SystemSerialPort {
    port: Box<dyn serialport::SerialPort>,
}

impl SystemSerialPort {
    pub fn open(path: &str, baud: u32, parity: Parity) -> Result<Self, SerialError> {
        let data_bits = match parity {
            Parity::None => serialport::DataBits::Eight,
            Parity::Even | Parity::Odd => serialport::DataBits::Seven,
        };
        let serial_parity = match parity {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
        };

        let port = serialport::new(path, baud)
            .data_bits(data_bits)
            .parity(serial_parity)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_secs(1))
            .open()
            .map_err(|source| SerialError::Open {
                path: path.to_string(),
                source,
            })?;

        Ok(SystemSerialPort { port })
    }
}

impl SerialPort for SystemSerialPort {
    fn set_dtr(&mut self) {
        let _ = self.port.write_data_terminal_ready(true);
    }

    fn clear_dtr(&mut self) {
        let _ = self.port.write_data_terminal_ready(false);
    }

    fn readable(&mut self) -> bool {
        self.port.bytes_to_read().unwrap_or(0) > 0
    }

    fn getc(&mut self) -> i8 {
        let mut buf = [0u8; 1];
        loop {
            match self.port.read_exact(&mut buf) {
                Ok(()) => return buf[0] as i8,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(_) => return 0,
            }
        }
    }

    fn putc(&mut self, value: u8) {
        let _ = self.port.write_all(&[value]);
    }
}

/// An in-memory [`SerialPort`] test double: writes go to an output log,
/// reads are served from a pre-seeded input queue.
#[derive(Default)]
pub struct MockSerialPort {
    pub input: std::collections::VecDeque<u8>,
    pub output: Vec<u8>,
    pub dtr: bool,
}

impl MockSerialPort {
    pub fn new() -> Self {
        MockSerialPort::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }
}

impl SerialPort for MockSerialPort {
    fn set_dtr(&mut self) {
        self.dtr = true;
    }

    fn clear_dtr(&mut self) {
        self.dtr = false;
    }

    fn readable(&mut self) -> bool {
        !self.input.is_empty()
    }

    fn getc(&mut self) -> i8 {
        self.input.pop_front().unwrap_or(0) as i8
    }

    fn putc(&mut self, value: u8) {
        self.output.push(value);
    }
}
