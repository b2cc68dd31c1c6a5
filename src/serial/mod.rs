//! # Serial Communication Module
//!
//! Handles the UART link to the VESC.
//!
//! This module handles:
//! - Opening the serial port (115,200 baud 8N1 by default)
//! - Exposing the port through the [`Transport`](port_trait::Transport) trait
//! - Device auto-detection across common USB serial paths

pub mod port_trait;

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use crate::error::{Result, VescError};
use port_trait::Transport;
use tracing::{debug, info, warn};

/// Default VESC UART baud rate
pub const VESC_BAUD_RATE: u32 = 115_200;

/// Default VESC device paths to try (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // VESC native USB (CDC)
    "/dev/ttyUSB0", // USB-to-UART adapters on the COMM port
];

/// Per-read timeout handed to the OS driver; reads only happen when bytes are pending
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// VESC Serial Port Transport
///
/// Blocking serial port plus a monotonic clock anchored at open time.
pub struct SerialTransport {
    /// Serial port handle
    port: Box<dyn tokio_serial::SerialPort>,
    /// Device path (e.g., /dev/ttyACM0)
    device_path: String,
    /// Clock origin for `now_millis`
    epoch: Instant,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl SerialTransport {
    /// Open connection to the VESC
    ///
    /// Auto-detects the device by trying common paths.
    ///
    /// # Errors
    ///
    /// Returns error if no VESC device found or connection fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vesc_telemetry::serial::SerialTransport;
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let serial = SerialTransport::open()?;
    ///     Ok(())
    /// }
    /// ```
    pub fn open() -> Result<Self> {
        Self::open_with_paths(DEFAULT_DEVICE_PATHS, VESC_BAUD_RATE)
    }

    /// Open connection to the VESC with custom device paths
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyACM0"])
    /// * `baud_rate` - UART baud rate configured on the VESC
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Successfully opened VESC device at {}", path);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                        epoch: Instant::now(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(VescError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with 8N1 settings
    fn open_port(path: &str, baud_rate: u32) -> Result<Box<dyn tokio_serial::SerialPort>> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| VescError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(data.len())
    }

    fn bytes_available(&mut self) -> std::io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read_byte(&mut self) -> std::io::Result<u8> {
        let mut byte = [0u8; 1];
        self.port.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn discard_input(&mut self) -> std::io::Result<usize> {
        let pending = self.port.bytes_to_read()? as usize;
        self.port.clear(tokio_serial::ClearBuffer::Input)?;
        Ok(pending)
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}
