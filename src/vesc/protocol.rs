//! # VESC Protocol Constants and Types
//!
//! Core packet definitions for the VESC UART protocol.

use serde::Serialize;

use crate::error::{Result, VescError};

/// Start marker for packets whose payload length fits in one byte
pub const VESC_START_SHORT: u8 = 0x02;

/// Start marker for packets with a 16-bit big-endian payload length
pub const VESC_START_LONG: u8 = 0x03;

/// Terminator byte closing every packet
pub const VESC_STOP_BYTE: u8 = 0x03;

/// Largest payload that still uses the short (2-byte) header
pub const VESC_SHORT_MAX_PAYLOAD: usize = 0xFF;

/// Largest payload the long (3-byte) header can describe
pub const VESC_MAX_PAYLOAD_SIZE: usize = 0xFFFF;

/// Bytes following the payload: crc(2) + stop(1)
pub const VESC_TRAILER_SIZE: usize = 3;

/// Firmware version request/response
pub const COMM_FW_VERSION: u8 = 0x00;

/// Realtime values request/response
pub const COMM_GET_VALUES: u8 = 0x04;

/// Payload bytes required by a GET_VALUES response (opcode + fields)
///
/// 2+2+4+4+4+4+2+4+2+4+4+4+4+4+4+1+4+1 field bytes after the opcode.
pub const COMM_GET_VALUES_MIN_SIZE: usize = 1 + 58;

/// A command packet before framing
///
/// The payload is only reachable through [`Frame::new`] and
/// [`Frame::command`], so it is never empty and never longer than
/// [`VESC_MAX_PAYLOAD_SIZE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload data (opcode followed by arguments)
    payload: Vec<u8>,
}

impl Frame {
    /// Create a new VESC frame
    ///
    /// # Arguments
    ///
    /// * `payload` - Opcode followed by its arguments (max 65535 bytes)
    ///
    /// # Errors
    ///
    /// Returns error if payload is empty or exceeds VESC_MAX_PAYLOAD_SIZE
    pub fn new(payload: Vec<u8>) -> Result<Self> {
        if payload.is_empty() {
            return Err(VescError::Protocol("Payload must contain an opcode".to_string()));
        }

        if payload.len() > VESC_MAX_PAYLOAD_SIZE {
            return Err(VescError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                payload.len(),
                VESC_MAX_PAYLOAD_SIZE
            )));
        }

        Ok(Self { payload })
    }

    /// Frame for a bare command without arguments
    pub fn command(opcode: u8) -> Self {
        Self {
            payload: vec![opcode],
        }
    }

    /// Opcode followed by its arguments
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Header size in bytes (2 for short packets, 3 for long ones)
    pub fn header_len(&self) -> usize {
        if self.payload.len() <= VESC_SHORT_MAX_PAYLOAD {
            2
        } else {
            3
        }
    }

    /// Total encoded size: header + payload + crc + stop
    pub fn encoded_len(&self) -> usize {
        self.header_len() + self.payload.len() + VESC_TRAILER_SIZE
    }
}

/// Controller fault state reported in the GET_VALUES response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    None,
    OverVoltage,
    UnderVoltage,
    Drv,
    AbsOverCurrent,
    OverTempFet,
    OverTempMotor,
    /// Any code this crate has no name for
    Unknown(u8),
}

impl From<u8> for FaultCode {
    fn from(code: u8) -> Self {
        match code {
            0 => FaultCode::None,
            1 => FaultCode::OverVoltage,
            2 => FaultCode::UnderVoltage,
            3 => FaultCode::Drv,
            4 => FaultCode::AbsOverCurrent,
            5 => FaultCode::OverTempFet,
            6 => FaultCode::OverTempMotor,
            other => FaultCode::Unknown(other),
        }
    }
}

/// Realtime motor controller measurements (GET_VALUES response)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MotorValues {
    /// MOSFET temperature in °C
    pub temp_fet: f32,

    /// Motor temperature in °C
    pub temp_motor: f32,

    /// Average motor current in amperes
    pub avg_motor_current: f32,

    /// Average input current in amperes
    pub avg_input_current: f32,

    /// Average direct-axis current in amperes
    pub avg_id: f32,

    /// Average quadrature-axis current in amperes
    pub avg_iq: f32,

    /// Duty cycle as a fraction (-1.0 to 1.0)
    pub duty: f32,

    /// Electrical RPM
    pub erpm: f32,

    /// Input (battery) voltage in volts
    pub battery_voltage: f32,

    /// Amp-hours drawn
    pub amp_hours_used: f32,

    /// Amp-hours regenerated
    pub amp_hours_charged: f32,

    /// Watt-hours drawn
    pub watt_hours_used: f32,

    /// Watt-hours regenerated
    pub watt_hours_charged: f32,

    /// Tachometer count
    pub tachometer: i32,

    /// Absolute tachometer count
    pub tachometer_abs: i32,

    /// Raw fault code byte
    pub fault_code: u8,

    /// Position PID integral term
    pub pid_pos: f32,

    /// CAN/controller ID
    pub controller_id: u8,
}

impl MotorValues {
    /// Typed view of the fault code
    pub fn fault(&self) -> FaultCode {
        FaultCode::from(self.fault_code)
    }
}

/// Latest telemetry as seen by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TelemetryRecord {
    /// True when the most recent refresh produced a valid, decoded response
    pub connected: bool,

    /// Last successfully decoded values
    pub values: MotorValues,
}
