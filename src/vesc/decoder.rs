//! # VESC Packet Decoder
//!
//! Validates received packets and decodes response payloads.

use thiserror::Error;

use super::buffer::FieldReader;
use super::crc::crc16;
use super::protocol::*;

/// Structural or integrity problem with a received packet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("invalid start byte: 0x{0:02X}")]
    InvalidStartMarker(u8),

    #[error("length mismatch: header declares {declared} payload bytes, packet holds {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("invalid stop byte: 0x{0:02X}")]
    BadTerminator(u8),

    #[error("CRC mismatch: packet carries 0x{received:04X}, payload computes 0x{computed:04X}")]
    ChecksumMismatch { received: u16, computed: u16 },
}

/// Problem interpreting a validated payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("unsupported command 0x{0:02X}")]
    Unsupported(u8),

    #[error("payload too short: needed {needed} bytes, got {actual}")]
    PayloadTooShort { needed: usize, actual: usize },
}

/// Decoded response payload
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Response {
    Values(MotorValues),
}

type DecodeFn = fn(&mut FieldReader<'_>) -> Result<Response, DecodeError>;

/// Response decoders keyed by opcode
const DECODERS: &[(u8, DecodeFn)] = &[(COMM_GET_VALUES, decode_get_values)];

/// Verify a complete packet and extract its payload
///
/// # Arguments
///
/// * `packet` - Complete packet bytes (header, payload, crc, stop byte)
///
/// # Returns
///
/// * `Result<&[u8], FrameError>` - Payload slice if the packet is intact
///
/// # Errors
///
/// Returns error if:
/// - Start byte is neither 0x02 nor 0x03
/// - Declared length disagrees with the packet size
/// - Stop byte is not 0x03
/// - CRC check fails
pub fn unpack_payload(packet: &[u8]) -> Result<&[u8], FrameError> {
    let (header_len, declared) = match packet.first() {
        Some(&VESC_START_SHORT) if packet.len() >= 2 => (2, packet[1] as usize),
        Some(&VESC_START_LONG) if packet.len() >= 3 => {
            (3, u16::from_be_bytes([packet[1], packet[2]]) as usize)
        }
        Some(&VESC_START_SHORT) | Some(&VESC_START_LONG) => {
            return Err(FrameError::LengthMismatch {
                declared: 0,
                actual: packet.len(),
            })
        }
        Some(&other) => return Err(FrameError::InvalidStartMarker(other)),
        None => {
            return Err(FrameError::LengthMismatch {
                declared: 0,
                actual: 0,
            })
        }
    };

    if packet.len() != header_len + declared + VESC_TRAILER_SIZE {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: packet.len(),
        });
    }

    let stop = packet[packet.len() - 1];
    if stop != VESC_STOP_BYTE {
        return Err(FrameError::BadTerminator(stop));
    }

    let received = u16::from_be_bytes([packet[packet.len() - 3], packet[packet.len() - 2]]);
    let payload = &packet[header_len..header_len + declared];
    let computed = crc16(payload);

    if received != computed {
        return Err(FrameError::ChecksumMismatch { received, computed });
    }

    Ok(payload)
}

/// Decode a validated payload by dispatching on its opcode
///
/// # Errors
///
/// Returns `DecodeError::Unsupported` for opcodes without a decoder and
/// `DecodeError::PayloadTooShort` when the payload ends early.
pub fn decode_payload(payload: &[u8]) -> Result<Response, DecodeError> {
    let (&opcode, body) = payload.split_first().ok_or(DecodeError::Empty)?;

    let decode = DECODERS
        .iter()
        .find(|(id, _)| *id == opcode)
        .map(|(_, decode)| *decode)
        .ok_or(DecodeError::Unsupported(opcode))?;

    decode(&mut FieldReader::new(body))
}

/// Decode the GET_VALUES response body (everything after the opcode)
///
/// Newer firmware appends fields after `controller_id`; those are ignored.
fn decode_get_values(reader: &mut FieldReader<'_>) -> Result<Response, DecodeError> {
    Ok(Response::Values(MotorValues {
        temp_fet: reader.read_f16(10.0)?,
        temp_motor: reader.read_f16(10.0)?,
        avg_motor_current: reader.read_f32(100.0)?,
        avg_input_current: reader.read_f32(100.0)?,
        avg_id: reader.read_f32(1000.0)?,
        avg_iq: reader.read_f32(1000.0)?,
        duty: reader.read_f16(1000.0)?,
        erpm: reader.read_f32(1.0)?,
        battery_voltage: reader.read_f16(10.0)?,
        amp_hours_used: reader.read_f32(10000.0)?,
        amp_hours_charged: reader.read_f32(10000.0)?,
        watt_hours_used: reader.read_f32(10000.0)?,
        watt_hours_charged: reader.read_f32(10000.0)?,
        tachometer: reader.read_i32()?,
        tachometer_abs: reader.read_i32()?,
        fault_code: reader.read_u8()?,
        pid_pos: reader.read_f32(1_000_000.0)?,
        controller_id: reader.read_u8()?,
    }))
}
