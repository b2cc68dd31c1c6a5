//! # VESC Packet Encoder
//!
//! Wraps a command payload into a transmittable VESC packet.

use super::crc::crc16;
use super::protocol::*;

/// Encode a frame into its on-wire representation
///
/// # Arguments
///
/// * `frame` - Frame holding the opcode and arguments
///
/// # Returns
///
/// * `Vec<u8>` - Complete packet: header + payload + crc16 (big-endian) + stop byte
///
/// # Layout
///
/// ```text
/// short: 0x02 | len(1)  | payload | crc_hi | crc_lo | 0x03
/// long:  0x03 | len(2)  | payload | crc_hi | crc_lo | 0x03
/// ```
///
/// # Examples
///
/// ```
/// use vesc_telemetry::vesc::encoder::encode_frame;
/// use vesc_telemetry::vesc::protocol::{Frame, COMM_GET_VALUES};
///
/// let packet = encode_frame(&Frame::command(COMM_GET_VALUES));
/// assert_eq!(packet, vec![0x02, 0x01, 0x04, 0x40, 0x84, 0x03]);
/// ```
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let payload = frame.payload();
    let mut packet = Vec::with_capacity(frame.encoded_len());

    if payload.len() <= VESC_SHORT_MAX_PAYLOAD {
        packet.push(VESC_START_SHORT);
        packet.push(payload.len() as u8);
    } else {
        // Frame construction caps the payload at VESC_MAX_PAYLOAD_SIZE
        packet.push(VESC_START_LONG);
        packet.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    }

    packet.extend_from_slice(payload);

    // CRC covers the payload only, never the header
    packet.extend_from_slice(&crc16(payload).to_be_bytes());
    packet.push(VESC_STOP_BYTE);

    packet
}
