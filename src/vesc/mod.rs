//! # VESC Protocol Module
//!
//! Implementation of the VESC UART packet protocol.
//!
//! This module handles:
//! - Request packet encoding (short and long headers)
//! - Deadline-bounded packet reception
//! - CRC16-XModem checksum calculation and packet validation
//! - GET_VALUES response decoding (fixed-point fields)

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod receiver;
pub mod buffer;
pub mod crc;
