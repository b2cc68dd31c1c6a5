//! # VESC Telemetry Library
//!
//! Poll and decode realtime telemetry from a VESC motor controller.
//!
//! This library provides the packet framing, checksum validation and payload
//! decoding for the VESC UART protocol, plus a blocking request/response
//! driver over any byte [`Transport`](serial::port_trait::Transport).

pub mod config;
pub mod error;
pub mod communicator;
pub mod vesc;
pub mod serial;
pub mod telemetry;
