//! # VESC Communicator
//!
//! Request/response driver: encodes a GET_VALUES request, sends it, waits
//! for the reply, validates it and decodes the measurements.
//!
//! [`Communicator::poll`] yields a fresh result per attempt and leaves all
//! state untouched. [`Communicator::refresh`] keeps the last good values
//! and only flips the `connected` flag when an attempt fails.
//!
//! ## Usage
//!
//! ```no_run
//! use vesc_telemetry::communicator::Communicator;
//! use vesc_telemetry::serial::SerialTransport;
//!
//! let mut vesc = Communicator::with_transport(SerialTransport::open()?);
//! let record = vesc.refresh();
//! if record.connected {
//!     println!("{:.1} V", record.values.battery_voltage);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::io;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::ProtocolConfig;
use crate::serial::port_trait::Transport;
use crate::vesc::decoder::{decode_payload, unpack_payload, DecodeError, FrameError, Response};
use crate::vesc::encoder::encode_frame;
use crate::vesc::protocol::{Frame, MotorValues, TelemetryRecord, COMM_GET_VALUES};
use crate::vesc::receiver::{FrameReceiver, ReceiveError};

/// Why a refresh did not produce new values
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("no transport bound")]
    Unbound,

    #[error("timed out waiting for response ({received} bytes received)")]
    TimedOut { received: usize },

    #[error("response exceeded {capacity}-byte receive buffer")]
    Overflowed { capacity: usize },

    #[error("corrupt response: {0}")]
    Frame(#[from] FrameError),

    #[error("undecodable response: {0}")]
    Decode(#[from] DecodeError),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

impl From<ReceiveError> for RefreshError {
    fn from(err: ReceiveError) -> Self {
        match err {
            ReceiveError::TimedOut { received } => RefreshError::TimedOut { received },
            ReceiveError::Overflowed { capacity } => RefreshError::Overflowed { capacity },
            ReceiveError::Transport(e) => RefreshError::Transport(e),
        }
    }
}

/// Furthest point reached by the most recent exchange
///
/// An exchange walks `Idle -> Sent -> {TimedOut | Received}` and a received
/// packet ends in `Invalid` or `Decoded`. The communicator keeps the state
/// the last exchange stopped in until the next one starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeState {
    /// Nothing sent: no exchange yet, no transport, or the write failed
    #[default]
    Idle,
    /// Request written; the transport failed while waiting
    Sent,
    /// No complete packet before the deadline or within the buffer
    TimedOut,
    /// Complete packet buffered, not yet validated
    Received,
    /// Packet failed validation or could not be decoded
    Invalid,
    /// Values decoded
    Decoded,
}

/// Owns the transport and the last good telemetry
pub struct Communicator<T: Transport> {
    transport: Option<T>,
    receiver: FrameReceiver,
    record: TelemetryRecord,
    last_error: Option<RefreshError>,
    state: ExchangeState,
}

impl<T: Transport> Default for Communicator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Communicator<T> {
    /// Create an unbound communicator with default timing
    pub fn new() -> Self {
        Self::with_config(ProtocolConfig::default())
    }

    /// Create an unbound communicator with explicit timeout and buffer size
    pub fn with_config(config: ProtocolConfig) -> Self {
        Self {
            transport: None,
            receiver: FrameReceiver::new(&config),
            record: TelemetryRecord::default(),
            last_error: None,
            state: ExchangeState::Idle,
        }
    }

    /// Create a communicator already bound to `transport`
    pub fn with_transport(transport: T) -> Self {
        let mut comm = Self::new();
        comm.bind(transport);
        comm
    }

    /// Bind (or rebind) the transport, returning the previous one
    pub fn bind(&mut self, transport: T) -> Option<T> {
        self.transport.replace(transport)
    }

    /// Detach the transport
    pub fn unbind(&mut self) -> Option<T> {
        self.transport.take()
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    pub fn transport_mut(&mut self) -> Option<&mut T> {
        self.transport.as_mut()
    }

    /// Latest record without issuing a request
    pub fn record(&self) -> TelemetryRecord {
        self.record
    }

    /// Cause of the most recent failed refresh, cleared on success
    pub fn last_error(&self) -> Option<&RefreshError> {
        self.last_error.as_ref()
    }

    /// Where the most recent exchange stopped
    pub fn last_exchange(&self) -> ExchangeState {
        self.state
    }

    /// Frame `payload` and write it to the transport
    ///
    /// # Returns
    ///
    /// * `io::Result<usize>` - Bytes written; 0 when no transport is bound
    pub fn send_payload(&mut self, frame: &Frame) -> io::Result<usize> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(0);
        };
        transport.write(&encode_frame(frame))
    }

    /// Run one GET_VALUES exchange and return freshly decoded values
    ///
    /// Does not touch the stored record.
    ///
    /// # Errors
    ///
    /// Returns the first failure: unbound transport, timeout, buffer overflow,
    /// corrupt packet, unsupported or short payload, or an I/O error.
    pub fn poll(&mut self) -> Result<MotorValues, RefreshError> {
        self.enter(ExchangeState::Idle);

        let transport = self.transport.as_mut().ok_or(RefreshError::Unbound)?;

        // Anything already buffered answers an earlier request
        let stale = transport.discard_input()?;
        if stale > 0 {
            debug!("Discarded {} stale bytes before request", stale);
        }

        let sent = self.send_payload(&Frame::command(COMM_GET_VALUES))?;
        self.enter(ExchangeState::Sent);
        debug!("Sent GET_VALUES request ({} bytes)", sent);

        let transport = self.transport.as_mut().ok_or(RefreshError::Unbound)?;
        let packet = match self.receiver.receive(transport) {
            Ok(packet) => packet,
            Err(err @ (ReceiveError::TimedOut { .. } | ReceiveError::Overflowed { .. })) => {
                self.enter(ExchangeState::TimedOut);
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };
        self.enter(ExchangeState::Received);

        let result = decode_values(&packet);
        self.enter(if result.is_ok() {
            ExchangeState::Decoded
        } else {
            ExchangeState::Invalid
        });
        result
    }

    fn enter(&mut self, state: ExchangeState) {
        trace!("Exchange {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Request fresh telemetry, blocking up to the configured timeout
    ///
    /// On success the stored values are replaced and `connected` is set.
    /// On any failure the previous values are kept and `connected` is cleared.
    pub fn refresh(&mut self) -> TelemetryRecord {
        match self.poll() {
            Ok(values) => {
                self.record = TelemetryRecord {
                    connected: true,
                    values,
                };
                self.last_error = None;
            }
            Err(err) => {
                match &err {
                    RefreshError::TimedOut { .. } | RefreshError::Unbound => {
                        debug!("VESC refresh failed: {}", err)
                    }
                    _ => warn!("VESC refresh failed: {}", err),
                }
                self.record.connected = false;
                self.last_error = Some(err);
            }
        }

        self.record
    }
}

fn decode_values(packet: &[u8]) -> Result<MotorValues, RefreshError> {
    let payload = unpack_payload(packet)?;
    match decode_payload(payload)? {
        Response::Values(values) => Ok(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::port_trait::mocks::MockTransport;
    use crate::serial::port_trait::MockTransportIo;
    use crate::vesc::decoder::test_support::{get_values_payload, sample_raw};
    use crate::vesc::protocol::COMM_FW_VERSION;

    fn reply_frame(payload: Vec<u8>) -> Vec<u8> {
        encode_frame(&Frame::new(payload).unwrap())
    }

    fn connected_communicator() -> Communicator<MockTransport> {
        let mut transport = MockTransport::new();
        transport.reply = Some(reply_frame(get_values_payload(&sample_raw())));

        let mut comm = Communicator::with_transport(transport);
        assert!(comm.refresh().connected);
        comm
    }

    #[test]
    fn test_refresh_sends_get_values_request() {
        let comm = connected_communicator();

        let written = comm.transport().unwrap().get_written_data();
        assert_eq!(written, &[vec![0x02, 0x01, COMM_GET_VALUES, 0x40, 0x84, 0x03]]);
    }

    #[test]
    fn test_refresh_decodes_values() {
        let comm = connected_communicator();
        let record = comm.record();

        assert!(record.connected);
        assert!((record.values.temp_fet - 31.2).abs() < 1e-4);
        assert!((record.values.battery_voltage - 42.1).abs() < 1e-4);
        assert_eq!(record.values.tachometer, -98765);
        assert_eq!(record.values.controller_id, 17);
        assert!(comm.last_error().is_none());
        assert_eq!(comm.last_exchange(), ExchangeState::Decoded);
    }

    #[test]
    fn test_get_values_with_trailing_fields() {
        // 78-byte payload: opcode + 58 field bytes + 19 bytes of newer fields
        let raw = sample_raw();
        let mut payload = get_values_payload(&raw);
        payload.extend((0..19).map(|i| i as u8));
        assert_eq!(payload.len(), 0x4E);

        let packet = reply_frame(payload);
        assert_eq!(packet[0], 0x02);
        assert_eq!(packet[1], 0x4E);
        assert_eq!(packet.len(), 0x4E + 5);
        assert_eq!(*packet.last().unwrap(), 0x03);

        let mut transport = MockTransport::new();
        transport.reply = Some(packet);
        let mut comm = Communicator::with_transport(transport);

        let values = comm.poll().unwrap();
        assert_eq!(values.temp_fet, raw.temp_fet as f32 / 10.0);
        assert_eq!(values.avg_motor_current, raw.avg_motor_current as f32 / 100.0);
        assert_eq!(values.erpm, raw.erpm as f32);
        assert_eq!(values.watt_hours_used, raw.watt_hours_used as f32 / 10000.0);
        assert_eq!(values.tachometer_abs, raw.tachometer_abs);
        assert_eq!(values.fault_code, raw.fault_code);
        assert_eq!(values.pid_pos, raw.pid_pos as f32 / 1_000_000.0);
        assert_eq!(values.controller_id, raw.controller_id);

        // poll never stores
        assert!(!comm.record().connected);
    }

    #[test]
    fn test_timeout_keeps_previous_values() {
        let mut comm = connected_communicator();
        let before = comm.record().values;

        comm.transport_mut().unwrap().reply = None;
        let record = comm.refresh();

        assert!(!record.connected);
        assert_eq!(record.values, before);
        assert!(matches!(comm.last_error(), Some(RefreshError::TimedOut { received: 0 })));
        assert_eq!(comm.last_exchange(), ExchangeState::TimedOut);
    }

    #[test]
    fn test_checksum_mismatch_keeps_previous_values() {
        let mut comm = connected_communicator();
        let before = comm.record().values;

        let mut raw = sample_raw();
        raw.battery_voltage = 360;
        let mut packet = reply_frame(get_values_payload(&raw));
        let crc_hi = packet.len() - 3;
        packet[crc_hi] ^= 0x40;
        comm.transport_mut().unwrap().reply = Some(packet);

        let record = comm.refresh();
        assert!(!record.connected);
        assert_eq!(record.values, before);
        assert!(matches!(
            comm.last_error(),
            Some(RefreshError::Frame(FrameError::ChecksumMismatch { .. }))
        ));
        assert_eq!(comm.last_exchange(), ExchangeState::Invalid);
    }

    #[test]
    fn test_bad_terminator_never_updates() {
        let mut comm = connected_communicator();
        let before = comm.record().values;

        let mut raw = sample_raw();
        raw.erpm = 5000;
        let mut packet = reply_frame(get_values_payload(&raw));
        let last = packet.len() - 1;
        packet[last] = 0x00;
        comm.transport_mut().unwrap().reply = Some(packet);

        let record = comm.refresh();
        assert!(!record.connected);
        assert_eq!(record.values, before);
    }

    #[test]
    fn test_unsupported_opcode_leaves_values_bit_identical() {
        let mut comm = connected_communicator();
        let before = comm.record().values;

        comm.transport_mut().unwrap().reply = Some(reply_frame(vec![COMM_FW_VERSION, 6, 5, 0x41]));
        let record = comm.refresh();

        assert!(!record.connected);
        assert_eq!(record.values.temp_fet.to_bits(), before.temp_fet.to_bits());
        assert_eq!(record.values.pid_pos.to_bits(), before.pid_pos.to_bits());
        assert_eq!(record.values, before);
        assert!(matches!(
            comm.last_error(),
            Some(RefreshError::Decode(DecodeError::Unsupported(COMM_FW_VERSION)))
        ));
    }

    #[test]
    fn test_overflow_reports_disconnected() {
        let mut transport = MockTransport::new();
        transport.reply = Some(vec![0x55; 400]);
        let mut comm = Communicator::with_transport(transport);

        assert!(!comm.refresh().connected);
        assert!(matches!(comm.last_error(), Some(RefreshError::Overflowed { capacity: 256 })));
        assert_eq!(comm.last_exchange(), ExchangeState::TimedOut);
    }

    #[test]
    fn test_recovers_after_failure() {
        let mut comm = connected_communicator();
        let good = comm.transport_mut().unwrap().reply.take();

        assert!(!comm.refresh().connected);

        comm.transport_mut().unwrap().reply = good;
        assert!(comm.refresh().connected);
        assert!(comm.last_error().is_none());
    }

    #[test]
    fn test_unbound_reports_zero_and_disconnected() {
        let mut comm: Communicator<MockTransport> = Communicator::new();

        assert_eq!(comm.send_payload(&Frame::command(COMM_GET_VALUES)).unwrap(), 0);
        let record = comm.refresh();
        assert!(!record.connected);
        assert!(matches!(comm.last_error(), Some(RefreshError::Unbound)));
        assert_eq!(comm.last_exchange(), ExchangeState::Idle);
    }

    #[test]
    fn test_send_payload_writes_once() {
        let mut comm = Communicator::with_transport(MockTransport::new());
        let frame = Frame::new(vec![0x05, 0x00, 0x00, 0x13, 0x88]).unwrap();

        let sent = comm.send_payload(&frame).unwrap();
        assert_eq!(sent, frame.encoded_len());
        assert_eq!(comm.transport().unwrap().get_written_data().len(), 1);
    }

    #[test]
    fn test_bind_replaces_transport() {
        let mut comm = Communicator::with_transport(MockTransport::new());
        let previous = comm.bind(MockTransport::new());
        assert!(previous.is_some());
        assert!(comm.unbind().is_some());
        assert!(comm.transport().is_none());
    }

    #[test]
    fn test_silent_transport_returns_within_budget() {
        let mut mock = MockTransportIo::new();
        let mut clock = 0u64;
        mock.expect_discard_input().times(1).returning(|| Ok(0));
        mock.expect_write().times(1).returning(|data: &[u8]| Ok(data.len()));
        mock.expect_bytes_available().returning(|| Ok(0));
        mock.expect_now_millis().returning(move || {
            clock += 1;
            clock
        });

        let mut comm = Communicator::with_transport(mock);
        let record = comm.refresh();

        assert!(!record.connected);
        let now = comm.transport().unwrap().now_millis();
        assert!(now <= 110, "refresh overran its budget: {} ms", now);
    }

    #[test]
    fn test_custom_timeout() {
        let mut comm: Communicator<MockTransport> = Communicator::with_config(ProtocolConfig {
            timeout_ms: 20,
            buffer_capacity: 256,
        });
        comm.bind(MockTransport::new());

        comm.refresh();
        let now = comm.transport().unwrap().now_millis();
        assert!(now < 40, "clock at {} ms", now);
    }

    #[test]
    fn test_stale_reply_is_discarded_before_request() {
        let mut stale = sample_raw();
        stale.battery_voltage = 100;

        let mut transport = MockTransport::new();
        transport.queue_rx(&reply_frame(get_values_payload(&stale)));
        transport.reply = Some(reply_frame(get_values_payload(&sample_raw())));
        let mut comm = Communicator::with_transport(transport);

        let record = comm.refresh();
        assert!(record.connected);
        assert!((record.values.battery_voltage - 42.1).abs() < 1e-4);

        // Device goes quiet: nothing left over may pass as a reply
        comm.transport_mut().unwrap().reply = None;
        let record = comm.refresh();
        assert!(!record.connected);
        assert!(matches!(comm.last_error(), Some(RefreshError::TimedOut { received: 0 })));
    }

    #[test]
    fn test_late_partial_reply_is_discarded() {
        let mut comm: Communicator<MockTransport> = Communicator::with_config(ProtocolConfig {
            timeout_ms: 10,
            buffer_capacity: 256,
        });
        comm.bind(MockTransport::new());
        assert!(!comm.refresh().connected);

        // Tail of the answer to the timed-out request shows up afterwards
        let late = reply_frame(get_values_payload(&sample_raw()));
        let transport = comm.transport_mut().unwrap();
        transport.queue_rx(&late[20..]);
        transport.reply = Some(late.clone());

        let record = comm.refresh();
        assert!(record.connected);
        assert_eq!(comm.last_exchange(), ExchangeState::Decoded);
    }

    #[test]
    fn test_transport_failure_while_waiting_stays_sent() {
        let mut mock = MockTransportIo::new();
        mock.expect_discard_input().returning(|| Ok(0));
        mock.expect_write().returning(|data: &[u8]| Ok(data.len()));
        mock.expect_now_millis().returning(|| 0);
        mock.expect_bytes_available()
            .returning(|| Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));

        let mut comm = Communicator::with_transport(mock);
        assert!(!comm.refresh().connected);
        assert!(matches!(comm.last_error(), Some(RefreshError::Transport(_))));
        assert_eq!(comm.last_exchange(), ExchangeState::Sent);
    }

    #[test]
    fn test_failed_write_never_leaves_idle() {
        let mut mock = MockTransportIo::new();
        mock.expect_discard_input().returning(|| Ok(0));
        mock.expect_write()
            .returning(|_: &[u8]| Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
        mock.expect_bytes_available().never();

        let mut comm = Communicator::with_transport(mock);
        assert!(!comm.refresh().connected);
        assert_eq!(comm.last_exchange(), ExchangeState::Idle);
    }
}
