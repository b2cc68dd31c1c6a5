//! # VESC Packet Receiver
//!
//! Accumulates response bytes from a [`Transport`] until a complete packet
//! is seen, the receive buffer fills up, or the deadline passes.
//!
//! Only the length prefix and stop byte are inspected here; integrity is
//! checked afterwards by [`unpack_payload`](super::decoder::unpack_payload).

use std::io;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tracing::{debug, trace};

use super::protocol::{VESC_START_LONG, VESC_START_SHORT, VESC_STOP_BYTE, VESC_TRAILER_SIZE};
use crate::config::ProtocolConfig;
use crate::serial::port_trait::Transport;

/// Receive attempt failure
#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error("no complete packet within deadline ({received} bytes received)")]
    TimedOut { received: usize },

    #[error("receive buffer full ({capacity} bytes) before packet completed")]
    Overflowed { capacity: usize },

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

/// Receiver progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    Idle,
    Accumulating,
    Complete,
    TimedOut,
    Overflowed,
}

/// Point in time on the transport's millisecond clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at_ms: u64,
}

impl Deadline {
    /// Deadline `timeout_ms` after `now_ms`
    ///
    /// # Arguments
    ///
    /// * `now_ms` - Current reading of the transport clock
    /// * `timeout_ms` - Time budget; saturates instead of wrapping
    pub fn after(now_ms: u64, timeout_ms: u64) -> Self {
        Self {
            at_ms: now_ms.saturating_add(timeout_ms),
        }
    }

    /// True once `now_ms` has reached the deadline
    pub fn expired(&self, now_ms: u64) -> bool {
        now_ms >= self.at_ms
    }
}

/// Byte buffer that refuses to grow past a fixed capacity
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl FrameBuffer {
    /// Create an empty buffer holding at most `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a byte; returns false when the buffer is already full
    pub fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.buf.extend_from_slice(&[byte]);
        true
    }

    /// Bytes buffered so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing has been buffered
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// True when no further byte fits
    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    /// Fixed upper bound in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// View of the buffered bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Discard the buffered bytes, keeping the capacity
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Hand the buffered bytes off, leaving the buffer empty
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

/// Length-prefix driven packet accumulator
#[derive(Debug)]
pub struct FrameReceiver {
    buffer: FrameBuffer,
    expected_len: Option<usize>,
    state: ReceiveState,
    timeout_ms: u64,
}

impl FrameReceiver {
    /// Create an idle receiver
    ///
    /// # Arguments
    ///
    /// * `config` - Receive deadline (`timeout_ms`) and buffer size (`buffer_capacity`)
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            buffer: FrameBuffer::with_capacity(config.buffer_capacity),
            expected_len: None,
            state: ReceiveState::Idle,
            timeout_ms: config.timeout_ms,
        }
    }

    /// State after the last byte fed or the last `receive` call
    pub fn state(&self) -> ReceiveState {
        self.state
    }

    /// Total packet size announced by the header, once known
    pub fn expected_len(&self) -> Option<usize> {
        self.expected_len
    }

    /// Drop any partial packet and return to Idle
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected_len = None;
        self.state = ReceiveState::Idle;
    }

    /// Feed one byte into the state machine
    ///
    /// # Returns
    ///
    /// * `ReceiveState` - `Complete` once the announced length ends on a stop
    ///   byte, `Overflowed` when the buffer fills first. Terminal states stick
    ///   until [`reset`](Self::reset).
    pub fn push(&mut self, byte: u8) -> ReceiveState {
        if matches!(
            self.state,
            ReceiveState::Complete | ReceiveState::TimedOut | ReceiveState::Overflowed
        ) {
            return self.state;
        }

        if !self.buffer.push(byte) {
            self.state = ReceiveState::Overflowed;
            return self.state;
        }
        self.state = ReceiveState::Accumulating;

        let data = self.buffer.as_slice();
        match (data.len(), data[0]) {
            (2, VESC_START_SHORT) => {
                self.expected_len = Some(data[1] as usize + 2 + VESC_TRAILER_SIZE);
            }
            (3, VESC_START_LONG) => {
                let declared = u16::from_be_bytes([data[1], data[2]]) as usize;
                self.expected_len = Some(declared + 3 + VESC_TRAILER_SIZE);
            }
            _ => {}
        }

        if Some(self.buffer.len()) == self.expected_len && byte == VESC_STOP_BYTE {
            self.state = ReceiveState::Complete;
        } else if self.buffer.is_full() {
            self.state = ReceiveState::Overflowed;
        }

        self.state
    }

    /// Poll `transport` until a complete packet arrives or the attempt fails
    ///
    /// # Returns
    ///
    /// * `Result<Bytes, ReceiveError>` - The raw packet, header through stop byte
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The deadline passes first (`TimedOut`)
    /// - The buffer fills without a complete packet (`Overflowed`)
    /// - The transport reports an I/O failure
    pub fn receive<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<Bytes, ReceiveError> {
        self.reset();
        self.state = ReceiveState::Accumulating;

        let deadline = Deadline::after(transport.now_millis(), self.timeout_ms);

        while !deadline.expired(transport.now_millis()) {
            while !deadline.expired(transport.now_millis()) && transport.bytes_available()? > 0 {
                let byte = transport.read_byte()?;

                match self.push(byte) {
                    ReceiveState::Complete => {
                        debug!("Received VESC packet ({} bytes)", self.buffer.len());
                        return Ok(self.buffer.take());
                    }
                    ReceiveState::Overflowed => {
                        trace!("Receive buffer overflow: {:02X?}", self.buffer.as_slice());
                        return Err(ReceiveError::Overflowed {
                            capacity: self.buffer.capacity(),
                        });
                    }
                    _ => {}
                }
            }

            std::hint::spin_loop();
        }

        self.state = ReceiveState::TimedOut;
        Err(ReceiveError::TimedOut {
            received: self.buffer.len(),
        })
    }
}
