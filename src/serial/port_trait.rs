//! Trait abstraction for the byte channel to the VESC to enable testing

use std::io;

/// Byte-level channel to the motor controller plus a monotonic clock
pub trait Transport {
    /// Write `data`, returning the number of bytes accepted
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Number of received bytes ready to be read without blocking
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read one byte; only valid when `bytes_available` is non-zero
    fn read_byte(&mut self) -> io::Result<u8>;

    /// Drop everything received but not yet read
    ///
    /// # Returns
    ///
    /// * `io::Result<usize>` - Number of bytes thrown away
    fn discard_input(&mut self) -> io::Result<usize>;

    /// Monotonic timestamp in milliseconds
    fn now_millis(&self) -> u64;
}

#[cfg(test)]
mockall::mock! {
    pub TransportIo {}

    impl Transport for TransportIo {
        fn write(&mut self, data: &[u8]) -> io::Result<usize>;
        fn bytes_available(&mut self) -> io::Result<usize>;
        fn read_byte(&mut self) -> io::Result<u8>;
        fn discard_input(&mut self) -> io::Result<usize>;
        fn now_millis(&self) -> u64;
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;

    /// Scripted transport for testing
    ///
    /// Queued chunks become readable one at a time, each time the reader
    /// drains what is already available. The clock advances 1 ms every time
    /// `bytes_available` finds nothing to read.
    #[derive(Default)]
    pub struct MockTransport {
        pub written_data: Vec<Vec<u8>>,
        rx: VecDeque<u8>,
        pending: VecDeque<Vec<u8>>,
        clock: Cell<u64>,
        /// Response queued whenever a packet is written
        pub reply: Option<Vec<u8>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queue_rx(&mut self, data: &[u8]) {
            self.pending.push_back(data.to_vec());
        }

        pub fn queue_rx_chunks(&mut self, chunks: &[&[u8]]) {
            for chunk in chunks {
                self.queue_rx(chunk);
            }
        }

        pub fn get_written_data(&self) -> &[Vec<u8>] {
            &self.written_data
        }
    }

    impl Transport for MockTransport {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.written_data.push(data.to_vec());
            if let Some(reply) = self.reply.clone() {
                self.queue_rx(&reply);
            }
            Ok(data.len())
        }

        fn bytes_available(&mut self) -> io::Result<usize> {
            if self.rx.is_empty() {
                self.clock.set(self.clock.get() + 1);
                if let Some(chunk) = self.pending.pop_front() {
                    self.rx.extend(chunk);
                }
                return Ok(0);
            }
            Ok(self.rx.len())
        }

        fn read_byte(&mut self) -> io::Result<u8> {
            self.rx
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::WouldBlock, "no data available"))
        }

        fn discard_input(&mut self) -> io::Result<usize> {
            let dropped = self.rx.len() + self.pending.iter().map(Vec::len).sum::<usize>();
            self.rx.clear();
            self.pending.clear();
            Ok(dropped)
        }

        fn now_millis(&self) -> u64 {
            self.clock.get()
        }
    }
}
