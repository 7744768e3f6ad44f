/// Default maximum payload length, chosen to stay under common path MTUs.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 1400;

/// Writes lines into a fixed-size buffer for more efficient network I/O.
///
/// StatsD lines are newline delimited, which means that multiple lines can be sent in a single
/// datagram and trivially split apart by the collector. Coalescing them saves a system call and a
/// packet per line.
///
/// The writer never holds more than `max_payload_len` bytes. A line that does not fit in the
/// remaining space causes the current payload to be flushed first, and a line that cannot fit even
/// in an empty buffer is truncated: the payload limit is a hard ceiling.
///
/// Flushing is delegated to a callback so that the same logic drives both delivery strategies and
/// can be exercised without a socket. The buffer is cleared after every flush whatever the callback
/// returns.
pub(crate) struct PayloadWriter {
    max_payload_len: usize,
    buf: Vec<u8>,
}

impl PayloadWriter {
    /// Creates a new `PayloadWriter` with the given maximum payload length.
    pub fn new(max_payload_len: usize) -> Self {
        // NOTE: The builder rejects zero, but double check that we're getting a sane value here since
        // a zero-length buffer could never make progress.
        assert!(max_payload_len > 0, "maximum payload length must be greater than zero");

        Self { max_payload_len, buf: Vec::with_capacity(max_payload_len) }
    }

    /// Returns the number of bytes that can still be written to the current payload.
    fn remaining(&self) -> usize {
        self.max_payload_len - self.buf.len()
    }

    /// Returns `true` if nothing has been written since the last flush.
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends a single line to the current payload.
    ///
    /// `end_of_batch` signals that no further lines are known to be pending, in which case the
    /// payload is flushed right away instead of waiting for it to fill up.
    ///
    /// If flushing fails, the line is still appended and the first error is returned once the append
    /// has completed.
    pub fn append<E, F>(&mut self, line: &[u8], end_of_batch: bool, mut flush: F) -> Result<(), E>
    where
        F: FnMut(&[u8]) -> Result<(), E>,
    {
        let mut result = Ok(());

        // Make room first if the line plus its separator would not fit behind what we already have.
        if self.remaining() < line.len() + 1 {
            result = self.flush(&mut flush);
        }

        if !self.buf.is_empty() {
            self.buf.push(b'\n');
        }

        // Whatever still doesn't fit is cut off.
        let len = line.len().min(self.remaining());
        self.buf.extend_from_slice(&line[..len]);

        if end_of_batch || self.remaining() == 0 {
            let flushed = self.flush(&mut flush);
            result = result.and(flushed);
        }

        result
    }

    /// Flushes the current payload, if there is one.
    pub fn flush<E, F>(&mut self, mut flush: F) -> Result<(), E>
    where
        F: FnMut(&[u8]) -> Result<(), E>,
    {
        if self.buf.is_empty() {
            return Ok(());
        }

        let result = flush(&self.buf);
        self.buf.clear();
        result
    }
}
