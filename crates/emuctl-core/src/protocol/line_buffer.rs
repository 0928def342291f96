//! Fixed-capacity receive buffer that frames a byte stream into lines.
//!
//! Each client owns one [`LineBuffer`].  Bytes are appended as they arrive,
//! complete lines are drained from the front, and whatever partial line is
//! left over stays for the next read.  A client that fills the whole buffer
//! without ever sending a newline is misbehaving; [`LineBuffer::is_full`]
//! lets the caller detect this and drop the connection.

use std::io;

/// Default per-client receive capacity in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Accumulates bytes and hands out complete `\n`-terminated lines.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Offset of the first byte not yet handed out by [`Self::next_line`].
    start: usize,
    capacity: usize,
}

impl LineBuffer {
    /// Creates an empty buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            start: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered bytes not yet consumed as lines.
    pub fn len(&self) -> usize {
        self.buf.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free space available for the next read.
    pub fn remaining(&self) -> usize {
        self.capacity - self.len()
    }

    /// `true` when the buffer holds `capacity` bytes and none of them ends a line.
    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// Appends bytes produced by `read`, which receives the free tail of the
    /// buffer and returns how many bytes it wrote.
    ///
    /// Typical use is with a non-blocking socket read:
    ///
    /// ```rust
    /// use emuctl_core::LineBuffer;
    /// use std::io::Read;
    ///
    /// let mut source: &[u8] = b"status\n";
    /// let mut buffer = LineBuffer::new(64);
    /// let n = buffer.fill(|spare| source.read(spare)).unwrap();
    /// assert_eq!(n, 7);
    /// assert_eq!(buffer.next_line().as_deref(), Some("status"));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns whatever error `read` returns; the buffer is left unchanged.
    pub fn fill<F>(&mut self, read: F) -> io::Result<usize>
    where
        F: FnOnce(&mut [u8]) -> io::Result<usize>,
    {
        self.compact();
        let filled = self.buf.len();
        self.buf.resize(self.capacity, 0);
        let result = read(&mut self.buf[filled..]);
        let added = match &result {
            Ok(n) => (*n).min(self.capacity - filled),
            Err(_) => 0,
        };
        self.buf.truncate(filled + added);
        result
    }

    /// Appends `bytes`, returning how many fitted.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> usize {
        self.compact();
        let n = bytes.len().min(self.remaining());
        self.buf.extend_from_slice(&bytes[..n]);
        n
    }

    /// Removes and returns the next complete line, without its `\n` and
    /// without a trailing `\r`.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; command words and
    /// numeric arguments are ASCII and paths are passed through as text.
    pub fn next_line(&mut self) -> Option<String> {
        let pending = &self.buf[self.start..];
        let end = pending.iter().position(|&b| b == b'\n')?;
        let mut line = &pending[..end];
        if let Some((&b'\r', rest)) = line.split_last() {
            line = rest;
        }
        let text = String::from_utf8_lossy(line).into_owned();
        self.start += end + 1;
        Some(text)
    }

    /// Moves the unconsumed partial line to the front of the buffer.
    pub fn compact(&mut self) {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.start = 0;
        }
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}
