//! ## Frame Reader
//!
//! Splits the inbound byte stream into newline-delimited messages.
//!
//! [`FrameReader`] owns a fixed-capacity receive buffer and a write cursor marking the end of
//! buffered-but-undispatched bytes. The socket reads straight into [`FrameReader::spare_mut`],
//! then [`FrameReader::commit`] hands back every complete line and compacts the partial tail to
//! offset 0. A line that cannot fit in the buffer is a protocol error, never an overrun.
use std::fmt;

/// Receive buffer size used when the configuration does not override it.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer filled up without a newline in sight.
    LineTooLong { capacity: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::LineTooLong { capacity } => write!(
                f,
                "Received a line that does not fit in the {capacity} bytes receive buffer"
            ),
        }
    }
}

impl std::error::Error for FrameError {}

#[derive(Debug)]
pub struct FrameReader {
    buf: Box<[u8]>,
    // invariant: pos <= buf.len(), and buf[..pos] holds no newline after `commit` returns
    pos: usize,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(DEFAULT_RECV_BUFFER_SIZE)
    }
}

impl FrameReader {
    /// Creates a reader with a buffer of `capacity` bytes (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(1)].into_boxed_slice(),
            pos: 0,
        }
    }

    /// Number of bytes of an incomplete line currently held.
    pub fn buffered(&self) -> usize {
        self.pos
    }

    /// Drops any partial line. Called whenever a new connection attempt starts.
    pub fn clear(&mut self) {
        self.pos = 0;
    }

    /// The free region after the write cursor, where the next read must land.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.pos..]
    }

    /// Accounts for `n` freshly read bytes in the spare region and extracts every complete line.
    ///
    /// Lines are returned without their trailing newline, in stream order. The unterminated
    /// remainder is moved to the start of the buffer for the next read.
    pub fn commit(&mut self, n: usize) -> Result<Vec<String>, FrameError> {
        self.pos += n.min(self.buf.len() - self.pos);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..self.pos].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(String::from_utf8_lossy(&self.buf[start..end]).into_owned());
            start = end + 1;
        }

        let remaining = self.pos - start;
        if remaining == 0 {
            self.pos = 0;
        } else if start > 0 {
            self.buf.copy_within(start..self.pos, 0);
            self.pos = remaining;
        }

        if self.pos == self.buf.len() {
            self.pos = 0;
            return Err(FrameError::LineTooLong {
                capacity: self.buf.len(),
            });
        }
        Ok(lines)
    }

    /// Copies `data` through the buffer as if it arrived in as many reads as needed.
    pub fn push(&mut self, mut data: &[u8]) -> Result<Vec<String>, FrameError> {
        let mut lines = Vec::new();
        while !data.is_empty() {
            let spare = self.spare_mut();
            let n = spare.len().min(data.len());
            spare[..n].copy_from_slice(&data[..n]);
            data = &data[n..];
            lines.extend(self.commit(n)?);
        }
        Ok(lines)
    }
}
