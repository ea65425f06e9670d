//! Ring buffer / stream framer for http-mode sessions.
//!
//! A fixed block of `2 x buffer_size` bytes with three moving cursors:
//!
//! ```text
//!  0 (bottom)     back          parsed             front            top
//!    |-------------|--------------|------------------|---------------|
//!      consumed      scanned        unscanned data      free space
//! ```
//!
//! Reads append at `front`, the terminator scan advances `parsed`, and
//! committing a parsed request moves `back` forward without touching
//! memory. When free space runs low the unconsumed region `[back, front)`
//! is compacted down to the bottom. Cursors are integer offsets into an
//! owned buffer; every operation is bounds-checked.

/// Invariant: `back <= parsed <= front <= capacity`.
pub struct RingBuffer {
    buf: Vec<u8>,
    back: usize,
    parsed: usize,
    front: usize,
}

const TERMINATOR: &[u8; 4] = b"\r\n\r\n";

impl RingBuffer {
    /// Create a framer able to buffer two full reads of `buffer_size`
    /// bytes. The doubled backing store guarantees a compaction always
    /// frees room for at least one more full-size read.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buf: vec![0u8; buffer_size.max(1) * 2],
            back: 0,
            parsed: 0,
            front: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes available past `front` for the next read.
    pub fn free_size(&self) -> usize {
        self.buf.len() - self.front
    }

    /// Unconsumed bytes buffered between `back` and `front`.
    pub fn data_len(&self) -> usize {
        self.front - self.back
    }

    /// The unconsumed window `[back, front)`.
    pub fn data(&self) -> &[u8] {
        &self.buf[self.back..self.front]
    }

    /// Writable region starting at `front`, capped at `max` bytes.
    pub fn write_slice(&mut self, max: usize) -> &mut [u8] {
        let end = (self.front + max).min(self.buf.len());
        &mut self.buf[self.front..end]
    }

    /// Record `n` bytes appended at `front`. Returns false (and pins
    /// `front` at the top) if the append would overflow; `n == 0` is a
    /// valid no-op.
    pub fn append(&mut self, n: usize) -> bool {
        if self.front + n <= self.buf.len() {
            self.front += n;
            true
        } else {
            self.front = self.buf.len();
            false
        }
    }

    /// Proactively compact when free space drops under one read's worth,
    /// so the append in the hot path never has to fail.
    pub fn make_room(&mut self, read_size: usize) {
        if self.free_size() < read_size {
            self.compact();
        }
    }

    /// Copy the unconsumed region down to the bottom and rebase all
    /// cursors. Never loses unconsumed bytes; safe for any overlap.
    pub fn compact(&mut self) {
        if self.back == 0 {
            return;
        }
        let data_len = self.front - self.back;
        let parsed_off = self.parsed - self.back;
        self.buf.copy_within(self.back..self.front, 0);
        self.back = 0;
        self.parsed = parsed_off;
        self.front = data_len;
    }

    /// Scan forward from `parsed` for `\r\n\r\n`.
    ///
    /// On a match, returns the offset just past the terminator and leaves
    /// `parsed` there; the caller commits with [`consume_to`]. On no match,
    /// parks `parsed` three bytes shy of `front` so a terminator split
    /// across two reads is still found, and the next scan resumes instead
    /// of restarting. Fewer than four buffered bytes never match.
    ///
    /// [`consume_to`]: RingBuffer::consume_to
    pub fn find_terminator(&mut self) -> Option<usize> {
        let mut cur = self.parsed;
        while cur + TERMINATOR.len() <= self.front {
            if &self.buf[cur..cur + TERMINATOR.len()] == TERMINATOR {
                self.parsed = cur + TERMINATOR.len();
                return Some(self.parsed);
            }
            cur += 1;
        }
        self.parsed = self
            .front
            .saturating_sub(TERMINATOR.len() - 1)
            .max(self.back);
        None
    }

    /// Discard everything before `pos` from the logical window.
    pub fn consume_to(&mut self, pos: usize) {
        debug_assert!(self.back <= pos && pos <= self.front);
        let pos = pos.min(self.front).max(self.back);
        self.back = pos;
        self.parsed = pos;
    }

    #[cfg(test)]
    fn assert_invariant(&self) {
        assert!(self.back <= self.parsed);
        assert!(self.parsed <= self.front);
        assert!(self.front <= self.buf.len());
    }
}
