//! Fixed-capacity ring buffer bridging non-blocking I/O and incremental
//! parsers.
//!
//! Holds unread bytes between a write cursor (bytes produced by I/O) and a
//! read cursor (bytes consumed by parsers/relay). `0 <= read <= write <=
//! capacity` always holds; when `read == write` both cursors reset to zero.

/// A bounded byte ring buffer with separate read/write cursors.
///
/// Unlike a true circular buffer, `ByteBuffer` never wraps storage: once the
/// write cursor reaches capacity, callers must drain (`read_advance`) before
/// more can be written. Full draining compacts the cursors back to zero, so
/// steady-state read/write cycles never hit the capacity ceiling.
pub struct ByteBuffer {
    data: Vec<u8>,
    read: usize,
    write: usize,
}

impl ByteBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            read: 0,
            write: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The contiguous suffix available for filling, and its length.
    pub fn write_ptr(&mut self) -> (&mut [u8], usize) {
        let remaining = self.data.len() - self.write;
        (&mut self.data[self.write..], remaining)
    }

    /// Marks `n` bytes as produced by I/O.
    ///
    /// # Panics
    /// In debug builds, panics if `n` would push the write cursor past
    /// capacity — advancing beyond the size reported by `write_ptr` is a
    /// programming error.
    pub fn write_advance(&mut self, n: usize) {
        debug_assert!(self.write + n <= self.data.len(), "write_advance past capacity");
        self.write += n;
    }

    /// The contiguous prefix available for draining, and its length.
    pub fn read_ptr(&self) -> (&[u8], usize) {
        let available = self.write - self.read;
        (&self.data[self.read..self.write], available)
    }

    /// Marks `n` bytes as consumed by a parser or the relay. Compacts the
    /// buffer back to the origin once fully drained.
    ///
    /// # Panics
    /// In debug builds, panics if `n` would push the read cursor past the
    /// write cursor.
    pub fn read_advance(&mut self, n: usize) {
        debug_assert!(self.read + n <= self.write, "read_advance past write cursor");
        self.read += n;
        if self.read == self.write {
            self.read = 0;
            self.write = 0;
        }
    }

    pub fn can_read(&self) -> bool {
        self.read < self.write
    }

    pub fn can_write(&self) -> bool {
        self.write < self.data.len()
    }

    pub fn reset(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    pub fn len(&self) -> usize {
        self.write - self.read
    }

    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }
}
