//! Fixed-capacity byte ring buffer with zero-copy region access.
//!
//! The connection engine keeps its recv buffer flat (one stable payload
//! span per parse is easier to pin that way), so this type serves as an
//! auxiliary buffer for callers that want bounded queueing around the
//! engine, e.g. staging outgoing payloads.
//!
//! `peek_read`/`peek_write` expose the longest contiguous region; when the
//! data wraps, a region may be shorter than [`len`](RingBuffer::len) /
//! [`available`](RingBuffer::available) and a second call after
//! `consume`/`commit` reaches the remainder.

#[derive(Debug)]
pub struct RingBuffer {
    buf: Box<[u8]>,
    head: usize, // next write index
    tail: usize, // next read index
    count: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn available(&self) -> usize {
        self.buf.len() - self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.buf.len()
    }

    fn advance(&self, idx: usize, n: usize) -> usize {
        let idx = idx + n;
        if idx >= self.buf.len() {
            idx - self.buf.len()
        } else {
            idx
        }
    }

    /// Longest contiguous readable region starting at the tail.
    pub fn peek_read(&self) -> &[u8] {
        if self.count == 0 {
            return &[];
        }
        let contiguous = if self.tail < self.head {
            self.head - self.tail
        } else {
            self.buf.len() - self.tail
        };
        let n = contiguous.min(self.count);
        &self.buf[self.tail..self.tail + n]
    }

    /// Drop `n` bytes from the readable side. Clamped to [`len`](Self::len).
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.count);
        self.tail = self.advance(self.tail, n);
        self.count -= n;
    }

    /// Longest contiguous writable region starting at the head.
    pub fn peek_write(&mut self) -> &mut [u8] {
        if self.is_full() {
            return &mut [];
        }
        let contiguous = if self.head < self.tail {
            self.tail - self.head
        } else {
            self.buf.len() - self.head
        };
        let n = contiguous.min(self.available());
        let head = self.head;
        &mut self.buf[head..head + n]
    }

    /// Mark `n` bytes written through [`peek_write`](Self::peek_write) as
    /// readable. Clamped to [`available`](Self::available).
    pub fn commit(&mut self, n: usize) {
        let n = n.min(self.available());
        self.head = self.advance(self.head, n);
        self.count += n;
    }

    /// Copy in as much of `data` as fits; returns the number of bytes taken.
    pub fn write_copy(&mut self, mut data: &[u8]) -> usize {
        let mut written = 0;
        while !data.is_empty() {
            let region = self.peek_write();
            if region.is_empty() {
                break;
            }
            let n = data.len().min(region.len());
            region[..n].copy_from_slice(&data[..n]);
            self.commit(n);
            data = &data[n..];
            written += n;
        }
        written
    }

    /// Copy out up to `out.len()` bytes; returns the number of bytes read.
    pub fn read_copy(&mut self, out: &mut [u8]) -> usize {
        let mut read = 0;
        while read < out.len() {
            let region = self.peek_read();
            if region.is_empty() {
                break;
            }
            let n = (out.len() - read).min(region.len());
            out[read..read + n].copy_from_slice(&region[..n]);
            self.consume(n);
            read += n;
        }
        read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_write_then_read() {
        let mut rb = RingBuffer::new(16);
        assert!(rb.is_empty());
        let data: Vec<u8> = (0..10).collect();
        assert_eq!(rb.write_copy(&data), 10);
        assert_eq!(rb.len(), 10);
        assert_eq!(rb.available(), 6);
        let mut out = [0u8; 10];
        assert_eq!(rb.read_copy(&mut out), 10);
        assert_eq!(&out[..], &data[..]);
        assert!(rb.is_empty());
    }

    #[test]
    fn tail_wrap() {
        // capacity 8: write 6 'A', consume them, then 6 'B' must wrap and
        // still read back intact.
        let mut rb = RingBuffer::new(8);
        assert_eq!(rb.write_copy(&[b'A'; 6]), 6);
        let region = rb.peek_read();
        assert!(!region.is_empty());
        let n = region.len();
        rb.consume(n);
        assert_eq!(rb.write_copy(&[b'B'; 6]), 6);
        let mut out = [0u8; 6];
        assert_eq!(rb.read_copy(&mut out), 6);
        assert_eq!(&out, b"BBBBBB");
    }

    #[test]
    fn wrapped_read_region_is_split() {
        let mut rb = RingBuffer::new(8);
        rb.write_copy(&[1; 6]);
        rb.consume(6);
        rb.write_copy(&[2, 2, 2, 2]);
        // two bytes fit before the end of the storage, two wrapped
        assert_eq!(rb.peek_read().len(), 2);
        rb.consume(2);
        assert_eq!(rb.peek_read().len(), 2);
    }

    #[test]
    fn full_and_overflow() {
        let mut rb = RingBuffer::new(4);
        assert_eq!(rb.write_copy(&[9; 10]), 4);
        assert!(rb.is_full());
        assert_eq!(rb.write_copy(&[1]), 0);
        assert!(rb.peek_write().is_empty());
        let mut out = [0u8; 4];
        assert_eq!(rb.read_copy(&mut out), 4);
        assert_eq!(out, [9; 4]);
    }

    #[test]
    fn commit_and_consume_are_clamped() {
        let mut rb = RingBuffer::new(4);
        rb.commit(100);
        assert_eq!(rb.len(), 4);
        rb.consume(100);
        assert!(rb.is_empty());
    }

    #[test]
    fn zero_copy_write_path() {
        let mut rb = RingBuffer::new(8);
        let region = rb.peek_write();
        region[..3].copy_from_slice(b"abc");
        rb.commit(3);
        assert_eq!(rb.peek_read(), b"abc");
    }
}
