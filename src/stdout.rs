//! Standard-output virtual files (§4.9): a full growing log and a
//! tail-window view, both fed by one ring buffer. The ring buffer is the
//! one piece of state genuinely shared with a producer thread outside the
//! single-threaded dispatch path (§5), so it carries its own lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Sectors are pulled in chunks this size by the transport; the tail
/// window's exposed length is always a multiple of it.
pub const TRANSPORT_CHUNK_BYTES: u64 = 64;

struct RingInner {
    data: Vec<u8>,
    total_written: u64,
    total_read: u64,
}

/// Fixed-capacity circular byte buffer. Old bytes are silently overwritten
/// once the producer outruns `capacity` — per §7, producer overflow is
/// policy, not an error: stale bytes read back as NUL through the full-log
/// file.
pub struct StdoutRing {
    inner: Mutex<RingInner>,
    capacity: u64,
    started: Instant,
    last_write_ms: AtomicU64,
}

impl StdoutRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RingInner {
                data: vec![0; capacity],
                total_written: 0,
                total_read: 0,
            }),
            capacity: capacity as u64,
            started: Instant::now(),
            last_write_ms: AtomicU64::new(0),
        }
    }

    /// Milliseconds elapsed since the previous call to [`Self::write`] (or
    /// since construction, if none yet) — the "idle" term the stdout
    /// on-write hook compares against `UA_DELAY_SEC`.
    pub fn ms_since_last_write(&self) -> u64 {
        let now = self.started.elapsed().as_millis() as u64;
        now.saturating_sub(self.last_write_ms.load(Ordering::Acquire))
    }

    /// Pushes new bytes, held only for the copy (§5). Returns the unread
    /// byte count after the write, for the on-write hook to act on.
    pub fn write(&self, bytes: &[u8]) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let capacity = self.capacity as usize;
        for &byte in bytes {
            let index = (inner.total_written % self.capacity) as usize;
            inner.data[index % capacity] = byte;
            inner.total_written += 1;
        }
        let now = self.started.elapsed().as_millis() as u64;
        self.last_write_ms.store(now, Ordering::Release);
        inner.total_written.saturating_sub(inner.total_read)
    }

    /// §4.9 full log file: byte at absolute stream position `offset`, or
    /// zero if it's fallen out of the ring or hasn't been written yet.
    pub fn read_full_log(&self, offset: u64, buf: &mut [u8]) {
        let inner = self.inner.lock().unwrap();
        let oldest_retained = inner.total_written.saturating_sub(self.capacity);
        for (i, out) in buf.iter_mut().enumerate() {
            let pos = offset + i as u64;
            *out = if pos >= oldest_retained && pos < inner.total_written {
                inner.data[(pos % self.capacity) as usize]
            } else {
                0
            };
        }
    }

    /// Unread byte count, rounded down to a whole transport chunk — the
    /// tail-window file's current size.
    pub fn tail_window_size(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        let unread = inner.total_written.saturating_sub(inner.total_read);
        (unread / TRANSPORT_CHUNK_BYTES) * TRANSPORT_CHUNK_BYTES
    }

    /// §4.9 tail-window file: reads within the current window, zero-filled
    /// past it. Pure — does not move `total_read`. A single LBA's sector is
    /// rendered through this once per sub-sector chunk the transport pulls
    /// (§4.1), so mutating the window here would make those chunks observe
    /// different snapshots of the same sector; [`Self::advance_tail_window`]
    /// is the only thing that shrinks the window, called by the integrator
    /// once it knows how much the host actually consumed.
    pub fn peek_tail_window(&self, file_offset: u64, buf: &mut [u8]) {
        let inner = self.inner.lock().unwrap();
        let unread = inner.total_written.saturating_sub(inner.total_read);
        let window_size = (unread / TRANSPORT_CHUNK_BYTES) * TRANSPORT_CHUNK_BYTES;

        for (i, out) in buf.iter_mut().enumerate() {
            let pos_in_window = file_offset + i as u64;
            *out = if pos_in_window < window_size {
                let absolute = inner.total_read + pos_in_window;
                inner.data[(absolute % self.capacity) as usize]
            } else {
                0
            };
        }
    }

    /// Explicit acknowledge step (§4.9): advances `total_read` by `bytes`,
    /// clamped to the window's current size so a caller can never advance
    /// past data that was never exposed. Called by the integrator once it
    /// knows a span of the tail-window file has actually been delivered to
    /// the host — not from inside sector rendering, so rendering the same
    /// sector twice (or in several sub-sector chunks) stays idempotent.
    pub fn advance_tail_window(&self, bytes: u64) {
        let mut inner = self.inner.lock().unwrap();
        let unread = inner.total_written.saturating_sub(inner.total_read);
        let window_size = (unread / TRANSPORT_CHUNK_BYTES) * TRANSPORT_CHUNK_BYTES;
        inner.total_read += bytes.min(window_size);
    }

    pub fn unread(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner.total_written.saturating_sub(inner.total_read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_log_returns_written_bytes() {
        let ring = StdoutRing::new(16);
        ring.write(b"hello");
        let mut buf = [0u8; 5];
        ring.read_full_log(0, &mut buf);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn full_log_zero_fills_unwritten_tail() {
        let ring = StdoutRing::new(16);
        ring.write(b"hi");
        let mut buf = [0xAAu8; 4];
        ring.read_full_log(2, &mut buf);
        assert_eq!(buf, [0, 0, 0, 0]);
    }

    #[test]
    fn full_log_zero_fills_discarded_prefix() {
        let ring = StdoutRing::new(4);
        ring.write(b"abcdefgh"); // overflows an 4-byte ring twice over
        let mut buf = [0xAAu8; 4];
        ring.read_full_log(0, &mut buf);
        assert_eq!(buf, [0, 0, 0, 0]);

        let mut buf = [0u8; 4];
        ring.read_full_log(4, &mut buf);
        assert_eq!(&buf, b"efgh");
    }

    #[test]
    fn tail_window_rounds_down_to_chunk() {
        let ring = StdoutRing::new(256);
        ring.write(&[0u8; 100]);
        assert_eq!(ring.tail_window_size(), 64);
    }

    #[test]
    fn tail_window_peek_does_not_shrink_the_window() {
        let ring = StdoutRing::new(256);
        ring.write(&[1u8; 128]);
        assert_eq!(ring.tail_window_size(), 128);

        let mut buf = [0u8; 64];
        ring.peek_tail_window(0, &mut buf);
        assert_eq!(ring.tail_window_size(), 128);
        assert_eq!(ring.unread(), 128);
    }

    #[test]
    fn repeated_peeks_of_the_same_range_agree() {
        // Models a single sector pulled in several sub-sector chunks: every
        // peek at the same file_offset must see the same bytes, since
        // nothing has been explicitly acknowledged yet.
        let ring = StdoutRing::new(256);
        ring.write(&[7u8; 128]);

        let mut first = [0u8; 64];
        let mut second = [0u8; 64];
        ring.peek_tail_window(0, &mut first);
        ring.peek_tail_window(0, &mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn advance_shrinks_the_window_by_exactly_the_acknowledged_amount() {
        let ring = StdoutRing::new(256);
        ring.write(&[1u8; 128]);
        assert_eq!(ring.tail_window_size(), 128);

        ring.advance_tail_window(64);
        assert_eq!(ring.tail_window_size(), 64);
        assert_eq!(ring.unread(), 64);
    }

    #[test]
    fn advance_clamps_to_the_window_size() {
        let ring = StdoutRing::new(256);
        ring.write(&[1u8; 64]);
        ring.advance_tail_window(4096);
        assert_eq!(ring.unread(), 0);
    }
}
