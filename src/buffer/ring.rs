//! Bounded FIFO byte queue.

use memchr::memmem;
use std::collections::VecDeque;

/// An ordered byte queue with a logical capacity.
///
/// Appends always succeed: on the transmit side the engine checks
/// [`free_space`](Self::free_space), less any bytes the drain holds out of
/// the ring, before appending; on the receive side the engine appends
/// whatever arrived and uses [`is_over_capacity`](Self::is_over_capacity) to
/// detect and report an overrun instead of dropping data.
#[derive(Debug, Clone)]
pub struct ByteRing {
    buf: VecDeque<u8>,
    capacity: usize,
}

impl ByteRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Logical capacity the ring was configured with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of occupied bytes.
    pub fn count(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Space left before the logical capacity is reached.
    pub fn free_space(&self) -> usize {
        self.capacity.saturating_sub(self.buf.len())
    }

    pub fn is_over_capacity(&self) -> bool {
        self.buf.len() > self.capacity
    }

    /// Add bytes at the tail.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes);
    }

    /// Put bytes back at the head, ahead of everything queued.
    pub fn restore_front(&mut self, bytes: &[u8]) {
        for &b in bytes.iter().rev() {
            self.buf.push_front(b);
        }
    }

    /// Remove and return at most `n` bytes from the head.
    ///
    /// Returns fewer bytes when fewer are queued, and an empty vector when the
    /// ring is empty.
    pub fn take_up_to(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.buf.len());
        self.buf.drain(..n).collect()
    }

    /// Move bytes from the head into `out`, returning how many were moved.
    pub fn take_into(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.buf.len());
        let (front, back) = self.buf.as_slices();
        if n <= front.len() {
            out[..n].copy_from_slice(&front[..n]);
        } else {
            let split = front.len();
            out[..split].copy_from_slice(front);
            out[split..n].copy_from_slice(&back[..n - split]);
        }
        self.buf.drain(..n);
        n
    }

    /// Append up to `n` head bytes to `out`, returning how many were moved.
    pub fn take_extend(&mut self, n: usize, out: &mut Vec<u8>) -> usize {
        let n = n.min(self.buf.len());
        out.extend(self.buf.drain(..n));
        n
    }

    /// Drop up to `n` bytes from the head.
    pub fn discard_front(&mut self, n: usize) -> usize {
        let n = n.min(self.buf.len());
        self.buf.drain(..n);
        n
    }

    /// The queued bytes as one slice, in order.
    pub fn contiguous(&mut self) -> &[u8] {
        self.buf.make_contiguous()
    }

    /// Offset of the first occurrence of `needle`, if it is fully queued.
    pub fn find(&mut self, needle: &[u8]) -> Option<usize> {
        if needle.is_empty() {
            return Some(0);
        }
        memmem::find(self.buf.make_contiguous(), needle)
    }

    /// Remove `expected.len()` bytes from the head and compare them.
    ///
    /// Removes as many bytes as are queued (up to `expected.len()`) even when
    /// they mismatch. Returns `true` only when enough bytes were queued and
    /// all of them matched.
    pub fn compare_and_remove(&mut self, expected: &[u8]) -> bool {
        let mut matched = self.buf.len() >= expected.len();
        for &want in expected {
            match self.buf.pop_front() {
                Some(got) => matched &= got == want,
                None => break,
            }
        }
        matched
    }

    /// Empty the ring.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_append_and_take() {
        let mut ring = ByteRing::with_capacity(8);
        ring.append(b"Hello");
        assert_eq!(ring.count(), 5);
        assert_eq!(ring.free_space(), 3);

        assert_eq!(ring.take_up_to(2), b"He");
        assert_eq!(ring.take_up_to(10), b"llo");
        assert!(ring.take_up_to(4).is_empty());
        assert!(ring.is_empty());
    }

    #[test]
    fn test_take_into_across_wraparound() {
        let mut ring = ByteRing::with_capacity(4);
        ring.append(b"abcd");
        ring.discard_front(3);
        ring.append(b"efg");

        let mut out = [0u8; 8];
        let n = ring.take_into(&mut out);
        assert_eq!(&out[..n], b"defg");
    }

    #[test]
    fn test_append_beyond_capacity_is_detected() {
        let mut ring = ByteRing::with_capacity(2);
        ring.append(b"abc");
        assert!(ring.is_over_capacity());
        assert_eq!(ring.free_space(), 0);
        assert_eq!(ring.count(), 3);
    }

    #[test]
    fn test_restore_front_keeps_order() {
        let mut ring = ByteRing::with_capacity(8);
        ring.append(b"cd");
        ring.restore_front(b"ab");
        assert_eq!(ring.take_up_to(4), b"abcd");
    }

    #[test]
    fn test_find_needle() {
        let mut ring = ByteRing::with_capacity(16);
        ring.append(b"Ping\r\nPong");
        assert_eq!(ring.find(b"\r\n"), Some(4));
        assert_eq!(ring.find(b"\n\n"), None);
        assert_eq!(ring.find(b""), Some(0));
    }

    #[test]
    fn test_compare_and_remove() {
        let mut ring = ByteRing::with_capacity(16);
        ring.append(b"abcdef");
        assert!(ring.compare_and_remove(b"abc"));
        assert!(!ring.compare_and_remove(b"dxf"));
        assert!(ring.is_empty());

        ring.append(b"gh");
        assert!(!ring.compare_and_remove(b"ghi"));
        assert!(ring.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut ring = ByteRing::with_capacity(4);
        ring.append(b"xyz");
        ring.clear();
        assert_eq!(ring.count(), 0);
        assert_eq!(ring.free_space(), 4);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Append(Vec<u8>),
        Take(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            proptest::collection::vec(any::<u8>(), 0..32).prop_map(Op::Append),
            (0usize..48).prop_map(Op::Take),
        ]
    }

    proptest! {
        #[test]
        fn prop_taken_bytes_are_prefix_of_appended(ops in proptest::collection::vec(op(), 0..64)) {
            let mut ring = ByteRing::with_capacity(64);
            let mut appended = Vec::new();
            let mut taken = Vec::new();
            for op in ops {
                match op {
                    Op::Append(bytes) => {
                        appended.extend_from_slice(&bytes);
                        ring.append(&bytes);
                    }
                    Op::Take(n) => taken.extend(ring.take_up_to(n)),
                }
                prop_assert_eq!(taken.len() + ring.count(), appended.len());
            }
            prop_assert_eq!(&appended[..taken.len()], &taken[..]);
        }
    }
}
