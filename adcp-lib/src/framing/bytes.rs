/// Bounded byte buffer used to assemble a candidate frame.
///
/// Storage is allocated once with the configured limit. Consuming bytes from the front only
/// advances a head index; the remaining bytes are moved to the front (compacted) when a push
/// would otherwise exceed the limit. Compaction never drops bytes.
#[derive(Debug)]
pub(crate) struct ByteQueue {
    buf: Vec<u8>,
    head: usize,
    limit: usize,
}

impl ByteQueue {
    pub fn with_limit(limit: usize) -> Self {
        ByteQueue {
            buf: Vec::with_capacity(limit),
            head: 0,
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.head..]
    }

    /// Append a byte, compacting first if the end of storage has been reached. Returns
    /// `false` if the queue already holds `limit` bytes.
    pub fn push(&mut self, b: u8) -> bool {
        if self.buf.len() == self.limit {
            if self.head == 0 {
                return false;
            }
            self.compact();
        }
        self.buf.push(b);
        true
    }

    /// Drop `n` bytes from the front.
    pub fn consume(&mut self, n: usize) {
        self.head = (self.head + n).min(self.buf.len());
        if self.head == self.buf.len() {
            self.clear();
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.head = 0;
    }

    fn compact(&mut self) {
        let n = self.len();
        self.buf.copy_within(self.head.., 0);
        self.buf.truncate(n);
        self.head = 0;
    }
}

/// Fixed-width trailing look-back window over the last `N` bytes seen, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window<const N: usize> {
    bytes: [u8; N],
    // number of valid bytes, saturating at N
    filled: usize,
}

impl<const N: usize> Window<N> {
    pub fn new() -> Self {
        Window {
            bytes: [0u8; N],
            filled: 0,
        }
    }

    pub fn push(&mut self, b: u8) {
        self.bytes.copy_within(1.., 0);
        self.bytes[N - 1] = b;
        self.filled = (self.filled + 1).min(N);
    }

    /// True if the most recent bytes equal `pattern`. Patterns wider than the window
    /// never match.
    pub fn ends_with(&self, pattern: &[u8]) -> bool {
        pattern.len() <= self.filled && self.bytes.ends_with(pattern)
    }

    pub fn bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    pub fn clear(&mut self) {
        self.bytes = [0u8; N];
        self.filled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_push_and_consume() {
        let mut queue = ByteQueue::with_limit(8);
        for b in 0..5 {
            assert!(queue.push(b));
        }
        assert_eq!(queue.as_slice(), &[0, 1, 2, 3, 4]);

        queue.consume(2);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.as_slice(), &[2, 3, 4]);

        queue.consume(10);
        assert!(queue.is_empty());
    }

    #[test]
    fn queue_compacts_instead_of_growing() {
        let mut queue = ByteQueue::with_limit(4);
        for b in 0..4 {
            assert!(queue.push(b));
        }
        assert!(!queue.push(4), "full queue with nothing consumed must refuse");

        queue.consume(3);
        assert!(queue.push(4));
        assert!(queue.push(5));
        assert_eq!(queue.as_slice(), &[3, 4, 5]);
        assert_eq!(queue.buf.capacity(), 4, "storage should never be reallocated");
    }

    #[test]
    fn window_tracks_last_bytes() {
        let mut window: Window<4> = Window::new();
        assert!(!window.ends_with(&[0, 0]), "empty window matches nothing");

        window.push(0x7f);
        assert!(!window.ends_with(&[0x7f, 0x7f]));
        window.push(0x7f);
        assert!(window.ends_with(&[0x7f, 0x7f]));

        for b in [1, 2, 3] {
            window.push(b);
        }
        assert_eq!(window.bytes(), &[0x7f, 1, 2, 3]);
        assert!(!window.ends_with(&[0, 0, 0, 0, 0]));

        window.clear();
        assert!(!window.ends_with(&[0]));
    }

    #[test]
    fn window_zero_pattern_requires_filled_bytes() {
        let mut window: Window<4> = Window::new();
        window.push(0);
        assert!(!window.ends_with(&[0, 0]));
        window.push(0);
        assert!(window.ends_with(&[0, 0]));
    }
}
