use tracing::{debug, trace};

use super::bytes::{ByteQueue, Window};
use crate::prelude::*;

const MAX_TERMINATOR_LEN: usize = 4;

/// Frames records separated by a terminator, e.g., `\r\n` for line oriented ASCII
/// instruments.
///
/// Bytes before the first terminator are discarded since the record they belong to started
/// before the stream did. Records are emitted without their terminator and are accepted
/// unconditionally. Empty records are skipped. A record growing past the configured maximum
/// is dropped along with everything up to the next terminator.
///
/// # Example
/// ```
/// use adcp::framing::DelimitedSynchronizer;
///
/// let mut sync = DelimitedSynchronizer::new(b"\r\n", 128).unwrap();
/// let records = sync.push(b"tial\r\n# 12.1, 3.4\r\n\r\n# 12.2");
/// assert_eq!(records, vec![b"# 12.1, 3.4".to_vec()]);
/// assert_eq!(sync.push(b", 3.5\r\n"), vec![b"# 12.2, 3.5".to_vec()]);
/// ```
#[derive(Debug)]
pub struct DelimitedSynchronizer {
    terminator: Vec<u8>,
    window: Window<MAX_TERMINATOR_LEN>,
    record: ByteQueue,
    max_len: usize,
    in_body: bool,
    dropped: u64,
}

impl DelimitedSynchronizer {
    /// Create a synchronizer for records of at most `max_len` bytes, excluding the
    /// terminator.
    ///
    /// # Errors
    /// [Error::Config] if `terminator` is empty or longer than 4 bytes.
    pub fn new(terminator: &[u8], max_len: usize) -> Result<Self> {
        if terminator.is_empty() || terminator.len() > MAX_TERMINATOR_LEN {
            return Err(Error::Config(format!(
                "terminator must be 1 to {MAX_TERMINATOR_LEN} bytes, got {}",
                terminator.len()
            )));
        }
        Ok(DelimitedSynchronizer {
            terminator: terminator.to_vec(),
            window: Window::new(),
            // room for the terminator that ends the record
            record: ByteQueue::with_limit(max_len + terminator.len()),
            max_len,
            in_body: false,
            dropped: 0,
        })
    }

    /// Number of records dropped for exceeding the maximum length.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Consume `dat`, returning completed records in stream order.
    pub fn push(&mut self, dat: &[u8]) -> Vec<Vec<u8>> {
        let mut records = Vec::new();
        for &b in dat {
            self.window.push(b);
            let terminated = self.window.ends_with(&self.terminator);

            if !self.in_body {
                if terminated {
                    trace!("found record terminator");
                    self.start_record();
                }
                continue;
            }

            if !self.record.push(b) {
                self.dropped += 1;
                debug!(max_len = self.max_len, "record exceeds maximum length; dropping");
                self.record.clear();
                self.in_body = false;
                // the byte that overflowed may itself complete a terminator
                if terminated {
                    self.start_record();
                }
                continue;
            }

            if terminated {
                let len = self.record.len().saturating_sub(self.terminator.len());
                if len > 0 {
                    records.push(self.record.as_slice()[..len].to_vec());
                }
                self.start_record();
            }
        }
        records
    }

    /// Discard any partial record and wait for the next terminator.
    pub fn reset(&mut self) {
        self.window.clear();
        self.record.clear();
        self.in_body = false;
    }

    // terminators may not overlap the one that started the record
    fn start_record(&mut self) {
        self.window.clear();
        self.record.clear();
        self.in_body = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_partial_record_is_discarded() {
        let mut sync = DelimitedSynchronizer::new(b"\r\n", 64).unwrap();
        let records = sync.push(b"garbage\r\nfirst\r\nsecond\r\n");

        assert_eq!(records, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn records_span_chunks() {
        let mut sync = DelimitedSynchronizer::new(b"\r\n", 64).unwrap();
        let stream = b"\r\nalpha\r\nbravo\r\ncharlie\r\n";

        let mut records = Vec::new();
        for chunk in stream.chunks(3) {
            records.extend(sync.push(chunk));
        }
        assert_eq!(
            records,
            vec![b"alpha".to_vec(), b"bravo".to_vec(), b"charlie".to_vec()]
        );
    }

    #[test]
    fn empty_records_are_skipped() {
        let mut sync = DelimitedSynchronizer::new(b"\n", 64).unwrap();
        let records = sync.push(b"\n\n\nx\n\n");

        assert_eq!(records, vec![b"x".to_vec()]);
    }

    #[test]
    fn terminators_do_not_overlap() {
        let mut sync = DelimitedSynchronizer::new(b"##", 64).unwrap();
        let records = sync.push(b"##a###b##");

        assert_eq!(records, vec![b"a".to_vec(), b"#b".to_vec()]);
    }

    #[test]
    fn overlong_record_is_dropped() {
        let mut sync = DelimitedSynchronizer::new(b"\r\n", 4).unwrap();
        let records = sync.push(b"\r\nabcd\r\nabcdefgh\r\nok\r\n");

        assert_eq!(records, vec![b"abcd".to_vec(), b"ok".to_vec()]);
        assert_eq!(sync.dropped(), 1);
    }

    #[test]
    fn reset_waits_for_terminator() {
        let mut sync = DelimitedSynchronizer::new(b"\r\n", 64).unwrap();
        sync.push(b"\r\npartial");
        sync.reset();

        let records = sync.push(b" line\r\nwhole\r\n");
        assert_eq!(records, vec![b"whole".to_vec()]);
    }

    #[test]
    fn invalid_terminator() {
        assert!(matches!(
            DelimitedSynchronizer::new(b"", 10),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            DelimitedSynchronizer::new(b"12345", 10),
            Err(Error::Config(_))
        ));
    }
}
