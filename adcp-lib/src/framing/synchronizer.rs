use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;

use super::bytes::{ByteQueue, Window};
use super::{byte_sum, ChecksumRule, Frame, Integrity, ModularSum, CHECKSUM_LEN, PD0_SIGNATURE};
use crate::prelude::*;

/// Width of the look-back window. When a frame completes the window holds its two
/// checksum bytes followed by the next frame's signature.
const WINDOW_LEN: usize = 4;

/// A frame is complete when the byte count reaches the declared length plus this many
/// bytes: the checksum and the first byte of the next frame's signature.
const TERMINATOR_OFFSET: usize = CHECKSUM_LEN + 1;

/// Smallest buffer limit a [Synchronizer] will use regardless of configuration.
const MIN_FRAME_LEN: usize = 16;

fn default_checksum() -> Arc<dyn ChecksumRule> {
    Arc::new(ModularSum::PD0)
}

/// Describes the layout of the frames a [Synchronizer] looks for.
///
/// Defaults describe a PD0 ensemble:
/// `[7f][7f][len lsb][len msb][spare][N][2N offset bytes][00 00 fixed leader id]...`
#[derive(Debug, Clone, TypedBuilder)]
pub struct SyncConfig {
    /// Start signature.
    #[builder(default = PD0_SIGNATURE)]
    pub signature: [u8; 2],
    /// Offset of the 2-byte little-endian declared length, i.e., the number of bytes in the
    /// frame excluding the checksum.
    #[builder(default = 2)]
    pub length_offset: usize,
    /// Offset of the number-of-data-types byte. It is followed by the data type offset
    /// table, 2 bytes per data type.
    #[builder(default = 5)]
    pub count_offset: usize,
    /// ID that must immediately follow the offset table.
    #[builder(default = [0x00, 0x00])]
    pub first_id: [u8; 2],
    #[builder(default = default_checksum())]
    pub checksum: Arc<dyn ChecksumRule>,
    /// Maximum number of bytes buffered for a single candidate frame.
    #[builder(default = SyncConfig::DEFAULT_MAX_FRAME_LEN)]
    pub max_frame_len: usize,
}

impl SyncConfig {
    /// Largest possible PD0 ensemble plus the next frame's signature.
    pub const DEFAULT_MAX_FRAME_LEN: usize = u16::MAX as usize + TERMINATOR_OFFSET + 2;

    /// Check that the header fields are laid out in stream order: signature, then the
    /// length field, then the count field.
    ///
    /// # Errors
    /// [Error::Config] if a field overlaps or precedes the one it must follow.
    pub fn validate(&self) -> Result<()> {
        if self.length_offset < self.signature.len() {
            return Err(Error::Config(format!(
                "length_offset {} overlaps the {} byte signature",
                self.length_offset,
                self.signature.len()
            )));
        }
        if self.count_offset < self.length_offset + 2 {
            return Err(Error::Config(format!(
                "count_offset {} overlaps the length field at {}",
                self.count_offset, self.length_offset
            )));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Scanning the window for the start signature.
    SeekStart,
    /// Reading the declared length field.
    Length,
    /// Reading the number of data types.
    CountField,
    /// Waiting for the first data type ID at the offset implied by the count.
    HeaderVerify,
    /// Accumulating until the next signature appears at the declared length. The checksum
    /// is verified on the transition out of this state.
    Body,
}

/// Running counters for a [Synchronizer].
#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    /// Total bytes consumed.
    pub bytes: u64,
    /// Frames emitted.
    pub frames: u64,
    /// Signatures that turned out not to start a frame.
    pub false_starts: u64,
    pub checksum_failures: u64,
    /// Candidates abandoned because the next signature did not follow the declared length,
    /// or because they would not fit the buffer.
    pub overruns: u64,
}

/// Byte-at-a-time state machine that locates frames in a chunked byte stream.
///
/// A candidate starts at every start signature. The header is considered genuine only if
/// the first data type ID is found exactly where the data type count says it should be;
/// otherwise the candidate is dropped and scanning continues with the next byte. A verified
/// candidate is complete when the next frame's signature is seen at its declared length,
/// at which point the checksum is checked and the frame emitted. The next frame's signature
/// bytes are carried over as the start of the next candidate, so adjacent frames never
/// lose bytes.
///
/// Output does not depend on how the stream is chunked. Since completion requires the
/// following signature, the last frame of a finite stream is only emitted by
/// [Synchronizer::finish].
///
/// # Example
/// ```
/// use adcp::framing::{Synchronizer, SyncConfig};
///
/// let mut sync = Synchronizer::new(SyncConfig::default());
/// // nothing to see here
/// assert!(sync.push(&[0x00, 0x7f, 0x01]).is_empty());
/// assert!(sync.push(&[]).is_empty());
/// ```
#[derive(Debug)]
pub struct Synchronizer {
    config: SyncConfig,
    state: State,
    window: Window<WINDOW_LEN>,
    frame: ByteQueue,
    // bytes in the candidate, including its signature
    count: usize,
    sum: u32,
    declared: usize,
    first_type_offset: usize,
    verified: bool,
    stats: SyncStats,
}

impl Synchronizer {
    /// # Panics
    /// If `config` fails [SyncConfig::validate].
    pub fn new(config: SyncConfig) -> Self {
        if let Err(err) = config.validate() {
            panic!("invalid synchronizer config: {err}");
        }
        let frame = ByteQueue::with_limit(config.max_frame_len.max(MIN_FRAME_LEN));
        Synchronizer {
            config,
            state: State::SeekStart,
            window: Window::new(),
            frame,
            count: 0,
            sum: 0,
            declared: 0,
            first_type_offset: 0,
            verified: false,
            stats: SyncStats::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// True while a candidate frame is being assembled.
    #[must_use]
    pub fn in_frame(&self) -> bool {
        self.state != State::SeekStart
    }

    /// Consume `dat`, returning any frames completed by it in stream order. An empty slice
    /// is a no-op.
    pub fn push(&mut self, dat: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for &b in dat {
            if let Some(frame) = self.step(b) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Signal the end of input.
    ///
    /// A pending candidate that holds exactly its declared length plus checksum is verified
    /// and returned; anything else in flight is discarded. The synchronizer is reset either
    /// way.
    pub fn finish(&mut self) -> Option<Frame> {
        let frame = if self.state == State::Body
            && self.verified
            && self.count == self.declared + CHECKSUM_LEN
        {
            let [.., lsb, msb] = *self.window.bytes();
            let sum = self.sum - u32::from(lsb) - u32::from(msb);
            self.verify(self.count, sum, u16::from_le_bytes([lsb, msb]))
        } else {
            if self.in_frame() {
                debug!(count = self.count, "discarding incomplete frame at end of input");
            }
            None
        };
        self.reset();
        frame
    }

    /// Discard all in-flight state, including the look-back window. Counters are kept.
    pub fn reset(&mut self) {
        self.window.clear();
        self.restart();
    }

    fn step(&mut self, b: u8) -> Option<Frame> {
        self.window.push(b);
        self.stats.bytes += 1;

        match self.state {
            State::SeekStart => {
                if self.window.ends_with(&self.config.signature) {
                    self.begin();
                }
            }
            State::Length => {
                if !self.accumulate(b) {
                    return None;
                }
                let off = self.config.length_offset;
                if self.count == off + 2 {
                    let dat = self.frame.as_slice();
                    self.declared = usize::from(u16::from_le_bytes([dat[off], dat[off + 1]]));
                    if self.declared <= self.config.count_offset
                        || self.declared + TERMINATOR_OFFSET > self.config.max_frame_len
                    {
                        trace!(declared = self.declared, "implausible declared length");
                        self.false_start();
                    } else {
                        self.state = State::CountField;
                    }
                }
            }
            State::CountField => {
                if !self.accumulate(b) {
                    return None;
                }
                let off = self.config.count_offset;
                if self.count == off + 1 {
                    let num_types = usize::from(self.frame.as_slice()[off]);
                    self.first_type_offset = off + 1 + 2 * num_types;
                    if self.first_type_offset + self.config.first_id.len() > self.declared {
                        trace!(num_types, declared = self.declared, "offset table exceeds frame");
                        self.false_start();
                    } else {
                        self.state = State::HeaderVerify;
                    }
                }
            }
            State::HeaderVerify => {
                if !self.accumulate(b) {
                    return None;
                }
                if self.count == self.first_type_offset + self.config.first_id.len() {
                    if self.window.ends_with(&self.config.first_id) {
                        self.verified = true;
                        self.state = State::Body;
                    } else {
                        self.false_start();
                    }
                }
            }
            State::Body => {
                if self.count == self.declared + TERMINATOR_OFFSET {
                    if self.verified && self.window.ends_with(&self.config.signature) {
                        return self.complete();
                    }
                    self.stats.overruns += 1;
                    debug!(
                        declared = self.declared,
                        "next signature not found at declared length; resynchronizing"
                    );
                    self.abandon();
                } else {
                    self.accumulate(b);
                }
            }
        }
        None
    }

    /// Add a byte to the candidate. If the candidate cannot hold it the candidate is
    /// abandoned and `false` returned.
    fn accumulate(&mut self, b: u8) -> bool {
        if !self.frame.push(b) {
            self.stats.overruns += 1;
            debug!(count = self.count, "candidate exceeds buffer limit; resynchronizing");
            self.abandon();
            return false;
        }
        self.count += 1;
        self.sum += u32::from(b);
        true
    }

    /// Start a candidate with the signature currently at the end of the window.
    fn begin(&mut self) {
        self.restart();
        let signature = self.config.signature;
        for b in signature {
            self.accumulate(b);
        }
        self.state = State::Length;
    }

    /// The candidate buffer holds the complete frame followed by the first byte of the next
    /// frame's signature. The current byte, the second signature byte, has not been
    /// accumulated.
    fn complete(&mut self) -> Option<Frame> {
        let [lsb, msb, sig0, sig1] = *self.window.bytes();
        let len = self.declared + CHECKSUM_LEN;
        let sum = self.sum - u32::from(sig0) - u32::from(lsb) - u32::from(msb);
        let frame = self.verify(len, sum, u16::from_le_bytes([lsb, msb]));

        // carry the next signature over as the start of the next candidate
        self.frame.consume(len);
        self.count = self.frame.len();
        self.sum = byte_sum(self.frame.as_slice());
        self.declared = 0;
        self.first_type_offset = 0;
        self.verified = false;
        self.state = State::Length;
        self.accumulate(sig1);

        frame
    }

    fn verify(&mut self, len: usize, sum: u32, declared: u16) -> Option<Frame> {
        let integrity = self.config.checksum.check(sum, declared);
        if integrity == Integrity::Failed {
            self.stats.checksum_failures += 1;
            warn!(len, sum, declared, "ensemble checksum mismatch; dropping");
            return None;
        }
        self.stats.frames += 1;
        debug!(len, ?integrity, "ensemble");
        Some(Frame {
            data: self.frame.as_slice()[..len].to_vec(),
            sum,
            checksum: declared,
            integrity,
        })
    }

    fn false_start(&mut self) {
        self.stats.false_starts += 1;
        trace!(count = self.count, "signature did not start a frame");
        self.abandon();
    }

    /// Drop the candidate and go back to scanning. Consumed bytes are not rescanned, but a
    /// signature ending at the current byte starts a new candidate immediately.
    fn abandon(&mut self) {
        self.restart();
        if self.window.ends_with(&self.config.signature) {
            self.begin();
        }
    }

    fn restart(&mut self) {
        self.frame.clear();
        self.count = 0;
        self.sum = 0;
        self.declared = 0;
        self.first_type_offset = 0;
        self.verified = false;
        self.state = State::SeekStart;
    }
}

/// Iterates over frames synchronized from a reader. Created using [read_ensemble_frames].
///
/// ## Errors
/// Read errors other than [ErrorKind::Interrupted] are passed on, after which the iterator
/// ends.
pub struct FrameIter<R>
where
    R: Read,
{
    reader: R,
    sync: Synchronizer,
    buf: Vec<u8>,
    pending: VecDeque<Frame>,
    done: bool,
}

impl<R> FrameIter<R>
where
    R: Read,
{
    /// Counters of the underlying [Synchronizer].
    pub fn stats(&self) -> SyncStats {
        self.sync.stats()
    }
}

impl<R> Iterator for FrameIter<R>
where
    R: Read,
{
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(Ok(frame));
            }
            if self.done {
                return None;
            }
            match self.reader.read(&mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    self.pending.extend(self.sync.finish());
                }
                Ok(n) => {
                    let frames = self.sync.push(&self.buf[..n]);
                    self.pending.extend(frames);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.done = true;
                    return Some(Err(Error::Io(err)));
                }
            }
        }
    }
}

/// Creates an iterator over the frames found in `reader`, read in chunks of `buffer_size`.
///
/// The final frame is emitted at end of input provided it is complete.
///
/// # Example
/// ```
/// use adcp::framing::{read_ensemble_frames, SyncConfig};
///
/// let dat: &[u8] = &[0x7f, 0x7f, 0x01];
/// let frames: Vec<_> = read_ensemble_frames(dat, SyncConfig::default(), 1024).collect();
/// assert!(frames.is_empty());
/// ```
pub fn read_ensemble_frames<R>(reader: R, config: SyncConfig, buffer_size: usize) -> FrameIter<R>
where
    R: Read,
{
    FrameIter {
        reader,
        sync: Synchronizer::new(config),
        buf: vec![0u8; buffer_size.max(1)],
        pending: VecDeque::new(),
        done: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal ensemble with one data type: header, fixed leader id, `body`, reserved and
    /// checksum.
    fn ensemble(body: &[u8]) -> Vec<u8> {
        let mut dat = vec![0x7f, 0x7f, 0, 0, 0x00, 0x01, 0x08, 0x00, 0x00, 0x00];
        dat.extend_from_slice(body);
        dat.extend_from_slice(&[0x00, 0x00]);
        let len = u16::try_from(dat.len()).unwrap().to_le_bytes();
        dat[2] = len[0];
        dat[3] = len[1];
        let checksum = u16::try_from(byte_sum(&dat) % 65535).unwrap();
        dat.extend_from_slice(&checksum.to_le_bytes());
        dat
    }

    fn with_checksum_offset(mut dat: Vec<u8>, delta: i32) -> Vec<u8> {
        let n = dat.len();
        let checksum = i32::from(u16::from_le_bytes([dat[n - 2], dat[n - 1]])) + delta;
        let checksum = u16::try_from(checksum.rem_euclid(65535)).unwrap();
        dat[n - 2..].copy_from_slice(&checksum.to_le_bytes());
        dat
    }

    #[test]
    fn config_field_order() {
        assert!(SyncConfig::default().validate().is_ok());

        let config = SyncConfig::builder().length_offset(1).build();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = SyncConfig::builder().length_offset(3).count_offset(4).build();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = SyncConfig::builder().length_offset(3).count_offset(5).build();
        assert!(config.validate().is_ok());
    }

    #[test]
    #[should_panic(expected = "invalid synchronizer config")]
    fn new_rejects_overlapping_fields() {
        let _ = Synchronizer::new(SyncConfig::builder().count_offset(3).build());
    }

    #[test]
    fn single_ensemble_followed_by_signature() {
        let body: Vec<u8> = (1..=12).collect();
        let ens = ensemble(&body);
        assert_eq!(ens.len(), 26, "declared length 24 plus checksum");

        let mut sync = Synchronizer::new(SyncConfig::default());
        let mut frames = sync.push(&ens);
        assert!(frames.is_empty(), "frame requires the next signature");
        frames.extend(sync.push(&PD0_SIGNATURE));

        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.data, ens);
        assert_eq!(frame.declared_len(), Some(24));
        assert_eq!(frame.integrity, Integrity::Ok);
        assert!(frame.is_valid());
        assert!(sync.in_frame(), "next signature starts a new candidate");
    }

    #[test]
    fn finish_emits_complete_trailing_frame() {
        let ens = ensemble(&[1, 2, 3, 4]);
        let mut sync = Synchronizer::new(SyncConfig::default());
        assert!(sync.push(&ens).is_empty());

        let frame = sync.finish().expect("complete frame at end of input");
        assert_eq!(frame.data, ens);
        assert!(!sync.in_frame());
        assert!(sync.finish().is_none());
    }

    #[test]
    fn finish_drops_incomplete_frame() {
        let ens = ensemble(&[1, 2, 3, 4]);
        let mut sync = Synchronizer::new(SyncConfig::default());
        sync.push(&ens[..ens.len() - 1]);

        assert!(sync.finish().is_none());
        assert_eq!(sync.stats().frames, 0);
    }

    #[test]
    fn adjacent_frames_share_no_bytes() {
        let a = ensemble(&[1; 10]);
        let b = ensemble(&[2; 20]);
        let c = ensemble(&[3; 30]);
        let stream: Vec<u8> = [a.clone(), b.clone(), c.clone()].concat();

        let mut sync = Synchronizer::new(SyncConfig::default());
        let mut frames = sync.push(&stream);
        frames.extend(sync.finish());

        let got: Vec<Vec<u8>> = frames.into_iter().map(|f| f.data).collect();
        assert_eq!(got, vec![a, b, c]);
    }

    #[test]
    fn corrupt_checksum_is_dropped_and_next_frame_synchronizes() {
        let bad = with_checksum_offset(ensemble(&[5; 16]), 7);
        let good = ensemble(&[6; 16]);
        let stream: Vec<u8> = [bad, good.clone(), PD0_SIGNATURE.to_vec()].concat();

        let mut sync = Synchronizer::new(SyncConfig::default());
        let frames = sync.push(&stream);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, good);
        assert_eq!(sync.stats().checksum_failures, 1);
    }

    #[test]
    fn checksum_window() {
        for (delta, accepted) in [(0, true), (1, true), (-1, true), (2, false), (-2, false)] {
            let ens = with_checksum_offset(ensemble(&[9; 8]), delta);
            let mut sync = Synchronizer::new(SyncConfig::default());
            let frames = sync.push(&[ens, PD0_SIGNATURE.to_vec()].concat());
            assert_eq!(frames.len() == 1, accepted, "checksum delta {delta}");
        }
    }

    #[test]
    fn chunking_does_not_change_output() {
        let stream: Vec<u8> = [
            vec![0x11, 0x7f, 0x03],
            ensemble(&[0x7f, 0x7f, 0x00]),
            ensemble(&[0x22; 40]),
            ensemble(&[0x7f; 5]),
        ]
        .concat();

        let mut whole = Synchronizer::new(SyncConfig::default());
        let mut expected = whole.push(&stream);
        expected.extend(whole.finish());
        assert_eq!(expected.len(), 3);

        for chunk_size in [1, 2, 3, 7, 64] {
            let mut sync = Synchronizer::new(SyncConfig::default());
            let mut got = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                got.extend(sync.push(chunk));
                got.extend(sync.push(&[]));
            }
            got.extend(sync.finish());
            assert_eq!(got, expected, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn false_start_in_leading_garbage() {
        // signature, a length, spare, 2 data types, then something that is not 00 00 where
        // the fixed leader id should be
        let garbage = [0x7f, 0x7f, 0x40, 0x00, 0x00, 0x02, 0x0a, 0x00, 0x20, 0x00, 0x01, 0x02];
        let ens = ensemble(&[1, 2, 3]);
        let stream: Vec<u8> = [&garbage[..], &ens, &PD0_SIGNATURE].concat();

        let mut sync = Synchronizer::new(SyncConfig::default());
        let frames = sync.push(&stream);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, ens);
        assert_eq!(sync.stats().false_starts, 1);
    }

    #[test]
    fn signature_inside_body_does_not_end_frame() {
        let ens = ensemble(&[0x7f, 0x7f, 0x7f, 0x7f, 0x00, 0x00, 0x7f, 0x7f]);
        let mut sync = Synchronizer::new(SyncConfig::default());
        let frames = sync.push(&[ens.clone(), PD0_SIGNATURE.to_vec()].concat());

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, ens);
    }

    #[test]
    fn missing_next_signature_resynchronizes() {
        let first = ensemble(&[1; 8]);
        let second = ensemble(&[2; 8]);
        // junk between the frames means the first never sees its terminating signature
        let stream: Vec<u8> = [
            first,
            vec![0xaa, 0xbb, 0xcc],
            second.clone(),
            PD0_SIGNATURE.to_vec(),
        ]
        .concat();

        let mut sync = Synchronizer::new(SyncConfig::default());
        let frames = sync.push(&stream);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, second);
        assert_eq!(sync.stats().overruns, 1);
    }

    #[test]
    fn implausible_length_is_a_false_start() {
        // declared length smaller than the header itself
        let stream = [0x7f, 0x7f, 0x02, 0x00, 0x00, 0x00];
        let mut sync = Synchronizer::new(SyncConfig::default());
        sync.push(&stream);

        assert_eq!(sync.stats().false_starts, 1);
        assert!(!sync.in_frame());
    }

    #[test]
    fn frames_larger_than_limit_are_skipped() {
        let big = ensemble(&[1; 200]);
        let small = ensemble(&[2; 10]);
        let config = SyncConfig::builder().max_frame_len(100).build();
        let mut sync = Synchronizer::new(config);
        let frames = sync.push(&[big, small.clone(), PD0_SIGNATURE.to_vec()].concat());

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, small);
    }

    #[test]
    fn compaction_keeps_frames_intact() {
        let frames_in: Vec<Vec<u8>> = (0..10u8)
            .map(|i| ensemble(&vec![i; 30 + usize::from(i)]))
            .collect();
        let limit = frames_in.iter().map(Vec::len).max().unwrap() + TERMINATOR_OFFSET;
        let config = SyncConfig::builder().max_frame_len(limit).build();

        let mut sync = Synchronizer::new(config);
        let mut frames = sync.push(&frames_in.concat());
        frames.extend(sync.finish());

        let got: Vec<Vec<u8>> = frames.into_iter().map(|f| f.data).collect();
        assert_eq!(got, frames_in);
    }

    #[test]
    fn reset_discards_partial_frame() {
        let ens = ensemble(&[1; 8]);
        let mut sync = Synchronizer::new(SyncConfig::default());
        sync.push(&ens[..10]);
        assert!(sync.in_frame());

        sync.reset();
        assert!(!sync.in_frame());
        let mut frames = sync.push(&ens[10..]);
        frames.extend(sync.finish());
        assert!(frames.is_empty(), "no partial frame may survive a reset");
    }

    #[test]
    fn read_frames_from_reader() {
        let a = ensemble(&[1; 8]);
        let b = ensemble(&[2; 9]);
        let stream = [a.clone(), b.clone()].concat();

        let frames: Vec<Frame> = read_ensemble_frames(&stream[..], SyncConfig::default(), 5)
            .map(|f| f.unwrap())
            .collect();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, a);
        assert_eq!(frames[1].data, b);
    }
}
