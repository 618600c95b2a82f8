use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, unbounded, Receiver};
use tracing::{debug, error, span, Level};

use super::Ensemble;
use crate::framing::Frame;
use crate::prelude::*;

/// Decodes [Frame]s into [Ensemble]s on a thread pool, preserving input order.
///
/// # Example
/// ```no_run
/// use std::fs::File;
/// use adcp::ensemble::EnsembleDecoder;
/// use adcp::framing::{read_ensemble_frames, SyncConfig};
///
/// let file = File::open("capture.pd0").unwrap();
/// let frames = read_ensemble_frames(file, SyncConfig::default(), 8192).filter_map(Result::ok);
/// let ensembles = EnsembleDecoder::new()
///     .with_threads(4)
///     .decode(frames)
///     .unwrap()
///     .filter_map(Result::ok);
/// ```
#[derive(Debug, Default)]
pub struct EnsembleDecoder {
    num_threads: Option<usize>,
}

impl EnsembleDecoder {
    const DEFAULT_BUFFER_SIZE: usize = 1024;

    pub fn new() -> Self {
        EnsembleDecoder { num_threads: None }
    }

    pub fn with_threads(mut self, num: usize) -> Self {
        self.num_threads = Some(num);
        self
    }

    /// Returns an iterator over decode results, one per frame in input order.
    ///
    /// Frames are read and dispatched from a background thread; each is decoded as a job on
    /// a rayon pool.
    ///
    /// # Errors
    /// [Error::Io] if the background thread cannot be started. Errors decoding individual
    /// frames are produced by the iterator.
    pub fn decode<F>(self, frames: F) -> Result<EnsembleIter>
    where
        F: Iterator<Item = Frame> + Send + 'static,
    {
        let (jobs_tx, jobs_rx) = bounded(Self::DEFAULT_BUFFER_SIZE);

        let handle = thread::Builder::new()
            .name("ensemble_decoder".into())
            .spawn(move || {
                let pool = {
                    let mut pool = rayon::ThreadPoolBuilder::new();
                    if let Some(num) = self.num_threads {
                        pool = pool.num_threads(num);
                    }
                    pool
                }
                .build();
                let pool = match pool {
                    Ok(pool) => pool,
                    Err(err) => {
                        let (future_tx, future_rx) = unbounded();
                        let _ = future_tx.send(Err(Error::Decode(format!(
                            "failed to create decode thread pool: {err}"
                        ))));
                        let _ = jobs_tx.send(future_rx);
                        return;
                    }
                };

                for (idx, frame) in frames.enumerate() {
                    let (future_tx, future_rx) = unbounded();
                    // spawn_fifo makes sure the frame order is maintained
                    pool.spawn_fifo(move || {
                        let zult = Ensemble::decode(&frame.data);
                        if future_tx.send(zult).is_err() {
                            debug!(frame_idx = idx, "failed to send ensemble");
                        }
                    });
                    if let Err(err) = jobs_tx.send(future_rx) {
                        debug!("failed to send ensemble future: {err}");
                        break;
                    }
                }
            })?;

        Ok(EnsembleIter {
            jobs: jobs_rx,
            handle: Some(handle),
        })
    }
}

/// Iterator over [Ensemble]s decoded by an [EnsembleDecoder].
pub struct EnsembleIter {
    jobs: Receiver<Receiver<Result<Ensemble>>>,
    handle: Option<JoinHandle<()>>,
}

impl Iterator for EnsembleIter {
    type Item = Result<Ensemble>;

    fn next(&mut self) -> Option<Self::Item> {
        // recv blocks current thread until data is available.
        match self.jobs.recv() {
            Err(_) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        error!("ensemble decoder thread panicked");
                    }
                }
                None
            }
            Ok(rx) => match rx.recv() {
                Ok(Ok(ensemble)) => {
                    let span = span!(
                        Level::TRACE,
                        "ensemble",
                        number = ensemble.ensemble_number()
                    );
                    let _guard = span.enter();
                    debug!(data_types = ?ensemble.data_types(), "decoded");
                    Some(Ok(ensemble))
                }
                Ok(Err(err)) => Some(Err(err)),
                Err(_) => Some(Err(Error::Decode(
                    "decode job exited without a result".to_string(),
                ))),
            },
        }
    }
}

/// Decode `frames` using an [EnsembleDecoder] with the default number of threads.
///
/// # Errors
/// See [EnsembleDecoder::decode].
pub fn decode_frames<F>(frames: F) -> Result<EnsembleIter>
where
    F: Iterator<Item = Frame> + Send + 'static,
{
    EnsembleDecoder::new().decode(frames)
}
