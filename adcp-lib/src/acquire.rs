//! Acquisition loops.
//!
//! An [Acquisition] owns one connection and one [Synchronizer]: it reads chunks, pushes them
//! through the synchronizer, decodes each emitted frame and hands the result to the shared
//! [Sink]. On a transport or sink failure it tears the connection down, resets the
//! synchronizer, waits the configured retry delay and reconnects, until shut down.
//!
//! A [Gateway] runs one acquisition loop per configured source on a thread pool.
use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crossbeam::channel::unbounded;
use serde::Serialize;
use threadpool::ThreadPool;
use tracing::{debug, error, info, info_span, warn};

use crate::config::{Endpoint, GatewayConfig, SourceConfig};
use crate::ensemble::Ensemble;
use crate::framing::{Frame, SyncStats, Synchronizer};
use crate::prelude::*;
use crate::sink::{now_seconds, ChannelMetadata, Sink};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cooperative cancellation flag shared by acquisition loops.
///
/// Loops check it between reads and while waiting to retry, so triggering it stops them
/// within one read timeout.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<(Mutex<bool>, Condvar)>);

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (lock, cvar) = &*self.0;
        match lock.lock() {
            Ok(mut triggered) => *triggered = true,
            Err(poisoned) => *poisoned.into_inner() = true,
        }
        cvar.notify_all();
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        let (lock, _) = &*self.0;
        match lock.lock() {
            Ok(triggered) => *triggered,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Block for up to `timeout`, returning early if triggered. Returns whether shutdown has
    /// been triggered.
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.0;
        let Ok(guard) = lock.lock() else {
            return true;
        };
        match cvar.wait_timeout_while(guard, timeout, |triggered| !*triggered) {
            Ok((triggered, _)) => *triggered,
            Err(_) => true,
        }
    }
}

/// Counters for a single acquisition loop.
#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionStats {
    /// Successful connections, or file opens.
    pub connections: u64,
    /// Failures that caused a reconnect.
    pub failures: u64,
    pub bytes: u64,
    /// Ensembles handed to the sink.
    pub ensembles: u64,
    /// Frames that passed synchronization but could not be decoded.
    pub decode_failures: u64,
    pub sync: SyncStats,
}

enum Completion {
    /// A finite source was read to the end.
    EndOfInput,
    Shutdown,
}

/// Acquisition loop for a single source.
pub struct Acquisition {
    config: SourceConfig,
    sink: Arc<dyn Sink>,
    shutdown: Shutdown,
}

impl Acquisition {
    pub fn new(config: SourceConfig, sink: Arc<dyn Sink>, shutdown: Shutdown) -> Self {
        Acquisition {
            config,
            sink,
            shutdown,
        }
    }

    /// Run until shutdown is triggered or, for a file source, the file has been read.
    ///
    /// Failures are logged and retried after the configured delay; they are never returned.
    ///
    /// # Errors
    /// [Error::Config] if the source configuration is invalid.
    pub fn run(&self) -> Result<AcquisitionStats> {
        self.config.validate()?;
        let span = info_span!("acquire", source = %self.config.name);
        let _guard = span.enter();

        let mut sync = Synchronizer::new(self.config.sync_config());
        let mut stats = AcquisitionStats::default();

        while !self.shutdown.is_triggered() {
            match self.session(&mut sync, &mut stats) {
                Ok(Completion::EndOfInput) => {
                    info!("end of input");
                    break;
                }
                Ok(Completion::Shutdown) => break,
                Err(err) => {
                    stats.failures += 1;
                    let delay = self.config.retry_delay();
                    warn!(%err, ?delay, "acquisition failed; retrying");
                    sync.reset();
                    if self.shutdown.wait(delay) {
                        break;
                    }
                }
            }
        }

        stats.sync = sync.stats();
        info!(
            ensembles = stats.ensembles,
            failures = stats.failures,
            bytes = stats.bytes,
            "acquisition stopped"
        );
        Ok(stats)
    }

    fn session(&self, sync: &mut Synchronizer, stats: &mut AcquisitionStats) -> Result<Completion> {
        self.sink
            .register_channel(&self.config.channel, &ChannelMetadata::default())?;

        match &self.config.endpoint {
            Endpoint::Tcp { host, port } => {
                let stream = connect(host, *port)?;
                stream.set_read_timeout(Some(self.config.read_timeout()))?;
                stats.connections += 1;
                info!(endpoint = %self.config.endpoint, "connected");
                self.pump(stream, false, sync, stats)
            }
            Endpoint::File { path } => {
                let file = File::open(path)?;
                stats.connections += 1;
                info!(endpoint = %self.config.endpoint, "opened");
                self.pump(file, true, sync, stats)
            }
        }
    }

    /// Read from `reader` until shutdown, failure or, if `finite`, end of input. A
    /// connection that reaches end of input is a failure since streams are unbounded.
    fn pump<R: Read>(
        &self,
        mut reader: R,
        finite: bool,
        sync: &mut Synchronizer,
        stats: &mut AcquisitionStats,
    ) -> Result<Completion> {
        let mut buf = vec![0u8; self.config.buffer_size];
        loop {
            if self.shutdown.is_triggered() {
                if sync.in_frame() {
                    debug!("discarding partial frame at shutdown");
                }
                sync.reset();
                return Ok(Completion::Shutdown);
            }
            let n = match reader.read(&mut buf) {
                Ok(0) if finite => {
                    if let Some(frame) = sync.finish() {
                        self.deliver(&frame, stats)?;
                    }
                    return Ok(Completion::EndOfInput);
                }
                Ok(0) => {
                    return Err(Error::Io(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "connection closed by peer",
                    )))
                }
                Ok(n) => n,
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                    ) =>
                {
                    continue
                }
                Err(err) => return Err(err.into()),
            };
            stats.bytes += n as u64;

            for frame in sync.push(&buf[..n]) {
                self.deliver(&frame, stats)?;
            }
        }
    }

    /// Decode `frame` and push it to the sink. Frames that fail to decode are skipped;
    /// sink failures are returned.
    fn deliver(&self, frame: &Frame, stats: &mut AcquisitionStats) -> Result<()> {
        let ensemble = match Ensemble::decode(&frame.data) {
            Ok(ensemble) => ensemble,
            Err(err) => {
                stats.decode_failures += 1;
                warn!(%err, len = frame.data.len(), "failed to decode ensemble; skipping");
                return Ok(());
            }
        };
        self.sink
            .push_record(&self.config.channel, now_seconds(), &ensemble)?;
        stats.ensembles += 1;
        debug!(number = ensemble.ensemble_number(), "pushed ensemble");
        Ok(())
    }
}

fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                debug!(%addr, %err, "connect failed");
                last_err = Some(err);
            }
        }
    }
    Err(Error::Io(last_err.unwrap_or_else(|| {
        io::Error::new(
            ErrorKind::NotFound,
            format!("{host}:{port} did not resolve to any address"),
        )
    })))
}

/// Runs an [Acquisition] per configured source, sharing a single sink and shutdown flag.
pub struct Gateway {
    config: GatewayConfig,
    sink: Arc<dyn Sink>,
    shutdown: Shutdown,
}

impl Gateway {
    pub fn new(config: GatewayConfig, sink: Arc<dyn Sink>, shutdown: Shutdown) -> Self {
        Gateway {
            config,
            sink,
            shutdown,
        }
    }

    /// Run all sources to completion, returning each source's name and result in
    /// configuration order. A source whose worker panicked gets an [Error::Worker] result.
    ///
    /// # Errors
    /// [Error::Config] if the configuration is invalid.
    pub fn run(self) -> Result<Vec<(String, Result<AcquisitionStats>)>> {
        self.config.validate()?;
        let names: Vec<String> = self.config.sources.iter().map(|s| s.name.clone()).collect();
        let pool = ThreadPool::with_name("acquire".to_string(), names.len());
        let (tx, rx) = unbounded();

        for (idx, source) in self.config.sources.into_iter().enumerate() {
            let tx = tx.clone();
            let acquisition = Acquisition::new(source, self.sink.clone(), self.shutdown.clone());
            pool.execute(move || {
                let zult = acquisition.run();
                if tx.send((idx, zult)).is_err() {
                    debug!("gateway result receiver dropped");
                }
            });
        }
        drop(tx);
        pool.join();
        if pool.panic_count() > 0 {
            error!(panics = pool.panic_count(), "acquisition worker panicked");
        }

        let mut zults: Vec<Option<Result<AcquisitionStats>>> =
            names.iter().map(|_| None).collect();
        for (idx, zult) in rx.iter() {
            zults[idx] = Some(zult);
        }
        Ok(names
            .into_iter()
            .zip(zults)
            .map(|(name, zult)| {
                let zult = zult.unwrap_or_else(|| {
                    Err(Error::Worker(format!("{name}: worker exited without a result")))
                });
                (name, zult)
            })
            .collect())
    }
}
