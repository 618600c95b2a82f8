//! Destinations for decoded ensembles.
//!
//! A [Sink] is shared by every acquisition loop feeding it, so implementations must accept
//! concurrent pushes. Records must be pushed to a channel only after it is registered.
use std::collections::HashSet;
use std::io::Write;
use std::sync::Mutex;

use chrono::Utc;
use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::ensemble::Ensemble;
use crate::prelude::*;

/// MIME type of raw PD0 ensemble bytes.
pub const PD0_MIME_TYPE: &str = "application/octet-stream";

/// Describes the data pushed to a channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChannelMetadata {
    pub mime_type: String,
    pub description: Option<String>,
}

impl Default for ChannelMetadata {
    fn default() -> Self {
        ChannelMetadata {
            mime_type: PD0_MIME_TYPE.to_string(),
            description: None,
        }
    }
}

pub trait Sink: Send + Sync {
    /// Declare a channel before pushing to it. Registering a channel more than once is not
    /// an error.
    ///
    /// # Errors
    /// If the channel cannot be created.
    fn register_channel(&self, name: &str, metadata: &ChannelMetadata) -> Result<()>;

    /// Hand off a validated, decoded ensemble. `timestamp` is seconds since the Unix epoch.
    /// The raw ensemble bytes are available as `ensemble.data`.
    ///
    /// # Errors
    /// If `channel` is not registered or the record cannot be stored.
    fn push_record(&self, channel: &str, timestamp: f64, ensemble: &Ensemble) -> Result<()>;
}

/// Current time as seconds since the Unix epoch, with microsecond resolution.
#[must_use]
pub fn now_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1e6
}

fn lock_err<T>(_: T) -> Error {
    Error::Sink("lock poisoned".to_string())
}

/// Registered channel names.
#[derive(Debug, Default)]
struct Channels(Mutex<HashSet<String>>);

impl Channels {
    fn register(&self, name: &str) -> Result<()> {
        if self.0.lock().map_err(lock_err)?.insert(name.to_string()) {
            debug!(channel = name, "registered channel");
        }
        Ok(())
    }

    fn check(&self, name: &str) -> Result<()> {
        if self.0.lock().map_err(lock_err)?.contains(name) {
            Ok(())
        } else {
            Err(Error::Sink(format!("channel {name} is not registered")))
        }
    }
}

/// An ensemble as handed to a sink.
#[derive(Serialize, Debug, Clone)]
pub struct Record {
    pub channel: String,
    pub timestamp: f64,
    pub ensemble: Ensemble,
}

/// Forwards records to a crossbeam channel.
///
/// # Example
/// ```
/// use adcp::sink::{ChannelMetadata, ChannelSink, Sink};
///
/// let (sink, records) = ChannelSink::new();
/// sink.register_channel("adcp", &ChannelMetadata::default()).unwrap();
/// drop(sink);
/// assert!(records.recv().is_err());
/// ```
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<Record>,
    channels: Channels,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, Receiver<Record>) {
        let (tx, rx) = unbounded();
        (
            ChannelSink {
                tx,
                channels: Channels::default(),
            },
            rx,
        )
    }
}

impl Sink for ChannelSink {
    fn register_channel(&self, name: &str, _metadata: &ChannelMetadata) -> Result<()> {
        self.channels.register(name)
    }

    fn push_record(&self, channel: &str, timestamp: f64, ensemble: &Ensemble) -> Result<()> {
        self.channels.check(channel)?;
        self.tx
            .send(Record {
                channel: channel.to_string(),
                timestamp,
                ensemble: ensemble.clone(),
            })
            .map_err(|_| Error::Sink("record receiver disconnected".to_string()))
    }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    channel: &'a str,
    timestamp: f64,
    ensemble: &'a Ensemble,
}

/// Writes one JSON object per record, newline delimited.
#[derive(Debug)]
pub struct JsonLinesSink<W>
where
    W: Write + Send,
{
    writer: Mutex<W>,
    channels: Channels,
}

impl<W> JsonLinesSink<W>
where
    W: Write + Send,
{
    pub fn new(writer: W) -> Self {
        JsonLinesSink {
            writer: Mutex::new(writer),
            channels: Channels::default(),
        }
    }

    /// # Errors
    /// If the writer lock was poisoned.
    pub fn into_inner(self) -> Result<W> {
        self.writer.into_inner().map_err(lock_err)
    }
}

impl<W> Sink for JsonLinesSink<W>
where
    W: Write + Send,
{
    fn register_channel(&self, name: &str, _metadata: &ChannelMetadata) -> Result<()> {
        self.channels.register(name)
    }

    fn push_record(&self, channel: &str, timestamp: f64, ensemble: &Ensemble) -> Result<()> {
        self.channels.check(channel)?;
        let line = serde_json::to_string(&JsonRecord {
            channel,
            timestamp,
            ensemble,
        })?;
        let mut writer = self.writer.lock().map_err(lock_err)?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        trace!(channel, bytes = line.len(), "wrote record");
        Ok(())
    }
}

/// Appends the raw ensemble bytes of every record, producing a PD0 file.
#[derive(Debug)]
pub struct RawFileSink<W>
where
    W: Write + Send,
{
    writer: Mutex<W>,
    channels: Channels,
}

impl<W> RawFileSink<W>
where
    W: Write + Send,
{
    pub fn new(writer: W) -> Self {
        RawFileSink {
            writer: Mutex::new(writer),
            channels: Channels::default(),
        }
    }

    /// # Errors
    /// If the writer lock was poisoned.
    pub fn into_inner(self) -> Result<W> {
        self.writer.into_inner().map_err(lock_err)
    }
}

impl<W> Sink for RawFileSink<W>
where
    W: Write + Send,
{
    fn register_channel(&self, name: &str, _metadata: &ChannelMetadata) -> Result<()> {
        self.channels.register(name)
    }

    fn push_record(&self, channel: &str, _timestamp: f64, ensemble: &Ensemble) -> Result<()> {
        self.channels.check(channel)?;
        let mut writer = self.writer.lock().map_err(lock_err)?;
        writer.write_all(&ensemble.data)?;
        writer.flush()?;
        Ok(())
    }
}
