//! Ring-buffer encoder.
//!
//! Compression runs on its own tokio task so codec and disk latency never
//! reach the render path. Frames arrive over a bounded channel, compressed
//! units accumulate in a time-bounded ring buffer, and `save_to_file`
//! drains a snapshot of the buffered window to a container file while
//! ingest keeps running.

pub mod buffer;
pub mod muxer;

pub use buffer::{EncodedUnit, RingBuffer};
pub use muxer::{ContainerMuxer, MuxerFactory};

use crate::config::Config;
use crate::error::SaveStatus;
use crate::frame::Frame;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Codec boundary. Created per recording session; driven only from the
/// encoder context.
pub trait VideoCodec: Send {
    /// Compress one frame. Codecs pipeline internally, so a call may
    /// return zero, one, or several complete access units.
    fn encode(&mut self, frame: &Frame) -> Result<Vec<EncodedUnit>>;

    /// Signal end of stream and return any remaining buffered units.
    fn finish(&mut self) -> Result<Vec<EncodedUnit>>;
}

/// Asynchronous notifications from the encoder context.
#[derive(Debug, Clone)]
pub enum EncoderEvent {
    /// Snapshot of the buffered duration, emitted at a fixed cadence.
    BufferStatus { span_us: i64 },
    /// Exactly-once outcome of an accepted save.
    SaveComplete { status: SaveStatus },
}

enum EncoderCommand {
    Save { id: Uuid, path: PathBuf },
    Shutdown,
}

/// Handle to a running encoder context.
///
/// Owns the ring buffer exclusively; all buffer queries and the save
/// operation go through this interface.
pub struct RingEncoder {
    frame_tx: mpsc::Sender<Frame>,
    cmd_tx: mpsc::UnboundedSender<EncoderCommand>,
    task: JoinHandle<()>,
}

impl RingEncoder {
    /// Spawn the encoder context for one recording session.
    ///
    /// `codec` has already been opened by the caller, so unsupported
    /// formats fail synchronously before any task exists.
    pub fn start(
        codec: Box<dyn VideoCodec>,
        muxers: Arc<dyn MuxerFactory>,
        config: &Config,
        event_tx: mpsc::UnboundedSender<EncoderEvent>,
    ) -> Self {
        let (frame_tx, frame_rx) = mpsc::channel(config.buffer.frame_queue_depth.max(1));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let task = EncoderTask {
            codec,
            muxers,
            config: config.clone(),
            buffer: RingBuffer::new(config.window()),
            frame_rx,
            cmd_rx,
            event_tx,
        };

        Self {
            frame_tx,
            cmd_tx,
            task: tokio::spawn(task.run()),
        }
    }

    /// Submit a rendered frame for compression.
    ///
    /// Never blocks: when the compression pipeline is saturated the frame
    /// is dropped so rendering stays live.
    pub fn submit_frame(&self, frame: Frame) {
        match self.frame_tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                debug!(
                    timestamp_ns = frame.timestamp_ns,
                    "encoder saturated, dropping frame"
                );
            }
            Err(TrySendError::Closed(_)) => {
                debug!("frame submitted after encoder shutdown");
            }
        }
    }

    /// Begin an asynchronous drain of the buffered window into `path`.
    ///
    /// The session controller serializes saves; the outcome arrives
    /// exactly once as an [`EncoderEvent::SaveComplete`]. Returns the id
    /// used in log context.
    pub fn save_to_file(&self, path: PathBuf) -> Uuid {
        let id = Uuid::new_v4();
        if self
            .cmd_tx
            .send(EncoderCommand::Save { id, path })
            .is_err()
        {
            warn!(%id, "save requested after encoder shutdown");
        }
        id
    }

    /// Stop ingest, flush the codec, and release all encoder resources.
    ///
    /// An in-flight save is interrupted and its completion (cancelled or
    /// failed) is delivered before resources are freed.
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(EncoderCommand::Shutdown);
        if let Err(e) = self.task.await {
            error!("encoder task join failed: {e}");
        }
    }
}

struct InFlightSave {
    id: Uuid,
    handle: JoinHandle<SaveStatus>,
    cancel: Arc<AtomicBool>,
}

struct EncoderTask {
    codec: Box<dyn VideoCodec>,
    muxers: Arc<dyn MuxerFactory>,
    config: Config,
    buffer: RingBuffer,
    frame_rx: mpsc::Receiver<Frame>,
    cmd_rx: mpsc::UnboundedReceiver<EncoderCommand>,
    event_tx: mpsc::UnboundedSender<EncoderEvent>,
}

impl EncoderTask {
    async fn run(mut self) {
        debug!(
            window_us = self.buffer.window_us(),
            "encoder context started"
        );

        let mut status_timer = tokio::time::interval(self.config.status_interval());
        let mut in_flight: Option<InFlightSave> = None;

        loop {
            tokio::select! {
                maybe_frame = self.frame_rx.recv() => {
                    match maybe_frame {
                        Some(frame) => self.ingest(frame),
                        None => break,
                    }
                }

                Some(cmd) = self.cmd_rx.recv() => {
                    match cmd {
                        EncoderCommand::Save { id, path } => {
                            if in_flight.is_some() {
                                // The controller serializes saves; a
                                // duplicate here is a programmer error and
                                // must not disturb the accepted save's
                                // exactly-once completion.
                                error!(%id, "save command while a drain is in flight, ignoring");
                            } else {
                                in_flight = Some(self.begin_save(id, path));
                            }
                        }
                        EncoderCommand::Shutdown => break,
                    }
                }

                joined = join_in_flight(&mut in_flight) => {
                    let save = in_flight.take().expect("join arm only runs with a save in flight");
                    self.finish_save(save.id, joined);
                }

                _ = status_timer.tick() => {
                    self.emit_status();
                }
            }
        }

        self.release(in_flight).await;
    }

    fn ingest(&mut self, frame: Frame) {
        match self.codec.encode(&frame) {
            Ok(units) => {
                for unit in units {
                    self.buffer.push(unit);
                }
            }
            Err(e) => {
                // One bad frame leaves a gap; the buffered run stays
                // decodable.
                warn!(
                    timestamp_ns = frame.timestamp_ns,
                    "frame failed to compress, dropping: {e:#}"
                );
            }
        }
    }

    fn emit_status(&self) {
        let span_us = self.buffer.span_us();
        let _ = self.event_tx.send(EncoderEvent::BufferStatus { span_us });
    }

    fn begin_save(&mut self, id: Uuid, path: PathBuf) -> InFlightSave {
        let units = self.buffer.snapshot();
        info!(
            %id,
            path = %path.display(),
            units = units.len(),
            span_us = self.buffer.span_us(),
            bytes = self.buffer.total_bytes(),
            "draining buffered window"
        );

        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = cancel.clone();
        let muxers = self.muxers.clone();
        let config = self.config.clone();
        let handle = tokio::task::spawn_blocking(move || {
            write_clip(muxers.as_ref(), &path, &config, &units, &worker_cancel)
        });

        InFlightSave { id, handle, cancel }
    }

    fn finish_save(&mut self, id: Uuid, joined: Result<SaveStatus, JoinError>) {
        let status = match joined {
            Ok(status) => status,
            Err(e) => {
                error!(%id, "save worker failed: {e}");
                SaveStatus::Encoder(format!("save worker failed: {e}"))
            }
        };

        match &status {
            SaveStatus::Ok => info!(%id, "clip saved"),
            other => warn!(%id, status = ?other, "clip save did not complete cleanly"),
        }
        let _ = self.event_tx.send(EncoderEvent::SaveComplete { status });
    }

    /// Shutdown path: stop ingest, discard the codec tail, resolve any
    /// in-flight save before the buffer is dropped.
    async fn release(mut self, in_flight: Option<InFlightSave>) {
        self.frame_rx.close();

        match self.codec.finish() {
            Ok(tail) => {
                if !tail.is_empty() {
                    debug!(units = tail.len(), "discarding codec tail at shutdown");
                }
            }
            Err(e) => warn!("codec finish failed at shutdown: {e:#}"),
        }

        if let Some(save) = in_flight {
            save.cancel.store(true, Ordering::Release);
            let joined = save.handle.await;
            self.finish_save(save.id, joined);
        }

        debug!("encoder context stopped");
    }
}

async fn join_in_flight(save: &mut Option<InFlightSave>) -> Result<SaveStatus, JoinError> {
    match save.as_mut() {
        Some(save) => (&mut save.handle).await,
        None => std::future::pending().await,
    }
}

/// Blocking drain of a buffer snapshot through the container muxer.
fn write_clip(
    muxers: &dyn MuxerFactory,
    path: &Path,
    config: &Config,
    units: &[EncodedUnit],
    cancel: &AtomicBool,
) -> SaveStatus {
    if units.first().map_or(true, |unit| !unit.is_sync) {
        return SaveStatus::Encoder("no decodable window buffered".to_string());
    }

    let mut muxer = match muxers.open(path, config) {
        Ok(muxer) => muxer,
        Err(e) => return SaveStatus::Io(format!("{e:#}")),
    };

    for unit in units {
        if cancel.load(Ordering::Acquire) {
            return SaveStatus::Cancelled;
        }
        if let Err(e) = muxer.write_unit(unit) {
            return SaveStatus::Io(format!("{e:#}"));
        }
    }

    match muxer.finish() {
        Ok(()) => SaveStatus::Ok,
        Err(e) => SaveStatus::Io(format!("{e:#}")),
    }
}
