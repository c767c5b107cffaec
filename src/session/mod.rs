//! Capture session control - state machine and caller-facing surface.

mod controller;

pub use controller::CaptureSession;

use crate::bridge::FrameBridge;
use crate::config::Config;
use crate::encoder::{MuxerFactory, VideoCodec};
use crate::error::{SaveStatus, SessionError};
use crate::frame::FrameProducer;
use crate::render::RenderTarget;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Session lifecycle states. Saving is tracked as a flag alongside
/// `Recording`: recording continues while a save drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Previewing,
    Recording,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Previewing => "previewing",
            SessionState::Recording => "recording",
        }
    }
}

/// Commands sent from the caller handle to the session task. Each carries
/// a reply channel so setup and protocol errors surface synchronously to
/// the caller.
#[derive(Debug)]
pub enum SessionCommand {
    StartPreview {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    StartRecording {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    StopRecording {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    RequestSave {
        path: PathBuf,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Asynchronous notifications delivered to the caller.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Snapshot of the buffered duration while recording.
    BufferStatus { duration_us: i64 },
    /// Exactly-once outcome of an accepted save request.
    SaveComplete { status: SaveStatus },
}

/// Supplies the platform pieces a session needs: the frame producer, the
/// two render destinations, the codec, and the container muxer.
///
/// Acquisition happens on the state transitions of the session table:
/// producer and display target at start-preview, codec and encoder target
/// at start-record. Failures are opaque to the core and reported as setup
/// errors.
pub trait CaptureBackend: Send {
    /// Acquire the frame producer. The producer signals readiness through
    /// `bridge` from whatever thread its hardware callbacks arrive on.
    fn open_producer(&mut self, bridge: Arc<FrameBridge>) -> Result<Box<dyn FrameProducer>>;

    /// Acquire the display destination, sized to the viewport.
    fn open_display_target(&mut self) -> Result<Box<dyn RenderTarget>>;

    /// Acquire the encoder input destination at the capture resolution.
    fn open_encoder_target(&mut self, config: &Config) -> Result<Box<dyn RenderTarget>>;

    /// Open the codec for the configured format. Unsupported
    /// format/resolution must fail here, synchronously.
    fn open_codec(&mut self, config: &Config) -> Result<Box<dyn VideoCodec>>;

    /// Container muxer factory used by save drains.
    fn muxer_factory(&self) -> Arc<dyn MuxerFactory>;
}
