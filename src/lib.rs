//! retrocap - continuous-capture core with a rolling replay buffer.
//!
//! Frames stream from a producer through a dual-target renderer (live
//! preview plus encoder input); compressed output accumulates in a
//! time-bounded ring buffer of encoded access units; on demand the
//! buffered window is drained to a container file while capture keeps
//! running. Platform pieces - camera, GPU surfaces, codec, container
//! library - plug in behind the [`session::CaptureBackend`] seams.

pub mod bridge;
pub mod config;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod logging;
pub mod render;
pub mod session;

pub use bridge::FrameBridge;
pub use config::Config;
pub use encoder::{ContainerMuxer, EncodedUnit, MuxerFactory, RingBuffer, RingEncoder, VideoCodec};
pub use error::{ProtocolError, SaveStatus, SessionError};
pub use frame::{Frame, FrameProducer, TextureId};
pub use render::{DualRenderer, RenderTarget};
pub use session::{CaptureBackend, CaptureSession, SessionEvent, SessionState};
