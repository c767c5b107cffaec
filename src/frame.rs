//! Frame types and the producer-side seam.

/// Opaque handle to a GPU-resident image. The core never inspects the
/// pixels; the handle is passed through to the render destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Column-major 4x4 transform applied when sampling the frame texture
/// (mirroring, rotation, crop - whatever the producer reports).
pub type TextureTransform = [f32; 16];

/// Identity sampling transform.
pub const IDENTITY_TRANSFORM: TextureTransform = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// One frame latched from the producer.
///
/// The producer owns the underlying image until it is latched; the core
/// does not retain the frame after the render pass completes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub texture: TextureId,
    pub transform: TextureTransform,
    /// Monotonic capture timestamp in nanoseconds.
    pub timestamp_ns: i64,
}

impl Frame {
    /// Capture timestamp in microseconds (codec/container timebase).
    pub fn timestamp_us(&self) -> i64 {
        self.timestamp_ns / 1_000
    }
}

/// Source of frames (camera or other sensor).
///
/// The core only consumes the readiness signal (delivered through the
/// [`FrameBridge`](crate::bridge::FrameBridge) handed to the backend at
/// setup) plus the ability to latch the most recent frame. Latching is
/// called from the render context only.
pub trait FrameProducer: Send {
    /// Latch the newest frame, or `None` if nothing new is available.
    fn latch_latest(&mut self) -> Option<Frame>;
}
