//! Dual-target rendering.
//!
//! Each latched frame is drawn twice: into the display destination sized
//! to its viewport, and - only while recording - into the encoder input
//! destination at the capture resolution, presented with the frame's
//! original capture timestamp so compression preserves real time rather
//! than render-call time.

use crate::frame::Frame;
use anyhow::Result;

/// A presentable GPU destination (display surface or encoder input).
///
/// External collaborator. The two destinations of a session are
/// independently selectable: each is made current, drawn, and presented
/// on its own.
pub trait RenderTarget: Send {
    /// Bind this destination for drawing.
    fn make_current(&mut self) -> Result<()>;

    /// Draw `frame` scaled to `width` x `height`, applying the frame's
    /// texture transform.
    fn draw(&mut self, frame: &Frame, width: u32, height: u32) -> Result<()>;

    /// Set the presentation timestamp (nanoseconds) carried by the next
    /// `present`.
    fn set_presentation_time(&mut self, timestamp_ns: i64) -> Result<()>;

    /// Commit the drawn frame to the destination.
    fn present(&mut self) -> Result<()>;

    /// Destination dimensions in pixels.
    fn dimensions(&self) -> (u32, u32);
}

/// Draws latched frames into the display destination and, when an encoder
/// destination is supplied, into that as well.
pub struct DualRenderer {
    display: Box<dyn RenderTarget>,
    frames_rendered: u64,
}

impl DualRenderer {
    pub fn new(display: Box<dyn RenderTarget>) -> Self {
        Self {
            display,
            frames_rendered: 0,
        }
    }

    /// Render one frame.
    ///
    /// The display pass always runs; the encoder pass runs only when
    /// `encoder_input` is provided (session is recording) and carries the
    /// frame's capture timestamp into the presentation.
    pub fn render(
        &mut self,
        frame: &Frame,
        encoder_input: Option<&mut dyn RenderTarget>,
    ) -> Result<()> {
        self.display.make_current()?;
        let (width, height) = self.display.dimensions();
        self.display.draw(frame, width, height)?;
        self.display.present()?;

        if let Some(target) = encoder_input {
            target.make_current()?;
            let (width, height) = target.dimensions();
            target.draw(frame, width, height)?;
            target.set_presentation_time(frame.timestamp_ns)?;
            target.present()?;
        }

        self.frames_rendered += 1;
        Ok(())
    }

    /// Number of frames rendered so far. Debug/overlay use only.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }
}
