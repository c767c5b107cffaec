//! Container muxer seam.
//!
//! The codec/container library is an external collaborator: it accepts a
//! sync-point-first, timestamp-ordered unit stream and produces a playable
//! file. The core only requires that write failures are reported.

use super::buffer::EncodedUnit;
use crate::config::Config;
use anyhow::Result;
use std::path::Path;

/// Writes exactly one container file from an ordered unit stream.
pub trait ContainerMuxer: Send {
    /// Append one access unit. Units arrive in presentation order,
    /// starting at a sync point.
    fn write_unit(&mut self, unit: &EncodedUnit) -> Result<()>;

    /// Finalize the container. Consumes the muxer; a file that was not
    /// finished is not guaranteed playable.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Opens muxers for save drains.
pub trait MuxerFactory: Send + Sync {
    /// Open a muxer writing to `path` for the configured stream format.
    fn open(&self, path: &Path, config: &Config) -> Result<Box<dyn ContainerMuxer>>;
}
