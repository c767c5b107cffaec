//! Error taxonomy for the capture core.
//!
//! Three surfaces matter to callers: fatal setup errors reported
//! synchronously from session operations, protocol errors for misuse
//! (distinguishable from environment failures so tests can tell them
//! apart), and save outcomes delivered exactly once through the event
//! stream.

use thiserror::Error;

/// Errors surfaced synchronously by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The producer or a render destination could not be acquired.
    /// The session stays in its previous state.
    #[error("capture setup failed")]
    Setup(#[source] anyhow::Error),

    /// The codec or encoder destination rejected the configured
    /// format/resolution. Recording does not start.
    #[error("encoder initialization failed")]
    EncoderInit(#[source] anyhow::Error),

    /// The operation is not legal right now (caller error, not an
    /// environment failure).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The session task has already shut down.
    #[error("session is shut down")]
    Closed,
}

/// Caller/programmer errors, signaled distinctly from I/O failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A save was requested while another save is still in flight.
    #[error("a save is already in flight")]
    SaveInFlight,

    /// The operation requires an active recording.
    #[error("{op} requires an active recording")]
    NotRecording { op: &'static str },

    /// The operation is not valid in the current session state.
    #[error("{op} is not valid while {state}")]
    InvalidState {
        op: &'static str,
        state: &'static str,
    },
}

/// Outcome of an accepted save request, delivered exactly once via
/// `SessionEvent::SaveComplete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    /// The clip was written and finalized.
    Ok,
    /// The container file could not be opened, written, or finalized.
    Io(String),
    /// The encoder had nothing decodable to drain, or failed internally.
    Encoder(String),
    /// Shutdown interrupted the drain before it finished.
    Cancelled,
}

impl SaveStatus {
    /// Whether the save produced a usable file.
    pub fn is_ok(&self) -> bool {
        matches!(self, SaveStatus::Ok)
    }
}
