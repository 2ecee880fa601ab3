//! Error types
//!
//! Only [`StreamError`] is ever returned from a state-changing call on a
//! server stream. Everything else is produced by collaborators (sources,
//! sinks, listeners) and is logged and absorbed by the stream.

use std::fmt;

use crate::stream::state::PlaybackState;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Precondition violated on a stream operation
    Stream(StreamError),
    /// Failure moving a message through a pipe
    Pipe(PipeError),
}

/// Precondition failures on explicit state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The operation is not valid in the current state
    InvalidState(PlaybackState),
    /// The playlist has no items
    EmptyPlaylist,
    /// No published name has been set
    MissingPublishedName,
}

/// Failures raised by sources, sinks and listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeError {
    /// Pulling from an upstream source failed
    Pull(String),
    /// Pushing to a downstream sink failed
    Push(String),
    /// A listener rejected a packet
    Listener(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Stream(e) => write!(f, "Stream error: {}", e),
            Error::Pipe(e) => write!(f, "Pipe error: {}", e),
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::InvalidState(state) => write!(f, "State {} not valid to start", state),
            StreamError::EmptyPlaylist => {
                write!(f, "At least one item should be specified to start")
            }
            StreamError::MissingPublishedName => write!(f, "A published name is needed to start"),
        }
    }
}

impl fmt::Display for PipeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipeError::Pull(msg) => write!(f, "pull failed: {}", msg),
            PipeError::Push(msg) => write!(f, "push failed: {}", msg),
            PipeError::Listener(msg) => write!(f, "listener failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Stream(e) => Some(e),
            Error::Pipe(e) => Some(e),
        }
    }
}

impl std::error::Error for StreamError {}

impl std::error::Error for PipeError {}

impl From<StreamError> for Error {
    fn from(e: StreamError) -> Self {
        Error::Stream(e)
    }
}

impl From<PipeError> for Error {
    fn from(e: PipeError) -> Self {
        Error::Pipe(e)
    }
}
