//! Server-side streams
//!
//! This module provides:
//! - The playback state machine
//! - [`ServerStream`], which plays a playlist with real-time pacing
//! - The collaborator traits a stream is wired to (recorder, lifecycle hooks)
//! - Stream configuration

pub mod config;
pub mod recording;
pub mod server;
pub mod services;
pub mod state;

pub use config::StreamConfig;
pub use recording::{RecorderListener, RecordingFactory, RecordingHandle, RecordingSink};
pub use server::{PacingAnchor, ServerStream};
pub use services::{StreamAwareHandler, StreamServices};
pub use state::{AtomicState, PlaybackState};
