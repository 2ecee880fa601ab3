//! Playback state machine
//!
//! ```text
//!   UNINIT ──start()──► STOPPED ──play()──► PLAYING ◄──pause()──► PAUSED
//!                          ▲                   │                    │
//!                          └──────stop()───────┴────────────────────┘
//!   any state except CLOSED ──close()──► CLOSED (terminal)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Playback state of a server stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PlaybackState {
    Uninit = 0,
    Stopped = 1,
    Playing = 2,
    Paused = 3,
    Closed = 4,
}

impl PlaybackState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PlaybackState::Uninit,
            1 => PlaybackState::Stopped,
            2 => PlaybackState::Playing,
            3 => PlaybackState::Paused,
            _ => PlaybackState::Closed,
        }
    }

    /// PLAYING or PAUSED
    pub fn is_active(self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackState::Uninit => "UNINIT",
            PlaybackState::Stopped => "STOPPED",
            PlaybackState::Playing => "PLAYING",
            PlaybackState::Paused => "PAUSED",
            PlaybackState::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomically held [`PlaybackState`] with guarded transitions
#[derive(Debug)]
pub struct AtomicState(AtomicU8);

impl AtomicState {
    pub fn new(state: PlaybackState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> PlaybackState {
        PlaybackState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `to` if the current state is one of `from`
    ///
    /// Returns the state that was replaced, or `Err` with the current state
    /// when the transition is not allowed. CLOSED never transitions.
    pub fn transition(
        &self,
        from: &[PlaybackState],
        to: PlaybackState,
    ) -> Result<PlaybackState, PlaybackState> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let current = PlaybackState::from_u8(current);
                if current != PlaybackState::Closed && from.contains(&current) {
                    Some(to as u8)
                } else {
                    None
                }
            })
            .map(PlaybackState::from_u8)
            .map_err(PlaybackState::from_u8)
    }

    /// Move to CLOSED from any other state
    pub fn close(&self) -> bool {
        self.0.swap(PlaybackState::Closed as u8, Ordering::AcqRel) != PlaybackState::Closed as u8
    }
}

impl Default for AtomicState {
    fn default() -> Self {
        Self::new(PlaybackState::Uninit)
    }
}
