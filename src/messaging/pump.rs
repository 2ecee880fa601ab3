//! Message pump
//!
//! Moves single messages between pipe endpoints:
//!
//! ```text
//!   source ──pull_next_media()──► stream ──dispatch()──► sink
//!                                           │
//!                                           └──► listener, listener, ...
//! ```
//!
//! Listener fan-out is synchronous and sequential. A failing listener is
//! logged and skipped; it never affects the other listeners or the caller.

use std::sync::Arc;

use crate::error::Result;
use crate::registry::StreamKey;

use super::listeners::ListenerSet;
use super::message::{MediaPacket, Message};
use super::pipe::{MessageSink, MessageSource};

/// Push `message` to `sink` (if any), then notify every listener
///
/// Returns the sink's error, if it failed. Listener failures are absorbed.
pub fn dispatch(
    message: Message,
    sink: Option<&Arc<dyn MessageSink>>,
    listeners: &ListenerSet,
    origin: &StreamKey,
) -> Result<()> {
    let packet = message.packet().cloned();

    let pushed = match sink {
        Some(sink) => sink.push(message),
        None => Ok(()),
    };

    if let Some(packet) = packet {
        for listener in listeners.snapshot().iter() {
            if let Err(e) = listener.packet_received(origin, &packet) {
                tracing::error!(
                    stream = %origin,
                    timestamp = packet.timestamp,
                    error = %e,
                    "Error while notifying listener"
                );
            }
        }
    }

    pushed
}

/// Route a reset message through [`dispatch`], logging any failure
pub fn send_reset(sink: Option<&Arc<dyn MessageSink>>, listeners: &ListenerSet, origin: &StreamKey) {
    if let Err(e) = dispatch(Message::Reset, sink, listeners, origin) {
        tracing::error!(stream = %origin, error = %e, "Error while sending reset message");
    }
}

/// Pull from `source` until a media message turns up
///
/// Non-media messages are discarded. Returns `None` once the source has
/// nothing more to give; a pull failure is logged and treated the same way.
pub fn pull_next_media(source: &dyn MessageSource) -> Option<MediaPacket> {
    loop {
        match source.pull() {
            Ok(Some(Message::Media(packet))) => return Some(packet),
            Ok(Some(other)) => {
                tracing::trace!(message = ?other, "Skipping non-media message");
            }
            Ok(None) => return None,
            Err(e) => {
                tracing::error!(error = %e, "Error while pulling message");
                return None;
            }
        }
    }
}
