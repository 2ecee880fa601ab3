//! Messaging primitives
//!
//! This module provides:
//! - The message types carried between sources, streams and sinks
//! - The pipe endpoint traits (source, sink, consumer, listener)
//! - A copy-on-write listener set
//! - The dispatch pump used for every message a stream sends

pub mod listeners;
pub mod message;
pub mod pipe;
pub mod pump;

pub use listeners::ListenerSet;
pub use message::{ControlMessage, MediaPacket, Message, PacketKind};
pub use pipe::{MessageConsumer, MessageSink, MessageSource, StreamListener};
