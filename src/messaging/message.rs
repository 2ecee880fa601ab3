//! Message types moved through pipes
//!
//! A [`Message`] is what sources yield and sinks receive. Only
//! [`Message::Media`] carries a payload that listeners care about; the other
//! variants are in-band signals. [`ControlMessage`] travels out-of-band, from
//! a consumer back to the source it is subscribed to.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;

/// Control target understood by passive (pull-mode) providers
pub const PASSIVE_TARGET: &str = "passive";

/// Control target understood by seekable providers
pub const SEEKABLE_TARGET: &str = "seekableProvider";

/// Kind of media payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Audio,
    Video,
    /// Script data (onMetaData and friends)
    Data,
}

/// A timestamped media payload
///
/// Cheap to clone: the payload is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub kind: PacketKind,
    /// Timestamp in milliseconds
    pub timestamp: u32,
    /// Payload including the tag header bytes
    pub data: Bytes,
}

impl MediaPacket {
    pub fn video(timestamp: u32, data: Bytes) -> Self {
        Self {
            kind: PacketKind::Video,
            timestamp,
            data,
        }
    }

    pub fn audio(timestamp: u32, data: Bytes) -> Self {
        Self {
            kind: PacketKind::Audio,
            timestamp,
            data,
        }
    }

    pub fn data(timestamp: u32, data: Bytes) -> Self {
        Self {
            kind: PacketKind::Data,
            timestamp,
            data,
        }
    }

    /// Audio or video, as opposed to script data
    pub fn is_av(&self) -> bool {
        matches!(self.kind, PacketKind::Audio | PacketKind::Video)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// A message flowing through a pipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Media-bearing message
    Media(MediaPacket),
    /// Tells downstream to discard any timing state
    Reset,
    /// Status notification (e.g. "NetStream.Play.Complete")
    Status(String),
}

impl Message {
    /// The media payload, if this message carries one
    pub fn packet(&self) -> Option<&MediaPacket> {
        match self {
            Message::Media(packet) => Some(packet),
            _ => None,
        }
    }

    pub fn into_packet(self) -> Option<MediaPacket> {
        match self {
            Message::Media(packet) => Some(packet),
            _ => None,
        }
    }
}

impl From<MediaPacket> for Message {
    fn from(packet: MediaPacket) -> Self {
        Message::Media(packet)
    }
}

/// Out-of-band control message naming a service call on a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    /// Provider role the message is addressed to
    pub target: String,
    /// Service name (e.g. "init", "seek")
    pub service_name: String,
    /// Service parameters
    pub params: HashMap<String, i64>,
}

impl ControlMessage {
    pub fn new(target: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            service_name: service_name.into(),
            params: HashMap::new(),
        }
    }

    /// Add a parameter
    pub fn param(mut self, name: impl Into<String>, value: i64) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.params.get(name).copied()
    }

    /// Ask a passive provider to start serving from `start_ts`
    pub fn init(start_ts: i64) -> Self {
        Self::new(PASSIVE_TARGET, "init").param("startTS", start_ts)
    }

    /// Ask a seekable provider to reposition to `position`
    pub fn seek(position: i64) -> Self {
        Self::new(SEEKABLE_TARGET, "seek").param("position", position)
    }

    /// Target timestamp of an init or seek request
    pub fn target_timestamp(&self) -> Option<i64> {
        match self.service_name.as_str() {
            "init" => self.get("startTS"),
            "seek" => self.get("position"),
            _ => None,
        }
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{:?}", self.target, self.service_name, self.params)
    }
}
