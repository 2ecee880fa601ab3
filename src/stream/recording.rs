//! Recording attachment
//!
//! A recording sink sees every media packet a stream dispatches. The
//! stream registers it through a [`RecorderListener`] and keeps only a
//! [`RecordingHandle`]: weak references plus the sink's own
//! `is_recording()` answer. The listener set is the sole owner.

use std::sync::{Arc, Weak};

use bytes::Bytes;

use crate::error::Result;
use crate::messaging::{MediaPacket, StreamListener};
use crate::registry::StreamKey;

/// Consumer writing a stream to storage
pub trait RecordingSink: Send + Sync {
    /// Prepare to record `name`; `false` if that is not possible
    fn init(&self, scope: &str, name: &str, append: bool) -> bool;

    /// Video decoder configuration to write before any frame
    fn set_video_config(&self, config: Bytes);

    /// Audio decoder configuration to write before any frame
    fn set_audio_config(&self, config: Bytes);

    fn start(&self);

    fn stop(&self);

    fn is_recording(&self) -> bool;

    fn file_name(&self) -> String;

    /// A packet dispatched by the recorded stream
    fn packet_received(&self, stream: &StreamKey, packet: &MediaPacket) -> Result<()>;
}

/// Creates a fresh recording sink per `save_as` call
pub trait RecordingFactory: Send + Sync {
    fn create(&self) -> Arc<dyn RecordingSink>;
}

impl<F> RecordingFactory for F
where
    F: Fn() -> Arc<dyn RecordingSink> + Send + Sync,
{
    fn create(&self) -> Arc<dyn RecordingSink> {
        self()
    }
}

/// Adapts a recording sink to the listener set
pub struct RecorderListener {
    sink: Arc<dyn RecordingSink>,
}

impl RecorderListener {
    pub fn new(sink: Arc<dyn RecordingSink>) -> Self {
        Self { sink }
    }
}

impl StreamListener for RecorderListener {
    fn packet_received(&self, stream: &StreamKey, packet: &MediaPacket) -> Result<()> {
        self.sink.packet_received(stream, packet)
    }
}

/// Non-owning reference to the active recording
#[derive(Clone)]
pub struct RecordingHandle {
    sink: Weak<dyn RecordingSink>,
    listener: Weak<dyn StreamListener>,
}

impl RecordingHandle {
    pub fn new(sink: &Arc<dyn RecordingSink>, listener: &Arc<dyn StreamListener>) -> Self {
        Self {
            sink: Arc::downgrade(sink),
            listener: Arc::downgrade(listener),
        }
    }

    /// The sink, if anything still owns it
    pub fn sink(&self) -> Option<Arc<dyn RecordingSink>> {
        self.sink.upgrade()
    }

    pub fn listener(&self) -> Option<Arc<dyn StreamListener>> {
        self.listener.upgrade()
    }

    /// Sink is alive and says it is recording
    pub fn is_recording(&self) -> bool {
        self.sink().map(|s| s.is_recording()).unwrap_or(false)
    }
}
