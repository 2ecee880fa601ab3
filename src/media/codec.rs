//! Per-stream codec state
//!
//! Holds at most one video and one audio decoder-state buffer. The publish
//! path feeds every packet through [`StreamCodecInfo::on_packet`]; the
//! codec is picked from the first packet's tag byte.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::messaging::{MediaPacket, PacketKind};

use super::audio::AudioCodecBuffer;
use super::tag::{AudioFormat, TagHeader, VideoCodec};
use super::video::VideoCodecBuffer;

/// Codec state shared between the publish path and the stream
pub type SharedCodecInfo = Arc<Mutex<StreamCodecInfo>>;

/// Video/audio decoder state of one stream
#[derive(Debug, Default)]
pub struct StreamCodecInfo {
    video: Option<VideoCodecBuffer>,
    audio: Option<AudioCodecBuffer>,
    buffer_interframes: bool,
}

impl StreamCodecInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retain interframes in video buffers created from now on
    pub fn buffer_interframes(mut self, enabled: bool) -> Self {
        self.buffer_interframes = enabled;
        self
    }

    pub fn shared(self) -> SharedCodecInfo {
        Arc::new(Mutex::new(self))
    }

    pub fn video(&self) -> Option<&VideoCodecBuffer> {
        self.video.as_ref()
    }

    pub fn audio(&self) -> Option<&AudioCodecBuffer> {
        self.audio.as_ref()
    }

    pub fn set_video(&mut self, codec: VideoCodecBuffer) {
        self.video = Some(codec);
    }

    pub fn set_audio(&mut self, codec: AudioCodecBuffer) {
        self.audio = Some(codec);
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Video decoder configuration, if known
    pub fn video_configuration(&self) -> Option<bytes::Bytes> {
        self.video.as_ref().and_then(|v| v.decoder_configuration())
    }

    /// Audio decoder configuration, if known
    pub fn audio_configuration(&self) -> Option<bytes::Bytes> {
        self.audio.as_ref().and_then(|a| a.decoder_configuration())
    }

    /// Feed a published packet into the matching buffer
    ///
    /// Returns `false` when no buffer handles the packet: script data,
    /// codecs without a configuration record, or a codec change mid-stream.
    pub fn on_packet(&mut self, packet: &MediaPacket) -> bool {
        match packet.kind {
            PacketKind::Video => {
                if self.video.is_none() {
                    self.video = self.detect_video(&packet.data);
                }
                match self.video.as_mut() {
                    Some(video) => video.add_data(&packet.data, packet.timestamp),
                    None => false,
                }
            }
            PacketKind::Audio => {
                if self.audio.is_none() {
                    self.audio = detect_audio(&packet.data);
                }
                match self.audio.as_mut() {
                    Some(audio) => audio.add_data(&packet.data),
                    None => false,
                }
            }
            PacketKind::Data => false,
        }
    }

    /// Drop all codec state
    pub fn reset(&mut self) {
        self.video = None;
        self.audio = None;
    }

    fn detect_video(&self, data: &[u8]) -> Option<VideoCodecBuffer> {
        let header = TagHeader::peek(data)?;
        match VideoCodec::from_byte(header.tag)? {
            codec @ (VideoCodec::Avc | VideoCodec::Hevc) => {
                tracing::debug!(codec = codec.name(), "Video codec detected");
                Some(VideoCodecBuffer::new(codec).buffer_interframes(self.buffer_interframes))
            }
            _ => None,
        }
    }
}

fn detect_audio(data: &[u8]) -> Option<AudioCodecBuffer> {
    let header = TagHeader::peek(data)?;
    match AudioFormat::from_byte(header.tag)? {
        AudioFormat::Aac => {
            tracing::debug!(codec = "AAC", "Audio codec detected");
            Some(AudioCodecBuffer::aac())
        }
        _ => None,
    }
}
