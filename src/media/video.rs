//! Video decoder-state buffer
//!
//! Keeps the minimum a late-joining consumer needs to start decoding a
//! video stream mid-flight:
//! 1. The decoder configuration record (SPS/PPS for AVC, VPS/SPS/PPS for HEVC)
//! 2. Every fragment of the most recent keyframe
//! 3. Optionally, the interframes that followed it
//!
//! A new configuration record or a keyframe with a new timestamp starts a
//! new GOP and drops everything buffered before it.

use bytes::Bytes;

use super::tag::{PacketType, TagHeader, VideoCodec};

/// Decoder-state buffer for one video codec
#[derive(Debug)]
pub struct VideoCodecBuffer {
    /// Codec this buffer accepts
    codec: VideoCodec,
    /// Last configuration record, whole payload
    decoder_configuration: Option<Bytes>,
    /// Fragments of the current keyframe
    keyframes: Vec<Bytes>,
    /// Timestamp of the current GOP
    keyframe_timestamp: Option<u32>,
    /// Interframes of the current GOP
    interframes: Vec<Bytes>,
    /// Slot for the next interframe
    num_interframes: usize,
    /// Whether interframes are retained at all
    buffer_interframes: bool,
}

impl VideoCodecBuffer {
    /// Create a buffer for `codec` that does not retain interframes
    pub fn new(codec: VideoCodec) -> Self {
        Self {
            codec,
            decoder_configuration: None,
            keyframes: Vec::new(),
            keyframe_timestamp: None,
            interframes: Vec::new(),
            num_interframes: 0,
            buffer_interframes: false,
        }
    }

    /// Create an AVC (H.264) buffer
    pub fn avc() -> Self {
        Self::new(VideoCodec::Avc)
    }

    /// Create an HEVC (H.265) buffer
    pub fn hevc() -> Self {
        Self::new(VideoCodec::Hevc)
    }

    /// Enable or disable interframe retention
    pub fn buffer_interframes(mut self, enabled: bool) -> Self {
        self.buffer_interframes = enabled;
        self
    }

    pub fn codec(&self) -> VideoCodec {
        self.codec
    }

    pub fn name(&self) -> &'static str {
        self.codec.name()
    }

    /// Frames held here may be skipped by a congested consumer
    pub fn can_drop_frames(&self) -> bool {
        true
    }

    /// Check whether `data` belongs to this codec without consuming it
    pub fn can_handle(&self, data: &[u8]) -> bool {
        TagHeader::peek(data)
            .map(|h| h.low_nibble() == self.codec.id())
            .unwrap_or(false)
    }

    /// Classify and retain a payload
    ///
    /// Returns `false` if the payload belongs to another codec, in which case
    /// nothing is modified. Empty payloads are accepted and ignored.
    pub fn add_data(&mut self, data: &Bytes, timestamp: u32) -> bool {
        let header = match TagHeader::peek(data) {
            Some(h) => h,
            None => return true,
        };

        if header.low_nibble() != self.codec.id() {
            tracing::debug!(codec = self.name(), tag = header.tag, "Non-codec data, rejecting");
            return false;
        }

        if header.is_keyframe() {
            match header.packet_type.and_then(PacketType::from_byte) {
                Some(PacketType::Payload) => {
                    if self.keyframe_timestamp != Some(timestamp) {
                        // new GOP
                        self.keyframe_timestamp = Some(timestamp);
                        self.clear_frames();
                    }
                    self.keyframes.push(data.clone());
                }
                Some(PacketType::Configuration) => {
                    tracing::debug!(codec = self.name(), size = data.len(), "Decoder configuration");
                    self.decoder_configuration = Some(data.clone());
                    self.clear_frames();
                }
                None => {}
            }
        } else if self.buffer_interframes {
            let slot = self.num_interframes;
            self.num_interframes += 1;
            if slot < self.interframes.len() {
                self.interframes[slot] = data.clone();
            } else {
                self.interframes.push(data.clone());
            }
        }

        true
    }

    /// Add a payload without a known timestamp
    ///
    /// Any keyframe added this way starts a new GOP.
    pub fn add_untimed(&mut self, data: &Bytes) -> bool {
        let timestamp = self
            .keyframe_timestamp
            .map(|ts| ts.wrapping_add(1))
            .unwrap_or(0);
        self.add_data(data, timestamp)
    }

    /// Last configuration record, byte-for-byte as received
    pub fn decoder_configuration(&self) -> Option<Bytes> {
        self.decoder_configuration.clone()
    }

    /// Fragments of the current keyframe, in arrival order
    pub fn keyframes(&self) -> &[Bytes] {
        &self.keyframes
    }

    /// Most recent keyframe fragment
    pub fn keyframe(&self) -> Option<&Bytes> {
        self.keyframes.last()
    }

    pub fn keyframe_timestamp(&self) -> Option<u32> {
        self.keyframe_timestamp
    }

    pub fn interframe(&self, index: usize) -> Option<&Bytes> {
        if index < self.num_interframes {
            self.interframes.get(index)
        } else {
            None
        }
    }

    /// Number of interframes in the current GOP
    pub fn num_interframes(&self) -> usize {
        self.num_interframes
    }

    /// Drop the configuration and all buffered frames
    pub fn reset(&mut self) {
        self.decoder_configuration = None;
        self.clear_frames();
    }

    // everything except the configuration
    fn clear_frames(&mut self) {
        self.keyframes.clear();
        self.interframes.clear();
        self.num_interframes = 0;
    }
}
