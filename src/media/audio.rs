//! Audio decoder-state buffer
//!
//! Audio has no keyframe/interframe distinction: every frame can be decoded
//! once the decoder configuration is known, so only the configuration block
//! is retained. For AAC that is the AudioSpecificConfig carried by the first
//! packet whose packet-type byte is zero.

use bytes::Bytes;

use super::tag::{AudioFormat, TagHeader};

/// Sampling frequencies by AudioSpecificConfig index
const AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Decoder-state buffer for one audio format
#[derive(Debug)]
pub struct AudioCodecBuffer {
    format: AudioFormat,
    decoder_configuration: Option<Bytes>,
}

impl AudioCodecBuffer {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            decoder_configuration: None,
        }
    }

    /// Create an AAC buffer
    pub fn aac() -> Self {
        Self::new(AudioFormat::Aac)
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn name(&self) -> &'static str {
        self.format.name()
    }

    /// Check whether `data` belongs to this format without consuming it
    pub fn can_handle(&self, data: &[u8]) -> bool {
        TagHeader::peek(data)
            .map(|h| h.high_nibble() == self.format.id())
            .unwrap_or(false)
    }

    /// Inspect a payload, keeping it if it is the first configuration block
    ///
    /// Returns `false` for payloads of another format.
    pub fn add_data(&mut self, data: &Bytes) -> bool {
        let header = match TagHeader::peek(data) {
            Some(h) => h,
            None => return true,
        };
        if header.high_nibble() != self.format.id() {
            return false;
        }
        if self.decoder_configuration.is_none() && header.is_configuration() {
            tracing::debug!(codec = self.name(), size = data.len(), "Decoder configuration");
            self.decoder_configuration = Some(data.clone());
        }
        true
    }

    /// Stored configuration block, byte-for-byte as received
    pub fn decoder_configuration(&self) -> Option<Bytes> {
        self.decoder_configuration.clone()
    }

    /// Parsed AudioSpecificConfig of the stored AAC configuration
    pub fn aac_config(&self) -> Option<AacConfig> {
        if self.format != AudioFormat::Aac {
            return None;
        }
        let data = self.decoder_configuration.as_ref()?;
        AacConfig::parse(data.get(2..)?)
    }

    pub fn reset(&mut self) {
        self.decoder_configuration = None;
    }
}

/// Fields of interest from an AAC AudioSpecificConfig
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AacConfig {
    /// Audio object type (2 = LC, 5 = HE-AAC)
    pub object_type: u8,
    /// Sampling frequency in Hz
    pub sample_rate: u32,
    /// Channel configuration (1 = mono, 2 = stereo)
    pub channels: u8,
}

impl AacConfig {
    /// Parse from the bytes following the two-byte tag header
    ///
    /// ```text
    /// objectType (5 bits) | frequencyIndex (4 bits) | channelConfig (4 bits) | ...
    /// ```
    pub fn parse(asc: &[u8]) -> Option<Self> {
        if asc.len() < 2 {
            return None;
        }
        let object_type = asc[0] >> 3;
        let index = ((asc[0] & 0x07) << 1) | (asc[1] >> 7);
        let sample_rate = *AAC_SAMPLE_RATES.get(index as usize)?;
        let channels = (asc[1] >> 3) & 0x0F;

        Some(Self {
            object_type,
            sample_rate,
            channels,
        })
    }
}
