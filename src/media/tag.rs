//! Tag byte conventions for RTMP media payloads
//!
//! Every audio/video payload starts with a tag byte, followed for most
//! modern codecs by a packet-type byte:
//!
//! ```text
//! video: +-----------+----------+-------------+
//!        | FrameKind | CodecID  | PacketType  | data...
//!        | (4 bits)  | (4 bits) | (1 byte)    |
//!        +-----------+----------+-------------+
//!
//! audio: +-----------+----------+-------------+
//!        | Format    | rate/size| PacketType  | data...
//!        | (4 bits)  | /type    | (1 byte)    |
//!        +-----------+----------+-------------+
//! ```
//!
//! A packet type of 0 carries the decoder configuration record, 1 carries
//! frame data.

/// Keyframe marker in the high nibble of a video tag byte
pub const FRAME_KIND_KEY: u8 = 0x10;

/// Video frame kind (high nibble of the tag byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameKind {
    Keyframe = 1,
    InterFrame = 2,
    DisposableInterFrame = 3,
    GeneratedKeyframe = 4,
    InfoFrame = 5,
}

impl VideoFrameKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b >> 4 {
            1 => Some(VideoFrameKind::Keyframe),
            2 => Some(VideoFrameKind::InterFrame),
            3 => Some(VideoFrameKind::DisposableInterFrame),
            4 => Some(VideoFrameKind::GeneratedKeyframe),
            5 => Some(VideoFrameKind::InfoFrame),
            _ => None,
        }
    }
}

/// Video codec identifier (low nibble of the tag byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    SorensonH263 = 2,
    ScreenVideo = 3,
    Vp6 = 4,
    Vp6Alpha = 5,
    ScreenVideoV2 = 6,
    Avc = 7,
    Hevc = 12,
    Av1 = 13,
}

impl VideoCodec {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            2 => Some(VideoCodec::SorensonH263),
            3 => Some(VideoCodec::ScreenVideo),
            4 => Some(VideoCodec::Vp6),
            5 => Some(VideoCodec::Vp6Alpha),
            6 => Some(VideoCodec::ScreenVideoV2),
            7 => Some(VideoCodec::Avc),
            12 => Some(VideoCodec::Hevc),
            13 => Some(VideoCodec::Av1),
            _ => None,
        }
    }

    /// The 4-bit identifier carried in the tag byte
    pub fn id(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            VideoCodec::SorensonH263 => "H263",
            VideoCodec::ScreenVideo => "ScreenVideo",
            VideoCodec::Vp6 => "VP6",
            VideoCodec::Vp6Alpha => "VP6A",
            VideoCodec::ScreenVideoV2 => "ScreenVideo2",
            VideoCodec::Avc => "AVC",
            VideoCodec::Hevc => "HEVC",
            VideoCodec::Av1 => "AV1",
        }
    }
}

/// Audio format (high nibble of the tag byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    LinearPcmPlatform = 0,
    Adpcm = 1,
    Mp3 = 2,
    LinearPcmLe = 3,
    Nellymoser16kMono = 4,
    Nellymoser8kMono = 5,
    Nellymoser = 6,
    G711ALaw = 7,
    G711MuLaw = 8,
    Aac = 10,
    Speex = 11,
    Mp38k = 14,
    DeviceSpecific = 15,
}

impl AudioFormat {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b >> 4 {
            0 => Some(AudioFormat::LinearPcmPlatform),
            1 => Some(AudioFormat::Adpcm),
            2 => Some(AudioFormat::Mp3),
            3 => Some(AudioFormat::LinearPcmLe),
            4 => Some(AudioFormat::Nellymoser16kMono),
            5 => Some(AudioFormat::Nellymoser8kMono),
            6 => Some(AudioFormat::Nellymoser),
            7 => Some(AudioFormat::G711ALaw),
            8 => Some(AudioFormat::G711MuLaw),
            10 => Some(AudioFormat::Aac),
            11 => Some(AudioFormat::Speex),
            14 => Some(AudioFormat::Mp38k),
            15 => Some(AudioFormat::DeviceSpecific),
            _ => None,
        }
    }

    /// The 4-bit identifier carried in the tag byte
    pub fn id(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            AudioFormat::Aac => "AAC",
            AudioFormat::Mp3 | AudioFormat::Mp38k => "MP3",
            AudioFormat::Speex => "Speex",
            AudioFormat::Nellymoser
            | AudioFormat::Nellymoser16kMono
            | AudioFormat::Nellymoser8kMono => "Nellymoser",
            AudioFormat::G711ALaw => "PCMA",
            AudioFormat::G711MuLaw => "PCMU",
            AudioFormat::Adpcm => "ADPCM",
            AudioFormat::LinearPcmPlatform | AudioFormat::LinearPcmLe => "PCM",
            AudioFormat::DeviceSpecific => "DeviceSpecific",
        }
    }
}

/// Packet type carried in the second byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Decoder configuration record
    Configuration = 0,
    /// Frame data
    Payload = 1,
}

impl PacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(PacketType::Configuration),
            1 => Some(PacketType::Payload),
            _ => None,
        }
    }
}

/// The two leading bytes of a media payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    /// First byte, unmodified
    pub tag: u8,
    /// Second byte (packet type), if present
    pub packet_type: Option<u8>,
}

impl TagHeader {
    /// Peek the header from the start of `data`
    ///
    /// Returns `None` for an empty payload.
    pub fn peek(data: &[u8]) -> Option<Self> {
        let tag = *data.first()?;
        Some(Self {
            tag,
            packet_type: data.get(1).copied(),
        })
    }

    /// Low nibble (video codec identifier)
    pub fn low_nibble(&self) -> u8 {
        self.tag & 0x0F
    }

    /// High nibble (video frame kind, audio format)
    pub fn high_nibble(&self) -> u8 {
        self.tag >> 4
    }

    /// Whether the high nibble carries the keyframe marker
    pub fn is_keyframe(&self) -> bool {
        self.tag & 0xF0 == FRAME_KIND_KEY
    }

    pub fn is_configuration(&self) -> bool {
        self.packet_type == Some(PacketType::Configuration as u8)
    }
}
