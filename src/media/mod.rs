//! Media handling
//!
//! This module provides:
//! - Tag byte classification (frame kind, codec, packet type)
//! - Video decoder-state buffering (configuration, keyframe, interframes)
//! - Audio decoder-state buffering (configuration only)
//! - Per-stream codec detection for late-joiner support

pub mod audio;
pub mod codec;
pub mod tag;
pub mod video;

pub use audio::{AacConfig, AudioCodecBuffer};
pub use codec::{SharedCodecInfo, StreamCodecInfo};
pub use tag::{AudioFormat, PacketType, TagHeader, VideoCodec, VideoFrameKind};
pub use video::VideoCodecBuffer;
