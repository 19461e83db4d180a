//! DTS downmix data types.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::channels::ChannelPosition;
use crate::sample::SampleFormat;

/// Decoder channel flags.
///
/// The low six bits carry the channel arrangement code, bit 7 marks the LFE
/// channel and bit 8 asks the primitive to adjust output levels. The values
/// match the flags word used by libdca.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelFlags(u32);

impl ChannelFlags {
    /// 1/0: center only.
    pub const MONO: Self = Self(0);
    /// 2/0: left, right.
    pub const STEREO: Self = Self(2);
    /// 2/0 with sum/difference coding.
    pub const STEREO_SUMDIFF: Self = Self(3);
    /// 2/0 with total coding.
    pub const STEREO_TOTAL: Self = Self(4);
    /// 3/0: center, left, right.
    pub const FRONT3: Self = Self(5);
    /// 2/1: left, right, surround.
    pub const FRONT2_REAR1: Self = Self(6);
    /// 3/1: center, left, right, surround.
    pub const FRONT3_REAR1: Self = Self(7);
    /// 2/2: left, right, surround left, surround right.
    pub const FRONT2_REAR2: Self = Self(8);
    /// 3/2: center, left, right, surround left, surround right.
    pub const FRONT3_REAR2: Self = Self(9);
    /// 4/2: center left, center right, left, right, surround left, surround right.
    pub const FRONT4_REAR2: Self = Self(10);
    /// Low frequency effects channel present.
    pub const LFE: Self = Self(0x80);
    /// Ask the primitive to scale output to the requested level.
    pub const ADJUST_LEVEL: Self = Self(0x100);

    /// Bits holding the arrangement code.
    pub const ARRANGEMENT_MASK: u32 = 0x3F;

    /// Create flags from a raw flags word.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw flags word.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Channel arrangement code (low six bits).
    pub const fn arrangement_code(self) -> u32 {
        self.0 & Self::ARRANGEMENT_MASK
    }

    /// Check for the LFE flag.
    pub const fn has_lfe(self) -> bool {
        self.0 & Self::LFE.0 != 0
    }

    /// Same arrangement with the LFE flag set.
    pub const fn with_lfe(self) -> Self {
        Self(self.0 | Self::LFE.0)
    }

    /// Arrangement code and LFE flag only, dropping control bits.
    pub const fn layout(self) -> Self {
        Self(self.0 & (Self::ARRANGEMENT_MASK | Self::LFE.0))
    }
}

impl BitOr for ChannelFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChannelFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ChannelFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Stream bit rate as reported by a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BitRate {
    /// No header seen yet.
    #[default]
    Unknown,
    /// Open bit rate.
    Open,
    /// Variable bit rate.
    Variable,
    /// Lossless stream.
    Lossless,
    /// Fixed rate in bits per second.
    Bps(u32),
}

impl BitRate {
    /// Decode the libdca convention: 1 open, 2 variable, 3 lossless, larger
    /// values are bits per second.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            i32::MIN..=0 => BitRate::Unknown,
            1 => BitRate::Open,
            2 => BitRate::Variable,
            3 => BitRate::Lossless,
            bps => BitRate::Bps(bps as u32),
        }
    }

    /// Value to publish as a bitrate tag, if this is a real rate.
    pub fn tag_value(self) -> Option<u32> {
        match self {
            BitRate::Bps(bps) => Some(bps),
            _ => None,
        }
    }
}

impl fmt::Display for BitRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitRate::Unknown => write!(f, "unknown"),
            BitRate::Open => write!(f, "open"),
            BitRate::Variable => write!(f, "variable"),
            BitRate::Lossless => write!(f, "lossless"),
            BitRate::Bps(bps) => write!(f, "{} bps", bps),
        }
    }
}

/// Result of probing a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncInfo {
    /// Frame length in bytes.
    pub frame_length: usize,
    /// Channel flags reported by the header.
    pub flags: ChannelFlags,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bit rate.
    pub bit_rate: BitRate,
}

/// Stream properties tracked across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamParameters {
    /// Sample rate of the last frame, if any frame was seen.
    pub sample_rate: Option<u32>,
    /// Bit rate of the last frame.
    pub bit_rate: BitRate,
    /// Channel arrangement and LFE flag of the last frame.
    pub stream_channels: Option<ChannelFlags>,
}

/// Tags discovered in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamTags {
    /// Nominal bit rate in bits per second.
    pub bitrate: Option<u32>,
}

/// Output format announced downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    /// Sample format.
    pub sample_format: SampleFormat,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: usize,
    /// Channel positions in output order; `None` for mono.
    pub positions: Option<Vec<ChannelPosition>>,
}

/// Output capabilities advertised by the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputCaps {
    /// Minimum sample rate in Hz.
    pub min_rate: u32,
    /// Maximum sample rate in Hz.
    pub max_rate: u32,
    /// Minimum channel count.
    pub min_channels: usize,
    /// Maximum channel count.
    pub max_channels: usize,
}

impl OutputCaps {
    /// Check if a format lies within these capabilities.
    pub fn accepts(&self, format: &OutputFormat) -> bool {
        (self.min_rate..=self.max_rate).contains(&format.sample_rate)
            && (self.min_channels..=self.max_channels).contains(&format.channels)
    }
}

/// Capabilities of the PCM output.
pub const OUTPUT_CAPS: OutputCaps = OutputCaps {
    min_rate: 4000,
    max_rate: 48000,
    min_channels: 1,
    max_channels: 6,
};

/// Input stream flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputFormat {
    /// Plain DTS byte stream (`audio/x-dts`).
    #[default]
    Dts,
    /// DVD private stream with first-access prefix (`audio/x-private1-dts`).
    DvdPrivate,
}

impl InputFormat {
    /// Map a media type to an input format.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            "audio/x-dts" => Some(InputFormat::Dts),
            "audio/x-private1-dts" => Some(InputFormat::DvdPrivate),
            _ => None,
        }
    }

    /// Media type string.
    pub fn media_type(self) -> &'static str {
        match self {
            InputFormat::Dts => "audio/x-dts",
            InputFormat::DvdPrivate => "audio/x-private1-dts",
        }
    }
}

/// A buffer of input bytes with an optional decode timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBuffer {
    /// Payload.
    pub data: Bytes,
    /// Timestamp of the first byte, if known.
    pub timestamp: Option<Duration>,
}

impl InputBuffer {
    /// Create a buffer without a timestamp.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            timestamp: None,
        }
    }

    /// Create a buffer with a timestamp.
    pub fn with_timestamp(data: impl Into<Bytes>, timestamp: Duration) -> Self {
        Self {
            data: data.into(),
            timestamp: Some(timestamp),
        }
    }

    /// Payload length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check for an empty payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
