//! PCM sample type and output buffers.
//!
//! The sample type is fixed at compile time to match the decode primitive
//! build: `i16` with the `fixed` feature, `f64` with `double`, `f32` otherwise.

use std::fmt;
use std::time::Duration;

use byteorder::{ByteOrder, NativeEndian};

use crate::BLOCK_SAMPLES;

/// Decoded sample type.
#[cfg(feature = "fixed")]
pub type Sample = i16;

/// Decoded sample type.
#[cfg(feature = "double")]
pub type Sample = f64;

/// Decoded sample type.
#[cfg(not(any(feature = "fixed", feature = "double")))]
pub type Sample = f32;

/// Sample format for interleaved output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Signed 16-bit, native endian.
    S16,
    /// 32-bit float, native endian.
    F32,
    /// 64-bit float, native endian.
    F64,
}

impl SampleFormat {
    /// Get the number of bytes per sample.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::S16 => 2,
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Check if this is a floating-point format.
    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S16 => write!(f, "s16"),
            Self::F32 => write!(f, "flt"),
            Self::F64 => write!(f, "dbl"),
        }
    }
}

/// Format of [`Sample`].
#[cfg(feature = "fixed")]
pub const SAMPLE_FORMAT: SampleFormat = SampleFormat::S16;

/// Format of [`Sample`].
#[cfg(feature = "double")]
pub const SAMPLE_FORMAT: SampleFormat = SampleFormat::F64;

/// Format of [`Sample`].
#[cfg(not(any(feature = "fixed", feature = "double")))]
pub const SAMPLE_FORMAT: SampleFormat = SampleFormat::F32;

/// Unity gain level handed to the primitive.
pub const UNITY_LEVEL: Sample = 1 as Sample;

/// Zero bias handed to the primitive.
pub const ZERO_BIAS: Sample = 0 as Sample;

#[cfg(feature = "fixed")]
fn write_native(src: &[Sample], dst: &mut [u8]) {
    NativeEndian::write_i16_into(src, dst);
}

#[cfg(feature = "double")]
fn write_native(src: &[Sample], dst: &mut [u8]) {
    NativeEndian::write_f64_into(src, dst);
}

#[cfg(not(any(feature = "fixed", feature = "double")))]
fn write_native(src: &[Sample], dst: &mut [u8]) {
    NativeEndian::write_f32_into(src, dst);
}

/// One decoded frame of interleaved PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    /// Interleaved samples in canonical channel order.
    pub samples: Vec<Sample>,
    /// Number of interleaved channels.
    pub channels: usize,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of 256-sample blocks.
    pub blocks: usize,
    /// Output follows a decode error or dropped data.
    pub discont: bool,
    /// Timestamp carried over from the input, if any.
    pub timestamp: Option<Duration>,
}

impl PcmBuffer {
    /// Allocate a silent buffer for `blocks` blocks of `channels` channels.
    pub fn silent(channels: usize, sample_rate: u32, blocks: usize) -> Self {
        Self {
            samples: vec![0 as Sample; BLOCK_SAMPLES * channels * blocks],
            channels,
            sample_rate,
            blocks,
            discont: false,
            timestamp: None,
        }
    }

    /// Samples per channel.
    pub fn samples_per_channel(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    /// Size of the buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.samples.len() * SAMPLE_FORMAT.bytes_per_sample()
    }

    /// Duration of the buffer.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples_per_channel() as f64 / self.sample_rate as f64)
    }

    /// Mutable view of one block's interleaved samples.
    pub fn block_mut(&mut self, block: usize) -> &mut [Sample] {
        let stride = BLOCK_SAMPLES * self.channels;
        &mut self.samples[block * stride..(block + 1) * stride]
    }

    /// Serialize samples as native-endian bytes.
    pub fn to_ne_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.byte_len()];
        write_native(&self.samples, &mut bytes);
        bytes
    }
}
