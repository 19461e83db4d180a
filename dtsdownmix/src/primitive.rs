//! Decode primitive interface.
//!
//! The DTS bitstream decoder itself is an external collaborator. This module
//! defines the contract the pipeline drives: probe a header, decode a frame
//! into the requested channel layout, then pull 256-sample blocks out of it.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parser::CoreHeader;
use crate::sample::Sample;
use crate::types::{ChannelFlags, SyncInfo};
use crate::Result;

bitflags! {
    /// CPU acceleration flags handed to the primitive at initialization.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AccelFlags: u32 {
        /// MMX.
        const X86_MMX = 0x8000_0000;
        /// 3DNow!.
        const X86_3DNOW = 0x4000_0000;
        /// MMX extensions.
        const X86_MMXEXT = 0x2000_0000;
    }
}

impl AccelFlags {
    /// Detect acceleration flags for the current CPU.
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    pub fn detect() -> Self {
        let mut flags = AccelFlags::empty();
        if is_x86_feature_detected!("mmx") {
            flags |= AccelFlags::X86_MMX;
        }
        // SSE implies the integer MMX extensions.
        if is_x86_feature_detected!("sse") {
            flags |= AccelFlags::X86_MMXEXT;
        }
        flags
    }

    /// Detect acceleration flags for the current CPU.
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    pub fn detect() -> Self {
        AccelFlags::empty()
    }
}

/// Failure reported by the decode primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Decode primitive failure: {0}")]
pub struct PrimitiveError(pub String);

/// Per-stream decode context.
///
/// One context belongs to exactly one stream; the pipeline never shares it.
/// Dropping the context releases it.
pub trait DecodePrimitive {
    /// Probe a frame header at the start of `data`.
    ///
    /// Returns `None` when `data` does not start with a usable header. The
    /// default implementation reads DTS core headers natively.
    fn sync_info(&mut self, data: &[u8]) -> Option<SyncInfo> {
        CoreHeader::parse(data).map(|header| header.sync_info())
    }

    /// Start decoding one complete frame.
    ///
    /// `flags` carries the requested output layout in and the layout the
    /// primitive will actually produce out. `level` is the requested output
    /// level and is updated to the applied level.
    fn frame(
        &mut self,
        data: &[u8],
        flags: &mut ChannelFlags,
        level: &mut Sample,
        bias: Sample,
    ) -> std::result::Result<(), PrimitiveError>;

    /// Number of 256-sample blocks in the current frame.
    fn blocks_num(&self) -> usize;

    /// Decode the next block into [`DecodePrimitive::samples`].
    fn block(&mut self) -> std::result::Result<(), PrimitiveError>;

    /// Planar output of the last decoded block: channel `c` occupies
    /// `c * 256 .. (c + 1) * 256`.
    fn samples(&self) -> &[Sample];

    /// Enable or disable the stream's embedded dynamic range compression.
    fn set_dynamic_range(&mut self, enabled: bool);
}

/// Creates decode contexts at stream start.
pub trait PrimitiveProvider {
    /// Context type produced.
    type Context: DecodePrimitive;

    /// Initialize a new context.
    fn init(&mut self, accel: AccelFlags) -> Result<Self::Context>;
}

impl<F, P> PrimitiveProvider for F
where
    F: FnMut(AccelFlags) -> Result<P>,
    P: DecodePrimitive,
{
    type Context = P;

    fn init(&mut self, accel: AccelFlags) -> Result<P> {
        self(accel)
    }
}
