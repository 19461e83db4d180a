//! # dtsdownmix
//!
//! DTS decode adaptation layer: frame synchronization, channel negotiation,
//! downmix and PCM output reordering.
//!
//! The crate sits between a raw DTS byte stream and a PCM consumer. It does
//! not implement the DTS entropy coding or synthesis itself; that work is
//! delegated to a [`DecodePrimitive`] (for example libdca through the
//! `ffi-libdca` feature). What this crate owns is the stateful part around it:
//!
//! - Finding frame boundaries in arbitrary byte windows and resynchronizing
//!   after corrupt data ([`sync`])
//! - Resolving channel arrangements into speaker positions ([`channels`])
//! - Choosing a downmix target from downstream capabilities ([`negotiate`])
//! - Driving the primitive block by block and renegotiating the output format
//!   when the stream changes ([`decoder`])
//! - Interleaving planar blocks into canonical channel order ([`reorder`])
//! - Splitting DVD private-stream buffers that carry two frames ([`dvd`])
//!
//! ## Sample format
//!
//! The PCM sample type is chosen at compile time:
//!
//! - default: 32-bit float
//! - `fixed` feature: 16-bit signed integer
//! - `double` feature: 64-bit float
//!
//! ## Example
//!
//! ```rust,ignore
//! use dtsdownmix::{DownmixConfig, DtsDownmix, StreamDecoder, InputBuffer};
//!
//! let element = DtsDownmix::new(DownmixConfig::default(), provider, sink);
//! let mut stream = StreamDecoder::new(element);
//! stream.start()?;
//! for chunk in chunks {
//!     for pcm in stream.push(InputBuffer::new(chunk))? {
//!         play(&pcm);
//!     }
//! }
//! stream.stop();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(all(feature = "fixed", feature = "double"))]
compile_error!("features `fixed` and `double` select different sample types and are mutually exclusive");

pub mod channels;
pub mod config;
pub mod decoder;
pub mod dvd;
#[cfg(feature = "ffi-libdca")]
pub mod ffi;
pub mod negotiate;
pub mod parser;
pub mod primitive;
pub mod reorder;
pub mod sample;
pub mod stream;
pub mod sync;
pub mod types;

pub use channels::{resolve_channels, ChannelConfiguration, ChannelPosition};
pub use config::{DownmixConfig, PropertyValue, SettingsGate};
pub use decoder::{Downstream, DownmixState, DtsDownmix};
pub use dvd::{DvdSplitter, SplitUnits};
pub use negotiate::{ChannelCaps, ChannelNegotiator};
pub use parser::CoreHeader;
pub use primitive::{AccelFlags, DecodePrimitive, PrimitiveProvider};
pub use reorder::ReorderMap;
pub use sample::{PcmBuffer, Sample, SampleFormat, SAMPLE_FORMAT};
pub use stream::StreamDecoder;
pub use sync::{FrameSynchronizer, SyncOutcome};
pub use types::*;

use thiserror::Error;

/// Errors raised by the DTS downmix pipeline.
#[derive(Error, Debug)]
pub enum DownmixError {
    /// Not enough bytes to find or complete a frame.
    #[error("Insufficient data: need {needed} bytes, have {available}")]
    InsufficientData {
        /// Bytes needed.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// No valid frame header at the given offset.
    #[error("Sync lost at offset {offset}")]
    SyncLost {
        /// Offset of the rejected header candidate.
        offset: usize,
    },

    /// A 256-sample block failed to decode.
    #[error("Error decoding block {block}")]
    BlockDecode {
        /// Index of the failed block within its frame.
        block: usize,
    },

    /// The primitive rejected a whole frame.
    #[error("Frame decode error")]
    FrameDecode,

    /// Accumulated decode errors exceeded the configured budget.
    #[error("Too many decode errors: {count} (maximum {max})")]
    TooManyErrors {
        /// Current error count.
        count: u32,
        /// Configured maximum.
        max: i32,
        /// The failure that exhausted the budget.
        #[source]
        last: Box<DownmixError>,
    },

    /// Channel flags do not name a known arrangement.
    #[error("Invalid channel flags: {0:#x}")]
    InvalidChannelLayout(u32),

    /// Downstream refused the proposed output format.
    #[error("Output negotiation failed: {0}")]
    Negotiation(String),

    /// Malformed DVD first-access header.
    #[error("Bad first_access parameter ({first_access}) in buffer of {size} bytes")]
    InvalidFraming {
        /// Value read from the 2-byte prefix.
        first_access: u16,
        /// Size of the whole buffer.
        size: usize,
    },

    /// The frame handed to the decoder is not the frame the synchronizer found.
    #[error("Frame length mismatch: header says {expected} bytes, buffer has {actual}")]
    FrameLengthMismatch {
        /// Length reported by the header.
        expected: usize,
        /// Length of the buffer.
        actual: usize,
    },

    /// `handle_frame` or `parse` was called outside of a started stream.
    #[error("Decoder not started")]
    NotStarted,

    /// The decoder hit a fatal error and must be restarted.
    #[error("Decoder faulted")]
    Faulted,

    /// The settings gate refused to start the decoder.
    #[error("DTS downmix disabled by settings")]
    Disabled,

    /// The decode primitive could not be initialized.
    #[error("Decode primitive initialization failed: {0}")]
    PrimitiveInit(String),

    /// Property name not recognized.
    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    /// Property value has the wrong type or range.
    #[error("Invalid value for property {0}")]
    InvalidPropertyValue(String),
}

impl DownmixError {
    /// Check if processing can continue after this error.
    ///
    /// Recoverable errors are absorbed by the pipeline (waiting for more
    /// input, resyncing, or skipping a block). Errors that are neither
    /// recoverable nor fatal reject a single frame or input buffer.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DownmixError::InsufficientData { .. }
                | DownmixError::SyncLost { .. }
                | DownmixError::BlockDecode { .. }
                | DownmixError::FrameDecode
        )
    }

    /// Check if this error terminates the current stream.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DownmixError::TooManyErrors { .. }
                | DownmixError::Negotiation(_)
                | DownmixError::FrameLengthMismatch { .. }
                | DownmixError::Faulted
                | DownmixError::Disabled
                | DownmixError::PrimitiveInit(_)
        )
    }
}

/// Result type for DTS downmix operations.
pub type Result<T> = std::result::Result<T, DownmixError>;

/// DTS sync word (16-bit format, big endian).
pub const DTS_SYNC_WORD_BE: u32 = 0x7FFE8001;

/// DTS sync word (16-bit format, little endian).
pub const DTS_SYNC_WORD_LE: u32 = 0xFE7F0180;

/// Minimum window needed to probe a frame header.
pub const MIN_SYNC_BYTES: usize = 7;

/// Samples per channel in one decoded block.
pub const BLOCK_SAMPLES: usize = 256;

/// Maximum decoded channels, LFE included.
pub const MAX_CHANNELS: usize = 7;

/// Default decode error budget.
pub const DEFAULT_MAX_ERRORS: i32 = 10;

/// Check if the libdca binding is compiled in.
pub fn is_ffi_available() -> bool {
    cfg!(feature = "ffi-libdca")
}
