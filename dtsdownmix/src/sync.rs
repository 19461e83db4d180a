//! Frame synchronization.
//!
//! Scans a byte window for the next decodable frame, skipping garbage one
//! byte at a time.

use tracing::{debug, trace};

use crate::parser::{is_sync_prefix, CORE_HEADER_BYTES};
use crate::primitive::DecodePrimitive;
use crate::types::{BitRate, StreamParameters, SyncInfo};
use crate::{DownmixError, MIN_SYNC_BYTES};

/// Result of scanning a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A complete frame starts `offset` bytes into the window.
    Frame {
        /// Bytes before the frame that carry no frame start.
        offset: usize,
        /// Header summary; `info.frame_length` bytes follow `offset`.
        info: SyncInfo,
    },
    /// No complete frame in the window yet.
    NeedMoreData {
        /// Leading bytes known not to start a frame.
        skipped: usize,
    },
}

/// Locates frame boundaries.
#[derive(Debug, Default)]
pub struct FrameSynchronizer {
    /// Frames located.
    frames_found: u64,
    /// Garbage bytes skipped in front of located frames.
    bytes_skipped: u64,
}

impl FrameSynchronizer {
    /// Create a new synchronizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `window` for the next complete frame.
    ///
    /// `hints` fills in header values the primitive does not report.
    pub fn find_frame<P: DecodePrimitive + ?Sized>(
        &mut self,
        primitive: &mut P,
        window: &[u8],
        hints: &StreamParameters,
    ) -> SyncOutcome {
        let mut offset = 0;

        while window.len() - offset >= MIN_SYNC_BYTES {
            let rest = &window[offset..];

            if rest.len() < CORE_HEADER_BYTES && is_sync_prefix(rest) {
                debug!("Partial header at offset {}, waiting for data", offset);
                return SyncOutcome::NeedMoreData { skipped: offset };
            }

            match primitive.sync_info(rest) {
                Some(info) if info.frame_length > 0 => {
                    if info.frame_length > rest.len() {
                        debug!(
                            "Not enough data available (needed {} had {})",
                            info.frame_length,
                            rest.len()
                        );
                        return SyncOutcome::NeedMoreData { skipped: offset };
                    }

                    trace!("Sync: frame size {} at offset {}", info.frame_length, offset);
                    self.frames_found += 1;
                    self.bytes_skipped += offset as u64;
                    return SyncOutcome::Frame {
                        offset,
                        info: apply_hints(info, hints),
                    };
                }
                _ => {
                    trace!("{}", DownmixError::SyncLost { offset });
                    offset += 1;
                }
            }
        }

        SyncOutcome::NeedMoreData { skipped: offset }
    }

    /// Frames located so far.
    pub fn frames_found(&self) -> u64 {
        self.frames_found
    }

    /// Garbage bytes skipped in front of located frames.
    pub fn bytes_skipped(&self) -> u64 {
        self.bytes_skipped
    }

    /// Reset counters.
    pub fn reset(&mut self) {
        self.frames_found = 0;
        self.bytes_skipped = 0;
    }
}

/// Fill header values the primitive left unknown from `hints`.
pub(crate) fn apply_hints(mut info: SyncInfo, hints: &StreamParameters) -> SyncInfo {
    if info.sample_rate == 0 {
        info.sample_rate = hints.sample_rate.unwrap_or(0);
    }
    if info.bit_rate == BitRate::Unknown {
        info.bit_rate = hints.bit_rate;
    }
    info
}
