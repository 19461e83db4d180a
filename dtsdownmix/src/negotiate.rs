//! Channel negotiation.
//!
//! Decides which channel mask to request from the decode primitive for each
//! frame. Priority, highest first: a user override, the cached result of the
//! last negotiation, a fresh downstream capability query, and finally the
//! stream's own layout.

use tracing::debug;

use crate::channels::channel_count;
use crate::types::ChannelFlags;

/// Masks requested for each downmix target, indexed by channel count - 1.
const DOWNMIX_MASKS: [ChannelFlags; 6] = [
    ChannelFlags::MONO,
    ChannelFlags::STEREO,
    ChannelFlags::STEREO.with_lfe(),
    ChannelFlags::FRONT2_REAR2,
    ChannelFlags::FRONT2_REAR2.with_lfe(),
    ChannelFlags::FRONT3_REAR2.with_lfe(),
];

/// Channel count assumed when the stream layout is unknown.
const DEFAULT_TARGET_CHANNELS: usize = 6;

/// Mask to request for a downmix to `count` channels.
///
/// Counts above six clamp to 3/2 with LFE; zero is treated as mono.
pub fn mask_for_count(count: usize) -> ChannelFlags {
    DOWNMIX_MASKS[count.clamp(1, DOWNMIX_MASKS.len()) - 1]
}

/// Channel counts a downstream consumer accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCaps {
    /// Exactly one count.
    Fixed(usize),
    /// Any count in an inclusive range.
    Range {
        /// Smallest accepted count.
        min: usize,
        /// Largest accepted count.
        max: usize,
    },
    /// Listed counts, most preferred first.
    List(Vec<usize>),
}

impl ChannelCaps {
    /// Pick the accepted count nearest to `target`.
    ///
    /// Ties go to the value listed first. Returns `None` for an empty list or
    /// an inverted range.
    pub fn fixate_nearest(&self, target: usize) -> Option<usize> {
        match self {
            ChannelCaps::Fixed(count) => Some(*count),
            ChannelCaps::Range { min, max } if min <= max => Some(target.clamp(*min, *max)),
            ChannelCaps::Range { .. } => None,
            ChannelCaps::List(counts) => {
                let mut best: Option<usize> = None;
                for &count in counts {
                    let closer = match best {
                        Some(b) => count.abs_diff(target) < b.abs_diff(target),
                        None => true,
                    };
                    if closer {
                        best = Some(count);
                    }
                }
                best
            }
        }
    }
}

/// Per-stream negotiation state.
#[derive(Debug, Clone)]
pub struct ChannelNegotiator {
    request: Option<ChannelFlags>,
    prev_flags: Option<ChannelFlags>,
    flag_update: bool,
    using: Option<ChannelFlags>,
}

impl ChannelNegotiator {
    /// Create a new negotiator with an optional forced mask.
    pub fn new(request: Option<ChannelFlags>) -> Self {
        Self {
            request,
            prev_flags: None,
            flag_update: true,
            using: None,
        }
    }

    /// Forced mask, if any.
    pub fn request(&self) -> Option<ChannelFlags> {
        self.request
    }

    /// Change the forced mask.
    ///
    /// Clearing it makes the next frame query downstream again.
    pub fn set_request(&mut self, request: Option<ChannelFlags>) {
        if request.is_none() && self.request.is_some() {
            self.flag_update = true;
        }
        self.request = request;
    }

    /// Record the header flags of the current frame.
    pub fn observe(&mut self, frame_flags: ChannelFlags) {
        if self.prev_flags != Some(frame_flags) {
            self.prev_flags = Some(frame_flags);
            self.flag_update = true;
        }
    }

    /// Check if the next choice will query downstream.
    pub fn needs_query(&self) -> bool {
        self.request.is_none() && self.flag_update
    }

    /// Choose the mask to request for the current frame.
    ///
    /// `query` is only invoked when the stream flags changed since the last
    /// query (or on the first frame) and no override is set.
    pub fn choose<F>(
        &mut self,
        frame_flags: ChannelFlags,
        stream_channels: Option<ChannelFlags>,
        query: F,
    ) -> ChannelFlags
    where
        F: FnOnce() -> Option<ChannelCaps>,
    {
        if let Some(request) = self.request {
            return request;
        }

        let fallback = || stream_channels.unwrap_or(ChannelFlags::FRONT3_REAR2.with_lfe());

        if !self.flag_update {
            return self.using.unwrap_or_else(fallback);
        }
        self.flag_update = false;

        let target = match channel_count(frame_flags) {
            0 => DEFAULT_TARGET_CHANNELS,
            n => n,
        };

        match query().and_then(|caps| caps.fixate_nearest(target)) {
            Some(count) => {
                let mask = mask_for_count(count);
                debug!(
                    "Downstream prefers {} channels (stream has {}), requesting {}",
                    count, target, mask
                );
                mask
            }
            None => {
                let mask = fallback();
                debug!("No downstream channel preference, requesting {}", mask);
                mask
            }
        }
    }

    /// Record the layout the primitive actually produced.
    ///
    /// Returns `true` when it differs from the active layout.
    pub fn settle(&mut self, achieved: ChannelFlags) -> bool {
        let achieved = achieved.layout();
        if self.using == Some(achieved) {
            return false;
        }
        self.using = Some(achieved);
        true
    }

    /// Active output layout.
    pub fn using(&self) -> Option<ChannelFlags> {
        self.using
    }

    /// Forget per-stream state, keeping the override.
    pub fn reset(&mut self) {
        *self = Self::new(self.request);
    }
}

impl Default for ChannelNegotiator {
    fn default() -> Self {
        Self::new(None)
    }
}
