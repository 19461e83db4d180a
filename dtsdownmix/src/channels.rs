//! Channel arrangement resolution.
//!
//! Maps decoder channel flags to speaker positions in the order the decode
//! primitive produces them, and derives the canonical output order.

use std::fmt;

use tracing::warn;

use crate::reorder::ReorderMap;
use crate::types::ChannelFlags;
use crate::{DownmixError, Result};

/// Speaker position of one channel.
///
/// Variants are declared in canonical output order; sorting positions gives
/// the order used for interleaved output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelPosition {
    /// Single channel without a spatial position.
    Mono,
    /// Front left.
    FrontLeft,
    /// Front right.
    FrontRight,
    /// Front center.
    FrontCenter,
    /// Low frequency effects.
    Lfe1,
    /// Rear left.
    RearLeft,
    /// Rear right.
    RearRight,
    /// Front left of center.
    FrontLeftOfCenter,
    /// Front right of center.
    FrontRightOfCenter,
    /// Rear center.
    RearCenter,
}

impl fmt::Display for ChannelPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelPosition::Mono => "mono",
            ChannelPosition::FrontLeft => "front-left",
            ChannelPosition::FrontRight => "front-right",
            ChannelPosition::FrontCenter => "front-center",
            ChannelPosition::Lfe1 => "lfe1",
            ChannelPosition::RearLeft => "rear-left",
            ChannelPosition::RearRight => "rear-right",
            ChannelPosition::FrontLeftOfCenter => "front-left-of-center",
            ChannelPosition::FrontRightOfCenter => "front-right-of-center",
            ChannelPosition::RearCenter => "rear-center",
        };
        f.write_str(name)
    }
}

/// Channel arrangements the pipeline can output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum ChannelArrangement {
    /// 1/0.
    Mono,
    /// 2/0.
    Stereo,
    /// 2/0, sum/difference coded.
    StereoSumDiff,
    /// 2/0, total coded.
    StereoTotal,
    /// 3/0.
    Front3,
    /// 2/1.
    Front2_Rear1,
    /// 3/1.
    Front3_Rear1,
    /// 2/2.
    Front2_Rear2,
    /// 3/2.
    Front3_Rear2,
    /// 4/2.
    Front4_Rear2,
}

impl ChannelArrangement {
    /// Look up the arrangement of a flags word, ignoring LFE and control bits.
    pub fn from_flags(flags: ChannelFlags) -> Option<Self> {
        let arrangement = match flags.arrangement_code() {
            0 => ChannelArrangement::Mono,
            2 => ChannelArrangement::Stereo,
            3 => ChannelArrangement::StereoSumDiff,
            4 => ChannelArrangement::StereoTotal,
            5 => ChannelArrangement::Front3,
            6 => ChannelArrangement::Front2_Rear1,
            7 => ChannelArrangement::Front3_Rear1,
            8 => ChannelArrangement::Front2_Rear2,
            9 => ChannelArrangement::Front3_Rear2,
            10 => ChannelArrangement::Front4_Rear2,
            _ => return None,
        };
        Some(arrangement)
    }

    /// Positions in decode order, LFE excluded.
    pub fn positions(self) -> &'static [ChannelPosition] {
        use ChannelPosition::*;
        match self {
            ChannelArrangement::Mono => &[Mono],
            ChannelArrangement::Stereo
            | ChannelArrangement::StereoSumDiff
            | ChannelArrangement::StereoTotal => &[FrontLeft, FrontRight],
            ChannelArrangement::Front3 => &[FrontCenter, FrontLeft, FrontRight],
            ChannelArrangement::Front2_Rear1 => &[FrontLeft, FrontRight, RearCenter],
            ChannelArrangement::Front3_Rear1 => &[FrontCenter, FrontLeft, FrontRight, RearCenter],
            ChannelArrangement::Front2_Rear2 => &[FrontLeft, FrontRight, RearLeft, RearRight],
            ChannelArrangement::Front3_Rear2 => {
                &[FrontCenter, FrontLeft, FrontRight, RearLeft, RearRight]
            }
            ChannelArrangement::Front4_Rear2 => &[
                FrontLeftOfCenter,
                FrontRightOfCenter,
                FrontLeft,
                FrontRight,
                RearLeft,
                RearRight,
            ],
        }
    }
}

/// Resolve channel flags into positions in decode order.
///
/// The LFE channel, when flagged, is always last.
pub fn resolve_channels(flags: ChannelFlags) -> Result<Vec<ChannelPosition>> {
    let arrangement = ChannelArrangement::from_flags(flags).ok_or_else(|| {
        warn!("invalid channel flags {}", flags);
        DownmixError::InvalidChannelLayout(flags.bits())
    })?;

    let mut positions = arrangement.positions().to_vec();
    if flags.has_lfe() {
        positions.push(ChannelPosition::Lfe1);
    }
    Ok(positions)
}

/// Number of channels described by `flags`, or 0 if the arrangement is unknown.
pub fn channel_count(flags: ChannelFlags) -> usize {
    match ChannelArrangement::from_flags(flags) {
        Some(arrangement) => arrangement.positions().len() + usize::from(flags.has_lfe()),
        None => 0,
    }
}

/// Output channel configuration established by a renegotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfiguration {
    /// Flags the configuration was built from (arrangement and LFE only).
    pub flags: ChannelFlags,
    /// Positions in decode order.
    pub positions: Vec<ChannelPosition>,
    /// Positions in canonical output order.
    pub canonical: Vec<ChannelPosition>,
    /// Decode index to output index.
    pub reorder_map: ReorderMap,
}

impl ChannelConfiguration {
    /// Build the configuration for `flags`.
    pub fn from_flags(flags: ChannelFlags) -> Result<Self> {
        let flags = flags.layout();
        let positions = resolve_channels(flags)?;
        let mut canonical = positions.clone();
        canonical.sort();
        let reorder_map = ReorderMap::between(&positions, &canonical)
            .ok_or(DownmixError::InvalidChannelLayout(flags.bits()))?;

        Ok(Self {
            flags,
            positions,
            canonical,
            reorder_map,
        })
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.positions.len()
    }
}
