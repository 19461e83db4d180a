//! Planar to interleaved reordering.

use crate::channels::ChannelPosition;
use crate::sample::Sample;
use crate::BLOCK_SAMPLES;

/// Permutation from decode channel index to output channel index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReorderMap(Vec<usize>);

impl ReorderMap {
    /// Identity map over `channels` channels.
    pub fn identity(channels: usize) -> Self {
        Self((0..channels).collect())
    }

    /// Map each position of `from` to its index in `to`.
    ///
    /// Returns `None` unless `to` is a permutation of `from`.
    pub fn between(from: &[ChannelPosition], to: &[ChannelPosition]) -> Option<Self> {
        if from.len() != to.len() {
            return None;
        }
        let mut taken = vec![false; to.len()];
        let mut map = Vec::with_capacity(from.len());
        for position in from {
            let index = to
                .iter()
                .enumerate()
                .position(|(i, p)| p == position && !taken[i])?;
            taken[index] = true;
            map.push(index);
        }
        Some(Self(map))
    }

    /// Build from raw indices, checking that they form a permutation.
    pub fn from_indices(indices: Vec<usize>) -> Option<Self> {
        let mut seen = vec![false; indices.len()];
        for &i in &indices {
            if i >= indices.len() || seen[i] {
                return None;
            }
            seen[i] = true;
        }
        Some(Self(indices))
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check for an empty map.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Indices as a slice.
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Interleave one planar block into `out`.
    ///
    /// `planar` holds `len()` channels of [`BLOCK_SAMPLES`] samples each,
    /// channel-major. `out` receives `BLOCK_SAMPLES * len()` samples where
    /// sample `n` of decode channel `c` lands at `n * len() + map[c]`.
    pub fn interleave_block(&self, planar: &[Sample], out: &mut [Sample]) {
        let chans = self.0.len();
        debug_assert!(planar.len() >= BLOCK_SAMPLES * chans);
        debug_assert!(out.len() >= BLOCK_SAMPLES * chans);

        for (c, &dest) in self.0.iter().enumerate() {
            let channel = &planar[c * BLOCK_SAMPLES..(c + 1) * BLOCK_SAMPLES];
            for (n, &sample) in channel.iter().enumerate() {
                out[n * chans + dest] = sample;
            }
        }
    }
}
