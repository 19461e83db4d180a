//! DVD private-stream splitting.
//!
//! DVD program streams prefix each DTS payload with a 2-byte big-endian
//! `first_access` field. Values above one mark where the first frame that
//! starts in this packet begins, so the bytes before it belong to a frame
//! started in the previous packet and must not inherit this packet's
//! timestamp.

use byteorder::{BigEndian, ByteOrder};
use tracing::trace;

use crate::types::InputBuffer;
use crate::{DownmixError, Result};

const PREFIX_LEN: usize = 2;

/// Sub-units produced from one DVD packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitUnits {
    /// Whole payload, carrying the packet timestamp.
    Single(InputBuffer),
    /// Payload split at the first access point.
    Pair {
        /// Bytes before the access point, without timestamp.
        first: InputBuffer,
        /// Bytes from the access point on, carrying the packet timestamp.
        /// Absent when the access point is the end of the packet.
        second: Option<InputBuffer>,
    },
}

impl SplitUnits {
    /// Number of sub-units.
    pub fn len(&self) -> usize {
        match self {
            SplitUnits::Single(_) => 1,
            SplitUnits::Pair { second, .. } => 1 + usize::from(second.is_some()),
        }
    }

    /// Always false; a split yields at least one unit.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Total payload bytes across sub-units.
    pub fn payload_len(&self) -> usize {
        match self {
            SplitUnits::Single(unit) => unit.len(),
            SplitUnits::Pair { first, second } => {
                first.len() + second.as_ref().map_or(0, InputBuffer::len)
            }
        }
    }
}

impl IntoIterator for SplitUnits {
    type Item = InputBuffer;
    type IntoIter = std::vec::IntoIter<InputBuffer>;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            SplitUnits::Single(unit) => vec![unit].into_iter(),
            SplitUnits::Pair { first, second } => {
                let mut units = vec![first];
                units.extend(second);
                units.into_iter()
            }
        }
    }
}

/// Strips the DVD first-access prefix.
#[derive(Debug, Default)]
pub struct DvdSplitter {
    packets: u64,
    splits: u64,
}

impl DvdSplitter {
    /// Create a new splitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Split one packet.
    pub fn split(&mut self, packet: &InputBuffer) -> Result<SplitUnits> {
        let size = packet.len();
        if size < PREFIX_LEN {
            return Err(DownmixError::InsufficientData {
                needed: PREFIX_LEN,
                available: size,
            });
        }

        let first_access = BigEndian::read_u16(&packet.data[..PREFIX_LEN]);
        self.packets += 1;

        if first_access <= 1 {
            trace!("DVD packet of {} bytes, first_access {}", size, first_access);
            return Ok(SplitUnits::Single(InputBuffer {
                data: packet.data.slice(PREFIX_LEN..),
                timestamp: packet.timestamp,
            }));
        }

        let len = usize::from(first_access) - 1;
        if PREFIX_LEN + len > size {
            return Err(DownmixError::InvalidFraming { first_access, size });
        }

        let split_at = PREFIX_LEN + len;
        trace!(
            "DVD packet of {} bytes split at {} (first_access {})",
            size,
            split_at,
            first_access
        );
        self.splits += 1;

        let first = InputBuffer::new(packet.data.slice(PREFIX_LEN..split_at));
        let second = (split_at < size).then(|| InputBuffer {
            data: packet.data.slice(split_at..),
            timestamp: packet.timestamp,
        });

        Ok(SplitUnits::Pair { first, second })
    }

    /// Split one packet and hand its units to `sink` in order.
    ///
    /// Stops at the first unit `sink` rejects.
    pub fn forward<F>(&mut self, packet: &InputBuffer, mut sink: F) -> Result<()>
    where
        F: FnMut(InputBuffer) -> Result<()>,
    {
        for unit in self.split(packet)? {
            sink(unit)?;
        }
        Ok(())
    }

    /// Packets processed.
    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Packets that carried an access point past the prefix.
    pub fn splits(&self) -> u64 {
        self.splits
    }
}
