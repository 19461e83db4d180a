//! DTS core frame header parsing.
//!
//! A native reader for the fields the synchronizer needs: frame size, block
//! count, channel arrangement, sample rate, bit rate and LFE flag. Both the
//! 16-bit big-endian layout and its byte-swapped little-endian form are
//! recognized.

use crate::types::{BitRate, ChannelFlags, SyncInfo};
use crate::{DTS_SYNC_WORD_BE, DTS_SYNC_WORD_LE};

/// Bytes needed to read a complete core header in either byte order.
pub const CORE_HEADER_BYTES: usize = 12;

/// Smallest legal frame size in bytes.
pub const MIN_FRAME_SIZE: usize = 96;

/// Largest frame size expressible in the 14-bit FSIZE field.
pub const MAX_FRAME_SIZE: usize = 16384;

/// Sample rates indexed by SFREQ. Zero marks a reserved code.
const SAMPLE_RATES: [u32; 16] = [
    0, 8000, 16000, 32000, 0, 0, 11025, 22050, 44100, 0, 0, 12000, 24000, 48000, 96000, 192000,
];

/// Bit rates indexed by RATE, in bits per second. The last three codes are
/// open, variable and lossless.
const BIT_RATES: [i32; 32] = [
    32000, 56000, 64000, 96000, 112000, 128000, 192000, 224000, 256000, 320000, 384000, 448000,
    512000, 576000, 640000, 768000, 960000, 1024000, 1152000, 1280000, 1344000, 1408000, 1411200,
    1472000, 1536000, 1920000, 2048000, 3072000, 3840000, 1, 2, 3,
];

/// Parsed DTS core frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreHeader {
    /// Frame is stored byte-swapped (16-bit little endian).
    pub little_endian: bool,
    /// NBLKS: number of 32-sample PCM blocks minus one.
    pub nblks: u8,
    /// Frame size in bytes (FSIZE + 1).
    pub frame_size: usize,
    /// AMODE: channel arrangement code.
    pub amode: u8,
    /// SFREQ: sample rate code.
    pub sfreq: u8,
    /// RATE: bit rate code.
    pub rate: u8,
    /// LFF: low frequency effects flag.
    pub lff: u8,
}

impl CoreHeader {
    /// Create a big-endian header.
    pub fn new(frame_size: usize, nblks: u8, amode: u8, sfreq: u8, rate: u8, lfe: bool) -> Self {
        Self {
            little_endian: false,
            nblks,
            frame_size,
            amode,
            sfreq,
            rate,
            lff: u8::from(lfe),
        }
    }

    /// Parse a header at the start of `data`.
    ///
    /// Returns `None` when there is no sync word, the header is truncated, or
    /// a field holds a value the decoder cannot use.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }

        let sync = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let little_endian = match sync {
            DTS_SYNC_WORD_BE => false,
            DTS_SYNC_WORD_LE => true,
            _ => return None,
        };

        let mut header = [0u8; CORE_HEADER_BYTES];
        let mut available = data.len().min(CORE_HEADER_BYTES);
        if little_endian {
            available &= !1;
            for pair in 0..available / 2 {
                header[pair * 2] = data[pair * 2 + 1];
                header[pair * 2 + 1] = data[pair * 2];
            }
        } else {
            header[..available].copy_from_slice(&data[..available]);
        }

        let mut reader = BitReader::new(&header[4..available]);

        let _ftype = reader.read_bit()?;
        let _short = reader.read_bits(5)?;
        let _cpf = reader.read_bit()?;
        let nblks = reader.read_bits(7)? as u8;
        if nblks < 5 {
            return None;
        }

        let frame_size = reader.read_bits(14)? as usize + 1;
        if frame_size < MIN_FRAME_SIZE {
            return None;
        }

        let amode = reader.read_bits(6)? as u8;

        let sfreq = reader.read_bits(4)? as u8;
        if SAMPLE_RATES[sfreq as usize] == 0 {
            return None;
        }

        let rate = reader.read_bits(5)? as u8;

        // Downmix, DYNF, TIMEF, AUXF, HDCD, EXT_AUDIO_ID, EXT_AUDIO, ASPF
        reader.skip(10)?;

        let lff = reader.read_bits(2)? as u8;

        Some(Self {
            little_endian,
            nblks,
            frame_size,
            amode,
            sfreq,
            rate,
            lff,
        })
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATES[(self.sfreq & 0x0F) as usize]
    }

    /// Bit rate.
    pub fn bit_rate(&self) -> BitRate {
        BitRate::from_raw(BIT_RATES[(self.rate & 0x1F) as usize])
    }

    /// Channel flags: arrangement code plus LFE.
    pub fn flags(&self) -> ChannelFlags {
        let flags = ChannelFlags::from_bits(u32::from(self.amode & 0x3F));
        if self.lff != 0 {
            flags.with_lfe()
        } else {
            flags
        }
    }

    /// PCM samples per channel in this frame.
    pub fn samples_per_channel(&self) -> usize {
        (self.nblks as usize + 1) * 32
    }

    /// Number of 256-sample decode blocks in this frame.
    pub fn blocks(&self) -> usize {
        (self.nblks as usize + 1) / 8
    }

    /// Summary for the frame synchronizer.
    pub fn sync_info(&self) -> SyncInfo {
        SyncInfo {
            frame_length: self.frame_size,
            flags: self.flags(),
            sample_rate: self.sample_rate(),
            bit_rate: self.bit_rate(),
        }
    }

    /// Serialize the header.
    ///
    /// Fields not tracked by [`CoreHeader`] are written as zero.
    pub fn to_bytes(&self) -> [u8; CORE_HEADER_BYTES] {
        let mut writer = BitWriter::new();
        writer.write_bits(DTS_SYNC_WORD_BE, 32);
        writer.write_bits(1, 1); // FTYPE: normal frame
        writer.write_bits(31, 5); // SHORT: no deficit samples
        writer.write_bits(0, 1);
        writer.write_bits(u32::from(self.nblks & 0x7F), 7);
        writer.write_bits((self.frame_size.saturating_sub(1) & 0x3FFF) as u32, 14);
        writer.write_bits(u32::from(self.amode & 0x3F), 6);
        writer.write_bits(u32::from(self.sfreq & 0x0F), 4);
        writer.write_bits(u32::from(self.rate & 0x1F), 5);
        writer.write_bits(0, 10);
        writer.write_bits(u32::from(self.lff & 0x03), 2);

        let mut bytes = [0u8; CORE_HEADER_BYTES];
        let data = writer.into_bytes();
        bytes[..data.len()].copy_from_slice(&data);
        if self.little_endian {
            for pair in bytes.chunks_exact_mut(2) {
                pair.swap(0, 1);
            }
        }
        bytes
    }
}

/// SFREQ code for a sample rate.
pub fn sample_rate_code(sample_rate: u32) -> Option<u8> {
    if sample_rate == 0 {
        return None;
    }
    SAMPLE_RATES
        .iter()
        .position(|&rate| rate == sample_rate)
        .map(|code| code as u8)
}

/// Check whether `data` could be the start of a sync word.
///
/// Used to hold back a short tail that may complete into a header once more
/// bytes arrive.
pub fn is_sync_prefix(data: &[u8]) -> bool {
    let len = data.len().min(4);
    let be = DTS_SYNC_WORD_BE.to_be_bytes();
    let le = DTS_SYNC_WORD_LE.to_be_bytes();
    data[..len] == be[..len] || data[..len] == le[..len]
}

/// Simple MSB-first bit reader.
#[derive(Debug)]
struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    fn read_bit(&mut self) -> Option<u8> {
        if self.byte_pos >= self.data.len() {
            return None;
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos >= 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Some(bit)
    }

    fn read_bits(&mut self, count: u8) -> Option<u32> {
        let mut value = 0u32;
        for _ in 0..count {
            value = (value << 1) | self.read_bit()? as u32;
        }
        Some(value)
    }

    fn skip(&mut self, count: u8) -> Option<()> {
        self.read_bits(count).map(|_| ())
    }
}

/// Simple MSB-first bit writer.
#[derive(Debug, Default)]
struct BitWriter {
    data: Vec<u8>,
    bit_pos: u8,
}

impl BitWriter {
    fn new() -> Self {
        Self::default()
    }

    fn write_bits(&mut self, value: u32, count: u8) {
        for i in (0..count).rev() {
            if self.bit_pos == 0 {
                self.data.push(0);
            }
            let bit = ((value >> i) & 1) as u8;
            if let Some(last) = self.data.last_mut() {
                *last |= bit << (7 - self.bit_pos);
            }
            self.bit_pos = (self.bit_pos + 1) % 8;
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
