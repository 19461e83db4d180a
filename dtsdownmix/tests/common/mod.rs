//! Shared helpers for dtsdownmix integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use dtsdownmix::channels::channel_count;
use dtsdownmix::parser::{sample_rate_code, CoreHeader};
use dtsdownmix::primitive::PrimitiveError;
use dtsdownmix::{
    AccelFlags, ChannelCaps, ChannelFlags, DecodePrimitive, DownmixConfig, DownmixError,
    Downstream, DtsDownmix, OutputFormat, PrimitiveProvider, Result, Sample, StreamParameters,
    StreamTags, BLOCK_SAMPLES,
};

/// Frame size used by most tests.
pub const FRAME_SIZE: usize = 512;

/// Bit rate code for 768 kbps.
pub const RATE_768K: u8 = 15;

/// Bit rate code marking an open bit rate.
pub const RATE_OPEN: u8 = 29;

/// Build a big-endian DTS core frame of `size` bytes with two decode blocks.
pub fn dts_frame_sized(size: usize, flags: ChannelFlags, sample_rate: u32, rate: u8) -> Vec<u8> {
    let sfreq = sample_rate_code(sample_rate).expect("supported sample rate");
    let header = CoreHeader::new(
        size,
        15,
        flags.arrangement_code() as u8,
        sfreq,
        rate,
        flags.has_lfe(),
    );
    let mut frame = vec![0u8; size];
    let bytes = header.to_bytes();
    frame[..bytes.len()].copy_from_slice(&bytes);
    frame
}

/// 512-byte frame at 768 kbps.
pub fn dts_frame(flags: ChannelFlags, sample_rate: u32) -> Vec<u8> {
    dts_frame_sized(FRAME_SIZE, flags, sample_rate, RATE_768K)
}

/// 5.1 layout.
pub fn surround_5_1() -> ChannelFlags {
    ChannelFlags::FRONT3_REAR2.with_lfe()
}

/// Planar sample the mock produces for decode channel `c`, sample `n`.
pub fn sample_value(channel: usize, n: usize) -> Sample {
    ((channel + 1) * 1000 + n) as Sample
}

/// Calls observed by mock primitives.
#[derive(Debug, Default)]
pub struct MockLog {
    /// Flags passed to each `frame` call.
    pub requests: Vec<ChannelFlags>,
    /// Arguments of `set_dynamic_range` calls.
    pub drc_calls: Vec<bool>,
    /// Contexts created.
    pub inits: usize,
}

/// Decode primitive that honors downmix requests to fewer channels.
pub struct MockPrimitive {
    log: Rc<RefCell<MockLog>>,
    fail_frames: Vec<usize>,
    fail_blocks: Vec<(usize, usize)>,
    frame_index: usize,
    block_index: usize,
    blocks: usize,
    channels: usize,
    samples: Vec<Sample>,
}

impl DecodePrimitive for MockPrimitive {
    fn frame(
        &mut self,
        data: &[u8],
        flags: &mut ChannelFlags,
        _level: &mut Sample,
        _bias: Sample,
    ) -> std::result::Result<(), PrimitiveError> {
        let index = self.frame_index;
        self.frame_index += 1;
        self.block_index = 0;
        self.log.borrow_mut().requests.push(*flags);

        if self.fail_frames.contains(&index) {
            return Err(PrimitiveError(format!("frame {} is corrupt", index)));
        }

        let header = CoreHeader::parse(data).ok_or_else(|| PrimitiveError("no header".into()))?;
        let stream = header.flags();
        let request = flags.layout();
        let requested = channel_count(request);
        let achieved = if requested > 0 && requested <= channel_count(stream) {
            request
        } else {
            stream
        };

        *flags = achieved;
        self.blocks = header.blocks();
        self.channels = channel_count(achieved);
        Ok(())
    }

    fn blocks_num(&self) -> usize {
        self.blocks
    }

    fn block(&mut self) -> std::result::Result<(), PrimitiveError> {
        let block = self.block_index;
        self.block_index += 1;
        if self.fail_blocks.contains(&(self.frame_index - 1, block)) {
            return Err(PrimitiveError(format!("block {} is corrupt", block)));
        }

        self.samples.clear();
        for c in 0..self.channels {
            for n in 0..BLOCK_SAMPLES {
                self.samples.push(sample_value(c, n));
            }
        }
        Ok(())
    }

    fn samples(&self) -> &[Sample] {
        &self.samples
    }

    fn set_dynamic_range(&mut self, enabled: bool) {
        self.log.borrow_mut().drc_calls.push(enabled);
    }
}

/// Creates [`MockPrimitive`] contexts sharing one log.
#[derive(Default, Clone)]
pub struct MockProvider {
    pub log: Rc<RefCell<MockLog>>,
    /// Frame indices whose `frame` call fails.
    pub fail_frames: Vec<usize>,
    /// (frame index, block index) pairs whose `block` call fails.
    pub fail_blocks: Vec<(usize, usize)>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_frames(mut self, frames: &[usize]) -> Self {
        self.fail_frames = frames.to_vec();
        self
    }

    pub fn failing_blocks(mut self, blocks: &[(usize, usize)]) -> Self {
        self.fail_blocks = blocks.to_vec();
        self
    }
}

impl PrimitiveProvider for MockProvider {
    type Context = MockPrimitive;

    fn init(&mut self, _accel: AccelFlags) -> Result<MockPrimitive> {
        self.log.borrow_mut().inits += 1;
        Ok(MockPrimitive {
            log: Rc::clone(&self.log),
            fail_frames: self.fail_frames.clone(),
            fail_blocks: self.fail_blocks.clone(),
            frame_index: 0,
            block_index: 0,
            blocks: 0,
            channels: 0,
            samples: Vec::new(),
        })
    }
}

/// Downstream that records everything it is told.
#[derive(Debug, Default)]
pub struct Recorder {
    pub caps: Option<ChannelCaps>,
    pub reject: bool,
    pub queries: usize,
    pub formats: Vec<OutputFormat>,
    pub tags: Vec<StreamTags>,
    pub params: Vec<StreamParameters>,
}

impl Recorder {
    pub fn with_caps(caps: ChannelCaps) -> Self {
        Self {
            caps: Some(caps),
            ..Self::default()
        }
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    /// Channel counts of the accepted formats, in order.
    pub fn channel_history(&self) -> Vec<usize> {
        self.formats.iter().map(|format| format.channels).collect()
    }
}

impl Downstream for Recorder {
    fn allowed_channels(&mut self) -> Option<ChannelCaps> {
        self.queries += 1;
        self.caps.clone()
    }

    fn accept_format(&mut self, format: &OutputFormat) -> Result<()> {
        if self.reject {
            return Err(DownmixError::Negotiation(format!(
                "{} channels refused",
                format.channels
            )));
        }
        self.formats.push(format.clone());
        Ok(())
    }

    fn stream_parameters_changed(&mut self, params: &StreamParameters) {
        self.params.push(*params);
    }

    fn tags(&mut self, tags: &StreamTags) {
        self.tags.push(*tags);
    }
}

/// Route `tracing` output through the test harness; `RUST_LOG` selects the level.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// Started element with default configuration.
pub fn started(provider: MockProvider, downstream: Recorder) -> DtsDownmix<MockProvider, Recorder> {
    started_with(DownmixConfig::default(), provider, downstream)
}

/// Started element with `config`.
pub fn started_with(
    config: DownmixConfig,
    provider: MockProvider,
    downstream: Recorder,
) -> DtsDownmix<MockProvider, Recorder> {
    init_logging();
    let mut element = DtsDownmix::new(config, provider, downstream);
    element.start().expect("start");
    element
}
