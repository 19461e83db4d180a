//! Frame decode orchestration.
//!
//! [`DtsDownmix`] owns the decode primitive context for one stream and runs
//! the per-frame sequence: re-probe the header, track stream parameters,
//! negotiate the downmix target, decode block by block, renegotiate the
//! output format when the achieved layout or sample rate changes, and
//! interleave the result into canonical channel order.
//!
//! ## Usage
//!
//! The host locates frames with [`DtsDownmix::parse`] and hands each exact
//! frame to [`DtsDownmix::handle_frame`]. [`crate::StreamDecoder`] does this
//! for plain byte streams.

use std::fmt;

use tracing::{debug, info, warn};

use crate::channels::ChannelConfiguration;
use crate::config::{DownmixConfig, PropertyValue, SettingsGate, PROP_REQUEST_CHANNELS};
use crate::negotiate::{ChannelCaps, ChannelNegotiator};
use crate::primitive::{DecodePrimitive, PrimitiveProvider};
use crate::sample::{PcmBuffer, SAMPLE_FORMAT, UNITY_LEVEL, ZERO_BIAS};
use crate::sync::{apply_hints, FrameSynchronizer, SyncOutcome};
use crate::types::{ChannelFlags, InputFormat, OutputFormat, StreamParameters, StreamTags};
use crate::{DownmixError, Result, BLOCK_SAMPLES};

/// Consumer of decoded audio.
///
/// Answers capability queries and accepts output format changes. The
/// notification hooks default to no-ops.
pub trait Downstream {
    /// Channel counts the consumer accepts, most preferred first.
    ///
    /// `None` means no capability information is available.
    fn allowed_channels(&mut self) -> Option<ChannelCaps>;

    /// Accept a new output format. An error is fatal for the stream.
    fn accept_format(&mut self, format: &OutputFormat) -> Result<()>;

    /// Stream parameters changed.
    fn stream_parameters_changed(&mut self, _params: &StreamParameters) {}

    /// Stream tags discovered.
    fn tags(&mut self, _tags: &StreamTags) {}
}

impl<D: Downstream + ?Sized> Downstream for &mut D {
    fn allowed_channels(&mut self) -> Option<ChannelCaps> {
        (**self).allowed_channels()
    }

    fn accept_format(&mut self, format: &OutputFormat) -> Result<()> {
        (**self).accept_format(format)
    }

    fn stream_parameters_changed(&mut self, params: &StreamParameters) {
        (**self).stream_parameters_changed(params)
    }

    fn tags(&mut self, tags: &StreamTags) {
        (**self).tags(tags)
    }
}

impl<D: Downstream + ?Sized> Downstream for Box<D> {
    fn allowed_channels(&mut self) -> Option<ChannelCaps> {
        (**self).allowed_channels()
    }

    fn accept_format(&mut self, format: &OutputFormat) -> Result<()> {
        (**self).accept_format(format)
    }

    fn stream_parameters_changed(&mut self, params: &StreamParameters) {
        (**self).stream_parameters_changed(params)
    }

    fn tags(&mut self, tags: &StreamTags) {
        (**self).tags(tags)
    }
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownmixState {
    /// Created, never started.
    Uninitialized,
    /// Started and waiting for a frame.
    Ready,
    /// Inside `handle_frame`.
    Decoding,
    /// A fatal error occurred; only `start` or `stop` are accepted.
    Faulted,
    /// Stopped; the primitive context is released.
    Stopped,
}

/// Decode error accounting.
#[derive(Debug, Clone)]
struct ErrorBudget {
    count: u32,
    max: i32,
    discont: bool,
    total: u64,
}

impl ErrorBudget {
    fn new(max: i32) -> Self {
        Self {
            count: 0,
            max,
            discont: false,
            total: 0,
        }
    }

    /// Count one decode error. Fails once the budget is exceeded.
    fn record(&mut self, cause: DownmixError) -> Result<()> {
        warn!("{}", cause);
        self.count += 1;
        self.total += 1;
        self.discont = true;
        if self.max >= 0 && self.count > self.max as u32 {
            warn!("Too many decode errors ({} > {})", self.count, self.max);
            return Err(DownmixError::TooManyErrors {
                count: self.count,
                max: self.max,
                last: Box::new(cause),
            });
        }
        Ok(())
    }

    fn success(&mut self) {
        self.count = self.count.saturating_sub(1);
    }

    fn take_discont(&mut self) -> bool {
        std::mem::take(&mut self.discont)
    }
}

/// DTS decode and downmix element.
pub struct DtsDownmix<P: PrimitiveProvider, D: Downstream> {
    config: DownmixConfig,
    provider: P,
    downstream: D,
    gate: Box<dyn SettingsGate + Send>,
    context: Option<P::Context>,
    state: DownmixState,
    format: InputFormat,
    params: StreamParameters,
    negotiator: ChannelNegotiator,
    synchronizer: FrameSynchronizer,
    configuration: Option<ChannelConfiguration>,
    pending_renegotiation: bool,
    budget: ErrorBudget,
    frames_decoded: u64,
}

impl<P: PrimitiveProvider, D: Downstream> fmt::Debug for DtsDownmix<P, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DtsDownmix")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("format", &self.format)
            .field("params", &self.params)
            .field("configuration", &self.configuration)
            .field("error_count", &self.budget.count)
            .field("frames_decoded", &self.frames_decoded)
            .finish_non_exhaustive()
    }
}

impl<P: PrimitiveProvider, D: Downstream> DtsDownmix<P, D> {
    /// Create a new element.
    pub fn new(config: DownmixConfig, provider: P, downstream: D) -> Self {
        let negotiator = ChannelNegotiator::new(config.request_channels);
        let budget = ErrorBudget::new(config.max_errors);
        Self {
            config,
            provider,
            downstream,
            gate: Box::new(true),
            context: None,
            state: DownmixState::Uninitialized,
            format: InputFormat::default(),
            params: StreamParameters::default(),
            negotiator,
            synchronizer: FrameSynchronizer::new(),
            configuration: None,
            pending_renegotiation: false,
            budget,
            frames_decoded: 0,
        }
    }

    /// Install the switch consulted by [`DtsDownmix::start`].
    pub fn with_settings_gate(mut self, gate: impl SettingsGate + Send + 'static) -> Self {
        self.gate = Box::new(gate);
        self
    }

    /// Start a stream: check the settings gate and create a primitive context.
    pub fn start(&mut self) -> Result<()> {
        if !self.gate.downmix_enabled() {
            warn!("DTS downmix disabled by settings");
            self.state = DownmixState::Faulted;
            return Err(DownmixError::Disabled);
        }

        let context = match self.provider.init(self.config.accel) {
            Ok(context) => context,
            Err(err) => {
                warn!("Failed to initialize decode primitive: {}", err);
                self.state = DownmixState::Faulted;
                return Err(match err {
                    DownmixError::PrimitiveInit(_) => err,
                    other => DownmixError::PrimitiveInit(other.to_string()),
                });
            }
        };

        self.context = Some(context);
        self.params = StreamParameters::default();
        self.negotiator = ChannelNegotiator::new(self.config.request_channels);
        self.synchronizer.reset();
        self.configuration = None;
        self.pending_renegotiation = false;
        self.budget = ErrorBudget::new(self.config.max_errors);
        self.frames_decoded = 0;
        self.state = DownmixState::Ready;

        info!(
            "DTS downmix started (accel {:?}, max errors {})",
            self.config.accel, self.config.max_errors
        );
        Ok(())
    }

    /// Stop the stream and release the primitive context.
    pub fn stop(&mut self) {
        self.context = None;
        self.state = DownmixState::Stopped;
        info!(
            "DTS downmix stopped after {} frames ({} decode errors)",
            self.frames_decoded, self.budget.total
        );
    }

    /// Select the input flavor.
    pub fn set_format(&mut self, format: InputFormat) {
        if format == InputFormat::DvdPrivate {
            info!("DVD private stream mode");
        }
        self.format = format;
    }

    /// Input flavor.
    pub fn input_format(&self) -> InputFormat {
        self.format
    }

    /// Locate the next frame in `window`.
    pub fn parse(&mut self, window: &[u8]) -> Result<SyncOutcome> {
        self.check_running()?;
        let context = self.context.as_mut().ok_or(DownmixError::NotStarted)?;
        Ok(self.synchronizer.find_frame(context, window, &self.params))
    }

    /// Decode one complete frame.
    ///
    /// Returns `Ok(None)` when the primitive rejected the frame and the error
    /// budget absorbed it. Fatal errors leave the element
    /// [`DownmixState::Faulted`].
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<Option<PcmBuffer>> {
        self.check_running()?;

        self.state = DownmixState::Decoding;
        let result = self.decode_frame(frame);
        self.state = match &result {
            Err(err) if err.is_fatal() => {
                warn!("Fatal stream error: {}", err);
                DownmixState::Faulted
            }
            _ => DownmixState::Ready,
        };
        result
    }

    fn check_running(&self) -> Result<()> {
        match self.state {
            DownmixState::Ready | DownmixState::Decoding => Ok(()),
            DownmixState::Faulted => Err(DownmixError::Faulted),
            DownmixState::Uninitialized | DownmixState::Stopped => Err(DownmixError::NotStarted),
        }
    }

    fn decode_frame(&mut self, frame: &[u8]) -> Result<Option<PcmBuffer>> {
        let context = self.context.as_mut().ok_or(DownmixError::NotStarted)?;

        let info = context
            .sync_info(frame)
            .map(|info| apply_hints(info, &self.params))
            .ok_or(DownmixError::SyncLost { offset: 0 })?;
        if info.frame_length != frame.len() {
            return Err(DownmixError::FrameLengthMismatch {
                expected: info.frame_length,
                actual: frame.len(),
            });
        }

        // Stream parameters
        let previous = self.params;
        self.negotiator.observe(info.flags);
        if self.params.sample_rate != Some(info.sample_rate) {
            self.params.sample_rate = Some(info.sample_rate);
            self.pending_renegotiation = true;
        }
        self.params.stream_channels = Some(info.flags.layout());
        if self.params.bit_rate != info.bit_rate {
            self.params.bit_rate = info.bit_rate;
            if let Some(bitrate) = info.bit_rate.tag_value() {
                debug!("Bitrate tag: {}", bitrate);
                self.downstream.tags(&StreamTags {
                    bitrate: Some(bitrate),
                });
            }
        }
        if self.params != previous {
            self.downstream.stream_parameters_changed(&self.params);
        }

        // Downmix target
        let downstream = &mut self.downstream;
        let mut flags = self.negotiator.choose(info.flags, self.params.stream_channels, || {
            downstream.allowed_channels()
        });
        flags |= ChannelFlags::ADJUST_LEVEL;

        let mut level = UNITY_LEVEL;
        if let Err(err) = context.frame(frame, &mut flags, &mut level, ZERO_BIAS) {
            debug!("dts_frame error: {}", err);
            self.budget.record(DownmixError::FrameDecode)?;
            return Ok(None);
        }

        let achieved = flags.layout();
        if self.negotiator.settle(achieved) {
            self.pending_renegotiation = true;
        }

        let sample_rate = info.sample_rate;
        if self.pending_renegotiation || self.configuration.is_none() {
            debug!(
                "Renegotiating: sample_rate:{} stream_chans:{} using_chans:{}",
                sample_rate,
                info.flags.layout(),
                achieved
            );
            self.configuration = Some(renegotiate(&mut self.downstream, sample_rate, achieved)?);
            self.pending_renegotiation = false;
        }

        if !self.config.drc {
            context.set_dynamic_range(false);
        }

        let configuration = self
            .configuration
            .as_ref()
            .ok_or(DownmixError::InvalidChannelLayout(achieved.bits()))?;
        let chans = configuration.channel_count();

        // One block is 256 samples per channel
        let blocks = context.blocks_num();
        let mut output = PcmBuffer::silent(chans, sample_rate, blocks);
        for block in 0..blocks {
            match context.block() {
                Ok(()) if context.samples().len() >= BLOCK_SAMPLES * chans => {
                    configuration
                        .reorder_map
                        .interleave_block(context.samples(), output.block_mut(block));
                }
                Ok(()) => {
                    debug!(
                        "Short block {}: {} samples for {} channels",
                        block,
                        context.samples().len(),
                        chans
                    );
                    self.budget.record(DownmixError::BlockDecode { block })?;
                }
                Err(err) => {
                    debug!("dts_block error: {}", err);
                    self.budget.record(DownmixError::BlockDecode { block })?;
                }
            }
        }

        output.discont = self.budget.take_discont();
        self.budget.success();
        self.frames_decoded += 1;
        Ok(Some(output))
    }

    /// Set a property by name.
    pub fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        self.config.set_property(name, value)?;
        if name == PROP_REQUEST_CHANNELS {
            self.negotiator.set_request(self.config.request_channels);
        }
        debug!("Property {} set to {}", name, value);
        Ok(())
    }

    /// Read a property by name.
    pub fn property(&self, name: &str) -> Result<PropertyValue> {
        self.config.property(name)
    }

    /// Check if dynamic range compression is applied.
    pub fn drc(&self) -> bool {
        self.config.drc
    }

    /// Enable or disable dynamic range compression.
    pub fn set_drc(&mut self, drc: bool) {
        self.config.drc = drc;
    }

    /// Force or clear the output channel mask.
    pub fn set_request_channels(&mut self, request: Option<ChannelFlags>) -> Result<()> {
        let mut config = self.config.clone();
        config.request_channels = request.map(ChannelFlags::layout);
        config.validate()?;
        self.config = config;
        self.negotiator.set_request(self.config.request_channels);
        Ok(())
    }

    /// Change the decode error budget.
    pub fn set_max_errors(&mut self, max_errors: i32) {
        self.config.max_errors = max_errors;
        self.budget.max = max_errors;
    }

    /// Current configuration.
    pub fn config(&self) -> &DownmixConfig {
        &self.config
    }

    /// Lifecycle state.
    pub fn state(&self) -> DownmixState {
        self.state
    }

    /// Parameters of the last frame.
    pub fn stream_parameters(&self) -> &StreamParameters {
        &self.params
    }

    /// Active output channel configuration.
    pub fn channel_configuration(&self) -> Option<&ChannelConfiguration> {
        self.configuration.as_ref()
    }

    /// Outstanding decode errors counted against the budget.
    pub fn error_count(&self) -> u32 {
        self.budget.count
    }

    /// Decode errors since start.
    pub fn total_errors(&self) -> u64 {
        self.budget.total
    }

    /// Frames decoded since start.
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Frame synchronizer statistics.
    pub fn synchronizer(&self) -> &FrameSynchronizer {
        &self.synchronizer
    }

    /// Downstream consumer.
    pub fn downstream(&self) -> &D {
        &self.downstream
    }

    /// Downstream consumer, mutably.
    pub fn downstream_mut(&mut self) -> &mut D {
        &mut self.downstream
    }

    /// Consume the element, returning the downstream consumer.
    pub fn into_downstream(self) -> D {
        self.downstream
    }
}

fn renegotiate<D: Downstream>(
    downstream: &mut D,
    sample_rate: u32,
    flags: ChannelFlags,
) -> Result<ChannelConfiguration> {
    let configuration = ChannelConfiguration::from_flags(flags)?;
    let channels = configuration.channel_count();

    info!("Renegotiate: channels={}, rate={}", channels, sample_rate);

    let format = OutputFormat {
        sample_format: SAMPLE_FORMAT,
        sample_rate,
        channels,
        positions: (channels > 1).then(|| configuration.canonical.clone()),
    };
    downstream.accept_format(&format).map_err(|err| {
        warn!("Downstream rejected {} channels at {} Hz: {}", channels, sample_rate, err);
        match err {
            DownmixError::Negotiation(reason) => DownmixError::Negotiation(reason),
            other => DownmixError::Negotiation(other.to_string()),
        }
    })?;

    Ok(configuration)
}
