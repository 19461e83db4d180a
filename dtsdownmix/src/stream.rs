//! Push-driven stream decoding.
//!
//! [`StreamDecoder`] plays the host side of [`DtsDownmix`]: it accumulates
//! input bytes, strips DVD packet prefixes when that mode is active, finds
//! frames with `parse`, discards garbage, and feeds exact frames to
//! `handle_frame`.
//!
//! A frame the element rejects without faulting (for example one with an
//! unresolvable channel layout) is dropped and decoding continues with the
//! next frame. PCM already produced in a push is kept when a later frame
//! faults the element; use [`StreamDecoder::push_into`] to receive it.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::decoder::{Downstream, DtsDownmix};
use crate::dvd::DvdSplitter;
use crate::primitive::PrimitiveProvider;
use crate::sample::PcmBuffer;
use crate::sync::SyncOutcome;
use crate::types::{InputBuffer, InputFormat};
use crate::Result;

/// Pending input bytes and the timestamps that arrived with them.
#[derive(Debug, Default)]
struct FrameAssembler {
    pending: BytesMut,
    /// Stream offset of `pending[0]`.
    base: u64,
    /// Stream offset where each timestamped unit began.
    timestamps: VecDeque<(u64, Duration)>,
}

impl FrameAssembler {
    fn push(&mut self, unit: InputBuffer) {
        if unit.is_empty() {
            return;
        }
        if let Some(timestamp) = unit.timestamp {
            let offset = self.base + self.pending.len() as u64;
            self.timestamps.push_back((offset, timestamp));
        }
        self.pending.extend_from_slice(&unit.data);
    }

    fn window(&self) -> &[u8] {
        &self.pending
    }

    fn discard(&mut self, count: usize) {
        self.pending.advance(count);
        self.base += count as u64;
    }

    /// Timestamp of the unit the next byte belongs to, unless a previous
    /// frame already claimed it.
    fn claim_timestamp(&mut self) -> Option<Duration> {
        let mut claimed = None;
        while let Some(&(offset, timestamp)) = self.timestamps.front() {
            if offset > self.base {
                break;
            }
            claimed = Some(timestamp);
            self.timestamps.pop_front();
        }
        claimed
    }

    fn take(&mut self, count: usize) -> Bytes {
        self.base += count as u64;
        self.pending.split_to(count).freeze()
    }

    fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.base += dropped as u64;
        self.pending.clear();
        self.timestamps.clear();
        dropped
    }
}

/// Drives a [`DtsDownmix`] from a byte stream.
#[derive(Debug)]
pub struct StreamDecoder<P: PrimitiveProvider, D: Downstream> {
    element: DtsDownmix<P, D>,
    splitter: DvdSplitter,
    assembler: FrameAssembler,
    frames_rejected: u64,
}

impl<P: PrimitiveProvider, D: Downstream> StreamDecoder<P, D> {
    /// Create a new stream decoder around `element`.
    pub fn new(element: DtsDownmix<P, D>) -> Self {
        Self {
            element,
            splitter: DvdSplitter::new(),
            assembler: FrameAssembler::default(),
            frames_rejected: 0,
        }
    }

    /// Start the stream.
    pub fn start(&mut self) -> Result<()> {
        self.assembler.clear();
        self.frames_rejected = 0;
        self.element.start()
    }

    /// Stop the stream, dropping pending bytes.
    pub fn stop(&mut self) {
        self.assembler.clear();
        self.element.stop();
    }

    /// Push one input buffer and return the PCM it completed.
    pub fn push(&mut self, input: InputBuffer) -> Result<Vec<PcmBuffer>> {
        let mut output = Vec::new();
        self.push_into(input, &mut output)?;
        Ok(output)
    }

    /// Push one input buffer, appending PCM to `output` as each frame decodes.
    ///
    /// On error `output` still holds every frame decoded before the failure.
    pub fn push_into(&mut self, input: InputBuffer, output: &mut Vec<PcmBuffer>) -> Result<()> {
        let element = &mut self.element;
        let assembler = &mut self.assembler;
        let rejected = &mut self.frames_rejected;
        match element.input_format() {
            InputFormat::Dts => Self::feed(element, assembler, rejected, input, output),
            InputFormat::DvdPrivate => self.splitter.forward(&input, |unit| {
                Self::feed(element, assembler, rejected, unit, output)
            }),
        }
    }

    fn feed(
        element: &mut DtsDownmix<P, D>,
        assembler: &mut FrameAssembler,
        rejected: &mut u64,
        unit: InputBuffer,
        output: &mut Vec<PcmBuffer>,
    ) -> Result<()> {
        assembler.push(unit);

        loop {
            match element.parse(assembler.window())? {
                SyncOutcome::Frame { offset, info } => {
                    if offset > 0 {
                        debug!("Skipping {} bytes before frame", offset);
                    }
                    assembler.discard(offset);
                    let timestamp = assembler.claim_timestamp();
                    let frame = assembler.take(info.frame_length);
                    match element.handle_frame(&frame) {
                        Ok(Some(mut pcm)) => {
                            pcm.timestamp = timestamp;
                            output.push(pcm);
                        }
                        Ok(None) => {}
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => {
                            warn!("Dropping frame of {} bytes: {}", frame.len(), err);
                            *rejected += 1;
                        }
                    }
                }
                SyncOutcome::NeedMoreData { skipped } => {
                    assembler.discard(skipped);
                    return Ok(());
                }
            }
        }
    }

    /// Discard partial data at end of stream. Returns the bytes dropped.
    pub fn drain(&mut self) -> usize {
        let dropped = self.assembler.clear();
        if dropped > 0 {
            debug!("Dropping {} bytes of partial frame data", dropped);
        }
        dropped
    }

    /// Frames dropped because the element rejected them.
    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    /// Bytes waiting for a complete frame.
    pub fn pending(&self) -> usize {
        self.assembler.pending.len()
    }

    /// Wrapped element.
    pub fn element(&self) -> &DtsDownmix<P, D> {
        &self.element
    }

    /// Wrapped element, mutably.
    pub fn element_mut(&mut self) -> &mut DtsDownmix<P, D> {
        &mut self.element
    }

    /// DVD splitter statistics.
    pub fn splitter(&self) -> &DvdSplitter {
        &self.splitter
    }

    /// Consume the driver, returning the element.
    pub fn into_inner(self) -> DtsDownmix<P, D> {
        self.element
    }
}
