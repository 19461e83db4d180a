//! FFI bindings for DTS decoding via libdca.
//!
//! Wraps the libdca C API behind [`DecodePrimitive`] so the pipeline can
//! drive it like any other decode primitive. The sample type must match the
//! libdca build: float by default, `fixed` for a fixed-point build, `double`
//! for a double-precision build.
//!
//! # Safety
//!
//! All libdca functions are inherently unsafe. This module owns the state
//! pointer, keeps the frame bytes alive while blocks are decoded, and frees
//! the state on drop.

#![allow(non_camel_case_types)]

use std::os::raw::{c_int, c_void};
use std::ptr::{self, NonNull};
use std::slice;

use tracing::debug;

use crate::primitive::{AccelFlags, DecodePrimitive, PrimitiveError, PrimitiveProvider};
use crate::sample::Sample;
use crate::types::{BitRate, ChannelFlags, SyncInfo};
use crate::{DownmixError, Result, BLOCK_SAMPLES};

/// Samples in the buffer returned by `dca_samples`.
const SAMPLE_BUFFER_LEN: usize = BLOCK_SAMPLES * 12;

/// Zero padding appended to buffers handed to libdca, which reads ahead.
const READ_PADDING: usize = 16;

#[repr(C)]
struct dca_state_t {
    _private: [u8; 0],
}

type dca_dynrng_fn = extern "C" fn(Sample, *mut c_void) -> Sample;

#[link(name = "dca")]
extern "C" {
    fn dca_init(mm_accel: u32) -> *mut dca_state_t;
    fn dca_free(state: *mut dca_state_t);
    fn dca_syncinfo(
        state: *mut dca_state_t,
        buf: *mut u8,
        flags: *mut c_int,
        sample_rate: *mut c_int,
        bit_rate: *mut c_int,
        frame_length: *mut c_int,
    ) -> c_int;
    fn dca_frame(
        state: *mut dca_state_t,
        buf: *mut u8,
        flags: *mut c_int,
        level: *mut Sample,
        bias: Sample,
    ) -> c_int;
    fn dca_dynrng(state: *mut dca_state_t, call: Option<dca_dynrng_fn>, data: *mut c_void);
    fn dca_blocks_num(state: *mut dca_state_t) -> c_int;
    fn dca_block(state: *mut dca_state_t) -> c_int;
    fn dca_samples(state: *mut dca_state_t) -> *mut Sample;
}

extern "C" fn dynrng_passthrough(range: Sample, _data: *mut c_void) -> Sample {
    range
}

/// Creates libdca contexts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibDca;

impl PrimitiveProvider for LibDca {
    type Context = LibDcaContext;

    fn init(&mut self, accel: AccelFlags) -> Result<LibDcaContext> {
        LibDcaContext::new(accel)
    }
}

/// One libdca decoder state.
pub struct LibDcaContext {
    state: NonNull<dca_state_t>,
    samples: NonNull<Sample>,
    /// Frame being decoded; libdca reads from it until the last block.
    frame: Vec<u8>,
    /// Scratch buffer for header probes.
    probe: [u8; 16 + READ_PADDING],
}

// SAFETY: The libdca state is only accessed through &mut self.
unsafe impl Send for LibDcaContext {}

impl LibDcaContext {
    /// Create a new libdca state.
    pub fn new(accel: AccelFlags) -> Result<Self> {
        // SAFETY: dca_init has no preconditions.
        let state = unsafe { dca_init(accel.bits()) };
        let state = NonNull::new(state)
            .ok_or_else(|| DownmixError::PrimitiveInit("dca_init returned null".into()))?;

        // SAFETY: state is a live libdca state.
        let samples = unsafe { dca_samples(state.as_ptr()) };
        let samples = match NonNull::new(samples) {
            Some(samples) => samples,
            None => {
                // SAFETY: state came from dca_init and is not used afterwards.
                unsafe { dca_free(state.as_ptr()) };
                return Err(DownmixError::PrimitiveInit("dca_samples returned null".into()));
            }
        };

        debug!("libdca initialized (accel {:?})", accel);
        Ok(Self {
            state,
            samples,
            frame: Vec::new(),
            probe: [0; 16 + READ_PADDING],
        })
    }
}

impl DecodePrimitive for LibDcaContext {
    fn sync_info(&mut self, data: &[u8]) -> Option<SyncInfo> {
        let len = data.len().min(16);
        self.probe = [0; 16 + READ_PADDING];
        self.probe[..len].copy_from_slice(&data[..len]);

        let mut flags: c_int = 0;
        let mut sample_rate: c_int = 0;
        let mut bit_rate: c_int = 0;
        let mut frame_length: c_int = 0;
        // SAFETY: probe is a padded, writable buffer; out-pointers are valid.
        let length = unsafe {
            dca_syncinfo(
                self.state.as_ptr(),
                self.probe.as_mut_ptr(),
                &mut flags,
                &mut sample_rate,
                &mut bit_rate,
                &mut frame_length,
            )
        };
        if length <= 0 {
            return None;
        }

        Some(SyncInfo {
            frame_length: length as usize,
            flags: ChannelFlags::from_bits(flags as u32),
            sample_rate: sample_rate.max(0) as u32,
            bit_rate: BitRate::from_raw(bit_rate),
        })
    }

    fn frame(
        &mut self,
        data: &[u8],
        flags: &mut ChannelFlags,
        level: &mut Sample,
        bias: Sample,
    ) -> std::result::Result<(), PrimitiveError> {
        self.frame.clear();
        self.frame.extend_from_slice(data);
        self.frame.resize(data.len() + READ_PADDING, 0);

        let mut raw_flags = flags.bits() as c_int;
        // SAFETY: self.frame outlives every dca_block call for this frame;
        // flags and level point to valid locals.
        let ret = unsafe {
            dca_frame(
                self.state.as_ptr(),
                self.frame.as_mut_ptr(),
                &mut raw_flags,
                level,
                bias,
            )
        };
        if ret != 0 {
            return Err(PrimitiveError(format!("dca_frame returned {}", ret)));
        }

        *flags = ChannelFlags::from_bits(raw_flags as u32);
        Ok(())
    }

    fn blocks_num(&self) -> usize {
        // SAFETY: state is a live libdca state.
        let blocks = unsafe { dca_blocks_num(self.state.as_ptr()) };
        blocks.max(0) as usize
    }

    fn block(&mut self) -> std::result::Result<(), PrimitiveError> {
        // SAFETY: state is live and dca_frame's buffer is still held in self.frame.
        let ret = unsafe { dca_block(self.state.as_ptr()) };
        if ret != 0 {
            return Err(PrimitiveError(format!("dca_block returned {}", ret)));
        }
        Ok(())
    }

    fn samples(&self) -> &[Sample] {
        // SAFETY: libdca allocates 256 * 12 samples with the state and keeps
        // the buffer until dca_free.
        unsafe { slice::from_raw_parts(self.samples.as_ptr(), SAMPLE_BUFFER_LEN) }
    }

    fn set_dynamic_range(&mut self, enabled: bool) {
        let call: Option<dca_dynrng_fn> = if enabled {
            Some(dynrng_passthrough)
        } else {
            None
        };
        // SAFETY: state is live; the callback ignores its data pointer.
        unsafe { dca_dynrng(self.state.as_ptr(), call, ptr::null_mut()) };
    }
}

impl Drop for LibDcaContext {
    fn drop(&mut self) {
        // SAFETY: state came from dca_init and is freed exactly once.
        unsafe { dca_free(self.state.as_ptr()) };
    }
}

impl std::fmt::Debug for LibDcaContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibDcaContext")
            .field("frame_len", &self.frame.len())
            .finish_non_exhaustive()
    }
}
