//! Integration tests for the frame decode orchestrator.

mod common;

use common::*;
use dtsdownmix::{
    ChannelCaps, ChannelFlags, ChannelPosition, DownmixConfig, DownmixError, DownmixState,
    PropertyValue, Sample, SampleFormat, BLOCK_SAMPLES, SAMPLE_FORMAT,
};

#[test]
fn test_first_frame_negotiates_5_1() {
    let mut element = started(
        MockProvider::new(),
        Recorder::with_caps(ChannelCaps::Range { min: 1, max: 6 }),
    );

    let pcm = element
        .handle_frame(&dts_frame(surround_5_1(), 48000))
        .unwrap()
        .unwrap();

    let formats = &element.downstream().formats;
    assert_eq!(formats.len(), 1);
    assert_eq!(formats[0].channels, 6);
    assert_eq!(formats[0].sample_rate, 48000);
    assert_eq!(formats[0].sample_format, SAMPLE_FORMAT);
    assert_eq!(
        formats[0].positions.as_deref(),
        Some(
            &[
                ChannelPosition::FrontLeft,
                ChannelPosition::FrontRight,
                ChannelPosition::FrontCenter,
                ChannelPosition::Lfe1,
                ChannelPosition::RearLeft,
                ChannelPosition::RearRight,
            ][..]
        )
    );

    assert_eq!(pcm.channels, 6);
    assert_eq!(pcm.sample_rate, 48000);
    assert_eq!(pcm.samples.len(), BLOCK_SAMPLES * 6 * 2);
}

#[test]
fn test_output_is_reordered() {
    let mut element = started(
        MockProvider::new(),
        Recorder::with_caps(ChannelCaps::Range { min: 1, max: 6 }),
    );
    let pcm = element
        .handle_frame(&dts_frame(surround_5_1(), 48000))
        .unwrap()
        .unwrap();

    // Decode order C, L, R, SL, SR, LFE
    let map = [2, 0, 1, 4, 5, 3];
    assert_eq!(
        element.channel_configuration().unwrap().reorder_map.as_slice(),
        &map
    );
    for block in 0..2 {
        let base = block * BLOCK_SAMPLES * 6;
        for n in 0..BLOCK_SAMPLES {
            for (c, &dest) in map.iter().enumerate() {
                assert_eq!(pcm.samples[base + n * 6 + dest], sample_value(c, n));
            }
        }
    }
}

#[test]
fn test_downmix_to_stereo() {
    let provider = MockProvider::new();
    let log = provider.log.clone();
    let mut element = started(provider, Recorder::with_caps(ChannelCaps::Range { min: 1, max: 2 }));

    let pcm = element
        .handle_frame(&dts_frame(surround_5_1(), 48000))
        .unwrap()
        .unwrap();

    assert_eq!(pcm.channels, 2);
    assert_eq!(element.downstream().channel_history(), vec![2]);
    assert_eq!(
        log.borrow().requests,
        vec![ChannelFlags::STEREO | ChannelFlags::ADJUST_LEVEL]
    );
    // Stereo needs no reordering.
    assert_eq!(pcm.samples[0], sample_value(0, 0));
    assert_eq!(pcm.samples[1], sample_value(1, 0));
}

#[test]
fn test_no_renegotiation_for_identical_frames() {
    let mut element = started(
        MockProvider::new(),
        Recorder::with_caps(ChannelCaps::Range { min: 1, max: 6 }),
    );
    let frame = dts_frame(surround_5_1(), 48000);
    for _ in 0..5 {
        assert!(element.handle_frame(&frame).unwrap().is_some());
    }
    assert_eq!(element.downstream().formats.len(), 1);
    assert_eq!(element.downstream().queries, 1);
    assert_eq!(element.frames_decoded(), 5);
}

#[test]
fn test_alternating_layouts_renegotiate_once_per_transition() {
    let mut element = started(
        MockProvider::new(),
        Recorder::with_caps(ChannelCaps::Range { min: 1, max: 6 }),
    );
    let stereo = dts_frame(ChannelFlags::STEREO, 48000);
    let surround = dts_frame(surround_5_1(), 48000);

    let mut channels = Vec::new();
    for frame in [&stereo, &surround, &surround, &stereo, &stereo, &surround] {
        let pcm = element.handle_frame(frame).unwrap().unwrap();
        channels.push(pcm.channels);
    }

    assert_eq!(channels, vec![2, 6, 6, 2, 2, 6]);
    assert_eq!(element.downstream().channel_history(), vec![2, 6, 2, 6]);
}

#[test]
fn test_sample_rate_change_renegotiates() {
    let mut element = started(
        MockProvider::new(),
        Recorder::with_caps(ChannelCaps::Range { min: 1, max: 6 }),
    );
    element.handle_frame(&dts_frame(ChannelFlags::STEREO, 48000)).unwrap();
    element.handle_frame(&dts_frame(ChannelFlags::STEREO, 48000)).unwrap();
    element.handle_frame(&dts_frame(ChannelFlags::STEREO, 44100)).unwrap();

    let rates: Vec<u32> = element
        .downstream()
        .formats
        .iter()
        .map(|format| format.sample_rate)
        .collect();
    assert_eq!(rates, vec![48000, 44100]);
    assert_eq!(element.stream_parameters().sample_rate, Some(44100));
}

#[test]
fn test_mono_output_has_no_positions() {
    let mut element = started(
        MockProvider::new(),
        Recorder::with_caps(ChannelCaps::Fixed(1)),
    );
    let pcm = element
        .handle_frame(&dts_frame(ChannelFlags::STEREO, 48000))
        .unwrap()
        .unwrap();
    assert_eq!(pcm.channels, 1);
    assert_eq!(element.downstream().formats[0].positions, None);
}

#[test]
fn test_no_caps_uses_stream_layout() {
    let mut element = started(MockProvider::new(), Recorder::default());
    let pcm = element
        .handle_frame(&dts_frame(ChannelFlags::FRONT2_REAR1, 48000))
        .unwrap()
        .unwrap();
    assert_eq!(pcm.channels, 3);
    assert_eq!(element.downstream().queries, 1);
}

#[test]
fn test_override_skips_query() {
    let provider = MockProvider::new();
    let log = provider.log.clone();
    let config = DownmixConfig::default().with_request_channels(ChannelFlags::STEREO);
    let mut element = started_with(
        config,
        provider,
        Recorder::with_caps(ChannelCaps::Range { min: 1, max: 6 }),
    );

    for _ in 0..3 {
        let pcm = element
            .handle_frame(&dts_frame(surround_5_1(), 48000))
            .unwrap()
            .unwrap();
        assert_eq!(pcm.channels, 2);
    }
    assert_eq!(element.downstream().queries, 0);
    assert!(log
        .borrow()
        .requests
        .iter()
        .all(|&flags| flags == ChannelFlags::STEREO | ChannelFlags::ADJUST_LEVEL));
}

#[test]
fn test_clearing_override_requeries() {
    let config = DownmixConfig::default().with_request_channels(ChannelFlags::STEREO);
    let mut element = started_with(
        config,
        MockProvider::new(),
        Recorder::with_caps(ChannelCaps::Range { min: 1, max: 6 }),
    );
    let frame = dts_frame(surround_5_1(), 48000);

    element.handle_frame(&frame).unwrap();
    element
        .set_property("request-channels", PropertyValue::Int(-1))
        .unwrap();
    let pcm = element.handle_frame(&frame).unwrap().unwrap();

    assert_eq!(pcm.channels, 6);
    assert_eq!(element.downstream().queries, 1);
    assert_eq!(element.downstream().channel_history(), vec![2, 6]);
}

#[test]
fn test_block_error_marks_discont() {
    let provider = MockProvider::new().failing_blocks(&[(0, 1)]);
    let mut element = started(provider, Recorder::with_caps(ChannelCaps::Range { min: 1, max: 2 }));
    let frame = dts_frame(ChannelFlags::STEREO, 48000);

    let pcm = element.handle_frame(&frame).unwrap().unwrap();
    assert!(pcm.discont);
    assert_eq!(element.error_count(), 0);
    assert_eq!(element.total_errors(), 1);
    // The failed block stays silent, the good one is filled.
    assert_eq!(pcm.samples[0], sample_value(0, 0));
    assert!(pcm.samples[BLOCK_SAMPLES * 2..].iter().all(|&s| s == 0 as Sample));

    let pcm = element.handle_frame(&frame).unwrap().unwrap();
    assert!(!pcm.discont);
    assert_eq!(element.state(), DownmixState::Ready);
}

#[test]
fn test_frame_error_is_absorbed() {
    let provider = MockProvider::new().failing_frames(&[0]);
    let mut element = started(provider, Recorder::with_caps(ChannelCaps::Range { min: 1, max: 2 }));
    let frame = dts_frame(ChannelFlags::STEREO, 48000);

    assert!(element.handle_frame(&frame).unwrap().is_none());
    assert_eq!(element.error_count(), 1);
    assert!(element.downstream().formats.is_empty());

    let pcm = element.handle_frame(&frame).unwrap().unwrap();
    assert!(pcm.discont);
    assert_eq!(element.error_count(), 0);
    assert_eq!(element.downstream().channel_history(), vec![2]);
}

#[test]
fn test_error_budget_exceeded_faults() {
    let provider = MockProvider::new().failing_frames(&[0, 1, 2]);
    let config = DownmixConfig::default().with_max_errors(2);
    let mut element = started_with(config, provider, Recorder::default());
    let frame = dts_frame(ChannelFlags::STEREO, 48000);

    assert!(element.handle_frame(&frame).unwrap().is_none());
    assert!(element.handle_frame(&frame).unwrap().is_none());
    match element.handle_frame(&frame) {
        Err(DownmixError::TooManyErrors { count: 3, max: 2, last }) => {
            assert!(matches!(*last, DownmixError::FrameDecode));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(element.state(), DownmixState::Faulted);
    assert!(matches!(element.handle_frame(&frame), Err(DownmixError::Faulted)));
}

#[test]
fn test_unlimited_error_budget() {
    let failing: Vec<usize> = (0..50).collect();
    let provider = MockProvider::new().failing_frames(&failing);
    let config = DownmixConfig::default().with_max_errors(-1);
    let mut element = started_with(config, provider, Recorder::default());
    let frame = dts_frame(ChannelFlags::STEREO, 48000);

    for _ in 0..50 {
        assert!(element.handle_frame(&frame).unwrap().is_none());
    }
    assert!(element.handle_frame(&frame).unwrap().is_some());
}

#[test]
fn test_block_errors_exhaust_budget() {
    let provider = MockProvider::new().failing_blocks(&[(0, 0), (0, 1)]);
    let config = DownmixConfig::default().with_max_errors(1);
    let mut element = started_with(config, provider, Recorder::default());

    match element.handle_frame(&dts_frame(ChannelFlags::STEREO, 48000)) {
        Err(DownmixError::TooManyErrors { count: 2, max: 1, last }) => {
            assert!(matches!(*last, DownmixError::BlockDecode { block: 1 }));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(element.state(), DownmixState::Faulted);
}

#[test]
fn test_unresolvable_layout_rejects_frame() {
    let mut element = started(MockProvider::new(), Recorder::default());
    let stereo = dts_frame(ChannelFlags::STEREO, 48000);
    let dual_mono = dts_frame(ChannelFlags::from_bits(1), 48000);

    assert!(element.handle_frame(&stereo).unwrap().is_some());

    let err = element.handle_frame(&dual_mono).unwrap_err();
    assert!(matches!(err, DownmixError::InvalidChannelLayout(1)));
    assert!(!err.is_fatal());
    assert_eq!(element.state(), DownmixState::Ready);
    assert_eq!(element.frames_decoded(), 1);

    // The next decodable frame renegotiates and decodes.
    let pcm = element.handle_frame(&stereo).unwrap().unwrap();
    assert_eq!(pcm.channels, 2);
    assert_eq!(element.downstream().channel_history(), vec![2, 2]);
    assert_eq!(element.frames_decoded(), 2);
}

#[test]
fn test_headerless_frame_is_rejected() {
    let mut element = started(MockProvider::new(), Recorder::default());

    let err = element.handle_frame(&[0u8; FRAME_SIZE]).unwrap_err();
    assert!(matches!(err, DownmixError::SyncLost { offset: 0 }));
    assert!(err.is_recoverable());
    assert_eq!(element.state(), DownmixState::Ready);

    assert!(element
        .handle_frame(&dts_frame(ChannelFlags::STEREO, 48000))
        .unwrap()
        .is_some());
}

#[test]
fn test_negotiation_failure_is_fatal() {
    let mut element = started(MockProvider::new(), Recorder::rejecting());
    let frame = dts_frame(ChannelFlags::STEREO, 48000);

    let err = element.handle_frame(&frame).unwrap_err();
    assert!(matches!(err, DownmixError::Negotiation(_)));
    assert!(err.is_fatal());
    assert_eq!(element.state(), DownmixState::Faulted);
    assert!(matches!(element.handle_frame(&frame), Err(DownmixError::Faulted)));

    // A restart recovers once downstream accepts again.
    element.downstream_mut().reject = false;
    element.start().unwrap();
    assert!(element.handle_frame(&frame).unwrap().is_some());
}

#[test]
fn test_frame_length_mismatch() {
    let mut element = started(MockProvider::new(), Recorder::default());
    let frame = dts_frame(ChannelFlags::STEREO, 48000);

    let result = element.handle_frame(&frame[..FRAME_SIZE - 10]);
    assert!(matches!(
        result,
        Err(DownmixError::FrameLengthMismatch { expected: 512, actual: 502 })
    ));
    assert_eq!(element.state(), DownmixState::Faulted);
}

#[test]
fn test_drc_disabled_by_default() {
    let provider = MockProvider::new();
    let log = provider.log.clone();
    let mut element = started(provider, Recorder::default());
    let frame = dts_frame(ChannelFlags::STEREO, 48000);

    element.handle_frame(&frame).unwrap();
    assert_eq!(log.borrow().drc_calls, vec![false]);

    element.set_property("drc", PropertyValue::Bool(true)).unwrap();
    element.handle_frame(&frame).unwrap();
    assert_eq!(log.borrow().drc_calls, vec![false]);
}

#[test]
fn test_bitrate_tags() {
    let mut element = started(MockProvider::new(), Recorder::default());

    element
        .handle_frame(&dts_frame_sized(FRAME_SIZE, ChannelFlags::STEREO, 48000, RATE_768K))
        .unwrap();
    element
        .handle_frame(&dts_frame_sized(FRAME_SIZE, ChannelFlags::STEREO, 48000, RATE_768K))
        .unwrap();
    element
        .handle_frame(&dts_frame_sized(FRAME_SIZE, ChannelFlags::STEREO, 48000, RATE_OPEN))
        .unwrap();

    let tags = &element.downstream().tags;
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].bitrate, Some(768_000));
}

#[test]
fn test_stream_parameters_hook() {
    let mut element = started(MockProvider::new(), Recorder::default());
    let frame = dts_frame(surround_5_1(), 48000);
    element.handle_frame(&frame).unwrap();
    element.handle_frame(&frame).unwrap();

    let params = &element.downstream().params;
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].sample_rate, Some(48000));
    assert_eq!(params[0].stream_channels, Some(surround_5_1()));
}

#[test]
fn test_restart_resets_stream_state() {
    let provider = MockProvider::new();
    let log = provider.log.clone();
    let mut element = started(provider, Recorder::with_caps(ChannelCaps::Range { min: 1, max: 6 }));
    let frame = dts_frame(ChannelFlags::STEREO, 48000);

    element.handle_frame(&frame).unwrap();
    element.stop();
    element.start().unwrap();
    element.handle_frame(&frame).unwrap();

    assert_eq!(log.borrow().inits, 2);
    assert_eq!(element.downstream().channel_history(), vec![2, 2]);
    assert_eq!(element.frames_decoded(), 1);
}

#[test]
fn test_sample_format_matches_features() {
    #[cfg(not(any(feature = "fixed", feature = "double")))]
    assert_eq!(SAMPLE_FORMAT, SampleFormat::F32);
    #[cfg(feature = "fixed")]
    assert_eq!(SAMPLE_FORMAT, SampleFormat::S16);
    #[cfg(feature = "double")]
    assert_eq!(SAMPLE_FORMAT, SampleFormat::F64);
}
