//! Integration tests for oss-duplex.
//!
//! Everything here runs against `MockDevice`. Tests that need a real
//! `/dev/dsp` node are marked with `#[ignore]` and should be run manually.

use std::sync::Arc;
use std::time::Duration;

use oss_duplex::device::{ControlRequest, DeviceCaps, MockDevice};
use oss_duplex::{
    event_callback, ChannelRequest, DuplexError, DuplexPump, FragmentCount, PlanarFrame,
    PumpState, SampleFormat, StreamEvent, StreamRequest, TransferDirection,
};
use parking_lot::Mutex;

fn collect_events() -> (oss_duplex::EventCallback, Arc<Mutex<Vec<StreamEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let callback = event_callback(move |event| sink.lock().push(event));
    (callback, events)
}

fn to_bytes_i32(samples: &[i32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_ne_bytes()).collect()
}

#[test]
fn test_identity_echo_is_byte_exact() {
    let device = MockDevice::full_duplex();
    let handle = device.handle();
    let request = StreamRequest::default()
        .with_channels(ChannelRequest::Exact(2))
        .with_fragment_exponent(8);

    let mut pump = DuplexPump::<_, _, i16>::new(device, request);
    let config = pump.start().unwrap().clone();
    assert_eq!(config.fragment_bytes(), 256);

    // Four whole fragments of arbitrary bytes
    let input: Vec<u8> = (0..4 * config.fragment_bytes())
        .map(|i| (i * 7 % 251) as u8)
        .collect();
    handle.push_input(&input);

    for _ in 0..4 {
        pump.step().unwrap();
    }

    assert_eq!(handle.output(), input);
    assert_eq!(pump.stats().fragments_processed, 4);
    assert_eq!(pump.stats().bytes_written, 4 * 256);
}

#[test]
fn test_stereo_fragment_splits_into_channels() {
    // 2 channels, s32, 32-byte fragments -> 8 samples, 4 per channel
    let device = MockDevice::full_duplex().grant_fragments(4, 32);
    let handle = device.handle();
    let request = StreamRequest::default()
        .with_channels(ChannelRequest::Exact(2))
        .with_sample_format(SampleFormat::Signed32);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_processor = Arc::clone(&seen);
    let mut pump = DuplexPump::<_, _, i32>::new(device, request).with_processor(
        move |frame: &mut PlanarFrame<i32>| {
            seen_in_processor
                .lock()
                .push(frame.clone().into_channels());
        },
    );
    let config = pump.start().unwrap().clone();
    assert_eq!(config.frame_sample_count(), 8);
    assert_eq!(config.per_channel_sample_count(), 4);

    let input = [0i32, 100, 1, 101, 2, 102, 3, 103];
    handle.push_samples(&input);
    pump.step().unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], vec![vec![0, 1, 2, 3], vec![100, 101, 102, 103]]);
    assert_eq!(handle.output(), to_bytes_i32(&input));
}

#[test]
fn test_three_channels_drop_trailing_sample() {
    // 3 channels, s32, 40-byte fragments -> 10 samples, 3 per channel, 1 dropped
    let device = MockDevice::full_duplex().grant_fragments(4, 40);
    let handle = device.handle();
    let request = StreamRequest::default()
        .with_channels(ChannelRequest::Exact(3))
        .with_sample_format(SampleFormat::Signed32);
    let (callback, events) = collect_events();

    let mut pump = DuplexPump::<_, _, i32>::new(device, request)
        .on_event(callback)
        .with_processor(|frame: &mut PlanarFrame<i32>| {
            assert_eq!(frame.channels(), 3);
            assert_eq!(frame.channel(0), &[0, 3, 6]);
            assert_eq!(frame.channel(1), &[1, 4, 7]);
            assert_eq!(frame.channel(2), &[2, 5, 8]);
        });
    pump.start().unwrap();
    assert!(events
        .lock()
        .contains(&StreamEvent::SamplesTruncated { per_fragment: 1 }));

    handle.push_samples(&(0..10).collect::<Vec<i32>>());
    pump.step().unwrap();

    let output = handle.output();
    assert_eq!(output.len(), 40);
    assert_eq!(&output[..36], to_bytes_i32(&(0..9).collect::<Vec<_>>()).as_slice());
    assert_eq!(pump.stats().samples_truncated, 1);
}

#[test]
fn test_rate_rejected_before_any_mutation() {
    let device = MockDevice::full_duplex();
    let handle = device.handle();
    let request = StreamRequest::default().with_sample_rate(4000);

    let mut pump = DuplexPump::<_, _, i16>::new(device, request);
    let err = pump.start().unwrap_err();

    assert!(matches!(
        err,
        DuplexError::UnsupportedRate {
            requested: 4000,
            min: 8000,
            max: 192_000
        }
    ));
    assert!(err.is_negotiation_error());
    assert!(!handle.requests().iter().any(|r| r.is_mutating()));
    assert_eq!(pump.state(), PumpState::Failed);
}

#[test]
fn test_half_duplex_device_rejected() {
    let caps = DeviceCaps {
        min_channels: 1,
        max_channels: 2,
        min_rate: 8000,
        max_rate: 48000,
        ..DeviceCaps::default()
    };
    let device = MockDevice::new(caps);
    let handle = device.handle();

    let mut pump = DuplexPump::<_, _, i16>::new(device, StreamRequest::default());
    let err = pump.start().unwrap_err();

    assert!(matches!(err, DuplexError::UnsupportedMode { .. }));
    assert!(!handle.requests().contains(&ControlRequest::SetFragment));
}

#[test]
fn test_half_duplex_allowed_when_not_required() {
    let caps = DeviceCaps {
        min_channels: 1,
        max_channels: 2,
        min_rate: 8000,
        max_rate: 48000,
        ..DeviceCaps::default()
    };
    let request = StreamRequest::default().with_duplex_required(false);
    let mut pump = DuplexPump::<_, _, i16>::new(MockDevice::new(caps), request);

    assert!(pump.start().is_ok());
}

#[test]
fn test_granted_values_reported_as_events() {
    let device = MockDevice::full_duplex()
        .grant_channels(2)
        .grant_rate(44100)
        .grant_fragments(8, 512);
    let request = StreamRequest::default()
        .with_channels(ChannelRequest::Exact(6))
        .with_fragment_count(FragmentCount::Count(4));
    let (callback, events) = collect_events();

    let mut pump = DuplexPump::<_, _, i16>::new(device, request).on_event(callback);
    let config = pump.start().unwrap().clone();

    assert_eq!(config.channels(), 2);
    assert_eq!(config.sample_rate(), 44100);
    assert_eq!(config.fragment_bytes(), 512);
    assert_eq!(config.fragment_count(), 8);

    let events = events.lock();
    assert!(events.contains(&StreamEvent::ChannelsAdjusted {
        requested: 6,
        granted: 2
    }));
    assert!(events.contains(&StreamEvent::RateAdjusted {
        requested: 48000,
        granted: 44100
    }));
    assert!(events.contains(&StreamEvent::FragmentLayoutAdjusted {
        requested_count: 4,
        requested_bytes: 1024,
        granted_count: 8,
        granted_bytes: 512
    }));
}

#[test]
fn test_block_size_fallback() {
    let device = MockDevice::full_duplex().hide_fragment_size();
    let handle = device.handle();
    let request = StreamRequest::default().with_fragment_exponent(9);

    let mut pump = DuplexPump::<_, _, i16>::new(device, request);
    let config = pump.start().unwrap().clone();

    assert_eq!(config.fragment_bytes(), 512);
    assert_eq!(handle.requests().last(), Some(&ControlRequest::BlockSize));
}

#[test]
fn test_format_mismatch_is_fatal() {
    let device = MockDevice::full_duplex().supported_formats(oss_duplex::device::afmt::S16_NE);
    let request = StreamRequest::default().with_sample_format(SampleFormat::Signed32);

    let mut pump = DuplexPump::<_, _, i32>::new(device, request);
    assert!(matches!(
        pump.start(),
        Err(DuplexError::UnsupportedFormat {
            requested: SampleFormat::Signed32,
            ..
        })
    ));
}

#[test]
fn test_processor_output_reaches_playback() {
    let device = MockDevice::full_duplex().grant_fragments(4, 16);
    let handle = device.handle();
    let request = StreamRequest::default()
        .with_channels(ChannelRequest::Exact(2))
        .with_sample_format(SampleFormat::Signed32);

    // Invert the right channel
    let mut pump = DuplexPump::<_, _, i32>::new(device, request).with_processor(
        |frame: &mut PlanarFrame<i32>| {
            for sample in frame.channel_mut(1) {
                *sample = -*sample;
            }
        },
    );
    pump.start().unwrap();

    handle.push_samples(&[1i32, 2, 3, 4]);
    pump.step().unwrap();

    assert_eq!(handle.output(), to_bytes_i32(&[1, -2, 3, -4]));
}

#[test]
fn test_run_fails_when_input_runs_dry() {
    let device = MockDevice::full_duplex().grant_fragments(4, 16);
    let handle = device.handle();
    let request = StreamRequest::default()
        .with_channels(ChannelRequest::Exact(2))
        .with_sample_format(SampleFormat::Signed32);
    let mut pump = DuplexPump::<_, _, i32>::new(device, request);

    // Two whole fragments and half of a third
    handle.push_samples(&[9i32; 10]);
    let err = pump.run().unwrap_err();

    assert!(matches!(
        err,
        DuplexError::TransferIoError {
            direction: TransferDirection::Read,
            expected: 16,
            transferred: 8,
            ..
        }
    ));
    assert_eq!(pump.state(), PumpState::Failed);
    assert_eq!(pump.stats().fragments_processed, 2);
    assert_eq!(handle.output().len(), 32);
}

#[tokio::test]
async fn test_stop_from_another_task() {
    let device = MockDevice::full_duplex().grant_fragments(4, 32);
    let handle = device.handle();
    let request = StreamRequest::default()
        .with_channels(ChannelRequest::Exact(2))
        .with_sample_format(SampleFormat::Signed32);

    // Far more input than the pump will get through before the stop
    let total_fragments = 10_000;
    handle.push_samples(&vec![1i32; 8 * total_fragments]);

    let pump = DuplexPump::<_, _, i32>::new(device, request).with_processor(
        |_: &mut PlanarFrame<i32>| std::thread::sleep(Duration::from_millis(1)),
    );
    let stop = pump.stop_handle();

    let task = tokio::task::spawn_blocking(move || {
        let mut pump = pump;
        let result = pump.run();
        (result, pump.state())
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.stop();

    let (result, state) = task.await.unwrap();
    let stats = result.unwrap();

    assert_eq!(state, PumpState::Stopped);
    assert!(stats.fragments_processed > 0);
    assert!(stats.fragments_processed < total_fragments as u64);
    assert_eq!(stats, stop.stats());
    // Only whole fragments were written
    assert_eq!(handle.output().len() as u64, stats.fragments_processed * 32);
}

#[test]
#[ignore = "requires audio hardware"]
#[cfg(all(unix, feature = "oss"))]
fn test_real_device_echo() {
    use oss_duplex::device::OssDevice;

    let device = OssDevice::open(oss_duplex::DEFAULT_DEVICE).unwrap();
    let mut pump = DuplexPump::<_, _, i16>::new(device, StreamRequest::default());
    pump.start().unwrap();

    for _ in 0..100 {
        pump.step().unwrap();
    }
    assert_eq!(pump.stats().fragments_processed, 100);
}
