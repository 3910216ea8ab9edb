//! In-memory duplex device for testing without hardware.

use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::{
    afmt, BufferInfo, Capabilities, ControlRequest, DeviceCaps, DspDevice, FRAGMENTS_UNLIMITED,
};
use crate::format::{encode_into, Sample};

/// Capture ring capacity in bytes (1 MiB).
const DEFAULT_INPUT_CAPACITY: usize = 1 << 20;

/// Fragments granted when the caller lets the device choose.
const DEFAULT_FRAGMENTS: u32 = 4;

/// Fragment size reported before any layout is requested.
const DEFAULT_FRAGMENT_BYTES: u32 = 4096;

struct MockState {
    requests: Vec<ControlRequest>,
    failing: HashSet<ControlRequest>,
    cooked: bool,
    channels: u32,
    format: u32,
    rate: u32,
    fragstotal: u32,
    fragsize: u32,
    supported_formats: u32,
    channel_grant: Option<u32>,
    rate_grant: Option<u32>,
    fragment_grant: Option<(u32, u32)>,
    report_fragsize: bool,
    input: HeapProd<u8>,
    output: Vec<u8>,
    write_limit: Option<usize>,
    write_error: bool,
}

impl MockState {
    fn record(&mut self, request: ControlRequest) -> io::Result<()> {
        self.requests.push(request);
        if self.failing.contains(&request) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("mock device rejected {request}"),
            ));
        }
        Ok(())
    }
}

/// A scripted [`DspDevice`] backed by memory.
///
/// Captured input comes from a ring buffer fed through
/// [`MockDeviceHandle::push_input`]; everything written is appended to an
/// output log. Every control request is recorded so tests can check the
/// order in which negotiation touched the device.
///
/// By default the device grants whatever is asked within its advertised
/// ranges. The `grant_*` methods force a different answer.
///
/// # Example
///
/// ```
/// use oss_duplex::device::{DeviceCaps, MockDevice};
///
/// let device = MockDevice::new(DeviceCaps::default());
/// let handle = device.handle();
/// handle.push_samples(&[1i16, 2, 3, 4]);
/// assert_eq!(handle.pending_input(), 8);
/// ```
pub struct MockDevice {
    name: String,
    caps: DeviceCaps,
    input: HeapCons<u8>,
    state: Arc<Mutex<MockState>>,
}

/// Shared view of a [`MockDevice`] that stays usable after the device has
/// been moved into a pump.
#[derive(Clone)]
pub struct MockDeviceHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    /// Creates a mock advertising `caps`.
    pub fn new(caps: DeviceCaps) -> Self {
        Self::with_capacity(caps, DEFAULT_INPUT_CAPACITY)
    }

    /// Creates a mock whose capture ring holds `capacity` bytes.
    pub fn with_capacity(caps: DeviceCaps, capacity: usize) -> Self {
        let (producer, consumer) = HeapRb::<u8>::new(capacity.max(1)).split();
        let state = MockState {
            requests: Vec::new(),
            failing: HashSet::new(),
            cooked: true,
            channels: caps.min_channels.max(1),
            format: afmt::S16_NE,
            rate: caps.min_rate,
            fragstotal: DEFAULT_FRAGMENTS,
            fragsize: DEFAULT_FRAGMENT_BYTES,
            supported_formats: afmt::S8 | afmt::S16_NE | afmt::S24_NE | afmt::S32_NE,
            channel_grant: None,
            rate_grant: None,
            fragment_grant: None,
            report_fragsize: true,
            input: producer,
            output: Vec::new(),
            write_limit: None,
            write_error: false,
        };
        Self {
            name: "mock".to_string(),
            caps,
            input: consumer,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// A full-duplex, mmap-capable device with 1..=8 channels at
    /// 8..=192 kHz.
    pub fn full_duplex() -> Self {
        Self::new(DeviceCaps {
            name: "Mock duplex engine".to_string(),
            handle: "mock0".to_string(),
            min_channels: 1,
            max_channels: 8,
            min_rate: 8000,
            max_rate: 192_000,
            latency: -1,
            caps: Capabilities(
                Capabilities::DUPLEX
                    | Capabilities::TRIGGER
                    | Capabilities::MMAP
                    | Capabilities::INPUT
                    | Capabilities::OUTPUT,
            ),
        })
    }

    /// Sets the name used in logs.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Makes `request` fail with an I/O error.
    #[must_use]
    pub fn fail_on(self, request: ControlRequest) -> Self {
        self.state.lock().failing.insert(request);
        self
    }

    /// Restricts the `AFMT_*` codes the device accepts.
    ///
    /// Requests for anything else are answered with 16-bit native endian.
    #[must_use]
    pub fn supported_formats(self, mask: u32) -> Self {
        self.state.lock().supported_formats = mask;
        self
    }

    /// Answers every channel request with `channels`.
    #[must_use]
    pub fn grant_channels(self, channels: u32) -> Self {
        self.state.lock().channel_grant = Some(channels);
        self
    }

    /// Answers every rate request with `rate`.
    #[must_use]
    pub fn grant_rate(self, rate: u32) -> Self {
        self.state.lock().rate_grant = Some(rate);
        self
    }

    /// Ignores the requested layout and grants `count` fragments of
    /// `fragment_bytes` bytes.
    #[must_use]
    pub fn grant_fragments(self, count: u32, fragment_bytes: u32) -> Self {
        self.state.lock().fragment_grant = Some((count, fragment_bytes));
        self
    }

    /// Reports a zero fragment size in buffer info, forcing callers to ask
    /// for the block size.
    #[must_use]
    pub fn hide_fragment_size(self) -> Self {
        self.state.lock().report_fragsize = false;
        self
    }

    /// Accepts at most `limit` bytes per write call.
    #[must_use]
    pub fn limit_writes(self, limit: usize) -> Self {
        self.state.lock().write_limit = Some(limit);
        self
    }

    /// Makes every write fail with an I/O error.
    #[must_use]
    pub fn fail_writes(self) -> Self {
        self.state.lock().write_error = true;
        self
    }

    /// Returns a handle for feeding input and inspecting the device.
    pub fn handle(&self) -> MockDeviceHandle {
        MockDeviceHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl MockDeviceHandle {
    /// Queues raw capture bytes. Returns how many fit in the ring.
    pub fn push_input(&self, bytes: &[u8]) -> usize {
        self.state.lock().input.push_slice(bytes)
    }

    /// Queues native-endian samples as capture input.
    pub fn push_samples<S: Sample>(&self, samples: &[S]) -> usize {
        let mut bytes = vec![0u8; samples.len() * S::WIDTH];
        encode_into(samples, &mut bytes);
        self.push_input(&bytes)
    }

    /// Queues `frames` frames of an `i16` sine tone, the same sample on
    /// every channel. Returns how many bytes fit in the ring.
    pub fn push_sine(&self, channels: usize, sample_rate: u32, frequency: f64, frames: usize) -> usize {
        let sample_rate = f64::from(sample_rate.max(1));
        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let t = i as f64 / sample_rate;
            let value = (2.0 * std::f64::consts::PI * frequency * t).sin();
            let sample = (value * 32767.0) as i16;
            samples.extend(std::iter::repeat(sample).take(channels));
        }
        self.push_samples(&samples)
    }

    /// Bytes of capture input not yet read.
    pub fn pending_input(&self) -> usize {
        self.state.lock().input.occupied_len()
    }

    /// Every control request issued so far, in order.
    pub fn requests(&self) -> Vec<ControlRequest> {
        self.state.lock().requests.clone()
    }

    /// Everything written to the device so far.
    pub fn output(&self) -> Vec<u8> {
        self.state.lock().output.clone()
    }

    /// Takes the output log, leaving it empty.
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().output)
    }

    /// Whether driver-side conversion is still enabled.
    pub fn cooked(&self) -> bool {
        self.state.lock().cooked
    }
}

impl Read for MockDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.input.pop_slice(buf))
    }
}

impl Write for MockDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.write_error {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock playback failed"));
        }
        let accepted = state.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        state.output.extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DspDevice for MockDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&mut self) -> io::Result<DeviceCaps> {
        self.state.lock().record(ControlRequest::QueryCaps)?;
        Ok(self.caps.clone())
    }

    fn set_cooked_mode(&mut self, enabled: bool) -> io::Result<()> {
        let mut state = self.state.lock();
        state.record(ControlRequest::SetCookedMode)?;
        state.cooked = enabled;
        Ok(())
    }

    fn set_channels(&mut self, channels: u32) -> io::Result<u32> {
        let mut state = self.state.lock();
        state.record(ControlRequest::SetChannels)?;
        state.channels = state.channel_grant.unwrap_or_else(|| {
            channels.clamp(self.caps.min_channels, self.caps.max_channels.max(self.caps.min_channels))
        });
        Ok(state.channels)
    }

    fn set_fragment(&mut self, count: u32, exponent: u32) -> io::Result<()> {
        let mut state = self.state.lock();
        state.record(ControlRequest::SetFragment)?;
        let (count, bytes) = state.fragment_grant.unwrap_or_else(|| {
            let count = if count == FRAGMENTS_UNLIMITED {
                DEFAULT_FRAGMENTS
            } else {
                count.max(2)
            };
            (count, 1u32 << exponent.min(31))
        });
        state.fragstotal = count;
        state.fragsize = bytes;
        Ok(())
    }

    fn set_format(&mut self, format: u32) -> io::Result<u32> {
        let mut state = self.state.lock();
        state.record(ControlRequest::SetFormat)?;
        state.format = if state.supported_formats & format == format && format != 0 {
            format
        } else {
            afmt::S16_NE
        };
        Ok(state.format)
    }

    fn set_rate(&mut self, rate: u32) -> io::Result<u32> {
        let mut state = self.state.lock();
        state.record(ControlRequest::SetRate)?;
        state.rate = state.rate_grant.unwrap_or(rate);
        Ok(state.rate)
    }

    fn output_space(&mut self) -> io::Result<BufferInfo> {
        let mut state = self.state.lock();
        state.record(ControlRequest::OutputSpace)?;
        let fragsize = if state.report_fragsize {
            state.fragsize
        } else {
            0
        };
        Ok(BufferInfo {
            fragments: state.fragstotal,
            fragstotal: state.fragstotal,
            fragsize,
            bytes: state.fragstotal * state.fragsize,
        })
    }

    fn block_size(&mut self) -> io::Result<u32> {
        let mut state = self.state.lock();
        state.record(ControlRequest::BlockSize)?;
        Ok(state.fragsize)
    }
}
