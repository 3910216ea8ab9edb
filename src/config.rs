//! Stream request and negotiated configuration types.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::device::FRAGMENTS_UNLIMITED;
use crate::format::FrameLayout;
use crate::{DuplexError, SampleFormat};

/// Default device node.
pub const DEFAULT_DEVICE: &str = "/dev/dsp";

/// Default sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Default fragment exponent (1024-byte fragments).
pub const DEFAULT_FRAGMENT_EXPONENT: u32 = 10;

/// Largest fragment exponent OSS accepts in `SNDCTL_DSP_SETFRAGMENT`.
pub const MAX_FRAGMENT_EXPONENT: u32 = 30;

/// Smallest `e` such that `2^e >= bytes`.
///
/// A fragment of `2^e` bytes holds at least `bytes` bytes; zero and one
/// both yield exponent zero.
#[must_use]
pub fn min_fragment_exponent(bytes: usize) -> u32 {
    bytes.max(1).next_power_of_two().trailing_zeros()
}

/// How many channels to ask the device for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelRequest {
    /// Use the most channels the device advertises.
    #[default]
    Auto,
    /// Ask for a specific count; the device may grant another.
    Exact(u32),
}

impl fmt::Display for ChannelRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Exact(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for ChannelRequest {
    type Err = DuplexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        match s.parse::<u32>() {
            Ok(n) if n >= 1 => Ok(Self::Exact(n)),
            _ => Err(DuplexError::invalid_request(format!(
                "channel count must be a positive integer or 'auto', got '{s}'"
            ))),
        }
    }
}

/// How many fragments make up the device ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FragmentCount {
    /// Let the driver decide.
    #[default]
    DeviceDefault,
    /// Ask for a specific number of fragments.
    Count(u32),
}

impl FragmentCount {
    /// Value placed in the upper half of the `SETFRAGMENT` argument.
    #[must_use]
    pub fn wire_value(self) -> u32 {
        match self {
            Self::DeviceDefault => FRAGMENTS_UNLIMITED,
            Self::Count(n) => n.clamp(1, FRAGMENTS_UNLIMITED),
        }
    }
}

impl FromStr for FragmentCount {
    type Err = DuplexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("default") {
            return Ok(Self::DeviceDefault);
        }
        // Zero and negative counts let the device choose.
        match s.parse::<i64>() {
            Ok(n) if n <= 0 => Ok(Self::DeviceDefault),
            Ok(n) => u32::try_from(n).map(Self::Count).map_err(|_| {
                DuplexError::invalid_request(format!("fragment count {n} is too large"))
            }),
            Err(_) => Err(DuplexError::invalid_request(format!(
                "fragment count must be an integer or 'default', got '{s}'"
            ))),
        }
    }
}

/// What the caller wants from the device.
///
/// Use [`StreamRequest::default()`] for the classic echo setup (`/dev/dsp`,
/// all channels, 16-bit, 48 kHz, 1 KiB fragments, full duplex), or
/// customize with the `with_*` methods.
///
/// # Example
///
/// ```
/// use oss_duplex::{ChannelRequest, SampleFormat, StreamRequest};
///
/// let request = StreamRequest::new("/dev/dsp1")
///     .with_channels(ChannelRequest::Exact(2))
///     .with_sample_format(SampleFormat::Signed32)
///     .with_sample_rate(96_000);
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Device node to open.
    pub device: PathBuf,
    /// Channel count, or `Auto` for the device maximum.
    pub channels: ChannelRequest,
    /// Sample format; must be granted exactly.
    pub sample_format: SampleFormat,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Smallest acceptable fragment exponent (fragment = `2^exponent` bytes).
    ///
    /// Raised automatically if a fragment this size cannot hold one frame.
    pub fragment_exponent: u32,
    /// Number of fragments in the device ring buffer.
    pub fragment_count: FragmentCount,
    /// Fail unless the device supports simultaneous capture and playback.
    pub duplex_required: bool,
    /// Disable driver-side conversion and require trigger + mmap support.
    pub zero_copy: bool,
}

impl Default for StreamRequest {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            channels: ChannelRequest::Auto,
            sample_format: SampleFormat::Signed16,
            sample_rate: DEFAULT_SAMPLE_RATE,
            fragment_exponent: DEFAULT_FRAGMENT_EXPONENT,
            fragment_count: FragmentCount::DeviceDefault,
            duplex_required: true,
            zero_copy: false,
        }
    }
}

impl StreamRequest {
    /// Creates a default request for `device`.
    #[must_use]
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }

    /// Sets the channel request.
    #[must_use]
    pub fn with_channels(mut self, channels: ChannelRequest) -> Self {
        self.channels = channels;
        self
    }

    /// Sets the sample format.
    #[must_use]
    pub fn with_sample_format(mut self, format: SampleFormat) -> Self {
        self.sample_format = format;
        self
    }

    /// Sets the sample rate in Hz.
    #[must_use]
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Sets the minimum fragment exponent.
    #[must_use]
    pub fn with_fragment_exponent(mut self, exponent: u32) -> Self {
        self.fragment_exponent = exponent;
        self
    }

    /// Sets the fragment count.
    #[must_use]
    pub fn with_fragment_count(mut self, count: FragmentCount) -> Self {
        self.fragment_count = count;
        self
    }

    /// Sets whether full duplex is mandatory.
    #[must_use]
    pub fn with_duplex_required(mut self, required: bool) -> Self {
        self.duplex_required = required;
        self
    }

    /// Sets zero-copy mode.
    #[must_use]
    pub fn with_zero_copy(mut self, zero_copy: bool) -> Self {
        self.zero_copy = zero_copy;
        self
    }

    /// Checks the request for values no device could satisfy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a zero rate, a zero channel count or a
    /// fragment exponent above [`MAX_FRAGMENT_EXPONENT`].
    pub fn validate(&self) -> Result<(), DuplexError> {
        if self.sample_rate == 0 {
            return Err(DuplexError::invalid_request("sample rate must be positive"));
        }
        if self.channels == ChannelRequest::Exact(0) {
            return Err(DuplexError::invalid_request(
                "channel count must be at least 1",
            ));
        }
        if self.fragment_exponent > MAX_FRAGMENT_EXPONENT {
            return Err(DuplexError::invalid_request(format!(
                "fragment exponent {} exceeds {MAX_FRAGMENT_EXPONENT}",
                self.fragment_exponent
            )));
        }
        Ok(())
    }
}

/// The configuration the device actually granted.
///
/// Produced once by [`Negotiator::negotiate`](crate::Negotiator::negotiate)
/// and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    channels: u32,
    sample_format: SampleFormat,
    sample_rate: u32,
    fragment_exponent: u32,
    fragment_count: u32,
    fragment_bytes: usize,
    zero_copy: bool,
}

impl StreamConfig {
    pub(crate) fn new(
        channels: u32,
        sample_format: SampleFormat,
        sample_rate: u32,
        fragment_exponent: u32,
        fragment_count: u32,
        fragment_bytes: usize,
        zero_copy: bool,
    ) -> Self {
        Self {
            channels,
            sample_format,
            sample_rate,
            fragment_exponent,
            fragment_count,
            fragment_bytes,
            zero_copy,
        }
    }

    /// Granted channel count.
    #[must_use]
    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Granted sample format.
    #[must_use]
    pub fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    /// Bytes per sample.
    #[must_use]
    pub fn sample_width_bytes(&self) -> usize {
        self.sample_format.width_bytes()
    }

    /// Granted sample rate in Hz.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Fragment exponent sent to the device (after raising to the minimum).
    #[must_use]
    pub fn fragment_exponent(&self) -> u32 {
        self.fragment_exponent
    }

    /// Granted number of fragments in the device ring buffer.
    #[must_use]
    pub fn fragment_count(&self) -> u32 {
        self.fragment_count
    }

    /// Granted fragment size in bytes; one read or write moves this much.
    #[must_use]
    pub fn fragment_bytes(&self) -> usize {
        self.fragment_bytes
    }

    /// Whether driver-side conversion was disabled.
    #[must_use]
    pub fn zero_copy(&self) -> bool {
        self.zero_copy
    }

    /// Total samples (all channels) per fragment.
    #[must_use]
    pub fn frame_sample_count(&self) -> usize {
        self.fragment_bytes / self.sample_width_bytes()
    }

    /// Samples per channel per fragment.
    #[must_use]
    pub fn per_channel_sample_count(&self) -> usize {
        self.layout().per_channel()
    }

    /// Samples per fragment that do not form a whole frame and are dropped.
    #[must_use]
    pub fn truncated_samples(&self) -> usize {
        self.layout().remainder()
    }

    /// Size arithmetic for the transcoder.
    #[must_use]
    pub fn layout(&self) -> FrameLayout {
        FrameLayout::new(self.channels as usize, self.frame_sample_count())
    }
}

impl fmt::Display for StreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ch {} @ {}Hz, {} x {} bytes ({} samples/channel)",
            self.channels,
            self.sample_format,
            self.sample_rate,
            self.fragment_count,
            self.fragment_bytes,
            self.per_channel_sample_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_fragment_exponent() {
        assert_eq!(min_fragment_exponent(2 * 4), 3);
        assert_eq!(min_fragment_exponent(6 * 4), 5);
        assert_eq!(min_fragment_exponent(1), 0);
        assert_eq!(min_fragment_exponent(0), 0);
        assert_eq!(min_fragment_exponent(1025), 11);
    }

    #[test]
    fn test_request_defaults() {
        let request = StreamRequest::default();
        assert_eq!(request.device, PathBuf::from("/dev/dsp"));
        assert_eq!(request.channels, ChannelRequest::Auto);
        assert_eq!(request.sample_rate, 48000);
        assert_eq!(request.fragment_exponent, 10);
        assert_eq!(request.fragment_count, FragmentCount::DeviceDefault);
        assert!(request.duplex_required);
        assert!(!request.zero_copy);
    }

    #[test]
    fn test_parse_channel_request() {
        assert_eq!("auto".parse::<ChannelRequest>().unwrap(), ChannelRequest::Auto);
        assert_eq!("4".parse::<ChannelRequest>().unwrap(), ChannelRequest::Exact(4));
        assert!("0".parse::<ChannelRequest>().is_err());
        assert!("-2".parse::<ChannelRequest>().is_err());
        assert!("stereo".parse::<ChannelRequest>().is_err());
    }

    #[test]
    fn test_parse_fragment_count() {
        assert_eq!(
            "default".parse::<FragmentCount>().unwrap(),
            FragmentCount::DeviceDefault
        );
        assert_eq!("-1".parse::<FragmentCount>().unwrap(), FragmentCount::DeviceDefault);
        assert_eq!("0".parse::<FragmentCount>().unwrap(), FragmentCount::DeviceDefault);
        assert_eq!("2".parse::<FragmentCount>().unwrap(), FragmentCount::Count(2));
        assert!("many".parse::<FragmentCount>().is_err());
    }

    #[test]
    fn test_fragment_count_wire_value() {
        assert_eq!(FragmentCount::DeviceDefault.wire_value(), 0x7fff);
        assert_eq!(FragmentCount::Count(2).wire_value(), 2);
        assert_eq!(FragmentCount::Count(0).wire_value(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(StreamRequest::default().with_sample_rate(0).validate().is_err());
        assert!(StreamRequest::default()
            .with_channels(ChannelRequest::Exact(0))
            .validate()
            .is_err());
        assert!(StreamRequest::default()
            .with_fragment_exponent(31)
            .validate()
            .is_err());
    }

    #[test]
    fn test_stream_config_counts() {
        let config = StreamConfig::new(2, SampleFormat::Signed32, 48000, 5, 2, 32, false);
        assert_eq!(config.frame_sample_count(), 8);
        assert_eq!(config.per_channel_sample_count(), 4);
        assert_eq!(config.truncated_samples(), 0);
    }

    #[test]
    fn test_stream_config_truncation() {
        let config = StreamConfig::new(3, SampleFormat::Signed32, 48000, 6, 2, 40, false);
        assert_eq!(config.frame_sample_count(), 10);
        assert_eq!(config.per_channel_sample_count(), 3);
        assert_eq!(config.truncated_samples(), 1);
    }
}
