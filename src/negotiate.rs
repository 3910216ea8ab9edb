//! Capability negotiation.
//!
//! Turns a [`StreamRequest`] into a [`StreamConfig`] by querying and
//! configuring a [`DspDevice`]. The steps run in a fixed order, each
//! validated before the next one touches the device:
//!
//! 1. Query capabilities; reject out-of-range rates before any mutation
//! 2. Enforce the duplex requirement
//! 3. Resolve and set the channel count
//! 4. Raise the fragment exponent to hold at least one frame
//! 5. Request the fragment layout
//! 6. Set the sample format (exact match required)
//! 7. Set the sample rate
//! 8. Read back the granted fragment size and count
//! 9. In zero-copy mode, require trigger and mmap support
//!
//! Values the device grants differently (channels, rate, fragment layout)
//! are accepted and reported as [`StreamEvent`]s.

use crate::config::{min_fragment_exponent, MAX_FRAGMENT_EXPONENT};
use crate::device::{Capabilities, ControlRequest, DeviceCaps, DspDevice, FRAGMENTS_UNLIMITED};
use crate::{
    ChannelRequest, DuplexError, EventCallback, SampleFormat, StreamConfig, StreamEvent,
    StreamRequest,
};

/// Negotiates a stream configuration with a device.
///
/// # Example
///
/// ```
/// use oss_duplex::device::MockDevice;
/// use oss_duplex::{ChannelRequest, Negotiator, SampleFormat, StreamRequest};
///
/// let mut device = MockDevice::full_duplex();
/// let request = StreamRequest::default()
///     .with_channels(ChannelRequest::Exact(2))
///     .with_sample_format(SampleFormat::Signed32);
///
/// let config = Negotiator::new(request).negotiate(&mut device)?;
/// assert_eq!(config.channels(), 2);
/// # Ok::<(), oss_duplex::DuplexError>(())
/// ```
#[must_use]
pub struct Negotiator {
    request: StreamRequest,
    event_callback: Option<EventCallback>,
}

impl Negotiator {
    /// Creates a negotiator for `request`.
    pub fn new(request: StreamRequest) -> Self {
        Self {
            request,
            event_callback: None,
        }
    }

    /// Registers a callback for advisory events.
    pub fn on_event(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// The request being negotiated.
    pub fn request(&self) -> &StreamRequest {
        &self.request
    }

    /// Runs the negotiation against `device`.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the request fails validation
    /// - `UnsupportedRate` if the rate is outside the advertised range
    /// - `UnsupportedMode` if duplex, trigger or mmap support is missing,
    ///   or the device grants zero channels
    /// - `UnsupportedFormat` if the exact sample format is not granted
    /// - `FragmentTooSmall` if the granted fragment cannot hold one frame
    /// - `NegotiationIoError` if any control request fails
    pub fn negotiate<D: DspDevice + ?Sized>(
        &self,
        device: &mut D,
    ) -> Result<StreamConfig, DuplexError> {
        let request = &self.request;
        request.validate()?;

        let caps = device
            .capabilities()
            .map_err(|e| DuplexError::control(ControlRequest::QueryCaps, e))?;
        tracing::info!(
            device = device.name(),
            engine = %caps.name,
            handle = %caps.handle,
            min_channels = caps.min_channels,
            max_channels = caps.max_channels,
            min_rate = caps.min_rate,
            max_rate = caps.max_rate,
            latency = caps.latency,
            caps = format_args!("{:#x}", caps.caps.0),
            "device capabilities"
        );
        check_rate(request.sample_rate, &caps)?;

        if request.duplex_required && !caps.caps.duplex() {
            return Err(DuplexError::unsupported_mode(
                "device does not support full duplex",
            ));
        }

        // OSS documents that the result of this request should not be checked.
        if request.zero_copy {
            if let Err(e) = device.set_cooked_mode(false) {
                tracing::debug!(error = %e, "could not disable cooked mode");
            }
        }

        let channels = self.resolve_channels(device, &caps)?;

        let frame_bytes = checked_frame_bytes(request.sample_format.width_bytes(), channels)?;
        let exponent = raise_exponent(request.fragment_exponent, frame_bytes);
        let requested_count = request.fragment_count.wire_value();
        device
            .set_fragment(requested_count, exponent)
            .map_err(|e| DuplexError::control(ControlRequest::SetFragment, e))?;

        check_format(device, request.sample_format)?;

        let rate = device
            .set_rate(request.sample_rate)
            .map_err(|e| DuplexError::control(ControlRequest::SetRate, e))?;
        if rate != request.sample_rate {
            self.emit(StreamEvent::RateAdjusted {
                requested: request.sample_rate,
                granted: rate,
            });
        }

        let (fragment_count, fragment_bytes) = read_back_layout(device)?;
        let requested_bytes = 1usize << exponent;
        if fragment_bytes != requested_bytes
            || (requested_count != FRAGMENTS_UNLIMITED
                && fragment_count != requested_count)
        {
            self.emit(StreamEvent::FragmentLayoutAdjusted {
                requested_count,
                requested_bytes,
                granted_count: fragment_count,
                granted_bytes: fragment_bytes,
            });
        }
        if fragment_bytes < frame_bytes {
            return Err(DuplexError::FragmentTooSmall {
                fragment_bytes,
                frame_bytes,
            });
        }

        if request.zero_copy {
            check_zero_copy(caps.caps)?;
        }

        let config = StreamConfig::new(
            channels,
            request.sample_format,
            rate,
            exponent,
            fragment_count,
            fragment_bytes,
            request.zero_copy,
        );
        if config.truncated_samples() > 0 {
            self.emit(StreamEvent::SamplesTruncated {
                per_fragment: config.truncated_samples(),
            });
        }

        tracing::info!(
            channels = config.channels(),
            format = %config.sample_format(),
            rate = config.sample_rate(),
            fragment_bytes = config.fragment_bytes(),
            fragment_count = config.fragment_count(),
            samples_per_channel = config.per_channel_sample_count(),
            "stream negotiated"
        );
        Ok(config)
    }

    fn resolve_channels<D: DspDevice + ?Sized>(
        &self,
        device: &mut D,
        caps: &DeviceCaps,
    ) -> Result<u32, DuplexError> {
        let requested = match self.request.channels {
            ChannelRequest::Auto => caps.max_channels,
            ChannelRequest::Exact(n) => n,
        };
        let granted = device
            .set_channels(requested)
            .map_err(|e| DuplexError::control(ControlRequest::SetChannels, e))?;
        if granted == 0 {
            return Err(DuplexError::unsupported_mode("device granted zero channels"));
        }
        if granted != requested {
            self.emit(StreamEvent::ChannelsAdjusted { requested, granted });
        }
        Ok(granted)
    }

    fn emit(&self, event: StreamEvent) {
        tracing::warn!(?event, "stream advisory");
        if let Some(callback) = &self.event_callback {
            callback(event);
        }
    }
}

fn check_rate(rate: u32, caps: &DeviceCaps) -> Result<(), DuplexError> {
    if rate < caps.min_rate || rate > caps.max_rate {
        return Err(DuplexError::UnsupportedRate {
            requested: rate,
            min: caps.min_rate,
            max: caps.max_rate,
        });
    }
    Ok(())
}

/// Bytes in one frame, rejecting channel grants no fragment could hold.
fn checked_frame_bytes(width: usize, channels: u32) -> Result<usize, DuplexError> {
    let largest = 1usize << MAX_FRAGMENT_EXPONENT;
    width
        .checked_mul(channels as usize)
        .filter(|&bytes| bytes <= largest)
        .ok_or_else(|| {
            DuplexError::unsupported_mode(format!(
                "{channels} channels of {width}-byte samples exceed the largest fragment"
            ))
        })
}

fn raise_exponent(requested: u32, frame_bytes: usize) -> u32 {
    let minimum = min_fragment_exponent(frame_bytes);
    if requested < minimum {
        tracing::debug!(requested, minimum, "raising fragment exponent to hold one frame");
        minimum
    } else {
        requested
    }
}

fn check_format<D: DspDevice + ?Sized>(
    device: &mut D,
    format: SampleFormat,
) -> Result<(), DuplexError> {
    let granted = device
        .set_format(format.afmt())
        .map_err(|e| DuplexError::control(ControlRequest::SetFormat, e))?;
    if granted != format.afmt() {
        return Err(DuplexError::UnsupportedFormat {
            requested: format,
            granted,
        });
    }
    Ok(())
}

fn read_back_layout<D: DspDevice + ?Sized>(device: &mut D) -> Result<(u32, usize), DuplexError> {
    let info = device
        .output_space()
        .map_err(|e| DuplexError::control(ControlRequest::OutputSpace, e))?;
    let fragsize = if info.fragsize > 0 {
        info.fragsize
    } else {
        device
            .block_size()
            .map_err(|e| DuplexError::control(ControlRequest::BlockSize, e))?
    };
    Ok((info.fragstotal.max(1), fragsize as usize))
}

fn check_zero_copy(caps: Capabilities) -> Result<(), DuplexError> {
    if !caps.trigger() {
        return Err(DuplexError::unsupported_mode(
            "device does not support triggering",
        ));
    }
    if !caps.mmap() {
        return Err(DuplexError::unsupported_mode(
            "device does not support mmap transfer",
        ));
    }
    Ok(())
}
