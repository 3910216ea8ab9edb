//! Error types for oss-duplex.
//!
//! Errors are split into two categories:
//! - **Negotiation errors**: the device cannot satisfy the [`StreamRequest`].
//!   They are fatal for the stream; build a new request to try again.
//! - **Transfer errors**: a read or write failed while the pump was running.
//!
//! Granted values that differ from the request are not errors. They are
//! reported as advisories through [`StreamEvent`](crate::StreamEvent).
//!
//! [`StreamRequest`]: crate::StreamRequest

use std::fmt;
use std::path::PathBuf;

use crate::device::ControlRequest;
use crate::pipeline::PumpState;
use crate::SampleFormat;

/// Direction of a data transfer on the duplex device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Capture: bytes read from the device.
    Read,
    /// Playback: bytes written to the device.
    Write,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// Errors raised while negotiating or running a duplex stream.
#[derive(Debug, thiserror::Error)]
pub enum DuplexError {
    /// The device node could not be opened for read+write.
    #[error("failed to open device {}: {source}", path.display())]
    DeviceOpenFailed {
        /// Path of the device node.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The requested sample rate is outside the device's advertised range.
    #[error("sample rate {requested}Hz not supported (device range {min}..={max}Hz)")]
    UnsupportedRate {
        /// The requested sample rate.
        requested: u32,
        /// Lowest rate the device advertises.
        min: u32,
        /// Highest rate the device advertises.
        max: u32,
    },

    /// The device did not grant the exact requested sample format.
    #[error("sample format {requested} not supported (device offered {granted:#x})")]
    UnsupportedFormat {
        /// The requested format.
        requested: SampleFormat,
        /// Raw `AFMT_*` value returned by the device.
        granted: u32,
    },

    /// A required capability (duplex, trigger, mmap) is missing.
    #[error("unsupported mode: {reason}")]
    UnsupportedMode {
        /// What the device lacks.
        reason: String,
    },

    /// A device-control request failed.
    #[error("control request {request} failed: {source}")]
    NegotiationIoError {
        /// The request that failed.
        request: ControlRequest,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A fragment read or write failed or was short.
    #[error("{direction} failed after {transferred} of {expected} bytes: {source}")]
    TransferIoError {
        /// Whether the read or the write failed.
        direction: TransferDirection,
        /// Fragment size in bytes.
        expected: usize,
        /// Bytes moved before the failure.
        transferred: usize,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The request itself is malformed.
    #[error("invalid stream request: {reason}")]
    InvalidRequest {
        /// What is wrong with the request.
        reason: String,
    },

    /// The granted fragment cannot hold a single multi-channel frame.
    #[error("fragment of {fragment_bytes} bytes cannot hold a {frame_bytes}-byte frame")]
    FragmentTooSmall {
        /// Granted fragment size.
        fragment_bytes: usize,
        /// Bytes needed for one sample on every channel.
        frame_bytes: usize,
    },

    /// The pump's sample container does not match the negotiated format.
    #[error("sample container is {container} bytes wide but {format} needs {expected}")]
    SampleWidthMismatch {
        /// The requested format.
        format: SampleFormat,
        /// Width the format needs.
        expected: usize,
        /// Width of the pump's sample type.
        container: usize,
    },

    /// An operation was attempted in the wrong pump state.
    #[error("operation requires {expected:?} state, pump is {actual:?}")]
    InvalidState {
        /// State the operation needs.
        expected: PumpState,
        /// State the pump was in.
        actual: PumpState,
    },
}

impl DuplexError {
    /// Creates an unsupported mode error with the given reason.
    pub fn unsupported_mode(reason: impl Into<String>) -> Self {
        Self::UnsupportedMode {
            reason: reason.into(),
        }
    }

    /// Creates an invalid request error with the given reason.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Wraps a failed control request.
    pub fn control(request: ControlRequest, source: std::io::Error) -> Self {
        Self::NegotiationIoError { request, source }
    }

    /// Returns `true` for errors raised before the pump started running.
    #[must_use]
    pub fn is_negotiation_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceOpenFailed { .. }
                | Self::UnsupportedRate { .. }
                | Self::UnsupportedFormat { .. }
                | Self::UnsupportedMode { .. }
                | Self::NegotiationIoError { .. }
                | Self::InvalidRequest { .. }
                | Self::FragmentTooSmall { .. }
                | Self::SampleWidthMismatch { .. }
        )
    }

    /// Returns `true` for fatal errors raised by the running pump.
    #[must_use]
    pub fn is_transfer_error(&self) -> bool {
        matches!(self, Self::TransferIoError { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_rate_display() {
        let err = DuplexError::UnsupportedRate {
            requested: 192_000,
            min: 8000,
            max: 96_000,
        };
        assert_eq!(
            err.to_string(),
            "sample rate 192000Hz not supported (device range 8000..=96000Hz)"
        );
    }

    #[test]
    fn test_unsupported_mode_helper() {
        let err = DuplexError::unsupported_mode("device does not support full duplex");
        assert_eq!(
            err.to_string(),
            "unsupported mode: device does not support full duplex"
        );
        assert!(err.is_negotiation_error());
        assert!(!err.is_transfer_error());
    }

    #[test]
    fn test_control_error_names_request() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "ioctl failed");
        let err = DuplexError::control(ControlRequest::SetRate, io_err);
        assert!(err.to_string().contains("SNDCTL_DSP_SPEED"));
    }

    #[test]
    fn test_transfer_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err = DuplexError::TransferIoError {
            direction: TransferDirection::Read,
            expected: 4096,
            transferred: 100,
            source: io_err,
        };
        assert_eq!(
            err.to_string(),
            "read failed after 100 of 4096 bytes: short read"
        );
        assert!(err.is_transfer_error());
        assert!(!err.is_negotiation_error());
    }

    #[test]
    fn test_device_open_failed_contains_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such device");
        let err = DuplexError::DeviceOpenFailed {
            path: PathBuf::from("/dev/dsp7"),
            source: io_err,
        };
        assert!(err.to_string().contains("/dev/dsp7"));
    }
}
