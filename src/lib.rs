//! # oss-duplex
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Full-duplex PCM streaming over OSS `/dev/dsp` devices.
//!
//! `oss-duplex` opens a single character device for reading and writing,
//! negotiates a stream layout with the driver (channels, sample format,
//! rate, fragment layout), and then runs a pump that reads one fragment of
//! interleaved capture audio, splits it into per-channel buffers, hands it
//! to a [`Processor`], merges it back and writes it to playback.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use oss_duplex::{ChannelRequest, DuplexPump, SampleFormat, StreamRequest};
//!
//! let request = StreamRequest::new("/dev/dsp")
//!     .with_channels(ChannelRequest::Exact(2))
//!     .with_sample_format(SampleFormat::Signed32)
//!     .with_sample_rate(48_000);
//!
//! let mut pump = DuplexPump::<_, _, i32>::open(request)?
//!     .on_event(oss_duplex::event_callback(|e| tracing::warn!(?e, "stream event")));
//!
//! let stop = pump.stop_handle();
//! // hand `stop` to a signal handler, then:
//! let stats = pump.run()?;
//! ```
//!
//! ## Architecture
//!
//! - **Negotiation**: [`Negotiator`] issues the control requests in a fixed
//!   order and records what the driver actually granted in a
//!   [`StreamConfig`]. Deviations are reported as [`StreamEvent`]s.
//! - **Pump**: [`DuplexPump`] owns the device and pre-allocated fragment
//!   buffers. Each step is one blocking read and one blocking write of
//!   exactly one fragment; the driver paces the loop.
//! - **Stop**: a [`StopHandle`] sets a flag that the pump checks between
//!   fragments, so a fragment is never half-delivered.
//!
//! The [`device::MockDevice`] lets everything above run without hardware.

// unsafe_code is denied in Cargo.toml; the OSS ioctl module opts out locally
#![warn(missing_docs)]
// Sample and byte counts cross between u32 (driver) and usize (buffers);
// test tones go through f64
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod config;
pub mod device;
mod error;
mod event;
pub mod format;
mod negotiate;
mod pipeline;
mod session;

pub use config::{
    min_fragment_exponent, ChannelRequest, FragmentCount, StreamConfig, StreamRequest,
    DEFAULT_DEVICE, DEFAULT_FRAGMENT_EXPONENT, DEFAULT_SAMPLE_RATE, MAX_FRAGMENT_EXPONENT,
};
pub use error::{DuplexError, TransferDirection};
pub use event::{event_callback, EventCallback, StreamEvent};
pub use format::{merge, split, FrameLayout, PlanarFrame, Sample, SampleFormat};
pub use negotiate::Negotiator;
pub use pipeline::{DuplexPump, Identity, Processor, PumpState};
pub use session::{PumpStats, StopHandle};
