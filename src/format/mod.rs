//! Sample format handling and frame transcoding.
//!
//! This module provides:
//! - The wire codec between native-endian device bytes and typed samples
//! - The interleave/deinterleave transform between device frames and
//!   per-channel buffers

mod frame;
mod sample;

pub use frame::{merge, split, FrameLayout, PlanarFrame};
pub use sample::{decode_into, encode_into, Sample, SampleFormat};
