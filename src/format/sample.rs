//! Sample formats and the native-endian wire codec.

use std::fmt;
use std::str::FromStr;

use crate::device::afmt;
use crate::DuplexError;

/// Signed PCM sample format, in native byte order.
///
/// OSS stores 24-bit samples in 32-bit words, so [`SampleFormat::Signed24`]
/// is four bytes wide on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleFormat {
    /// 8-bit signed.
    Signed8,
    /// 16-bit signed, native endian.
    #[default]
    Signed16,
    /// 24-bit signed in a 32-bit word, native endian.
    Signed24,
    /// 32-bit signed, native endian.
    Signed32,
}

impl SampleFormat {
    /// Bytes one sample occupies on the wire.
    #[must_use]
    pub const fn width_bytes(self) -> usize {
        match self {
            Self::Signed8 => 1,
            Self::Signed16 => 2,
            Self::Signed24 | Self::Signed32 => 4,
        }
    }

    /// The `AFMT_*` code requested from the device.
    #[must_use]
    pub const fn afmt(self) -> u32 {
        match self {
            Self::Signed8 => afmt::S8,
            Self::Signed16 => afmt::S16_NE,
            Self::Signed24 => afmt::S24_NE,
            Self::Signed32 => afmt::S32_NE,
        }
    }

    /// Maps a raw `AFMT_*` code back to a format, if it is one we handle.
    #[must_use]
    pub const fn from_afmt(code: u32) -> Option<Self> {
        match code {
            afmt::S8 => Some(Self::Signed8),
            afmt::S16_NE => Some(Self::Signed16),
            afmt::S24_NE => Some(Self::Signed24),
            afmt::S32_NE => Some(Self::Signed32),
            _ => None,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signed8 => f.write_str("s8"),
            Self::Signed16 => f.write_str("s16"),
            Self::Signed24 => f.write_str("s24"),
            Self::Signed32 => f.write_str("s32"),
        }
    }
}

impl FromStr for SampleFormat {
    type Err = DuplexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s8" | "8" => Ok(Self::Signed8),
            "s16" | "16" => Ok(Self::Signed16),
            "s24" | "24" => Ok(Self::Signed24),
            "s32" | "32" => Ok(Self::Signed32),
            other => Err(DuplexError::invalid_request(format!(
                "unknown sample format '{other}' (expected s8, s16, s24 or s32)"
            ))),
        }
    }
}

/// A sample container that can be moved to and from device bytes.
///
/// Implemented for `i8`, `i16` and `i32`; `i32` carries both
/// [`SampleFormat::Signed24`] and [`SampleFormat::Signed32`].
pub trait Sample: Copy + Default + Send + 'static {
    /// Bytes per sample on the wire.
    const WIDTH: usize;

    /// Decodes one sample from exactly [`Self::WIDTH`] native-endian bytes.
    fn from_ne_slice(bytes: &[u8]) -> Self;

    /// Encodes one sample into exactly [`Self::WIDTH`] bytes.
    fn write_ne_slice(self, out: &mut [u8]);
}

macro_rules! impl_sample {
    ($ty:ty, $width:expr) => {
        impl Sample for $ty {
            const WIDTH: usize = $width;

            #[inline]
            fn from_ne_slice(bytes: &[u8]) -> Self {
                let mut raw = [0u8; $width];
                raw.copy_from_slice(bytes);
                <$ty>::from_ne_bytes(raw)
            }

            #[inline]
            fn write_ne_slice(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_ne_bytes());
            }
        }
    };
}

impl_sample!(i8, 1);
impl_sample!(i16, 2);
impl_sample!(i32, 4);

/// Decodes native-endian device bytes into `samples`.
///
/// Converts `min(bytes.len() / WIDTH, samples.len())` samples and returns
/// that count. Trailing bytes that do not form a whole sample are ignored.
pub fn decode_into<S: Sample>(bytes: &[u8], samples: &mut [S]) -> usize {
    let mut count = 0;
    for (chunk, slot) in bytes.chunks_exact(S::WIDTH).zip(samples.iter_mut()) {
        *slot = S::from_ne_slice(chunk);
        count += 1;
    }
    count
}

/// Encodes `samples` into native-endian device bytes.
///
/// Returns the number of samples written.
pub fn encode_into<S: Sample>(samples: &[S], bytes: &mut [u8]) -> usize {
    let mut count = 0;
    for (chunk, &sample) in bytes.chunks_exact_mut(S::WIDTH).zip(samples.iter()) {
        sample.write_ne_slice(chunk);
        count += 1;
    }
    count
}
