//! Device boundary: the control requests the negotiator issues and the
//! byte stream the pump moves fragments over.
//!
//! [`DspDevice`] is implemented by [`OssDevice`] for real `/dev/dsp` nodes
//! and by [`MockDevice`] for tests and demos without hardware.

mod mock;
#[cfg(all(unix, feature = "oss"))]
mod oss;

pub use mock::{MockDevice, MockDeviceHandle};
#[cfg(all(unix, feature = "oss"))]
pub use oss::OssDevice;

use std::fmt;
use std::io::{Read, Write};

/// OSS `AFMT_*` sample format codes.
pub mod afmt {
    /// Mu-law encoded (not handled by the engine).
    pub const MU_LAW: u32 = 0x0000_0001;
    /// Signed 8-bit.
    pub const S8: u32 = 0x0000_0040;
    /// Signed 16-bit little endian.
    pub const S16_LE: u32 = 0x0000_0010;
    /// Signed 16-bit big endian.
    pub const S16_BE: u32 = 0x0000_0020;
    /// Signed 32-bit little endian.
    pub const S32_LE: u32 = 0x0000_1000;
    /// Signed 32-bit big endian.
    pub const S32_BE: u32 = 0x0000_2000;
    /// Signed 24-bit in a 32-bit word, little endian.
    pub const S24_LE: u32 = 0x0001_0000;
    /// Signed 24-bit in a 32-bit word, big endian.
    pub const S24_BE: u32 = 0x0002_0000;

    #[cfg(target_endian = "little")]
    /// Signed 16-bit native endian.
    pub const S16_NE: u32 = S16_LE;
    #[cfg(target_endian = "big")]
    /// Signed 16-bit native endian.
    pub const S16_NE: u32 = S16_BE;
    #[cfg(target_endian = "little")]
    /// Signed 24-bit native endian.
    pub const S24_NE: u32 = S24_LE;
    #[cfg(target_endian = "big")]
    /// Signed 24-bit native endian.
    pub const S24_NE: u32 = S24_BE;
    #[cfg(target_endian = "little")]
    /// Signed 32-bit native endian.
    pub const S32_NE: u32 = S32_LE;
    #[cfg(target_endian = "big")]
    /// Signed 32-bit native endian.
    pub const S32_NE: u32 = S32_BE;
}

/// Fragment count that lets the driver size the ring buffer itself.
pub const FRAGMENTS_UNLIMITED: u32 = 0x7fff;

/// Capability bitmask reported by `SNDCTL_DSP_GETCAPS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(pub u32);

impl Capabilities {
    /// Simultaneous capture and playback.
    pub const DUPLEX: u32 = 0x0000_0100;
    /// Supports `SNDCTL_DSP_SETTRIGGER`.
    pub const TRIGGER: u32 = 0x0000_1000;
    /// Supports memory-mapped transfer.
    pub const MMAP: u32 = 0x0000_2000;
    /// Can record.
    pub const INPUT: u32 = 0x0001_0000;
    /// Can play.
    pub const OUTPUT: u32 = 0x0002_0000;

    /// Returns `true` if every bit in `mask` is set.
    #[must_use]
    pub fn contains(self, mask: u32) -> bool {
        self.0 & mask == mask
    }

    /// Full-duplex support.
    #[must_use]
    pub fn duplex(self) -> bool {
        self.contains(Self::DUPLEX)
    }

    /// Hardware triggering support.
    #[must_use]
    pub fn trigger(self) -> bool {
        self.contains(Self::TRIGGER)
    }

    /// Memory-mapped transfer support.
    #[must_use]
    pub fn mmap(self) -> bool {
        self.contains(Self::MMAP)
    }
}

/// What the device advertises before anything is configured.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceCaps {
    /// Human-readable engine name.
    pub name: String,
    /// Driver handle string.
    pub handle: String,
    /// Fewest channels the device accepts.
    pub min_channels: u32,
    /// Most channels the device accepts.
    pub max_channels: u32,
    /// Lowest sample rate in Hz.
    pub min_rate: u32,
    /// Highest sample rate in Hz.
    pub max_rate: u32,
    /// Reported latency (driver units; negative means unknown).
    pub latency: i32,
    /// Capability bitmask.
    pub caps: Capabilities,
}

/// Buffer-space snapshot (`audio_buf_info`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferInfo {
    /// Fragments that can be transferred without blocking.
    pub fragments: u32,
    /// Fragments in the device ring buffer.
    pub fragstotal: u32,
    /// Bytes per fragment.
    pub fragsize: u32,
    /// Bytes that can be transferred without blocking.
    pub bytes: u32,
}

/// Control requests issued during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlRequest {
    /// `SNDCTL_ENGINEINFO` + `SNDCTL_DSP_GETCAPS`.
    QueryCaps,
    /// `SNDCTL_DSP_COOKEDMODE`.
    SetCookedMode,
    /// `SNDCTL_DSP_CHANNELS`.
    SetChannels,
    /// `SNDCTL_DSP_SETFRAGMENT`.
    SetFragment,
    /// `SNDCTL_DSP_SETFMT`.
    SetFormat,
    /// `SNDCTL_DSP_SPEED`.
    SetRate,
    /// `SNDCTL_DSP_GETOSPACE`.
    OutputSpace,
    /// `SNDCTL_DSP_GETBLKSIZE`.
    BlockSize,
}

impl ControlRequest {
    /// Returns `true` if the request changes device configuration.
    #[must_use]
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            Self::SetCookedMode
                | Self::SetChannels
                | Self::SetFragment
                | Self::SetFormat
                | Self::SetRate
        )
    }

    /// The ioctl name.
    #[must_use]
    pub fn ioctl_name(self) -> &'static str {
        match self {
            Self::QueryCaps => "SNDCTL_ENGINEINFO/SNDCTL_DSP_GETCAPS",
            Self::SetCookedMode => "SNDCTL_DSP_COOKEDMODE",
            Self::SetChannels => "SNDCTL_DSP_CHANNELS",
            Self::SetFragment => "SNDCTL_DSP_SETFRAGMENT",
            Self::SetFormat => "SNDCTL_DSP_SETFMT",
            Self::SetRate => "SNDCTL_DSP_SPEED",
            Self::OutputSpace => "SNDCTL_DSP_GETOSPACE",
            Self::BlockSize => "SNDCTL_DSP_GETBLKSIZE",
        }
    }
}

impl fmt::Display for ControlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ioctl_name())
    }
}

/// A duplex PCM device: control requests plus a blocking byte stream.
///
/// Setters return the value the device actually granted, which may differ
/// from the one requested.
pub trait DspDevice: Read + Write {
    /// Human-readable identifier for logging.
    fn name(&self) -> &str;

    /// Queries channel and rate ranges and the capability bitmask.
    fn capabilities(&mut self) -> std::io::Result<DeviceCaps>;

    /// Enables or disables driver-side format conversion.
    fn set_cooked_mode(&mut self, enabled: bool) -> std::io::Result<()>;

    /// Requests a channel count and returns the granted count.
    fn set_channels(&mut self, channels: u32) -> std::io::Result<u32>;

    /// Requests `count` fragments of `2^exponent` bytes.
    fn set_fragment(&mut self, count: u32, exponent: u32) -> std::io::Result<()>;

    /// Requests an `AFMT_*` format and returns the granted code.
    fn set_format(&mut self, format: u32) -> std::io::Result<u32>;

    /// Requests a sample rate and returns the granted rate.
    fn set_rate(&mut self, rate: u32) -> std::io::Result<u32>;

    /// Reads the playback buffer-space snapshot.
    fn output_space(&mut self) -> std::io::Result<BufferInfo>;

    /// Reads the fragment (block) size in bytes.
    fn block_size(&mut self) -> std::io::Result<u32>;
}

impl<D: DspDevice + ?Sized> DspDevice for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn capabilities(&mut self) -> std::io::Result<DeviceCaps> {
        (**self).capabilities()
    }

    fn set_cooked_mode(&mut self, enabled: bool) -> std::io::Result<()> {
        (**self).set_cooked_mode(enabled)
    }

    fn set_channels(&mut self, channels: u32) -> std::io::Result<u32> {
        (**self).set_channels(channels)
    }

    fn set_fragment(&mut self, count: u32, exponent: u32) -> std::io::Result<()> {
        (**self).set_fragment(count, exponent)
    }

    fn set_format(&mut self, format: u32) -> std::io::Result<u32> {
        (**self).set_format(format)
    }

    fn set_rate(&mut self, rate: u32) -> std::io::Result<u32> {
        (**self).set_rate(rate)
    }

    fn output_space(&mut self) -> std::io::Result<BufferInfo> {
        (**self).output_space()
    }

    fn block_size(&mut self) -> std::io::Result<u32> {
        (**self).block_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_bits() {
        let caps = Capabilities(Capabilities::DUPLEX | Capabilities::TRIGGER);
        assert!(caps.duplex());
        assert!(caps.trigger());
        assert!(!caps.mmap());
        assert!(!caps.contains(Capabilities::TRIGGER | Capabilities::MMAP));
    }

    #[test]
    fn test_mutating_requests() {
        assert!(!ControlRequest::QueryCaps.is_mutating());
        assert!(!ControlRequest::OutputSpace.is_mutating());
        assert!(!ControlRequest::BlockSize.is_mutating());
        assert!(ControlRequest::SetFragment.is_mutating());
        assert!(ControlRequest::SetRate.is_mutating());
    }

    #[test]
    fn test_control_request_display() {
        assert_eq!(ControlRequest::SetFormat.to_string(), "SNDCTL_DSP_SETFMT");
    }
}
