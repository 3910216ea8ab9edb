//! OSS `/dev/dsp` backend.
//!
//! Control requests are issued as ioctls on the open device node; data moves
//! through ordinary blocking `read`/`write` calls.

#![allow(unsafe_code)] // ioctl FFI requires unsafe

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use nix::libc;

use super::{BufferInfo, Capabilities, DeviceCaps, DspDevice};
use crate::{DuplexError, StreamRequest};

const SNDCTL_DSP_MAGIC: u8 = b'P';
const SNDCTL_DSP_SPEED: u8 = 2;
const SNDCTL_DSP_GETBLKSIZE: u8 = 4;
const SNDCTL_DSP_SETFMT: u8 = 5;
const SNDCTL_DSP_CHANNELS: u8 = 6;
const SNDCTL_DSP_SETFRAGMENT: u8 = 10;
const SNDCTL_DSP_GETOSPACE: u8 = 12;
const SNDCTL_DSP_GETCAPS: u8 = 15;
const SNDCTL_DSP_COOKEDMODE: u8 = 30;

const SNDCTL_INFO_MAGIC: u8 = b'X';
const SNDCTL_ENGINEINFO: u8 = 12;

/// `oss_audioinfo` from `sys/soundcard.h`.
#[repr(C)]
#[allow(dead_code)]
struct OssAudioInfo {
    dev: libc::c_int,
    name: [libc::c_char; 64],
    busy: libc::c_int,
    pid: libc::c_int,
    caps: libc::c_int,
    iformats: libc::c_int,
    oformats: libc::c_int,
    magic: libc::c_int,
    cmd: [libc::c_char; 64],
    card_number: libc::c_int,
    port_number: libc::c_int,
    mixer_dev: libc::c_int,
    legacy_device: libc::c_int,
    enabled: libc::c_int,
    flags: libc::c_int,
    min_rate: libc::c_int,
    max_rate: libc::c_int,
    min_channels: libc::c_int,
    max_channels: libc::c_int,
    binding: libc::c_int,
    rate_source: libc::c_int,
    handle: [libc::c_char; 32],
    nrates: libc::c_uint,
    rates: [libc::c_uint; 20],
    song_name: [libc::c_char; 64],
    label: [libc::c_char; 16],
    latency: libc::c_int,
    devnode: [libc::c_char; 32],
    next_play_engine: libc::c_int,
    next_rec_engine: libc::c_int,
    filler: [libc::c_int; 184],
}

impl OssAudioInfo {
    /// An info block asking about the engine behind the open descriptor.
    fn for_open_device() -> Self {
        Self {
            dev: -1,
            name: [0; 64],
            busy: 0,
            pid: 0,
            caps: 0,
            iformats: 0,
            oformats: 0,
            magic: 0,
            cmd: [0; 64],
            card_number: 0,
            port_number: 0,
            mixer_dev: 0,
            legacy_device: 0,
            enabled: 0,
            flags: 0,
            min_rate: 0,
            max_rate: 0,
            min_channels: 0,
            max_channels: 0,
            binding: 0,
            rate_source: 0,
            handle: [0; 32],
            nrates: 0,
            rates: [0; 20],
            song_name: [0; 64],
            label: [0; 16],
            latency: 0,
            devnode: [0; 32],
            next_play_engine: 0,
            next_rec_engine: 0,
            filler: [0; 184],
        }
    }
}

/// `audio_buf_info` from `sys/soundcard.h`.
#[repr(C)]
#[derive(Default)]
struct AudioBufInfo {
    fragments: libc::c_int,
    fragstotal: libc::c_int,
    fragsize: libc::c_int,
    bytes: libc::c_int,
}

nix::ioctl_readwrite!(oss_engine_info, SNDCTL_INFO_MAGIC, SNDCTL_ENGINEINFO, OssAudioInfo);
nix::ioctl_read!(oss_get_caps, SNDCTL_DSP_MAGIC, SNDCTL_DSP_GETCAPS, libc::c_int);
nix::ioctl_write_ptr!(oss_set_cooked, SNDCTL_DSP_MAGIC, SNDCTL_DSP_COOKEDMODE, libc::c_int);
nix::ioctl_readwrite!(oss_set_channels, SNDCTL_DSP_MAGIC, SNDCTL_DSP_CHANNELS, libc::c_int);
nix::ioctl_readwrite!(oss_set_fragment, SNDCTL_DSP_MAGIC, SNDCTL_DSP_SETFRAGMENT, libc::c_int);
nix::ioctl_readwrite!(oss_set_format, SNDCTL_DSP_MAGIC, SNDCTL_DSP_SETFMT, libc::c_int);
nix::ioctl_readwrite!(oss_set_speed, SNDCTL_DSP_MAGIC, SNDCTL_DSP_SPEED, libc::c_int);
nix::ioctl_read!(oss_output_space, SNDCTL_DSP_MAGIC, SNDCTL_DSP_GETOSPACE, AudioBufInfo);
nix::ioctl_readwrite!(oss_block_size, SNDCTL_DSP_MAGIC, SNDCTL_DSP_GETBLKSIZE, libc::c_int);

fn c_string(raw: &[libc::c_char]) -> String {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Packs the `SNDCTL_DSP_SETFRAGMENT` argument: count in the high 16 bits,
/// size exponent in the low 16.
fn fragment_arg(count: u32, exponent: u32) -> u32 {
    (count << 16) | (exponent & 0xffff)
}

fn non_negative(value: libc::c_int) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn to_c_int(value: u32) -> libc::c_int {
    libc::c_int::try_from(value).unwrap_or(libc::c_int::MAX)
}

/// An OSS DSP device node opened for combined read and write.
///
/// The device is released when this value is dropped.
#[derive(Debug)]
pub struct OssDevice {
    file: File,
    path: PathBuf,
    name: String,
}

impl OssDevice {
    /// Opens `path` for read+write.
    ///
    /// # Errors
    ///
    /// Returns `DeviceOpenFailed` if the node cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DuplexError> {
        let path = path.as_ref().to_path_buf();
        let file = File::options()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| DuplexError::DeviceOpenFailed {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "opened OSS device");
        Ok(Self {
            file,
            name: path.display().to_string(),
            path,
        })
    }

    /// Opens the device node named in `request`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceOpenFailed` if the node cannot be opened.
    pub fn for_request(request: &StreamRequest) -> Result<Self, DuplexError> {
        Self::open(&request.device)
    }

    /// Path the device was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fd(&self) -> libc::c_int {
        self.file.as_raw_fd()
    }

    fn read_write_int(
        &self,
        request: unsafe fn(libc::c_int, *mut libc::c_int) -> nix::Result<libc::c_int>,
        value: u32,
    ) -> io::Result<u32> {
        let mut arg = to_c_int(value);
        // SAFETY: `arg` is a valid, exclusively borrowed c_int for the call.
        unsafe { request(self.fd(), &mut arg) }.map_err(io::Error::from)?;
        Ok(non_negative(arg))
    }
}

impl Read for OssDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for OssDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl DspDevice for OssDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&mut self) -> io::Result<DeviceCaps> {
        let mut info = OssAudioInfo::for_open_device();
        let mut caps: libc::c_int = 0;
        // SAFETY: both arguments are valid, exclusively borrowed repr(C) values.
        unsafe {
            oss_engine_info(self.fd(), &mut info).map_err(io::Error::from)?;
            oss_get_caps(self.fd(), &mut caps).map_err(io::Error::from)?;
        }
        Ok(DeviceCaps {
            name: c_string(&info.name),
            handle: c_string(&info.handle),
            min_channels: non_negative(info.min_channels),
            max_channels: non_negative(info.max_channels),
            min_rate: non_negative(info.min_rate),
            max_rate: non_negative(info.max_rate),
            latency: info.latency,
            caps: Capabilities(caps as u32),
        })
    }

    fn set_cooked_mode(&mut self, enabled: bool) -> io::Result<()> {
        let arg: libc::c_int = i32::from(enabled);
        // SAFETY: `arg` outlives the call.
        unsafe { oss_set_cooked(self.fd(), &arg) }.map_err(io::Error::from)?;
        Ok(())
    }

    fn set_channels(&mut self, channels: u32) -> io::Result<u32> {
        self.read_write_int(oss_set_channels, channels)
    }

    fn set_fragment(&mut self, count: u32, exponent: u32) -> io::Result<()> {
        self.read_write_int(oss_set_fragment, fragment_arg(count, exponent))
            .map(|_| ())
    }

    fn set_format(&mut self, format: u32) -> io::Result<u32> {
        let mut arg = format as libc::c_int;
        // SAFETY: `arg` is a valid, exclusively borrowed c_int for the call.
        unsafe { oss_set_format(self.fd(), &mut arg) }.map_err(io::Error::from)?;
        Ok(arg as u32)
    }

    fn set_rate(&mut self, rate: u32) -> io::Result<u32> {
        self.read_write_int(oss_set_speed, rate)
    }

    fn output_space(&mut self) -> io::Result<BufferInfo> {
        let mut info = AudioBufInfo::default();
        // SAFETY: `info` is a valid, exclusively borrowed repr(C) value.
        unsafe { oss_output_space(self.fd(), &mut info) }.map_err(io::Error::from)?;
        Ok(BufferInfo {
            fragments: non_negative(info.fragments),
            fragstotal: non_negative(info.fragstotal),
            fragsize: non_negative(info.fragsize),
            bytes: non_negative(info.bytes),
        })
    }

    fn block_size(&mut self) -> io::Result<u32> {
        self.read_write_int(oss_block_size, 0)
    }
}
