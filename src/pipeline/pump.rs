//! The duplex pump: negotiate once, then move fragments until stopped.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::device::DspDevice;
use crate::error::TransferDirection;
use crate::format::{decode_into, encode_into, merge, split, PlanarFrame, Sample};
use crate::pipeline::{Identity, Processor};
use crate::session::{PumpStats, SessionState, StopHandle};
use crate::{DuplexError, EventCallback, Negotiator, StreamConfig, StreamRequest};

/// Lifecycle of a [`DuplexPump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    /// Created; nothing has touched the device yet.
    Idle,
    /// Negotiation in progress.
    Negotiating,
    /// Buffers allocated; fragments can be moved.
    Running,
    /// Stopped on request between fragments.
    Stopped,
    /// Negotiation or a transfer failed. Terminal.
    Failed,
}

/// Fragment buffers, sized once from the negotiated config.
struct FrameBuffers<S> {
    raw: Vec<u8>,
    interleaved: Vec<S>,
    planar: PlanarFrame<S>,
    truncated: usize,
}

impl<S: Sample> FrameBuffers<S> {
    fn new(config: &StreamConfig) -> Self {
        let layout = config.layout();
        Self {
            raw: vec![0u8; config.fragment_bytes()],
            interleaved: vec![S::default(); layout.frame_samples()],
            planar: PlanarFrame::for_layout(layout),
            truncated: layout.remainder(),
        }
    }
}

/// Moves audio from a duplex device's capture side, through a
/// [`Processor`], back to its playback side.
///
/// `S` is the sample container: `i8` for [`Signed8`], `i16` for
/// [`Signed16`], `i32` for [`Signed24`] and [`Signed32`].
///
/// Each iteration reads exactly one fragment, splits it into per-channel
/// buffers, runs the processor, merges and writes exactly one fragment.
/// The device's blocking I/O paces the loop. No allocation happens after
/// [`start`](Self::start).
///
/// # Example
///
/// ```
/// use oss_duplex::device::MockDevice;
/// use oss_duplex::{ChannelRequest, DuplexPump, PumpState, StreamRequest};
///
/// let device = MockDevice::full_duplex();
/// let input = device.handle();
/// let request = StreamRequest::default().with_channels(ChannelRequest::Exact(2));
///
/// let mut pump = DuplexPump::<_, _, i16>::new(device, request);
/// let config = pump.start()?.clone();
///
/// input.push_samples(&vec![7i16; config.frame_sample_count()]);
/// pump.step()?;
/// assert_eq!(input.output().len(), config.fragment_bytes());
/// assert_eq!(pump.state(), PumpState::Running);
/// # Ok::<(), oss_duplex::DuplexError>(())
/// ```
///
/// [`Signed8`]: crate::SampleFormat::Signed8
/// [`Signed16`]: crate::SampleFormat::Signed16
/// [`Signed24`]: crate::SampleFormat::Signed24
/// [`Signed32`]: crate::SampleFormat::Signed32
pub struct DuplexPump<D, P, S> {
    device: D,
    request: StreamRequest,
    processor: P,
    state: PumpState,
    config: Option<StreamConfig>,
    buffers: Option<FrameBuffers<S>>,
    session: Arc<SessionState>,
    event_callback: Option<EventCallback>,
}

impl<D: DspDevice, S: Sample> DuplexPump<D, Identity, S> {
    /// Creates an echo pump: input is played back unchanged.
    pub fn new(device: D, request: StreamRequest) -> Self {
        Self {
            device,
            request,
            processor: Identity,
            state: PumpState::Idle,
            config: None,
            buffers: None,
            session: Arc::new(SessionState::new()),
            event_callback: None,
        }
    }
}

#[cfg(all(unix, feature = "oss"))]
impl<S: Sample> DuplexPump<crate::device::OssDevice, Identity, S> {
    /// Opens the device named in `request` and creates an echo pump over it.
    ///
    /// # Errors
    ///
    /// Returns `DeviceOpenFailed` if the node cannot be opened.
    pub fn open(request: StreamRequest) -> Result<Self, DuplexError> {
        let device = crate::device::OssDevice::for_request(&request)?;
        Ok(Self::new(device, request))
    }
}

impl<D: DspDevice, P: Processor<S>, S: Sample> DuplexPump<D, P, S> {
    /// Replaces the processor.
    pub fn with_processor<Q: Processor<S>>(self, processor: Q) -> DuplexPump<D, Q, S> {
        DuplexPump {
            device: self.device,
            request: self.request,
            processor,
            state: self.state,
            config: self.config,
            buffers: self.buffers,
            session: self.session,
            event_callback: self.event_callback,
        }
    }

    /// Registers a callback for negotiation advisories.
    #[must_use]
    pub fn on_event(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PumpState {
        self.state
    }

    /// The negotiated configuration, once [`start`](Self::start) succeeded.
    pub fn config(&self) -> Option<&StreamConfig> {
        self.config.as_ref()
    }

    /// A handle that stops [`run`](Self::run) before its next fragment.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.session))
    }

    /// Transfer statistics so far.
    pub fn stats(&self) -> PumpStats {
        self.session.stats()
    }

    /// The processor.
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Consumes the pump and returns the device.
    pub fn into_device(self) -> D {
        self.device
    }

    /// Negotiates with the device and allocates fragment buffers.
    ///
    /// Moves `Idle → Negotiating → Running`, or to `Failed` on any error.
    /// Negotiation is never retried; build a new pump with a different
    /// request instead.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the pump is idle, `SampleWidthMismatch`
    /// if `S` cannot carry the requested format, and any negotiation error.
    pub fn start(&mut self) -> Result<&StreamConfig, DuplexError> {
        self.expect_state(PumpState::Idle)?;
        self.transition(PumpState::Negotiating);

        match self.negotiate() {
            Ok(config) => {
                self.buffers = Some(FrameBuffers::new(&config));
                self.config = Some(config);
                self.transition(PumpState::Running);
                self.config
                    .as_ref()
                    .ok_or(DuplexError::InvalidState {
                        expected: PumpState::Running,
                        actual: self.state,
                    })
            }
            Err(e) => {
                tracing::error!(error = %e, "negotiation failed");
                self.transition(PumpState::Failed);
                Err(e)
            }
        }
    }

    /// Moves exactly one fragment: read, split, process, merge, write.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the pump is running, and
    /// `TransferIoError` (moving the pump to `Failed`) if the read or write
    /// fails or is short.
    pub fn step(&mut self) -> Result<(), DuplexError> {
        self.expect_state(PumpState::Running)?;
        let Some(buffers) = self.buffers.as_mut() else {
            return Err(DuplexError::InvalidState {
                expected: PumpState::Running,
                actual: self.state,
            });
        };

        let (bytes, truncated) = (buffers.raw.len(), buffers.truncated);
        if let Err(e) = transfer_fragment(&mut self.device, buffers, &mut self.processor) {
            tracing::error!(error = %e, "fragment transfer failed");
            self.transition(PumpState::Failed);
            return Err(e);
        }

        self.session.record_fragment(bytes, truncated);
        tracing::trace!(
            fragment = self.session.fragments_processed.load(Ordering::Relaxed),
            "fragment echoed"
        );
        Ok(())
    }

    /// Moves fragments until a stop is requested.
    ///
    /// Starts the pump first if it is still idle. The stop flag is checked
    /// before every fragment, never in the middle of one.
    ///
    /// # Errors
    ///
    /// Returns any error from [`start`](Self::start) or
    /// [`step`](Self::step).
    pub fn run(&mut self) -> Result<PumpStats, DuplexError> {
        if self.state == PumpState::Idle {
            self.start()?;
        }
        self.expect_state(PumpState::Running)?;

        while !self.session.stop_requested.load(Ordering::SeqCst) {
            self.step()?;
        }

        self.transition(PumpState::Stopped);
        let stats = self.stats();
        tracing::info!(
            fragments = stats.fragments_processed,
            bytes = stats.bytes_written,
            "pump stopped"
        );
        Ok(stats)
    }

    fn negotiate(&mut self) -> Result<StreamConfig, DuplexError> {
        let format = self.request.sample_format;
        if format.width_bytes() != S::WIDTH {
            return Err(DuplexError::SampleWidthMismatch {
                format,
                expected: format.width_bytes(),
                container: S::WIDTH,
            });
        }

        let mut negotiator = Negotiator::new(self.request.clone());
        if let Some(callback) = &self.event_callback {
            negotiator = negotiator.on_event(Arc::clone(callback));
        }
        negotiator.negotiate(&mut self.device)
    }

    fn expect_state(&self, expected: PumpState) -> Result<(), DuplexError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(DuplexError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn transition(&mut self, next: PumpState) {
        tracing::debug!(from = ?self.state, to = ?next, "pump state change");
        self.state = next;
    }
}

fn transfer_fragment<D, P, S>(
    device: &mut D,
    buffers: &mut FrameBuffers<S>,
    processor: &mut P,
) -> Result<(), DuplexError>
where
    D: Read + Write,
    P: Processor<S>,
    S: Sample,
{
    read_fragment(device, &mut buffers.raw)?;
    decode_into(&buffers.raw, &mut buffers.interleaved);
    split(&buffers.interleaved, &mut buffers.planar);

    processor.process(&mut buffers.planar);

    merge(&buffers.planar, &mut buffers.interleaved);
    encode_into(&buffers.interleaved, &mut buffers.raw);
    write_fragment(device, &buffers.raw)
}

/// Reads one whole fragment with a single transfer.
///
/// Interrupted calls are retried; anything shorter than the fragment is an
/// error rather than being padded.
fn read_fragment<R: Read>(device: &mut R, buf: &mut [u8]) -> Result<(), DuplexError> {
    let expected = buf.len();
    loop {
        match device.read(buf) {
            Ok(n) if n == expected => return Ok(()),
            Ok(n) => {
                return Err(DuplexError::TransferIoError {
                    direction: TransferDirection::Read,
                    expected,
                    transferred: n,
                    source: std::io::Error::new(ErrorKind::UnexpectedEof, "short read"),
                })
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(DuplexError::TransferIoError {
                    direction: TransferDirection::Read,
                    expected,
                    transferred: 0,
                    source,
                })
            }
        }
    }
}

/// Writes one whole fragment with a single transfer.
fn write_fragment<W: Write>(device: &mut W, buf: &[u8]) -> Result<(), DuplexError> {
    let expected = buf.len();
    loop {
        match device.write(buf) {
            Ok(n) if n == expected => return Ok(()),
            Ok(n) => {
                return Err(DuplexError::TransferIoError {
                    direction: TransferDirection::Write,
                    expected,
                    transferred: n,
                    source: std::io::Error::new(ErrorKind::WriteZero, "short write"),
                })
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(DuplexError::TransferIoError {
                    direction: TransferDirection::Write,
                    expected,
                    transferred: 0,
                    source,
                })
            }
        }
    }
}
