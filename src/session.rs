//! Shared pump state: the cooperative stop flag and transfer counters.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Statistics about a running or finished pump.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Fragments read, processed and written back.
    pub fragments_processed: u64,
    /// Bytes read from the device.
    pub bytes_read: u64,
    /// Bytes written to the device.
    pub bytes_written: u64,
    /// Samples dropped because they did not form a whole frame.
    pub samples_truncated: u64,
}

/// State shared between the pump and its [`StopHandle`]s.
///
/// Counters are only written by the pump thread; other threads may read
/// them at any time.
pub(crate) struct SessionState {
    pub stop_requested: AtomicBool,
    pub fragments_processed: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
    pub samples_truncated: AtomicU64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            stop_requested: AtomicBool::new(false),
            fragments_processed: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            samples_truncated: AtomicU64::new(0),
        }
    }

    pub fn record_fragment(&self, bytes: usize, truncated: usize) {
        self.fragments_processed.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
        self.samples_truncated
            .fetch_add(truncated as u64, Ordering::Relaxed);
    }

    pub fn stats(&self) -> PumpStats {
        PumpStats {
            fragments_processed: self.fragments_processed.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            samples_truncated: self.samples_truncated.load(Ordering::Relaxed),
        }
    }
}

/// Cooperative stop signal for a running pump.
///
/// Cloneable and `Send`, so it can be moved to a signal handler or another
/// thread. The pump checks it before each fragment; a transfer already in
/// progress completes first.
///
/// # Example
///
/// ```
/// use oss_duplex::device::MockDevice;
/// use oss_duplex::DuplexPump;
///
/// let pump = DuplexPump::<_, _, i16>::new(MockDevice::full_duplex(), Default::default());
/// let stop = pump.stop_handle();
/// stop.stop();
/// assert!(stop.is_stopped());
/// ```
#[derive(Clone)]
pub struct StopHandle {
    state: Arc<SessionState>,
}

impl StopHandle {
    pub(crate) fn new(state: Arc<SessionState>) -> Self {
        Self { state }
    }

    /// Asks the pump to stop before its next fragment.
    pub fn stop(&self) {
        self.state.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state.stop_requested.load(Ordering::SeqCst)
    }

    /// Current transfer statistics.
    #[must_use]
    pub fn stats(&self) -> PumpStats {
        self.state.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_new() {
        let state = SessionState::new();
        assert!(!state.stop_requested.load(Ordering::SeqCst));
        assert_eq!(state.stats(), PumpStats::default());
    }

    #[test]
    fn test_record_fragment() {
        let state = SessionState::new();
        state.record_fragment(1024, 1);
        state.record_fragment(1024, 1);

        let stats = state.stats();
        assert_eq!(stats.fragments_processed, 2);
        assert_eq!(stats.bytes_read, 2048);
        assert_eq!(stats.bytes_written, 2048);
        assert_eq!(stats.samples_truncated, 2);
    }

    #[test]
    fn test_stop_handle_shared() {
        let state = Arc::new(SessionState::new());
        let handle = StopHandle::new(Arc::clone(&state));
        let clone = handle.clone();

        clone.stop();
        assert!(handle.is_stopped());
    }
}
