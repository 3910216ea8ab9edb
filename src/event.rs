//! Advisory events raised during negotiation.
//!
//! Events are non-fatal notifications: the device granted something other
//! than what was asked, and the engine carries on with the granted value.
//! They are always logged with `tracing::warn!`; register an
//! [`EventCallback`] to react to them programmatically.

use std::sync::Arc;

/// Advisories about granted values that differ from the request.
///
/// # Example
///
/// ```
/// use oss_duplex::StreamEvent;
///
/// fn handle_event(event: StreamEvent) {
///     match event {
///         StreamEvent::ChannelsAdjusted { requested, granted } => {
///             eprintln!("asked for {requested} channels, got {granted}");
///         }
///         StreamEvent::RateAdjusted { requested, granted } => {
///             eprintln!("asked for {requested}Hz, got {granted}Hz");
///         }
///         StreamEvent::FragmentLayoutAdjusted { granted_bytes, .. } => {
///             eprintln!("fragments are {granted_bytes} bytes");
///         }
///         StreamEvent::SamplesTruncated { per_fragment } => {
///             eprintln!("{per_fragment} samples per fragment are dropped");
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The device granted a different channel count.
    ChannelsAdjusted {
        /// Channels asked for.
        requested: u32,
        /// Channels granted (authoritative).
        granted: u32,
    },

    /// The device granted a different sample rate.
    RateAdjusted {
        /// Rate asked for in Hz.
        requested: u32,
        /// Rate granted in Hz (authoritative).
        granted: u32,
    },

    /// The device granted a different fragment layout.
    FragmentLayoutAdjusted {
        /// Fragment count asked for (`0x7fff` means "device default").
        requested_count: u32,
        /// Fragment size asked for in bytes.
        requested_bytes: usize,
        /// Fragment count granted.
        granted_count: u32,
        /// Fragment size granted in bytes.
        granted_bytes: usize,
    },

    /// The fragment's sample count is not a multiple of the channel count.
    ///
    /// The trailing samples of every fragment never reach a channel buffer.
    SamplesTruncated {
        /// Samples dropped per fragment.
        per_fragment: usize,
    },
}

/// Callback type for receiving advisory events.
pub type EventCallback = Arc<dyn Fn(StreamEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use oss_duplex::{event_callback, StreamEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(StreamEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_event_debug() {
        let event = StreamEvent::SamplesTruncated { per_fragment: 1 };
        let debug = format!("{:?}", event);
        assert!(debug.contains("SamplesTruncated"));
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |_| {
            called_clone.store(true, Ordering::SeqCst);
        });

        callback(StreamEvent::RateAdjusted {
            requested: 48000,
            granted: 44100,
        });
        assert!(called.load(Ordering::SeqCst));
    }
}
