//! Per-fragment processing hook.

use crate::format::PlanarFrame;

/// Receives each fragment in planar form between capture and playback.
///
/// The frame's shape (channels, samples per channel) is fixed at
/// negotiation time. Processors edit samples in place and must not keep the
/// buffers past the call; they are reused for the next fragment.
///
/// Any `FnMut(&mut PlanarFrame<S>)` closure is a processor.
///
/// # Example
///
/// ```
/// use oss_duplex::{PlanarFrame, Processor};
///
/// /// Swaps the first two channels.
/// struct SwapStereo;
///
/// impl Processor<i16> for SwapStereo {
///     fn process(&mut self, frame: &mut PlanarFrame<i16>) {
///         if frame.channels() < 2 {
///             return;
///         }
///         for i in 0..frame.per_channel() {
///             let left = frame.channel(0)[i];
///             frame.channel_mut(0)[i] = frame.channel(1)[i];
///             frame.channel_mut(1)[i] = left;
///         }
///     }
/// }
/// ```
pub trait Processor<S> {
    /// Processes one fragment in place.
    fn process(&mut self, frame: &mut PlanarFrame<S>);
}

/// Pass-through processor: captured audio is played back unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<S> Processor<S> for Identity {
    #[inline]
    fn process(&mut self, _frame: &mut PlanarFrame<S>) {}
}

impl<S, F> Processor<S> for F
where
    F: FnMut(&mut PlanarFrame<S>),
{
    fn process(&mut self, frame: &mut PlanarFrame<S>) {
        self(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_leaves_frame_unchanged() {
        let mut frame = PlanarFrame::from_channels(vec![vec![1i16, 2], vec![3, 4]]).unwrap();
        let before = frame.clone();
        Identity.process(&mut frame);
        assert_eq!(frame, before);
    }

    #[test]
    fn test_closure_processor() {
        let mut frame = PlanarFrame::from_channels(vec![vec![1i32, 2, 3]]).unwrap();
        let mut invert = |frame: &mut PlanarFrame<i32>| {
            for channel in frame.iter_mut() {
                for sample in channel {
                    *sample = -*sample;
                }
            }
        };
        invert.process(&mut frame);
        assert_eq!(frame.channel(0), &[-1, -2, -3]);
    }
}
