//! Interleaved ⇄ planar frame transcoding.
//!
//! A device fragment carries samples multiplexed per frame:
//! with two channels, eight samples arrive as `L,R,L,R,L,R,L,R`.
//! [`split`] turns that into one buffer per channel (`L,L,L,L` and
//! `R,R,R,R`) and [`merge`] performs the inverse.
//!
//! When the fragment's sample count is not a multiple of the channel count,
//! the trailing samples do not form a whole frame. They are never copied
//! into a channel buffer, and [`merge`] leaves the matching interleaved
//! positions untouched.

use crate::format::Sample;

/// Size arithmetic for one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    channels: usize,
    frame_samples: usize,
}

impl FrameLayout {
    /// Creates a layout for `frame_samples` interleaved samples across
    /// `channels` channels.
    ///
    /// A channel count of zero is treated as one.
    #[must_use]
    pub fn new(channels: usize, frame_samples: usize) -> Self {
        Self {
            channels: channels.max(1),
            frame_samples,
        }
    }

    /// Number of channels.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Total samples (all channels) in the interleaved fragment.
    #[must_use]
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Samples each channel buffer holds.
    #[must_use]
    pub fn per_channel(&self) -> usize {
        self.frame_samples / self.channels
    }

    /// Interleaved samples that belong to a whole frame.
    #[must_use]
    pub fn usable_samples(&self) -> usize {
        self.per_channel() * self.channels
    }

    /// Trailing samples dropped by [`split`].
    #[must_use]
    pub fn remainder(&self) -> usize {
        self.frame_samples % self.channels
    }
}

/// One fragment in per-channel (planar) layout.
///
/// The shape is fixed at construction; processors can change sample values
/// but not the number of channels or their length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanarFrame<S> {
    buffers: Vec<Vec<S>>,
    per_channel: usize,
}

impl<S: Sample> PlanarFrame<S> {
    /// Allocates a zeroed planar frame.
    #[must_use]
    pub fn new(channels: usize, per_channel: usize) -> Self {
        Self {
            buffers: vec![vec![S::default(); per_channel]; channels.max(1)],
            per_channel,
        }
    }

    /// Allocates a planar frame sized for `layout`.
    #[must_use]
    pub fn for_layout(layout: FrameLayout) -> Self {
        Self::new(layout.channels(), layout.per_channel())
    }

    /// Builds a frame from existing channel buffers.
    ///
    /// Returns `None` if there are no buffers or their lengths differ.
    #[must_use]
    pub fn from_channels(buffers: Vec<Vec<S>>) -> Option<Self> {
        let per_channel = buffers.first()?.len();
        if buffers.iter().any(|b| b.len() != per_channel) {
            return None;
        }
        Some(Self {
            buffers,
            per_channel,
        })
    }
}

impl<S> PlanarFrame<S> {
    /// Number of channels.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.buffers.len()
    }

    /// Samples in each channel buffer.
    #[must_use]
    pub fn per_channel(&self) -> usize {
        self.per_channel
    }

    /// Samples of one channel.
    ///
    /// # Panics
    ///
    /// Panics if `channel` is out of range.
    #[must_use]
    pub fn channel(&self, channel: usize) -> &[S] {
        &self.buffers[channel]
    }

    /// Mutable samples of one channel.
    ///
    /// # Panics
    ///
    /// Panics if `channel` is out of range.
    pub fn channel_mut(&mut self, channel: usize) -> &mut [S] {
        &mut self.buffers[channel]
    }

    /// Iterates over every channel buffer.
    pub fn iter(&self) -> impl Iterator<Item = &[S]> {
        self.buffers.iter().map(Vec::as_slice)
    }

    /// Iterates mutably over every channel buffer.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut [S]> {
        self.buffers.iter_mut().map(Vec::as_mut_slice)
    }

    /// Consumes the frame and returns the channel buffers.
    #[must_use]
    pub fn into_channels(self) -> Vec<Vec<S>> {
        self.buffers
    }
}

/// Deinterleaves `interleaved` into `planar`.
///
/// Sample `i` lands in channel `i % channels` at index `i / channels`.
/// At most `planar.per_channel()` whole frames are copied; samples past the
/// last whole frame are ignored. Returns the number of samples copied.
pub fn split<S: Copy>(interleaved: &[S], planar: &mut PlanarFrame<S>) -> usize {
    let channels = planar.channels();
    let mut frames = 0;
    for (index, frame) in interleaved
        .chunks_exact(channels)
        .take(planar.per_channel)
        .enumerate()
    {
        for (buffer, &sample) in planar.buffers.iter_mut().zip(frame) {
            buffer[index] = sample;
        }
        frames += 1;
    }
    frames * channels
}

/// Interleaves `planar` into `interleaved`.
///
/// Channel `c`, index `k` lands at `k * channels + c`. Positions past the
/// last whole frame keep their previous contents. Returns the number of
/// samples written.
pub fn merge<S: Copy>(planar: &PlanarFrame<S>, interleaved: &mut [S]) -> usize {
    let channels = planar.channels();
    let mut frames = 0;
    for (index, frame) in interleaved
        .chunks_exact_mut(channels)
        .take(planar.per_channel)
        .enumerate()
    {
        for (slot, buffer) in frame.iter_mut().zip(&planar.buffers) {
            *slot = buffer[index];
        }
        frames += 1;
    }
    frames * channels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_arithmetic() {
        let layout = FrameLayout::new(3, 10);
        assert_eq!(layout.per_channel(), 3);
        assert_eq!(layout.usable_samples(), 9);
        assert_eq!(layout.remainder(), 1);
    }

    #[test]
    fn test_layout_zero_channels_is_mono() {
        let layout = FrameLayout::new(0, 8);
        assert_eq!(layout.channels(), 1);
        assert_eq!(layout.per_channel(), 8);
    }

    #[test]
    fn test_split_stereo() {
        // L0,R0,L1,R1,L2,R2,L3,R3
        let interleaved = [10i32, 20, 11, 21, 12, 22, 13, 23];
        let mut planar = PlanarFrame::for_layout(FrameLayout::new(2, 8));

        assert_eq!(split(&interleaved, &mut planar), 8);
        assert_eq!(planar.channel(0), &[10, 11, 12, 13]);
        assert_eq!(planar.channel(1), &[20, 21, 22, 23]);
    }

    #[test]
    fn test_merge_stereo() {
        let planar = PlanarFrame::from_channels(vec![vec![10i32, 11, 12, 13], vec![20, 21, 22, 23]])
            .unwrap();
        let mut interleaved = [0i32; 8];

        assert_eq!(merge(&planar, &mut interleaved), 8);
        assert_eq!(interleaved, [10, 20, 11, 21, 12, 22, 13, 23]);
    }

    #[test]
    fn test_roundtrip_channel_counts() {
        for channels in [1usize, 2, 4, 8] {
            let per_channel = 16;
            let original: Vec<i16> = (0..(channels * per_channel) as i16).collect();
            let mut planar = PlanarFrame::new(channels, per_channel);
            let mut restored = vec![0i16; original.len()];

            split(&original, &mut planar);
            merge(&planar, &mut restored);

            assert_eq!(restored, original, "roundtrip failed for {channels} channels");
        }
    }

    #[test]
    fn test_split_drops_remainder() {
        // 3 channels, 10 samples: index 9 is not part of a whole frame
        let interleaved: Vec<i32> = (100..110).collect();
        let layout = FrameLayout::new(3, interleaved.len());
        let mut planar = PlanarFrame::for_layout(layout);

        assert_eq!(split(&interleaved, &mut planar), 9);
        assert_eq!(planar.per_channel(), 3);
        assert_eq!(planar.channel(0), &[100, 103, 106]);
        assert_eq!(planar.channel(1), &[101, 104, 107]);
        assert_eq!(planar.channel(2), &[102, 105, 108]);
        assert!(planar.iter().all(|channel| !channel.contains(&109)));
    }

    #[test]
    fn test_merge_leaves_remainder_untouched() {
        let planar = PlanarFrame::from_channels(vec![vec![1i8, 2], vec![3, 4], vec![5, 6]]).unwrap();
        let mut interleaved = [-1i8; 7];

        assert_eq!(merge(&planar, &mut interleaved), 6);
        assert_eq!(interleaved, [1, 3, 5, 2, 4, 6, -1]);
    }

    #[test]
    fn test_split_short_input_copies_whole_frames_only() {
        let mut planar = PlanarFrame::<i16>::new(2, 4);
        assert_eq!(split(&[1, 2, 3], &mut planar), 2);
        assert_eq!(planar.channel(0), &[1, 0, 0, 0]);
        assert_eq!(planar.channel(1), &[2, 0, 0, 0]);
    }

    #[test]
    fn test_from_channels_rejects_ragged_buffers() {
        assert!(PlanarFrame::from_channels(vec![vec![0i16; 4], vec![0; 3]]).is_none());
        assert!(PlanarFrame::<i16>::from_channels(vec![]).is_none());
    }
}
