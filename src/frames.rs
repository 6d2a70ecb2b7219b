//! Typed views over blocks of audio frames.
//!
//! Audio APIs hand out flat sample slices whose meaning depends on the channel count and on
//! whether channels are interleaved (`L R L R ...`) or planar (`L L ... R R ...`). These types do
//! the offset arithmetic once, with bounds checks, so callers address samples as
//! `(frame, channel)` pairs.

use crate::error::RingError;
use crate::FrameSample;


#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Layout {
    /// `[f0c0, f0c1, f1c0, f1c1, ...]`
    Interleaved,
    /// `[f0c0, f1c0, ..., f0c1, f1c1, ...]`
    Planar,
}


impl Layout {
    fn offset(self, frame: usize, channel: usize, frames: usize, channels: usize) -> Option<usize> {
        if frame >= frames || channel >= channels {
            return None;
        }
        Some(match self {
            Layout::Interleaved => frame * channels + channel,
            Layout::Planar => channel * frames + frame,
        })
    }
}


fn check_shape(len: usize, channels: usize) -> Result<usize, RingError> {
    if channels == 0 {
        return Err(RingError::Misconfigured("frames must have at least one channel".into()));
    }
    if len % channels != 0 {
        return Err(RingError::Misconfigured(format!(
            "{} samples do not divide into {} channels", len, channels)));
    }
    Ok(len / channels)
}


/// Owned block of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Frames<T> {
    data: Vec<T>,
    channels: usize,
    layout: Layout,
}


impl<T: FrameSample> Frames<T> {
    /// Allocate `frames` frames of silence.
    pub fn silence(frames: usize, channels: usize, layout: Layout) -> Self {
        Self {
            data: vec![T::default(); frames * channels.max(1)],
            channels: channels.max(1),
            layout,
        }
    }

    pub fn from_vec(data: Vec<T>, channels: usize, layout: Layout) -> Result<Self, RingError> {
        check_shape(data.len(), channels)?;
        Ok(Self { data, channels, layout })
    }

    /// Build interleaved frames by evaluating `f(frame, channel)` for every sample.
    pub fn from_fn<F>(frames: usize, channels: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let channels = channels.max(1);
        let mut data = Vec::with_capacity(frames * channels);
        for frame in 0 .. frames {
            for channel in 0 .. channels {
                data.push(f(frame, channel));
            }
        }
        Self { data, channels, layout: Layout::Interleaved }
    }

    pub fn frame_count(&self) -> usize {
        self.data.len() / self.channels
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn get(&self, frame: usize, channel: usize) -> Option<T> {
        self.as_slice().get(frame, channel)
    }

    pub fn set(&mut self, frame: usize, channel: usize, value: T) -> bool {
        self.as_slice_mut().set(frame, channel, value)
    }

    pub fn samples(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn as_slice(&self) -> FrameSlice<'_, T> {
        FrameSlice {
            data: &self.data,
            frames: self.frame_count(),
            channels: self.channels,
            layout: self.layout,
        }
    }

    pub fn as_slice_mut(&mut self) -> FrameSliceMut<'_, T> {
        let frames = self.frame_count();
        FrameSliceMut {
            data: &mut self.data,
            frames,
            channels: self.channels,
            layout: self.layout,
        }
    }
}


/// Borrowed, read-only block of frames.
#[derive(Debug, Copy, Clone)]
pub struct FrameSlice<'a, T> {
    data: &'a [T],
    frames: usize,
    channels: usize,
    layout: Layout,
}


impl<'a, T: FrameSample> FrameSlice<'a, T> {
    pub fn new(data: &'a [T], channels: usize, layout: Layout) -> Result<Self, RingError> {
        let frames = check_shape(data.len(), channels)?;
        Ok(Self { data, frames, channels, layout })
    }

    pub fn interleaved(data: &'a [T], channels: usize) -> Result<Self, RingError> {
        Self::new(data, channels, Layout::Interleaved)
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn offset(&self, frame: usize, channel: usize) -> Option<usize> {
        self.layout.offset(frame, channel, self.frames, self.channels)
    }

    pub fn get(&self, frame: usize, channel: usize) -> Option<T> {
        self.offset(frame, channel).map(|i| self.data[i])
    }
}


/// Borrowed, writable block of frames.
#[derive(Debug)]
pub struct FrameSliceMut<'a, T> {
    data: &'a mut [T],
    frames: usize,
    channels: usize,
    layout: Layout,
}


impl<'a, T: FrameSample> FrameSliceMut<'a, T> {
    pub fn new(data: &'a mut [T], channels: usize, layout: Layout) -> Result<Self, RingError> {
        let frames = check_shape(data.len(), channels)?;
        Ok(Self { data, frames, channels, layout })
    }

    pub fn interleaved(data: &'a mut [T], channels: usize) -> Result<Self, RingError> {
        Self::new(data, channels, Layout::Interleaved)
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn offset(&self, frame: usize, channel: usize) -> Option<usize> {
        self.layout.offset(frame, channel, self.frames, self.channels)
    }

    pub fn get(&self, frame: usize, channel: usize) -> Option<T> {
        self.offset(frame, channel).map(|i| self.data[i])
    }

    /// Returns `false` (and writes nothing) when `(frame, channel)` is out of range.
    pub fn set(&mut self, frame: usize, channel: usize, value: T) -> bool {
        match self.offset(frame, channel) {
            Some(i) => {
                self.data[i] = value;
                true
            },
            None => false,
        }
    }

    /// Zero the frames in `range` on every channel, clamped to the block.
    pub fn silence_frames(&mut self, range: std::ops::Range<usize>) {
        let end = range.end.min(self.frames);
        for frame in range.start.min(end) .. end {
            for channel in 0 .. self.channels {
                self.set(frame, channel, T::default());
            }
        }
    }

    pub fn fill_silence(&mut self) {
        for sample in self.data.iter_mut() {
            *sample = T::default();
        }
    }

    /// Reborrow without giving up `self`.
    pub fn reborrow(&mut self) -> FrameSliceMut<'_, T> {
        FrameSliceMut {
            data: &mut *self.data,
            frames: self.frames,
            channels: self.channels,
            layout: self.layout,
        }
    }
}
