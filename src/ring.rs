//! Time-stamped single-producer/single-consumer ring buffer for audio frames.
//!
//! Bridges two real-time callbacks that are not scheduled in lockstep, typically an input device
//! callback (`RingProducer::store`) and an output device callback (`RingConsumer::fetch`). Frames
//! are addressed by absolute frame number, not insertion order, so the two sides can drift
//! relative to each other: the buffer holds the window `[start, end)` of the most recently stored
//! frames and a fetch outside that window yields silence plus an underrun/overrun report instead
//! of stale data.
//!
//! Neither side blocks, locks or allocates after `RingBuffer::allocate`. Samples live in atomic
//! cells and the window bounds are published with release/acquire ordering:
//!
//!   - the producer publishes a new `start` before it touches any slot it evicts, and publishes
//!     `end` only after the new frames are written;
//!   - the consumer reads `end` before `start`, copies, then re-reads `start` (and the rewind
//!     epoch) behind an acquire fence and silences whatever the producer evicted mid-copy.
//!
//! ```rust
//! use tapeloop::{Frames, Layout, RingBuffer};
//!
//! let ring = RingBuffer::<f32>::allocate(1, 4, 300).unwrap();
//! let (mut producer, mut consumer) = ring.split();
//!
//! let input = Frames::from_fn(100, 1, |frame, _| frame as f32);
//! producer.store(input.as_slice(), 0).unwrap();
//!
//! let mut output = Frames::silence(100, 1, Layout::Interleaved);
//! let report = consumer.fetch(output.as_slice_mut(), 0).unwrap();
//! assert!(report.is_complete());
//! assert_eq!(output, input);
//! ```

use std::fmt;
use std::mem;
use std::sync::atomic::{fence, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::atomic::AtomicCell;
use crossbeam::utils::CachePadded;
use log::{debug, error, warn};

use crate::error::RingError;
use crate::frames::{FrameSlice, FrameSliceMut};
use crate::{AudioSink, AudioSource, FrameSample};


/// `read_head` value before the consumer has fetched anything.
const NEVER_READ: i64 = i64::MIN;


/// Outcome of a `fetch`.
///
/// The first `overrun_frames` frames of the destination were requested from before the window
/// (already evicted) and the last `underrun_frames` from past its end (not yet stored). Both
/// regions are silenced; everything in between is exactly what was stored.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FetchReport {
    pub overrun_frames: usize,
    pub underrun_frames: usize,
}


impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.overrun_frames == 0 && self.underrun_frames == 0
    }

    pub fn is_overrun(&self) -> bool {
        self.overrun_frames > 0
    }

    pub fn is_underrun(&self) -> bool {
        self.underrun_frames > 0
    }
}


/// Counters shared between the audio threads and whoever wants to watch them.
///
/// All updates are relaxed: values are for diagnostics and may lag each other slightly.
#[derive(Debug, Default)]
pub struct Diagnostics {
    stores: AtomicU64,
    fetches: AtomicU64,
    underruns: AtomicU64,
    underrun_frames: AtomicU64,
    overruns: AtomicU64,
    overrun_frames: AtomicU64,
    overwritten_frames: AtomicU64,
    rewinds: AtomicU64,
    misconfigurations: AtomicU64,
}


/// Point-in-time copy of `Diagnostics`.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct DiagnosticsSnapshot {
    pub stores: u64,
    pub fetches: u64,
    /// Fetches that asked for frames not yet stored.
    pub underruns: u64,
    pub underrun_frames: u64,
    /// Fetches that asked for frames already evicted.
    pub overruns: u64,
    pub overrun_frames: u64,
    /// Frames evicted by `store` before the consumer fetched them.
    pub overwritten_frames: u64,
    /// Stores that went backwards in time and restarted the window.
    pub rewinds: u64,
    pub misconfigurations: u64,
}


impl DiagnosticsSnapshot {
    /// Per-counter difference against an earlier snapshot.
    pub fn since(&self, earlier: &DiagnosticsSnapshot) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            stores: self.stores.saturating_sub(earlier.stores),
            fetches: self.fetches.saturating_sub(earlier.fetches),
            underruns: self.underruns.saturating_sub(earlier.underruns),
            underrun_frames: self.underrun_frames.saturating_sub(earlier.underrun_frames),
            overruns: self.overruns.saturating_sub(earlier.overruns),
            overrun_frames: self.overrun_frames.saturating_sub(earlier.overrun_frames),
            overwritten_frames: self.overwritten_frames.saturating_sub(earlier.overwritten_frames),
            rewinds: self.rewinds.saturating_sub(earlier.rewinds),
            misconfigurations: self.misconfigurations.saturating_sub(earlier.misconfigurations),
        }
    }

    /// `true` if anything audible went wrong.
    pub fn has_glitches(&self) -> bool {
        self.underruns > 0 || self.overruns > 0 || self.overwritten_frames > 0
            || self.misconfigurations > 0
    }
}


impl Diagnostics {
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            stores: self.stores.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            underrun_frames: self.underrun_frames.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            overrun_frames: self.overrun_frames.load(Ordering::Relaxed),
            overwritten_frames: self.overwritten_frames.load(Ordering::Relaxed),
            rewinds: self.rewinds.load(Ordering::Relaxed),
            misconfigurations: self.misconfigurations.load(Ordering::Relaxed),
        }
    }

    fn record_fetch(&self, report: &FetchReport) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if report.underrun_frames > 0 {
            self.underruns.fetch_add(1, Ordering::Relaxed);
            self.underrun_frames.fetch_add(report.underrun_frames as u64, Ordering::Relaxed);
        }
        if report.overrun_frames > 0 {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            self.overrun_frames.fetch_add(report.overrun_frames as u64, Ordering::Relaxed);
        }
    }

    fn record_misconfiguration(&self, err: &RingError) {
        error!("ring buffer {}", err);
        self.misconfigurations.fetch_add(1, Ordering::Relaxed);
    }
}


struct Shared<T> {
    channels: usize,
    capacity: usize,
    bytes_per_frame: usize,
    /// Planar: slot `s` of channel `c` lives at `c * capacity + s`.
    slots: Box<[AtomicCell<T>]>,
    start: CachePadded<AtomicI64>,
    end: CachePadded<AtomicI64>,
    /// Bumped whenever a store restarts the window behind its old end.
    epoch: CachePadded<AtomicU64>,
    /// One past the last frame the consumer asked for.
    read_head: CachePadded<AtomicI64>,
    diagnostics: Arc<Diagnostics>,
}


impl<T: FrameSample> Shared<T> {
    fn cell(&self, channel: usize, frame: i64) -> &AtomicCell<T> {
        let slot = frame.rem_euclid(self.capacity as i64) as usize;
        &self.slots[channel * self.capacity + slot]
    }

    fn time_bounds(&self) -> (i64, i64) {
        let end = self.end.load(Ordering::Acquire);
        let start = self.start.load(Ordering::Acquire);
        (start.min(end), end)
    }

    fn check_block(&self, frames: usize, channels: usize) -> Result<(), RingError> {
        let err = if channels != self.channels {
            RingError::ChannelMismatch { given: channels, expected: self.channels }
        } else if frames > self.capacity {
            RingError::TooManyFrames { requested: frames, capacity: self.capacity }
        } else {
            return Ok(());
        };
        self.diagnostics.record_misconfiguration(&err);
        Err(err)
    }

    /// Count unread frames in `[from, to)` that are about to be evicted.
    fn note_eviction(&self, from: i64, to: i64) {
        let read_head = self.read_head.load(Ordering::Relaxed);
        if read_head == NEVER_READ {
            return;
        }
        let unread = to - from.max(read_head);
        if unread > 0 {
            self.diagnostics.overwritten_frames.fetch_add(unread as u64, Ordering::Relaxed);
        }
    }

    /// One past the last frame of a `count` frame block at `start`, if that is representable.
    fn block_end(&self, start: i64, count: usize) -> Result<i64, RingError> {
        start.checked_add(count as i64).ok_or_else(|| {
            let err = RingError::FrameOverflow { start, frames: count };
            self.diagnostics.record_misconfiguration(&err);
            err
        })
    }

    fn store(&self, frames: FrameSlice<'_, T>, start_write: i64) -> Result<(), RingError> {
        let count = frames.frame_count();
        self.check_block(count, frames.channels())?;
        if count == 0 {
            return Ok(());
        }

        let capacity = self.capacity as i64;
        let end_write = self.block_end(start_write, count)?;
        // only this thread writes the bounds
        let start = self.start.load(Ordering::Relaxed);
        let end = self.end.load(Ordering::Relaxed);

        let rewind = start_write < end;
        let (new_start, new_end) = if rewind || start == end {
            (start_write, start_write)
        } else if end_write.saturating_sub(start) > capacity {
            let new_start = end_write - capacity;
            (new_start, new_start.max(end))
        } else {
            (start, end)
        };

        if rewind {
            if start != end {
                self.note_eviction(start, end);
                self.diagnostics.rewinds.fetch_add(1, Ordering::Relaxed);
            }
        } else if new_start > start {
            self.note_eviction(start, new_start.min(end));
        }
        if (new_start, new_end) != (start, end) {
            self.start.store(new_start, Ordering::Release);
            self.end.store(new_end, Ordering::Release);
        }
        // a reader that sees the new epoch must also see the restarted window
        if rewind {
            self.epoch.fetch_add(1, Ordering::Release);
        }
        // evictions above must be visible to any reader that sees the slot writes below
        fence(Ordering::Release);

        // skipped frames that are still inside the window read back as silence
        for frame in new_end .. start_write {
            for channel in 0 .. self.channels {
                self.cell(channel, frame).store(T::default());
            }
        }

        for i in 0 .. count {
            let frame = start_write + i as i64;
            for channel in 0 .. self.channels {
                self.cell(channel, frame).store(frames.get(i, channel).unwrap_or_default());
            }
        }

        self.end.store(end_write, Ordering::Release);
        self.diagnostics.stores.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn fetch(&self, mut dest: FrameSliceMut<'_, T>, start_read: i64) -> Result<FetchReport, RingError> {
        let count = dest.frame_count();
        self.check_block(count, dest.channels())?;
        if count == 0 {
            return Ok(FetchReport::default());
        }

        let end_read = self.block_end(start_read, count)?;
        let epoch = self.epoch.load(Ordering::Acquire);
        let end = self.end.load(Ordering::Acquire);
        let start = self.start.load(Ordering::Acquire);

        let lo = start.max(start_read).min(end_read);
        let hi = end.min(end_read).max(lo);

        for frame in lo .. hi {
            let i = (frame - start_read) as usize;
            for channel in 0 .. self.channels {
                dest.set(i, channel, self.cell(channel, frame).load());
            }
        }

        // anything the producer overwrote during the copy shows up as a moved `start`
        fence(Ordering::Acquire);
        let (lo, hi) = if self.epoch.load(Ordering::Relaxed) != epoch {
            (end_read, end_read)
        } else {
            let lo = self.start.load(Ordering::Relaxed).max(lo).min(hi);
            (lo, hi)
        };

        let valid_from = (lo - start_read) as usize;
        let valid_to = (hi - start_read) as usize;
        dest.silence_frames(0 .. valid_from);
        dest.silence_frames(valid_to .. count);

        self.read_head.store(end_read, Ordering::Relaxed);

        let report = FetchReport {
            overrun_frames: valid_from,
            underrun_frames: count - valid_to,
        };
        self.diagnostics.record_fetch(&report);
        Ok(report)
    }
}


/// Owner of a freshly allocated ring buffer, before it is split into its two ends.
pub struct RingBuffer<T> {
    shared: Arc<Shared<T>>,
}


impl<T: FrameSample> RingBuffer<T> {
    /// Reserve room for `capacity_frames` frames of `channels` channels.
    ///
    /// `bytes_per_frame` describes the caller's stream format and must match `T`: either a whole
    /// interleaved frame (`channels * size_of::<T>()`) or one planar channel (`size_of::<T>()`).
    pub fn allocate(
        channels: usize,
        bytes_per_frame: usize,
        capacity_frames: usize,
    ) -> Result<Self, RingError> {
        let sample_bytes = mem::size_of::<T>();
        if channels == 0 || capacity_frames == 0 {
            return Err(RingError::Misconfigured(format!(
                "cannot allocate {} channels x {} frames", channels, capacity_frames)));
        }
        if capacity_frames > i32::MAX as usize {
            return Err(RingError::TooManyFrames {
                requested: capacity_frames,
                capacity: i32::MAX as usize,
            });
        }
        if bytes_per_frame != sample_bytes && bytes_per_frame != sample_bytes * channels {
            return Err(RingError::Misconfigured(format!(
                "{} bytes per frame does not fit {} channels of {}-byte samples",
                bytes_per_frame, channels, sample_bytes)));
        }

        let total = channels
            .checked_mul(capacity_frames)
            .ok_or(RingError::Allocation { bytes: usize::MAX })?;
        let bytes = total.saturating_mul(sample_bytes);
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(total)
            .map_err(|_| RingError::Allocation { bytes })?;
        slots.extend((0 .. total).map(|_| AtomicCell::new(T::default())));

        if !AtomicCell::<T>::is_lock_free() {
            warn!("{}-byte samples are not lock-free on this target", sample_bytes);
        }
        debug!("allocated ring buffer: {} channels x {} frames ({} bytes)",
            channels, capacity_frames, bytes);

        Ok(Self {
            shared: Arc::new(Shared {
                channels,
                capacity: capacity_frames,
                bytes_per_frame,
                slots: slots.into_boxed_slice(),
                start: CachePadded::new(AtomicI64::new(0)),
                end: CachePadded::new(AtomicI64::new(0)),
                epoch: CachePadded::new(AtomicU64::new(0)),
                read_head: CachePadded::new(AtomicI64::new(NEVER_READ)),
                diagnostics: Arc::new(Diagnostics::default()),
            }),
        })
    }

    /// Hand out the writing and reading ends. Each can be moved to its own thread.
    pub fn split(self) -> (RingProducer<T>, RingConsumer<T>) {
        (
            RingProducer { shared: Arc::clone(&self.shared) },
            RingConsumer { shared: self.shared },
        )
    }

    pub fn capacity_frames(&self) -> usize {
        self.shared.capacity
    }

    pub fn channels(&self) -> usize {
        self.shared.channels
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.shared.bytes_per_frame
    }

    pub fn diagnostics(&self) -> Arc<Diagnostics> {
        Arc::clone(&self.shared.diagnostics)
    }
}


impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("channels", &self.shared.channels)
            .field("capacity", &self.shared.capacity)
            .field("start", &self.shared.start.load(Ordering::Relaxed))
            .field("end", &self.shared.end.load(Ordering::Relaxed))
            .finish()
    }
}


/// Writing end. Not `Clone`: there is exactly one producer.
pub struct RingProducer<T> {
    shared: Arc<Shared<T>>,
}


impl<T: FrameSample> RingProducer<T> {
    /// Copy `frames` in as frame numbers `start_frame ..`.
    ///
    /// Never fails for lack of room: the oldest frames are evicted instead. Fails only when the
    /// block is larger than the buffer, has the wrong channel count or would run past
    /// `i64::MAX`, in which case nothing is written.
    pub fn store(&mut self, frames: FrameSlice<'_, T>, start_frame: i64) -> Result<(), RingError> {
        self.shared.store(frames, start_frame)
    }

    /// `(start, end)` of the frames currently held.
    pub fn time_bounds(&self) -> (i64, i64) {
        self.shared.time_bounds()
    }

    pub fn capacity_frames(&self) -> usize {
        self.shared.capacity
    }

    pub fn diagnostics(&self) -> Arc<Diagnostics> {
        Arc::clone(&self.shared.diagnostics)
    }
}


impl<T: FrameSample> AudioSink<T> for RingProducer<T> {
    fn consume(&mut self, frames: FrameSlice<'_, T>, frame_number: i64) {
        // already logged and counted
        let _ = self.store(frames, frame_number);
    }
}


/// Reading end. Not `Clone`: there is exactly one consumer.
pub struct RingConsumer<T> {
    shared: Arc<Shared<T>>,
}


impl<T: FrameSample> RingConsumer<T> {
    /// Copy frames `start_frame ..` out into `dest`, silencing whatever is outside the window.
    pub fn fetch(
        &mut self,
        dest: FrameSliceMut<'_, T>,
        start_frame: i64,
    ) -> Result<FetchReport, RingError> {
        self.shared.fetch(dest, start_frame)
    }

    /// `(start, end)` of the frames currently held.
    pub fn time_bounds(&self) -> (i64, i64) {
        self.shared.time_bounds()
    }

    pub fn capacity_frames(&self) -> usize {
        self.shared.capacity
    }

    pub fn diagnostics(&self) -> Arc<Diagnostics> {
        Arc::clone(&self.shared.diagnostics)
    }
}


impl<T: FrameSample> AudioSource<T> for RingConsumer<T> {
    fn produce(&mut self, mut frames: FrameSliceMut<'_, T>, frame_number: i64) {
        if self.fetch(frames.reborrow(), frame_number).is_err() {
            frames.fill_silence();
        }
    }
}


#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicBool;
    use std::thread;

    use pretty_assertions::assert_eq;
    use rand::Rng;

    use super::*;
    use crate::frames::{Frames, Layout};

    fn ramp(frames: usize, channels: usize, first: i64) -> Frames<i32> {
        Frames::from_fn(frames, channels, |f, c| value_at(first + f as i64, c))
    }

    fn value_at(frame: i64, channel: usize) -> i32 {
        (frame as i32) * 4 + channel as i32 + 1
    }

    fn mono_f32(capacity: usize) -> (RingProducer<f32>, RingConsumer<f32>) {
        RingBuffer::<f32>::allocate(1, 4, capacity).unwrap().split()
    }

    #[test]
    fn test_round_trip_full_capacity() {
        for &(channels, capacity) in &[(1, 1), (1, 300), (2, 256), (6, 17)] {
            let (mut tx, mut rx) = RingBuffer::<i32>::allocate(channels, 4 * channels, capacity)
                .unwrap()
                .split();
            let input = ramp(capacity, channels, 40);
            tx.store(input.as_slice(), 40).unwrap();

            let mut output = Frames::silence(capacity, channels, Layout::Interleaved);
            let report = rx.fetch(output.as_slice_mut(), 40).unwrap();
            assert!(report.is_complete());
            assert_eq!(output, input);
        }
    }

    #[test]
    fn test_sub_range() {
        let (mut tx, mut rx) = RingBuffer::<i32>::allocate(2, 8, 64).unwrap().split();
        tx.store(ramp(50, 2, 1000).as_slice(), 1000).unwrap();

        let mut output = Frames::silence(20, 2, Layout::Interleaved);
        let report = rx.fetch(output.as_slice_mut(), 1015).unwrap();
        assert!(report.is_complete());
        assert_eq!(output, ramp(20, 2, 1015));
    }

    #[test]
    fn test_fetch_is_idempotent() {
        let (mut tx, mut rx) = RingBuffer::<i32>::allocate(2, 8, 32).unwrap().split();
        tx.store(ramp(20, 2, 0).as_slice(), 0).unwrap();

        let mut first = Frames::silence(24, 2, Layout::Interleaved);
        let mut second = Frames::silence(24, 2, Layout::Interleaved);
        let report_1 = rx.fetch(first.as_slice_mut(), 4).unwrap();
        let report_2 = rx.fetch(second.as_slice_mut(), 4).unwrap();
        assert_eq!(report_1, report_2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_planar_and_interleaved_agree() {
        let (mut tx, mut rx) = RingBuffer::<i16>::allocate(2, 2, 16).unwrap().split();
        let planar = Frames::from_vec(vec![1i16, 2, 3, 4, -1, -2, -3, -4], 2, Layout::Planar)
            .unwrap();
        tx.store(planar.as_slice(), 0).unwrap();

        let mut interleaved = Frames::silence(4, 2, Layout::Interleaved);
        rx.fetch(interleaved.as_slice_mut(), 0).unwrap();
        assert_eq!(interleaved.samples(), &[1, -1, 2, -2, 3, -3, 4, -4]);
    }

    #[test]
    fn test_fetch_after_end_is_underrun() {
        let (mut tx, mut rx) = RingBuffer::<i32>::allocate(1, 4, 64).unwrap().split();
        tx.store(ramp(10, 1, 0).as_slice(), 0).unwrap();

        let mut output = Frames::from_fn(8, 1, |_, _| 99);
        let report = rx.fetch(output.as_slice_mut(), 20).unwrap();
        assert_eq!(report, FetchReport { overrun_frames: 0, underrun_frames: 8 });
        assert_eq!(output.samples(), &[0; 8]);
    }

    #[test]
    fn test_partial_overlap_silences_only_the_gap() {
        let (mut tx, mut rx) = RingBuffer::<i32>::allocate(1, 4, 64).unwrap().split();
        tx.store(ramp(10, 1, 0).as_slice(), 0).unwrap();

        let mut output = Frames::silence(6, 1, Layout::Interleaved);
        let report = rx.fetch(output.as_slice_mut(), 7).unwrap();
        assert_eq!(report, FetchReport { overrun_frames: 0, underrun_frames: 3 });
        assert_eq!(output.samples(), &[value_at(7, 0), value_at(8, 0), value_at(9, 0), 0, 0, 0]);
    }

    #[test]
    fn test_fetch_before_start_is_overrun() {
        let (mut tx, mut rx) = RingBuffer::<i32>::allocate(1, 4, 16).unwrap().split();
        tx.store(ramp(16, 1, 0).as_slice(), 0).unwrap();
        tx.store(ramp(8, 1, 16).as_slice(), 16).unwrap();
        assert_eq!(tx.time_bounds(), (8, 24));

        let mut output = Frames::silence(4, 1, Layout::Interleaved);
        let report = rx.fetch(output.as_slice_mut(), 2).unwrap();
        assert_eq!(report, FetchReport { overrun_frames: 4, underrun_frames: 0 });
        assert_eq!(output.samples(), &[0; 4]);

        let mut output = Frames::silence(4, 1, Layout::Interleaved);
        let report = rx.fetch(output.as_slice_mut(), 6).unwrap();
        assert_eq!(report, FetchReport { overrun_frames: 2, underrun_frames: 0 });
        assert_eq!(output.samples(), &[0, 0, value_at(8, 0), value_at(9, 0)]);
    }

    #[test]
    fn test_scenario_store_then_fetch_mono() {
        let (mut tx, mut rx) = mono_f32(300);
        let input = Frames::from_fn(100, 1, |f, _| f as f32 * 0.01);
        tx.store(input.as_slice(), 0).unwrap();

        let mut output = Frames::silence(100, 1, Layout::Interleaved);
        assert!(rx.fetch(output.as_slice_mut(), 0).unwrap().is_complete());
        assert_eq!(output, input);
    }

    #[test]
    fn test_scenario_jump_ahead_evicts_head() {
        let (mut tx, mut rx) = mono_f32(300);
        let block = Frames::from_fn(100, 1, |f, _| 1.0 + f as f32);
        tx.store(block.as_slice(), 0).unwrap();
        tx.store(block.as_slice(), 250).unwrap();
        // 350 - 300: frames before 50 were evicted, the skipped 100..250 read back silent
        assert_eq!(tx.time_bounds(), (50, 350));

        let mut output = Frames::silence(50, 1, Layout::Interleaved);
        let report = rx.fetch(output.as_slice_mut(), 0).unwrap();
        assert_eq!(report, FetchReport { overrun_frames: 50, underrun_frames: 0 });
        assert!(output.samples().iter().all(|s| *s == 0.0));

        let mut output = Frames::from_fn(150, 1, |_, _| 7.0);
        assert!(rx.fetch(output.as_slice_mut(), 100).unwrap().is_complete());
        assert!(output.samples().iter().all(|s| *s == 0.0));

        let mut output = Frames::silence(100, 1, Layout::Interleaved);
        assert!(rx.fetch(output.as_slice_mut(), 250).unwrap().is_complete());
        assert_eq!(output, block);
    }

    #[test]
    fn test_jump_past_capacity_restarts_window() {
        let (mut tx, mut rx) = RingBuffer::<i32>::allocate(1, 4, 32).unwrap().split();
        tx.store(ramp(10, 1, 0).as_slice(), 0).unwrap();
        tx.store(ramp(10, 1, 1000).as_slice(), 1000).unwrap();
        assert_eq!(tx.time_bounds(), (978, 1010));

        let mut output = Frames::silence(32, 1, Layout::Interleaved);
        assert!(rx.fetch(output.as_slice_mut(), 978).unwrap().is_complete());
        assert_eq!(&output.samples()[.. 22], &[0; 22]);
        assert_eq!(&output.samples()[22 ..], ramp(10, 1, 1000).samples());
    }

    #[test]
    fn test_first_store_sets_window_start() {
        let (mut tx, _rx) = RingBuffer::<i32>::allocate(1, 4, 32).unwrap().split();
        tx.store(ramp(4, 1, 10).as_slice(), 10).unwrap();
        assert_eq!(tx.time_bounds(), (10, 14));
    }

    #[test]
    fn test_rewind_restarts_window() {
        let (mut tx, mut rx) = RingBuffer::<i32>::allocate(1, 4, 32).unwrap().split();
        tx.store(ramp(20, 1, 100).as_slice(), 100).unwrap();
        tx.store(ramp(5, 1, 50).as_slice(), 50).unwrap();
        assert_eq!(tx.time_bounds(), (50, 55));
        assert_eq!(tx.diagnostics().snapshot().rewinds, 1);

        let mut output = Frames::silence(5, 1, Layout::Interleaved);
        assert!(rx.fetch(output.as_slice_mut(), 50).unwrap().is_complete());
        assert_eq!(output, ramp(5, 1, 50));

        let mut output = Frames::silence(5, 1, Layout::Interleaved);
        assert_eq!(rx.fetch(output.as_slice_mut(), 100).unwrap().underrun_frames, 5);
    }

    #[test]
    fn test_negative_frame_numbers() {
        let (mut tx, mut rx) = RingBuffer::<i32>::allocate(1, 4, 8).unwrap().split();
        tx.store(ramp(6, 1, -3).as_slice(), -3).unwrap();

        let mut output = Frames::silence(6, 1, Layout::Interleaved);
        assert!(rx.fetch(output.as_slice_mut(), -3).unwrap().is_complete());
        assert_eq!(output, ramp(6, 1, -3));
    }

    #[test]
    fn test_frame_numbers_past_i64_max_are_rejected() {
        let (mut tx, mut rx) = RingBuffer::<i32>::allocate(1, 4, 16).unwrap().split();
        let block = Frames::from_fn(8, 1, |_, _| 5);

        assert_eq!(
            tx.store(block.as_slice(), i64::MAX - 4),
            Err(RingError::FrameOverflow { start: i64::MAX - 4, frames: 8 }));
        assert_eq!(tx.time_bounds(), (0, 0));

        let mut output = Frames::from_fn(8, 1, |_, _| 9);
        assert_eq!(
            rx.fetch(output.as_slice_mut(), i64::MAX - 4),
            Err(RingError::FrameOverflow { start: i64::MAX - 4, frames: 8 }));
        assert_eq!(rx.diagnostics().snapshot().misconfigurations, 2);

        // the last representable block still round-trips
        tx.store(block.as_slice(), i64::MAX - 8).unwrap();
        assert_eq!(tx.time_bounds(), (i64::MAX - 8, i64::MAX));
        assert!(rx.fetch(output.as_slice_mut(), i64::MAX - 8).unwrap().is_complete());
        assert_eq!(output, block);
    }

    #[test]
    fn test_misconfiguration() {
        let (mut tx, mut rx) = RingBuffer::<f32>::allocate(2, 8, 16).unwrap().split();

        let too_long = Frames::<f32>::silence(17, 2, Layout::Interleaved);
        assert_eq!(
            tx.store(too_long.as_slice(), 0),
            Err(RingError::TooManyFrames { requested: 17, capacity: 16 }));
        assert_eq!(tx.time_bounds(), (0, 0));

        let mono = Frames::<f32>::silence(4, 1, Layout::Interleaved);
        assert_eq!(
            tx.store(mono.as_slice(), 0),
            Err(RingError::ChannelMismatch { given: 1, expected: 2 }));

        let mut too_long = Frames::<f32>::silence(17, 2, Layout::Interleaved);
        assert!(rx.fetch(too_long.as_slice_mut(), 0).is_err());

        assert_eq!(rx.diagnostics().snapshot().misconfigurations, 3);
    }

    #[test]
    fn test_allocate_rejects_bad_format() {
        assert!(RingBuffer::<f32>::allocate(0, 4, 16).is_err());
        assert!(RingBuffer::<f32>::allocate(2, 4, 0).is_err());
        assert!(RingBuffer::<f32>::allocate(2, 6, 16).is_err());
        assert!(RingBuffer::<f32>::allocate(2, 4, 16).is_ok());
        assert!(RingBuffer::<f32>::allocate(2, 8, 16).is_ok());
        assert!(matches!(
            RingBuffer::<f64>::allocate(usize::MAX / 2, 8, 1 << 20),
            Err(RingError::Allocation { .. }) | Err(RingError::TooManyFrames { .. })));
    }

    #[test]
    fn test_diagnostics_count_gaps() {
        let (mut tx, mut rx) = RingBuffer::<i32>::allocate(1, 4, 16).unwrap().split();
        let mut output = Frames::silence(8, 1, Layout::Interleaved);

        tx.store(ramp(8, 1, 0).as_slice(), 0).unwrap();
        rx.fetch(output.as_slice_mut(), 0).unwrap();
        rx.fetch(output.as_slice_mut(), 4).unwrap();
        // consumer has read up to 12; storing 24..40 evicts 8..24, of which 12..24 were unread
        tx.store(ramp(16, 1, 8).as_slice(), 8).unwrap();
        tx.store(ramp(16, 1, 24).as_slice(), 24).unwrap();
        rx.fetch(output.as_slice_mut(), 20).unwrap();

        let snapshot = rx.diagnostics().snapshot();
        assert_eq!(snapshot.stores, 3);
        assert_eq!(snapshot.fetches, 3);
        assert_eq!(snapshot.underruns, 1);
        assert_eq!(snapshot.underrun_frames, 4);
        assert_eq!(snapshot.overruns, 1);
        assert_eq!(snapshot.overrun_frames, 4);
        assert_eq!(snapshot.overwritten_frames, 12);
        assert!(snapshot.has_glitches());
    }

    #[test]
    fn test_audio_source_sink_impls() {
        let (mut tx, mut rx) = RingBuffer::<f32>::allocate(2, 8, 16).unwrap().split();
        let input = Frames::from_fn(4, 2, |f, c| (f * 2 + c) as f32);
        tx.consume(input.as_slice(), 0);

        let mut output = Frames::from_fn(4, 2, |_, _| 9.0);
        rx.produce(output.as_slice_mut(), 0);
        assert_eq!(output, input);

        let mut wrong = Frames::from_fn(4, 1, |_, _| 9.0);
        rx.produce(wrong.as_slice_mut(), 0);
        assert_eq!(wrong.samples(), &[0.0; 4]);
    }

    #[test]
    fn test_concurrent_store_fetch() {
        const CHANNELS: usize = 2;
        const CAPACITY: usize = 256;
        const TOTAL_FRAMES: i64 = 200_000;

        let (mut tx, mut rx) = RingBuffer::<i32>::allocate(CHANNELS, 4 * CHANNELS, CAPACITY)
            .unwrap()
            .split();
        let done = Arc::new(AtomicBool::new(false));

        let producer_done = Arc::clone(&done);
        let producer = thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut block = Vec::with_capacity(64 * CHANNELS);
            let mut frame = 0i64;
            while frame < TOTAL_FRAMES {
                let count: usize = rng.gen_range(1, 65);
                block.clear();
                for f in 0 .. count {
                    for c in 0 .. CHANNELS {
                        block.push(value_at(frame + f as i64, c));
                    }
                }
                let frames = FrameSlice::interleaved(&block, CHANNELS).unwrap();
                tx.store(frames, frame).unwrap();
                frame += count as i64;
                if rng.gen_range(0, 8) == 0 {
                    thread::yield_now();
                }
            }
            producer_done.store(true, Ordering::SeqCst);
        });

        let consumer = thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut buffer = vec![0i32; CAPACITY * CHANNELS];
            let mut checked = 0u64;
            while !done.load(Ordering::SeqCst) {
                let count = rng.gen_range(1, CAPACITY + 1);
                let (_, end) = rx.time_bounds();
                let start = end - rng.gen_range(0, CAPACITY as i64 + 64) + 16;
                let dest = FrameSliceMut::interleaved(&mut buffer[.. count * CHANNELS], CHANNELS)
                    .unwrap();
                let report = rx.fetch(dest, start).unwrap();
                let frames = FrameSlice::interleaved(&buffer[.. count * CHANNELS], CHANNELS)
                    .unwrap();
                for i in 0 .. count {
                    let valid = i >= report.overrun_frames && i < count - report.underrun_frames;
                    for c in 0 .. CHANNELS {
                        let expected = if valid { value_at(start + i as i64, c) } else { 0 };
                        assert_eq!(frames.get(i, c), Some(expected), "frame {}", start + i as i64);
                    }
                    if valid {
                        checked += 1;
                    }
                }
            }
            checked
        });

        producer.join().unwrap();
        let checked = consumer.join().unwrap();
        assert!(checked > 0);
    }

    #[test]
    fn test_concurrent_rewinds_never_mix_generations() {
        const CHANNELS: usize = 2;
        const CAPACITY: usize = 256;
        const STORES: usize = 20_000;

        // each restart of the window writes its frames tagged with a new generation
        fn tagged(frame: i64, channel: usize, generation: u32) -> i32 {
            (((generation % 64) as i32) << 24) | value_at(frame, channel)
        }

        let (mut tx, mut rx) = RingBuffer::<i32>::allocate(CHANNELS, 4 * CHANNELS, CAPACITY)
            .unwrap()
            .split();
        let diagnostics = tx.diagnostics();
        let done = Arc::new(AtomicBool::new(false));

        let producer_done = Arc::clone(&done);
        let producer = thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut block = Vec::with_capacity(64 * CHANNELS);
            let mut frame = 0i64;
            let mut generation = 0u32;
            for _ in 0 .. STORES {
                if frame > 0 && rng.gen_range(0, 16) == 0 {
                    frame = (frame - rng.gen_range(1, CAPACITY as i64)).max(0);
                    generation += 1;
                }
                let count: usize = rng.gen_range(1, 65);
                block.clear();
                for f in 0 .. count {
                    for c in 0 .. CHANNELS {
                        block.push(tagged(frame + f as i64, c, generation));
                    }
                }
                let frames = FrameSlice::interleaved(&block, CHANNELS).unwrap();
                tx.store(frames, frame).unwrap();
                frame += count as i64;
                if rng.gen_range(0, 8) == 0 {
                    thread::yield_now();
                }
            }
            producer_done.store(true, Ordering::SeqCst);
        });

        let consumer = thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut buffer = vec![0i32; CAPACITY * CHANNELS];
            let mut checked = 0u64;
            while !done.load(Ordering::SeqCst) {
                let count = rng.gen_range(1, CAPACITY + 1);
                let (_, end) = rx.time_bounds();
                let start = end - rng.gen_range(0, CAPACITY as i64 + 64) + 16;
                let dest = FrameSliceMut::interleaved(&mut buffer[.. count * CHANNELS], CHANNELS)
                    .unwrap();
                let report = rx.fetch(dest, start).unwrap();
                let frames = FrameSlice::interleaved(&buffer[.. count * CHANNELS], CHANNELS)
                    .unwrap();

                let mut generation = None;
                for i in 0 .. count {
                    let frame = start + i as i64;
                    let valid = i >= report.overrun_frames && i < count - report.underrun_frames;
                    for c in 0 .. CHANNELS {
                        let value = frames.get(i, c).unwrap();
                        if !valid {
                            assert_eq!(value, 0, "gap at frame {}", frame);
                            continue;
                        }
                        assert_eq!(value & 0xFF_FFFF, value_at(frame, c), "frame {}", frame);
                        let tag = value >> 24;
                        assert_eq!(*generation.get_or_insert(tag), tag,
                            "generations mixed at frame {}", frame);
                    }
                    if valid {
                        checked += 1;
                    }
                }
            }
            checked
        });

        producer.join().unwrap();
        let checked = consumer.join().unwrap();
        assert!(checked > 0);
        assert!(diagnostics.snapshot().rewinds > 0);
    }
}
