//! Session settings, fixed once when the devices are opened.

use std::time::Duration;

use crate::error::RingError;
use crate::generators::Shape;
use crate::Sample;


pub const DEFAULT_SAMPLE_RATE: u32 = 44100;


/// Settings for an input -> ring buffer -> output session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayThroughConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per device callback. Also requested from the devices as a fixed buffer size.
    pub buffer_frames: u32,
    /// Ring buffer capacity as a multiple of `buffer_frames`, before rounding up to a power of two.
    pub capacity_multiplier: u32,
    /// How far behind the newest input frame the output reads. At least `buffer_frames`.
    pub latency_frames: u32,
    /// Consecutive gapped output callbacks before the input/output offset is re-taken.
    pub realign_after: u32,
    /// How often diagnostics are logged. `None` disables reporting.
    pub report_interval: Option<Duration>,
}


impl Default for PlayThroughConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            buffer_frames: 512,
            capacity_multiplier: 3,
            latency_frames: 512,
            realign_after: 32,
            report_interval: Some(Duration::from_secs(5)),
        }
    }
}


impl PlayThroughConfig {
    pub fn validate(&self) -> Result<(), RingError> {
        let problem = if self.sample_rate == 0 {
            "sample rate must be non-zero"
        } else if self.channels == 0 {
            "at least one channel is required"
        } else if self.buffer_frames == 0 {
            "buffer size must be non-zero"
        } else if self.capacity_multiplier < 2 {
            "capacity multiplier must be at least 2 so input and output blocks fit side by side"
        } else if self.latency_frames < self.buffer_frames {
            "latency must be at least one buffer or every output block reads past the input"
        } else if self.latency_frames as usize + self.buffer_frames as usize
            > self.capacity_frames()
        {
            "latency plus one buffer must fit in the ring buffer"
        } else {
            return Ok(());
        };
        Err(RingError::Misconfigured(problem.into()))
    }

    /// Ring buffer capacity in frames: `buffer_frames * capacity_multiplier`, rounded up to a
    /// power of two.
    pub fn capacity_frames(&self) -> usize {
        (self.buffer_frames as usize)
            .saturating_mul(self.capacity_multiplier as usize)
            .max(1)
            .next_power_of_two()
    }

    pub fn bytes_per_frame(&self) -> usize {
        std::mem::size_of::<Sample>() * self.channels as usize
    }

    pub fn stream_config(&self) -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.buffer_frames),
        }
    }
}


/// Settings for a synthesized tone.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneConfig {
    pub frequency: f32,
    pub shape: Shape,
    pub duration_secs: f32,
    pub sample_rate: u32,
}


impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            frequency: 440.0,
            shape: Shape::Sine,
            duration_secs: 5.0,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}


impl ToneConfig {
    pub fn validate(&self) -> Result<(), RingError> {
        let nyquist = self.sample_rate as f32 / 2.0;
        if !(self.frequency > 0.0) || self.frequency >= nyquist {
            return Err(RingError::Misconfigured(format!(
                "frequency {} Hz must be above 0 and below {} Hz", self.frequency, nyquist)));
        }
        if !(self.duration_secs > 0.0) {
            return Err(RingError::Misconfigured(format!(
                "duration {} s must be positive", self.duration_secs)));
        }
        Ok(())
    }

    pub fn total_samples(&self) -> usize {
        (self.sample_rate as f64 * self.duration_secs as f64) as usize
    }

    /// Samples per cycle.
    pub fn wavelength(&self) -> f64 {
        self.sample_rate as f64 / self.frequency as f64
    }
}
