use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};

use crate::{Generator, Sample};


/// Waveform shape for direct sample synthesis.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Shape {
    Sine,
    Sawtooth,
    Square,
}


impl Shape {
    /// Value on `[-1, 1]` at `phase` (in cycles, `[0, 1)`).
    pub fn at(self, phase: f64) -> f64 {
        let phase = phase.rem_euclid(1.0);
        match self {
            Shape::Sine => (2.0 * PI * phase).sin(),
            Shape::Sawtooth => 2.0 * phase - 1.0,
            Shape::Square => if phase < 0.5 { 1.0 } else { -1.0 },
        }
    }
}


impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Shape::Sine => "sine",
            Shape::Sawtooth => "saw",
            Shape::Square => "square",
        })
    }
}


impl FromStr for Shape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sine" | "sin" => Ok(Shape::Sine),
            "saw" | "sawtooth" => Ok(Shape::Sawtooth),
            "square" | "sqr" => Ok(Shape::Square),
            other => Err(anyhow!("unknown waveform '{}' (expected sine, saw or square)", other)),
        }
    }
}


/// Periodic `Generator` of the given `shape`.
///
/// The phase is tracked in samples and wrapped every cycle so that long-running generators do not
/// lose precision.
pub fn tone(shape: Shape, sample_rate: u32, frequency: f32) -> Generator {
    let cycle_length = sample_rate as f64 / frequency as f64;
    let mut position = 0f64;
    Box::new(move || {
        let value = shape.at(position / cycle_length);
        position += 1.0;
        if position >= cycle_length {
            position -= cycle_length;
        }
        value as Sample
    })
}


pub fn sine(sample_rate: u32, frequency: f32) -> Generator {
    tone(Shape::Sine, sample_rate, frequency)
}


pub fn sawtooth(sample_rate: u32, frequency: f32) -> Generator {
    tone(Shape::Sawtooth, sample_rate, frequency)
}


pub fn square(sample_rate: u32, frequency: f32) -> Generator {
    tone(Shape::Square, sample_rate, frequency)
}


pub fn silence() -> Generator {
    Box::new(|| 0.0)
}
