//! Tone files: a fixed-length 16-bit mono waveform written straight to disk.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use byteorder::{BigEndian, WriteBytesExt};
use hound::{SampleFormat, WavSpec, WavWriter};
use log::info;

use crate::config::ToneConfig;
use crate::{filters, generators, FilterComposable, Generator};


/// Fade applied at both ends of a played tone so it starts and stops without a click.
const FADE_SECS: f32 = 0.01;


/// `"{hz:.3}-{shape}.{extension}"`, e.g. `440.000-sine.wav`.
pub fn file_name(config: &ToneConfig, extension: &str) -> String {
    format!("{:.3}-{}.{}", config.frequency, config.shape, extension)
}


/// Every sample of the tone at full scale.
pub fn samples(config: &ToneConfig) -> impl Iterator<Item = i16> {
    let shape = config.shape;
    let wavelength = config.wavelength();
    (0 .. config.total_samples())
        .map(move |n| (f64::from(i16::MAX) * shape.at(n as f64 / wavelength)) as i16)
}


/// Real-time `Generator` for the tone, scaled by `gain` and faded in and out.
pub fn generator(config: &ToneConfig, gain: f32) -> Result<Generator> {
    config.validate()?;
    let fade = FADE_SECS.min(config.duration_secs / 2.0);
    Ok(generators::tone(config.shape, config.sample_rate, config.frequency)
        .compose(filters::gain(gain))
        .compose(filters::ramp_up(config.sample_rate, fade))
        .compose(filters::ramp_down(config.sample_rate, config.duration_secs - fade, fade)))
}


/// Write the tone as a mono 16-bit WAV file, returning the number of samples written.
pub fn write_wav<P: AsRef<Path>>(path: P, config: &ToneConfig) -> Result<usize> {
    config.validate()?;
    let spec = WavSpec {
        channels: 1,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path.as_ref(), spec)?;
    let mut count = 0;
    for sample in samples(config) {
        writer.write_sample(sample)?;
        count += 1;
    }
    writer.finalize()?;
    info!("wrote {} samples to {}", count, path.as_ref().display());
    Ok(count)
}


/// Write the tone as headerless big-endian signed 16-bit PCM.
pub fn write_raw_be<W: Write>(writer: &mut W, config: &ToneConfig) -> Result<usize> {
    config.validate()?;
    let mut count = 0;
    for sample in samples(config) {
        writer.write_i16::<BigEndian>(sample)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}


/// Write the tone into `dir` under its conventional name, returning the path and sample count.
pub fn write_to_dir<P: AsRef<Path>>(dir: P, config: &ToneConfig, raw: bool) -> Result<(PathBuf, usize)> {
    if raw {
        let path = dir.as_ref().join(file_name(config, "pcm"));
        let mut writer = BufWriter::new(File::create(&path)?);
        let count = write_raw_be(&mut writer, config)?;
        info!("wrote {} samples to {}", count, path.display());
        Ok((path, count))
    } else {
        let path = dir.as_ref().join(file_name(config, "wav"));
        let count = write_wav(&path, config)?;
        Ok((path, count))
    }
}
