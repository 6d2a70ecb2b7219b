use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info};

use tapeloop::config::{ToneConfig, DEFAULT_SAMPLE_RATE};
use tapeloop::consumers::MonoConsumer;
use tapeloop::generators::Shape;
use tapeloop::{tones, Sample};


/// Generate a tone and either write it to disk or play it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}


#[derive(Subcommand, Debug)]
enum Command {
    /// Write `<hz>-<shape>.wav` (or `.pcm` with --raw)
    Write {
        /// Tone frequency in Hz
        hz: f32,

        #[arg(long, default_value = "sine")]
        shape: Shape,

        #[arg(long, default_value_t = 5.0)]
        duration: f32,

        #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,

        /// Headerless big-endian 16-bit PCM instead of WAV
        #[arg(long)]
        raw: bool,

        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Play on the default output device
    Play {
        /// Tone frequency in Hz
        hz: f32,

        #[arg(long, default_value = "sine")]
        shape: Shape,

        #[arg(long, default_value_t = 5.0)]
        duration: f32,

        #[arg(long, default_value_t = 0.5)]
        gain: f32,
    },
}


fn play(shape: Shape, hz: f32, duration: f32, gain: f32) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("missing default output device"))?;
    let default_config = device.default_output_config()?;
    let config = cpal::StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    info!("config: {:?}", config);

    let tone = ToneConfig {
        frequency: hz,
        shape,
        duration_secs: duration,
        sample_rate: config.sample_rate.0,
    };
    let channels = config.channels as usize;
    let mut consumer = MonoConsumer::new(tones::generator(&tone, gain)?);

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [Sample], _: &cpal::OutputCallbackInfo| consumer.fill(data, channels),
        |err| error!("audio stream error: {}", err),
        None,
    )?;
    stream.play()?;
    info!("playing {} Hz {} for {} s", hz, shape, duration);

    std::thread::sleep(Duration::from_secs_f32(duration));
    stream.pause()?;
    Ok(())
}


fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Args::parse().command {
        Command::Write { hz, shape, duration, sample_rate, raw, out_dir } => {
            let config = ToneConfig {
                frequency: hz,
                shape,
                duration_secs: duration,
                sample_rate,
            };
            info!("generating {} hz {} tone", hz, shape);
            let (path, count) = tones::write_to_dir(&out_dir, &config, raw)?;
            println!("wrote {} samples to {}", count, path.display());
        },
        Command::Play { hz, shape, duration, gain } => play(shape, hz, duration, gain)?,
    }
    Ok(())
}
