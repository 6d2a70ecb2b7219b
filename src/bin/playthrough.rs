use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::info;

use tapeloop::config::PlayThroughConfig;
use tapeloop::playthrough::PlayThrough;


/// Route the default input device to the default output device through a ring buffer.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value_t = 44100)]
    sample_rate: u32,

    #[arg(long, default_value_t = 1)]
    channels: u16,

    /// Frames per device callback
    #[arg(long, default_value_t = 512)]
    buffer_frames: u32,

    /// How far the output trails the input, in frames (defaults to one buffer)
    #[arg(long)]
    latency_frames: Option<u32>,

    /// Consecutive glitching output blocks before re-syncing to the input (0 = never)
    #[arg(long, default_value_t = 32)]
    realign_after: u32,

    /// Seconds between diagnostics reports (0 = off)
    #[arg(long, default_value_t = 5)]
    report_secs: u64,
}


impl From<Args> for PlayThroughConfig {
    fn from(args: Args) -> Self {
        PlayThroughConfig {
            sample_rate: args.sample_rate,
            channels: args.channels,
            buffer_frames: args.buffer_frames,
            latency_frames: args.latency_frames.unwrap_or(args.buffer_frames),
            realign_after: args.realign_after,
            report_interval: match args.report_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            ..Default::default()
        }
    }
}


fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = PlayThroughConfig::from(Args::parse());
    config.validate()?;
    info!("config: {:?}", config);

    let mut session = PlayThrough::start(&config)?;

    // any line, EOF or ctrl-c ends the session
    let mut reader = rustyline::Editor::<()>::new();
    let _ = reader.readline("capturing, press <return> to stop> ");

    session.stop()?;
    Ok(())
}
