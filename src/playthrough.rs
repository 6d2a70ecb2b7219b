//! Default input device -> ring buffer -> default output device.
//!
//! The two devices run their callbacks on their own threads at their own pace. The input callback
//! stores each block under a running frame counter; the output callback fetches the block it
//! needs through a `FrameAlignment`, so it never depends on the two devices starting together or
//! ticking at exactly the same rate.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, error, info};

use crate::clock::FrameAlignment;
use crate::config::PlayThroughConfig;
use crate::observers::{LogObserver, Observer, Watcher};
use crate::ring::{Diagnostics, RingBuffer, RingConsumer, RingProducer};
use crate::{AudioSink, FrameSlice, FrameSliceMut, Sample};


/// State owned by the input device callback.
pub struct InputCallback {
    producer: RingProducer<Sample>,
    channels: usize,
    next_frame: i64,
}


impl InputCallback {
    pub fn new(producer: RingProducer<Sample>, channels: usize) -> Self {
        Self { producer, channels, next_frame: 0 }
    }

    pub fn process(&mut self, data: &[Sample]) {
        let frames = match FrameSlice::interleaved(data, self.channels) {
            Ok(frames) => frames,
            Err(e) => {
                error!("input block rejected: {}", e);
                return;
            },
        };
        let count = frames.frame_count() as i64;
        self.producer.consume(frames, self.next_frame);
        self.next_frame += count;
    }
}


/// State owned by the output device callback.
pub struct OutputCallback {
    consumer: RingConsumer<Sample>,
    alignment: FrameAlignment,
    channels: usize,
    next_frame: i64,
}


impl OutputCallback {
    pub fn new(consumer: RingConsumer<Sample>, alignment: FrameAlignment, channels: usize) -> Self {
        Self { consumer, alignment, channels, next_frame: 0 }
    }

    pub fn process(&mut self, data: &mut [Sample]) {
        let mut frames = match FrameSliceMut::interleaved(data, self.channels) {
            Ok(frames) => frames,
            Err(e) => {
                error!("output block rejected: {}", e);
                data.fill(0.0);
                return;
            },
        };
        let count = frames.frame_count() as i64;

        match self.alignment.input_frame(self.next_frame, self.consumer.time_bounds()) {
            Some(input_frame) => match self.consumer.fetch(frames.reborrow(), input_frame) {
                Ok(report) => self.alignment.observe(&report),
                Err(_) => frames.fill_silence(),
            },
            None => frames.fill_silence(),
        }
        self.next_frame += count;
    }

    pub fn alignment(&self) -> &FrameAlignment {
        &self.alignment
    }
}


/// Wire a fresh ring buffer between a new pair of callbacks.
pub fn callbacks(config: &PlayThroughConfig) -> Result<(InputCallback, OutputCallback, Arc<Diagnostics>)> {
    config.validate()?;
    let channels = config.channels as usize;
    let ring = RingBuffer::<Sample>::allocate(
        channels, config.bytes_per_frame(), config.capacity_frames())?;
    let diagnostics = ring.diagnostics();
    let (producer, consumer) = ring.split();
    let alignment = FrameAlignment::new(config.latency_frames as usize, config.realign_after);
    Ok((
        InputCallback::new(producer, channels),
        OutputCallback::new(consumer, alignment, channels),
        diagnostics,
    ))
}


/// A running play-through session. Dropping it stops both devices.
pub struct PlayThrough {
    input: Option<cpal::Stream>,
    output: Option<cpal::Stream>,
    diagnostics: Arc<Diagnostics>,
    watcher: Option<Watcher>,
}


impl PlayThrough {
    pub fn start(config: &PlayThroughConfig) -> Result<Self> {
        let host = cpal::default_host();
        let input_device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("missing default input device"))?;
        let output_device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("missing default output device"))?;
        info!("input device: {}", input_device.name().unwrap_or_else(|_| "unknown".into()));
        info!("output device: {}", output_device.name().unwrap_or_else(|_| "unknown".into()));

        let stream_config = config.stream_config();
        debug!("stream config: {:?}, ring buffer capacity {} frames",
            stream_config, config.capacity_frames());

        let (mut input_callback, mut output_callback, diagnostics) = callbacks(config)?;

        let input = input_device.build_input_stream(
            &stream_config,
            move |data: &[Sample], _: &cpal::InputCallbackInfo| input_callback.process(data),
            |err| error!("input stream error: {}", err),
            None,
        )?;
        let output = output_device.build_output_stream(
            &stream_config,
            move |data: &mut [Sample], _: &cpal::OutputCallbackInfo| output_callback.process(data),
            |err| error!("output stream error: {}", err),
            None,
        )?;

        // input first so the output has something to align against
        input.play()?;
        output.play()?;

        let watcher = config.report_interval.map(|interval| {
            let observers: Vec<Box<dyn Observer>> = vec![Box::new(LogObserver::new("playthrough"))];
            Watcher::spawn(Arc::clone(&diagnostics), interval, observers)
        });

        Ok(Self {
            input: Some(input),
            output: Some(output),
            diagnostics,
            watcher,
        })
    }

    pub fn diagnostics(&self) -> Arc<Diagnostics> {
        Arc::clone(&self.diagnostics)
    }

    /// Stop the output (the ring buffer's reader) first, then the input.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(output) = self.output.take() {
            output.pause()?;
        }
        if let Some(input) = self.input.take() {
            input.pause()?;
        }
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        info!("final diagnostics: {:?}", self.diagnostics.snapshot());
        Ok(())
    }
}


impl Drop for PlayThrough {
    fn drop(&mut self) {
        if self.output.is_some() || self.input.is_some() {
            if let Err(e) = self.stop() {
                error!("failed to stop play-through cleanly: {}", e);
            }
        }
    }
}
