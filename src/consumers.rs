use crate::{AudioSource, FrameSliceMut, Generator, Sample};


/// Write the output stream as generated from the bound `Generator`.
///
/// All channels of the output stream are written with the same data, one generator call per
/// frame.
pub struct MonoConsumer {
    generator: Generator,
}


impl MonoConsumer {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }

    /// Fill a raw interleaved device buffer.
    pub fn fill(&mut self, output: &mut [Sample], channels: usize) {
        for frame in output.chunks_mut(channels.max(1)) {
            let value = (self.generator)();
            for sample in frame.iter_mut() {
                *sample = value;
            }
        }
    }
}


impl AudioSource<Sample> for MonoConsumer {
    fn produce(&mut self, mut frames: FrameSliceMut<'_, Sample>, _frame_number: i64) {
        for frame in 0 .. frames.frame_count() {
            let value = (self.generator)();
            for channel in 0 .. frames.channels() {
                frames.set(frame, channel, value);
            }
        }
    }
}
