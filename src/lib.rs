pub mod clock;
pub mod config;
pub mod consumers;
pub mod error;
pub mod filters;
pub mod frames;
pub mod generators;
pub mod observers;
pub mod playthrough;
pub mod ring;
pub mod tones;

pub use error::RingError;
pub use frames::{FrameSlice, FrameSliceMut, Frames, Layout};
pub use ring::{Diagnostics, DiagnosticsSnapshot, FetchReport, RingBuffer, RingConsumer, RingProducer};


pub type Sample = f32;


/// Numeric type of a single channel sample held in a ring buffer.
///
/// `Default::default()` is the silence value for the type. Implemented for the sample types that
/// audio devices hand out in practice; all of them fit in a lock-free atomic cell.
pub trait FrameSample: Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {}


impl FrameSample for f32 {}
impl FrameSample for f64 {}
impl FrameSample for i16 {}
impl FrameSample for i32 {}


/// Source of an audio stream.
///
/// Each call generates the output value at that given instance in time, e.g. for a sample rate of
/// 44100Hz, this function should be called 44100 times per second to generate that second's worth
/// of sound.
pub type Generator = Box<dyn FnMut() -> Sample + Send>;


/// Transformation applied to an audio stream.
///
/// A call of a `Filter` pulls the next value from the provided `Generator`, applies its
/// transformation and returns it. `Filter`s will usually have some internal state allowing them to
/// track the passage of time.
pub type Filter = Box<dyn FnMut(&mut Generator) -> Sample + Send>;


/// Something that fills blocks of frames on demand, e.g. from an output device callback.
///
/// `frame_number` is the absolute index of the first frame in `frames`. Implementations must not
/// block or allocate: they run on the audio thread.
pub trait AudioSource<T: FrameSample>: Send {
    fn produce(&mut self, frames: FrameSliceMut<'_, T>, frame_number: i64);
}


/// Something that accepts blocks of frames, e.g. from an input device callback.
pub trait AudioSink<T: FrameSample>: Send {
    fn consume(&mut self, frames: FrameSlice<'_, T>, frame_number: i64);
}


/// Consume `self` and the provided `Filter` to create a new `Generator` with the filter applied.
///
/// Exists to provide a better interface to `filters::compose`, enabling the builder pattern:
///
/// ```rust
/// use tapeloop::{FilterComposable, Generator, filters, generators};
/// let gen: Generator = generators::sine(44100, 440.0)
///     .compose(filters::gain(0.5))
///     .compose(filters::ramp_up(44100, 0.01));
/// ```
pub trait FilterComposable {
    fn compose(self, filter: Filter) -> Generator;
}


impl FilterComposable for Generator {
    fn compose(self, filter: Filter) -> Generator {
        filters::compose(self, filter)
    }
}
