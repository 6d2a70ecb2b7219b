//! Errors raised by the ring buffer and frame accessors.
//!
//! Underruns and overruns are deliberately absent: they are recovered locally by substituting
//! silence and reported through `ring::FetchReport` and `ring::Diagnostics`.


/// Setup-time or caller-misuse failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RingError {
    #[error("unable to reserve {bytes} bytes for the ring buffer store")]
    /// The backing store could not be reserved.
    Allocation {
        bytes: usize,
    },

    #[error("{requested} frames requested but capacity is {capacity} frames")]
    /// A block larger than the ring buffer was passed to `store` or `fetch`.
    TooManyFrames {
        requested: usize,
        capacity: usize,
    },

    #[error("buffer has {given} channels, ring buffer was allocated with {expected}")]
    ChannelMismatch {
        given: usize,
        expected: usize,
    },

    #[error("{frames} frames starting at frame {start} run past the last addressable frame")]
    FrameOverflow {
        start: i64,
        frames: usize,
    },

    #[error("misconfigured: {0}")]
    /// Caller bug found at setup: zero sizes, inconsistent formats, invalid settings.
    Misconfigured(String),
}

