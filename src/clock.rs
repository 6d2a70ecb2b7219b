//! Mapping output-device frame numbers onto input-device frame numbers.
//!
//! Input and output callbacks each count frames from their own start, and the two devices do not
//! start at the same instant. The output side therefore locks in an offset the first time it runs
//! after the input has produced something: it reads `latency_frames` behind the newest stored
//! frame. Clock drift between the two devices slowly eats into that margin; once fetches keep
//! coming back with gaps the offset is dropped and taken again.

use crate::ring::FetchReport;


#[derive(Debug, Clone)]
pub struct FrameAlignment {
    latency_frames: i64,
    offset: Option<i64>,
    /// Consecutive gapped fetches before the offset is re-taken. Zero disables realignment.
    realign_after: u32,
    gapped_in_a_row: u32,
    realignments: u64,
}


impl FrameAlignment {
    pub fn new(latency_frames: usize, realign_after: u32) -> Self {
        Self {
            latency_frames: latency_frames as i64,
            offset: None,
            realign_after,
            gapped_in_a_row: 0,
            realignments: 0,
        }
    }

    /// Input frame number to fetch for the block starting at `output_frame`.
    ///
    /// `input_bounds` is the producer's current `(start, end)` window. Returns `None` (render
    /// silence) until the input has stored at least one frame.
    pub fn input_frame(&mut self, output_frame: i64, input_bounds: (i64, i64)) -> Option<i64> {
        if self.offset.is_none() {
            let (start, end) = input_bounds;
            if end <= start {
                return None;
            }
            self.offset = Some(end - self.latency_frames - output_frame);
        }
        self.offset.map(|offset| output_frame + offset)
    }

    /// Feed back the result of the fetch made at the frame `input_frame` returned.
    pub fn observe(&mut self, report: &FetchReport) {
        if report.is_complete() {
            self.gapped_in_a_row = 0;
            return;
        }
        self.gapped_in_a_row += 1;
        if self.realign_after > 0 && self.gapped_in_a_row >= self.realign_after {
            self.offset = None;
            self.gapped_in_a_row = 0;
            self.realignments += 1;
        }
    }

    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    pub fn realignments(&self) -> u64 {
        self.realignments
    }
}
