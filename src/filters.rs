use crate::{Filter, Generator};


/// Apply the given `Filter` to the given `Generator` and return a `Generator` interface.
pub fn compose(mut generator: Generator, mut filter: Filter) -> Generator {
    Box::new(move || filter(&mut generator))
}


/// Scale the signal by the provided scale factor with clipping at `[-1, 1]`.
pub fn gain(scale_factor: f32) -> Filter {
    Box::new(move |generator: &mut Generator| {
        let val = generator() * scale_factor;
        if val > 1.0 {
            1.0
        } else if val < -1.0 {
            -1.0
        } else {
            val
        }
    })
}


/// Ramp gain from zero to one over the specified number of seconds.
pub fn ramp_up(sample_rate: u32, ramp_secs: f32) -> Filter {
    let ramp_steps: f32 = (sample_rate as f32 * ramp_secs).max(1.0);
    let mut ramp_i = 0f32;

    Box::new(move |generator: &mut Generator| {
        if ramp_i < ramp_steps {
            ramp_i += 1.0;
        }
        generator() * (ramp_i / ramp_steps).min(1.0)
    })
}


/// Ramp the signal to zero after the provided time has elapsed and over the specified number of
/// seconds.
pub fn ramp_down(sample_rate: u32, cliff_secs: f32, ramp_secs: f32) -> Filter {
    let sample_rate = sample_rate as f32;
    let cliff_steps = sample_rate * cliff_secs;
    let ramp_steps: f32 = (sample_rate * ramp_secs).max(1.0);
    let mut ramp_i = 0f32;

    Box::new(move |generator: &mut Generator| {
        let mut val = generator();
        if ramp_i < cliff_steps + ramp_steps {
            ramp_i += 1.0;
        }
        if ramp_i >= cliff_steps {
            val *= (1.0 - ((ramp_i - cliff_steps) / ramp_steps)).max(0.0);
        }
        val
    })
}
