use chrono::{DateTime, Duration, DurationRound, Utc};
use rand::Rng;

pub fn wave<R: Rng>(
    rng: &mut R,
    step: usize,
    base: f64,
    amplitude: f64,
    period_steps: f64,
    noise: f64,
) -> f64 {
    let phase = step as f64 / period_steps.max(1.0) * std::f64::consts::TAU;
    let jitter = if noise > 0.0 {
        rng.gen_range(-noise..=noise)
    } else {
        0.0
    };
    base + amplitude * phase.sin() + jitter
}

pub fn trailing_times(now: DateTime<Utc>, count: usize, step: Duration) -> Vec<DateTime<Utc>> {
    let end = now.duration_trunc(step).unwrap_or(now);
    (0..count)
        .rev()
        .map(|back| end - step * back as i32)
        .collect()
}
