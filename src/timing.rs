use std::time::Duration;

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::Serialize;

use crate::config::{TypingConfig, JITTER_RANGE, WPM_RANGE};

/// No emission is ever scheduled sooner than this.
pub const MIN_DELAY_MS: f64 = 3.0;
/// Shape of the log-normal inter-key interval. Higher means heavier tails.
pub const LOG_NORMAL_SIGMA: f64 = 0.7;
/// Drift correction never moves a delay by more than this share of the base delay.
pub const CORRECTION_LIMIT: f64 = 0.5;

const HIGH_SPEED_WPM: u32 = 140;
const HIGH_SPEED_JITTER_CAP: f64 = 0.08;

/// Per-session pacing parameters and the delay draw built on them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingModel {
    /// Effective words per minute after the per-session offset.
    pub wpm: u32,
    pub speed_multiplier: f64,
    pub base_delay_ms: f64,
    /// Multiplicative jitter amplitude as a fraction (0.05 = ±5%).
    pub jitter: f64,
}

fn ms_per_char(wpm: u32) -> f64 {
    // Approximate 5 chars per word.
    60_000.0 / (f64::from(wpm.max(1)) * 5.0)
}

impl TimingModel {
    pub fn new(wpm: u32, jitter_percent: u32, speed_multiplier: f64) -> Self {
        let wpm = i64::from(wpm).clamp(*WPM_RANGE.start(), *WPM_RANGE.end()) as u32;
        let mut jitter = i64::from(jitter_percent).clamp(*JITTER_RANGE.start(), *JITTER_RANGE.end())
            as f64
            / 100.0;
        if wpm >= HIGH_SPEED_WPM && jitter > HIGH_SPEED_JITTER_CAP {
            jitter = HIGH_SPEED_JITTER_CAP;
        }

        Self {
            wpm,
            speed_multiplier,
            base_delay_ms: ms_per_char(wpm) * speed_multiplier,
            jitter,
        }
    }

    /// Draw the per-session speed multiplier (±10%) and WPM offset (±2).
    pub fn for_session(config: &TypingConfig, rng: &mut impl Rng) -> Self {
        let speed_multiplier = 1.0 + f64::from(rng.gen_range(-10i32..=10)) / 100.0;
        let offset: i64 = rng.gen_range(-2..=2);
        let wpm = (i64::from(config.wpm) + offset).clamp(*WPM_RANGE.start(), *WPM_RANGE.end());
        Self::new(wpm as u32, config.jitter_percent, speed_multiplier)
    }

    /// Closed-loop correction that spreads the current schedule error over the
    /// characters still to type.
    pub fn correction_ms(&self, elapsed: Duration, emitted: usize, remaining: usize) -> f64 {
        let ideal_elapsed = emitted as f64 * self.base_delay_ms;
        let error = elapsed.as_secs_f64() * 1000.0 - ideal_elapsed;
        let limit = self.base_delay_ms * CORRECTION_LIMIT;
        (-error / remaining.max(1) as f64).clamp(-limit, limit)
    }

    /// Delay before the next emission, in milliseconds.
    ///
    /// `elapsed` must exclude paused time so a pause is never corrected away.
    pub fn next_delay_ms(
        &self,
        elapsed: Duration,
        emitted: usize,
        remaining: usize,
        rng: &mut impl Rng,
    ) -> f64 {
        let mean = self.base_delay_ms + self.correction_ms(elapsed, emitted, remaining);
        let delay = lognormal_sample_ms(mean, LOG_NORMAL_SIGMA, rng);
        let factor = 1.0 + rng.gen_range(-1.0..=1.0) * self.jitter;
        (delay * factor).max(MIN_DELAY_MS)
    }
}

/// Log-normal sample whose arithmetic mean is `mean_ms`, floored at [`MIN_DELAY_MS`].
pub fn lognormal_sample_ms(mean_ms: f64, sigma: f64, rng: &mut impl Rng) -> f64 {
    let mu = mean_ms.max(MIN_DELAY_MS).ln() - 0.5 * sigma * sigma;
    let z: f64 = StandardNormal.sample(rng);
    (mu + sigma * z).exp().max(MIN_DELAY_MS)
}
