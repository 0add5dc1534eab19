#![allow(
    clippy::cast_precision_loss,        // Percent arithmetic is done in f64
    clippy::cast_possible_truncation,   // Values are clamped to 0..=100 first
    clippy::cast_sign_loss              // Same
)]

//! Phase-weighted progress
//!
//! A transaction is split into phases whose sizes are known only as relative
//! weights. [`allocate`] turns the weights into global percentage ranges and
//! [`PhaseProgress`] maps each phase's own 0-100 progress into its range,
//! keeping the emitted global value monotonic.

mod engine;
mod stepped;

pub use engine::PhaseProgress;
pub use stepped::{OperationProgress, SteppedProgress, OPEN_CACHE_STEPS};

use serde::{Deserialize, Serialize};

/// Receives global progress produced by a [`PhaseProgress`]
pub trait ProgressSink {
    fn on_percent(&mut self, percent: u8);

    fn on_phase_start(&mut self, name: &str);

    fn on_plan(&mut self, _phases: &[(String, PhaseRange)]) {}

    fn on_step_overrun(&mut self, _phase: &str, _step: usize) {}
}

impl<S: ProgressSink + ?Sized> ProgressSink for &mut S {
    fn on_percent(&mut self, percent: u8) {
        (**self).on_percent(percent);
    }

    fn on_phase_start(&mut self, name: &str) {
        (**self).on_phase_start(name);
    }

    fn on_plan(&mut self, phases: &[(String, PhaseRange)]) {
        (**self).on_plan(phases);
    }

    fn on_step_overrun(&mut self, phase: &str, step: usize) {
        (**self).on_step_overrun(phase, step);
    }
}

/// Global percentage interval owned by one phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseRange {
    pub start: f64,
    pub end: f64,
}

impl PhaseRange {
    /// The whole transaction
    pub const FULL: Self = Self {
        start: 0.0,
        end: 100.0,
    };

    /// Build a range, clamping both bounds into 0..=100 and ordering them.
    #[must_use]
    pub fn new(start: f64, end: f64) -> Self {
        let start = clamp_percent(start);
        let end = clamp_percent(end);
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.end - self.start
    }

    /// Linear interpolation of a phase-local percentage into this range
    #[must_use]
    pub fn map(&self, inner: f64) -> f64 {
        self.start + self.width() * clamp_percent(inner) / 100.0
    }

    /// Partition this range proportionally to `weights`.
    ///
    /// Interior bounds are rounded to whole percents and the last bound is
    /// exactly `self.end`. Non-finite or negative weights count as zero; if
    /// every weight is zero the range is split evenly.
    #[must_use]
    pub fn split(&self, weights: &[f64]) -> Vec<PhaseRange> {
        if weights.is_empty() {
            return Vec::new();
        }

        let sanitized: Vec<f64> = weights
            .iter()
            .map(|w| if w.is_finite() && *w > 0.0 { *w } else { 0.0 })
            .collect();
        let mut total: f64 = sanitized.iter().sum();
        let sanitized = if total > 0.0 {
            sanitized
        } else {
            total = sanitized.len() as f64;
            vec![1.0; sanitized.len()]
        };

        let mut ranges = Vec::with_capacity(sanitized.len());
        let mut cumulative = 0.0;
        let mut lower = self.start;
        for (i, weight) in sanitized.iter().enumerate() {
            cumulative += weight;
            let upper = if i + 1 == sanitized.len() {
                self.end
            } else {
                (self.start + self.width() * cumulative / total)
                    .round()
                    .clamp(lower, self.end)
            };
            ranges.push(PhaseRange {
                start: lower,
                end: upper,
            });
            lower = upper;
        }
        ranges
    }
}

/// Partition [0, 100] proportionally to `weights`, in order.
#[must_use]
pub fn allocate(weights: &[f64]) -> Vec<PhaseRange> {
    PhaseRange::FULL.split(weights)
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

fn to_whole_percent(value: f64) -> u8 {
    clamp_percent(value).round() as u8
}
