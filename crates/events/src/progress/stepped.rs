//! Progress for operations that announce completion one step at a time

use super::{PhaseProgress, PhaseRange, ProgressSink};
use tracing::warn;

/// Fractions of the cache-open range at which each loading step ends
pub const OPEN_CACHE_STEPS: [f64; 5] = [0.12, 0.25, 0.50, 0.75, 1.00];

/// Callback surface handed to long-running native operations
pub trait OperationProgress {
    /// Progress of the current step, 0-100
    fn update(&mut self, percent: f64);

    /// The current step finished
    fn done(&mut self);
}

/// Reports a step-wise operation inside the current phase.
///
/// The phase range is pre-split at the given step fractions. Steps beyond
/// the last fraction keep reporting at the end of the range.
pub struct SteppedProgress<'a, S: ProgressSink> {
    progress: &'a mut PhaseProgress<S>,
    range: PhaseRange,
    steps: Vec<f64>,
    step: usize,
}

impl<'a, S: ProgressSink> SteppedProgress<'a, S> {
    /// Step through the current phase using `steps` as cumulative fractions.
    pub fn new(progress: &'a mut PhaseProgress<S>, steps: &[f64]) -> Self {
        let range = progress
            .current_range()
            .unwrap_or(PhaseRange::new(f64::from(progress.last_emitted()), 100.0));
        Self {
            progress,
            range,
            steps: steps.to_vec(),
            step: 0,
        }
    }

    /// The default cache-open stepping
    pub fn for_cache_open(progress: &'a mut PhaseProgress<S>) -> Self {
        Self::new(progress, &OPEN_CACHE_STEPS)
    }

    fn step_range(&self) -> PhaseRange {
        let Some(end) = self.steps.get(self.step) else {
            return PhaseRange::new(self.range.end, self.range.end);
        };
        let start = if self.step == 0 {
            0.0
        } else {
            self.steps[self.step - 1]
        };
        PhaseRange::new(
            self.range.start + self.range.width() * start,
            self.range.start + self.range.width() * end,
        )
    }

    #[must_use]
    pub fn step(&self) -> usize {
        self.step
    }
}

impl<S: ProgressSink> OperationProgress for SteppedProgress<'_, S> {
    fn update(&mut self, percent: f64) {
        let range = self.step_range();
        self.progress.update_in(range, percent);
    }

    fn done(&mut self) {
        let range = self.step_range();
        self.progress.update_in(range, 100.0);
        self.step += 1;
        if self.step > self.steps.len() {
            warn!(
                step = self.step,
                planned = self.steps.len(),
                "operation reported more steps than planned"
            );
            self.progress.step_overrun(self.step);
        }
    }
}

/// Discards progress
impl OperationProgress for () {
    fn update(&mut self, _percent: f64) {}

    fn done(&mut self) {}
}
