//! Monotonic global progress over a phase plan

use super::{to_whole_percent, PhaseRange, ProgressSink};
use tracing::{debug, warn};

/// Maps per-phase progress into global percentages.
///
/// The last emitted value is tracked and nothing at or below it is emitted
/// again, so the sink only ever sees a strictly increasing sequence.
#[derive(Debug)]
pub struct PhaseProgress<S: ProgressSink> {
    sink: S,
    phases: Vec<(String, PhaseRange)>,
    current: Option<usize>,
    entered: usize,
    last_emitted: Option<u8>,
}

impl<S: ProgressSink> PhaseProgress<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            phases: Vec::new(),
            current: None,
            entered: 0,
            last_emitted: None,
        }
    }

    /// Emit the initial 0% of a transaction
    pub fn start(&mut self) {
        self.emit(0.0);
    }

    /// Lay out the phase plan over the range not yet reported.
    pub fn plan(&mut self, phases: &[(&str, f64)]) {
        self.phases.clear();
        self.current = None;
        self.entered = 0;
        self.append_plan(phases);
    }

    /// Replace every phase after the current one with a new plan.
    ///
    /// Entered phases keep their ranges; the new phases share whatever lies
    /// between the last emitted value and 100.
    pub fn replan(&mut self, phases: &[(&str, f64)]) {
        self.phases.truncate(self.entered);
        self.current = None;
        self.append_plan(phases);
    }

    fn append_plan(&mut self, phases: &[(&str, f64)]) {
        let floor = f64::from(self.last_emitted.unwrap_or(0));
        let weights: Vec<f64> = phases.iter().map(|(_, w)| *w).collect();
        let ranges = PhaseRange::new(floor, 100.0).split(&weights);
        for ((name, _), range) in phases.iter().zip(ranges) {
            debug!(phase = %name, start = range.start, end = range.end, "planned phase");
            self.phases.push(((*name).to_string(), range));
        }
        self.sink.on_plan(&self.phases[self.entered..]);
    }

    /// Enter the named phase, the most recently planned one if the name
    /// repeats. Unknown names leave progress untouched.
    pub fn enter(&mut self, name: &str) -> bool {
        let Some(index) = self.phases.iter().rposition(|(n, _)| n == name) else {
            warn!(phase = name, "entering a phase that is not part of the plan");
            return false;
        };
        self.current = Some(index);
        self.entered = self.entered.max(index + 1);
        self.sink.on_phase_start(name);
        let start = self.phases[index].1.start;
        self.emit(start);
        true
    }

    /// Report the current phase's own progress (0-100)
    pub fn update(&mut self, inner: f64) {
        if let Some(range) = self.current_range() {
            self.emit(range.map(inner));
        }
    }

    /// Report progress inside an explicit sub-range of the current phase
    pub fn update_in(&mut self, range: PhaseRange, inner: f64) {
        self.emit(range.map(inner));
    }

    /// Jump to the end of the current phase
    pub fn finish_phase(&mut self) {
        if let Some(range) = self.current_range() {
            self.emit(range.end);
        }
    }

    /// Note a step reported past the end of a stepped operation
    pub fn step_overrun(&mut self, step: usize) {
        let phase = self.current_phase().unwrap_or_default().to_string();
        self.sink.on_step_overrun(&phase, step);
    }

    /// Report 100%
    pub fn complete(&mut self) {
        self.emit(100.0);
    }

    #[must_use]
    pub fn current_range(&self) -> Option<PhaseRange> {
        self.current.map(|i| self.phases[i].1)
    }

    #[must_use]
    pub fn current_phase(&self) -> Option<&str> {
        self.current.map(|i| self.phases[i].0.as_str())
    }

    #[must_use]
    pub fn range_of(&self, name: &str) -> Option<PhaseRange> {
        self.phases
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, range)| *range)
    }

    #[must_use]
    pub fn phases(&self) -> &[(String, PhaseRange)] {
        &self.phases
    }

    /// Highest percentage handed to the sink so far (0 before any emission)
    #[must_use]
    pub fn last_emitted(&self) -> u8 {
        self.last_emitted.unwrap_or(0)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn emit(&mut self, global: f64) {
        let value = to_whole_percent(global);
        if self.last_emitted.is_some_and(|last| value <= last) {
            return;
        }
        self.last_emitted = Some(value);
        self.sink.on_percent(value);
    }
}
