//! # Frame Metrics
//!
//! One [`PerfCounter`] per simulation phase, bracketed by the step loop and
//! rolled into averages every `window` frames. There is no global registry;
//! whoever owns the frame loop owns the metrics and passes them down.

use skein_core::PerfCounter;
use tracing::info;

/// The timed sections of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Clearing cell representatives and accumulators.
    Reset,
    /// Hashing boids into grid cells.
    Hash,
    /// Accumulating per-cell position and velocity sums.
    Sum,
    /// Evaluating the steering rules.
    Rules,
    /// Integrating velocities and positions.
    Integrate,
    /// The whole frame, wall to wall.
    Total,
}

impl Phase {
    /// Number of phases.
    pub const COUNT: usize = 6;

    /// Every phase, in frame order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Reset,
        Self::Hash,
        Self::Sum,
        Self::Rules,
        Self::Integrate,
        Self::Total,
    ];

    /// Returns this phase's slot in a counter table.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Reset => 0,
            Self::Hash => 1,
            Self::Sum => 2,
            Self::Rules => 3,
            Self::Integrate => 4,
            Self::Total => 5,
        }
    }

    /// Returns the phase name used in log lines.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Hash => "hash",
            Self::Sum => "sum",
            Self::Rules => "rules",
            Self::Integrate => "integrate",
            Self::Total => "total",
        }
    }
}

/// Per-phase timing for the frame loop.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameMetrics {
    counters: [PerfCounter; Phase::COUNT],
}

impl FrameMetrics {
    /// Creates idle counters for every phase.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counters: [PerfCounter::new(); Phase::COUNT],
        }
    }

    /// Opens `phase`'s measurement at the current instant.
    #[inline]
    pub fn begin(&mut self, phase: Phase) {
        self.counters[phase.index()].begin();
    }

    /// Opens `phase`'s measurement at the instant `source` opened, so a
    /// phase can share its start with the frame total.
    #[inline]
    pub fn begin_from(&mut self, phase: Phase, source: Phase) {
        let from = self.counters[source.index()];
        self.counters[phase.index()].begin_from(&from);
    }

    /// Closes `phase`'s measurement at the current instant.
    #[inline]
    pub fn end(&mut self, phase: Phase) {
        self.counters[phase.index()].end();
    }

    /// Closes `phase`'s measurement at the instant `source` closed.
    #[inline]
    pub fn end_from(&mut self, phase: Phase, source: Phase) {
        let from = self.counters[source.index()];
        self.counters[phase.index()].end_from(&from);
    }

    /// Returns the counter for `phase`.
    #[must_use]
    pub const fn counter(&self, phase: Phase) -> &PerfCounter {
        &self.counters[phase.index()]
    }

    /// Folds the frame's measurements into every counter and, each time the
    /// averages roll over `window` frames, logs them.
    pub fn update(&mut self, window: usize) {
        let mut rolled = false;
        for counter in &mut self.counters {
            rolled |= counter.update(window);
        }

        if rolled {
            for phase in Phase::ALL {
                let counter = &self.counters[phase.index()];
                info!(
                    phase = phase.name(),
                    average_us = counter.average().as_micros() as u64,
                    frames = counter.hits(),
                    "phase average rolled"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_phase_indices_are_distinct() {
        for (slot, phase) in Phase::ALL.iter().enumerate() {
            assert_eq!(phase.index(), slot);
        }
    }

    #[test]
    fn test_total_brackets_the_phases() {
        let mut metrics = FrameMetrics::new();

        metrics.begin(Phase::Total);
        metrics.begin_from(Phase::Reset, Phase::Total);
        thread::sleep(Duration::from_millis(2));
        metrics.end(Phase::Reset);
        metrics.end_from(Phase::Total, Phase::Reset);
        metrics.update(1);

        let total = metrics.counter(Phase::Total).average();
        let reset = metrics.counter(Phase::Reset).average();
        assert_eq!(total, reset);
        assert!(total >= Duration::from_millis(1));
    }

    #[test]
    fn test_untouched_phases_stay_at_zero() {
        let mut metrics = FrameMetrics::new();

        metrics.begin(Phase::Hash);
        metrics.end(Phase::Hash);
        metrics.update(1);

        assert_eq!(metrics.counter(Phase::Rules).average(), Duration::ZERO);
    }
}
