//! # Rolling-Average Counter
//!
//! Brackets a repeatedly executed section with [`PerfCounter::begin`] /
//! [`PerfCounter::end`] and folds the elapsed time into an average that
//! rolls over every `window` hits.

use std::time::{Duration, Instant};

/// A begin/end timer with a rolling average.
///
/// # Example
///
/// ```rust,ignore
/// let mut counter = PerfCounter::new();
/// for _ in 0..600 {
///     counter.begin();
///     expensive_section();
///     counter.end();
///     if counter.update(600) {
///         println!("section averaged {:?}", counter.average());
///     }
/// }
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct PerfCounter {
    /// Start of the currently open measurement, if any.
    begin: Option<Instant>,
    /// End of the currently open measurement, if any.
    end: Option<Instant>,
    /// Time accumulated since the average last rolled.
    elapsed: Duration,
    /// The most recently rolled average.
    average: Duration,
    /// Measurements started since construction.
    hits: usize,
}

impl PerfCounter {
    /// Creates an idle counter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            begin: None,
            end: None,
            elapsed: Duration::ZERO,
            average: Duration::ZERO,
            hits: 0,
        }
    }

    /// Opens a measurement at the current instant.
    #[inline]
    pub fn begin(&mut self) {
        self.hits += 1;
        self.begin = Some(Instant::now());
    }

    /// Opens a measurement sharing `other`'s start point, so two counters
    /// can bracket overlapping sections without reading the clock twice.
    #[inline]
    pub fn begin_from(&mut self, other: &PerfCounter) {
        self.hits += 1;
        self.begin = other.begin;
    }

    /// Closes the open measurement at the current instant.
    #[inline]
    pub fn end(&mut self) {
        self.end = Some(Instant::now());
    }

    /// Closes the open measurement at `other`'s end point.
    #[inline]
    pub fn end_from(&mut self, other: &PerfCounter) {
        self.end = other.end;
    }

    /// Folds the closed measurement into the accumulator and, every
    /// `window` hits, rolls the accumulator into a fresh average.
    ///
    /// # Returns
    ///
    /// `true` exactly when the average rolled, i.e. the value returned by
    /// [`PerfCounter::average`] just changed.
    pub fn update(&mut self, window: usize) -> bool {
        if let (Some(begin), Some(end)) = (self.begin.take(), self.end.take()) {
            self.elapsed += end.saturating_duration_since(begin);
        }
        self.begin = None;
        self.end = None;

        if window > 0 && self.hits % window == 0 {
            let divisor = u32::try_from(window).unwrap_or(u32::MAX);
            self.average = self.elapsed / divisor;
            self.elapsed = Duration::ZERO;

            if self.hits > 0 {
                return true;
            }
        }

        false
    }

    /// Returns the most recently rolled average.
    #[inline]
    #[must_use]
    pub const fn average(&self) -> Duration {
        self.average
    }

    /// Returns the number of measurements started so far.
    #[inline]
    #[must_use]
    pub const fn hits(&self) -> usize {
        self.hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_average_rolls_on_window() {
        let mut counter = PerfCounter::new();

        for hit in 1..=4 {
            counter.begin();
            thread::sleep(Duration::from_millis(2));
            counter.end();

            let rolled = counter.update(2);
            assert_eq!(rolled, hit % 2 == 0);
        }

        assert_eq!(counter.hits(), 4);
        assert!(counter.average() >= Duration::from_millis(1));
    }

    #[test]
    fn test_idle_counter_never_rolls() {
        let mut counter = PerfCounter::new();
        assert!(!counter.update(10));
        assert_eq!(counter.average(), Duration::ZERO);
    }

    #[test]
    fn test_begin_from_shares_the_start_point() {
        let mut outer = PerfCounter::new();
        let mut inner = PerfCounter::new();

        outer.begin();
        inner.begin_from(&outer);
        thread::sleep(Duration::from_millis(2));
        inner.end();
        outer.end_from(&inner);

        assert!(outer.update(1));
        assert!(inner.update(1));
        assert_eq!(outer.hits(), 1);
        assert!(outer.average() >= inner.average());
    }
}
