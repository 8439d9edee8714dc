//! # Performance Counters
//!
//! Rolling-average timing for repeatedly executed code sections. Counters
//! are plain values owned by whoever is measuring - there is no process-wide
//! registry; tie a counter's lifetime to the run it instruments.

pub mod counter;

pub use counter::PerfCounter;
