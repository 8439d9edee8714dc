//! # Memory Substrate
//!
//! Startup-phase allocation primitives. Everything the simulation touches is
//! carved out of one [`arena::Arena`] before the workers spin up; the arena is
//! only ever unwound in reverse allocation order.

pub mod arena;
pub mod fixed_array;

pub use arena::Arena;
pub use fixed_array::FixedArray;
