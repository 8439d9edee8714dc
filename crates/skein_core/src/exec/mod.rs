//! # Execution Substrate
//!
//! A fixed, CPU-pinned worker pool coordinating through one mutex/condvar
//! pair and a single-slot task mailbox, plus the thin OS affinity layer the
//! workers pin themselves with.

pub mod affinity;
pub mod pool;

pub use affinity::CpuMask;
pub use pool::ThreadPool;
