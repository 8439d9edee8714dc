//! # SKEIN Core Substrate
//!
//! Low-level resources for the simulation: all memory is reserved once at
//! startup and carved out of a single arena, and all parallelism runs on a
//! fixed set of CPU-pinned worker threads.
//!
//! ## Architecture Rules
//!
//! 1. **No heap allocations after setup** - the arena is reserved once and
//!    blocks are released in strict reverse allocation order
//! 2. **No dynamic threads** - the pool is sized at init and every worker is
//!    pinned to a logical CPU for its whole life
//! 3. **One task in flight** - dispatch is serialized through a single-slot
//!    mailbox; execution may overlap dispatch, dispatch never overlaps itself
//!
//! ## Example
//!
//! ```rust,ignore
//! use skein_core::{Arena, FixedArray, ThreadPool};
//!
//! let arena = Arena::new();
//! assert!(arena.reserve(1 << 20, None));
//!
//! let pool = ThreadPool::new(&arena, 3, 2);
//! let table: FixedArray<f32> = FixedArray::new(&arena, 4096);
//! ```

pub mod exec;
pub mod memory;
pub mod perf;

pub use exec::affinity::{self, CpuMask};
pub use exec::pool::{worker_table_bytes, ThreadPool};
pub use memory::arena::Arena;
pub use memory::fixed_array::FixedArray;
pub use perf::counter::PerfCounter;
