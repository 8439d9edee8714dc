//! # SKEIN Flocking Simulation
//!
//! The domain layer over the core substrate: boid state tables carved from
//! one arena, a spatial hash over the unit cube, and the three classic
//! steering rules (alignment, coherence, separation) plus wall avoidance,
//! stepped frame by frame on the CPU-pinned worker pool.
//!
//! ## Architecture Rules
//!
//! 1. **Tables, not objects** - boid state is a struct of arena-backed
//!    arrays, iterated whole per phase
//! 2. **The flock lives in the unit cube** - positions stay in `[0, 1]` on
//!    every axis; the avoidance rule turns boids before they reach a wall
//! 3. **All tunables come from config** - a `Ruleset` is loaded once, never
//!    mutated mid-run

pub mod boids;
pub mod config;
pub mod grid;
pub mod metrics;
pub mod vec3;

pub use boids::BoidState;
pub use config::{ConfigError, Ruleset, SimConfig};
pub use metrics::{FrameMetrics, Phase};
pub use vec3::Vec3;
