//! # Simulation Configuration
//!
//! All tunables live in one TOML file, loaded once at startup. Nothing in
//! here is consulted again mid-run; a frame only ever sees the immutable
//! [`Ruleset`].

use std::fs;
use std::mem;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid;
use crate::vec3::Vec3;

/// Errors that can occur loading the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML (or has wrong field types).
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value that must be non-zero was zero.
    #[error("invalid configuration: {0} must be greater than zero")]
    ZeroField(&'static str),

    /// The workload is too small for the pool to split.
    #[error("invalid configuration: boid_count ({boids}) must exceed worker_threads ({threads})")]
    TinyFlock {
        /// Configured boid count.
        boids: usize,
        /// Configured worker count.
        threads: usize,
    },
}

/// Steering weights and limits for one run.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Ruleset {
    /// Weight of steering toward the flock's average heading.
    pub alignment_weight: f32,
    /// Weight of steering toward the flock's center of mass.
    pub coherence_weight: f32,
    /// Weight of steering away from the flock's center of mass.
    pub separation_weight: f32,
    /// Distance from a wall at which avoidance kicks in.
    pub avoidance_margin: f32,
    /// Upper bound on boid speed, in cube widths per time unit.
    pub max_speed: f32,
}

impl Default for Ruleset {
    fn default() -> Self {
        Self {
            alignment_weight: 0.1,
            coherence_weight: 0.1,
            separation_weight: 0.1,
            avoidance_margin: 0.15,
            max_speed: 0.1,
        }
    }
}

/// Top-level simulation configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of boids in the flock.
    pub boid_count: usize,
    /// Spatial hash resolution per axis.
    pub cells_per_axis: usize,
    /// Worker threads in the pool.
    pub worker_threads: usize,
    /// Frames to simulate.
    pub frame_count: usize,
    /// First logical CPU handed to the pool's workers.
    pub affinity_offset: usize,
    /// Seed for deterministic boid placement.
    pub seed: u64,
    /// Extra arena slack beyond the computed table sizes.
    pub arena_headroom: usize,
    /// Steering rules for the run.
    pub rules: Ruleset,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            boid_count: 400_000,
            cells_per_axis: 100,
            worker_threads: 3,
            frame_count: 600,
            affinity_offset: 2,
            seed: 0x5eed_f10c,
            arena_headroom: 4096,
            rules: Ruleset::default(),
        }
    }
}

impl SimConfig {
    /// Loads the configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, does not parse,
    /// or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the cross-field invariants the types cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.boid_count == 0 {
            return Err(ConfigError::ZeroField("boid_count"));
        }
        if self.cells_per_axis == 0 {
            return Err(ConfigError::ZeroField("cells_per_axis"));
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::ZeroField("worker_threads"));
        }
        if self.boid_count <= self.worker_threads {
            return Err(ConfigError::TinyFlock {
                boids: self.boid_count,
                threads: self.worker_threads,
            });
        }
        Ok(())
    }

    /// Returns the arena bytes the boid and cell tables will consume,
    /// headers included, excluding the pool's worker table.
    #[must_use]
    pub fn table_bytes(&self) -> usize {
        // Eight Vec3 tables and two index tables per boid, one index table
        // over the grid, plus one block header per table.
        let per_boid = 8 * mem::size_of::<Vec3>() + 2 * mem::size_of::<usize>();
        let per_cell = mem::size_of::<usize>();
        let headers = 11 * 2 * mem::size_of::<usize>();

        per_boid * self.boid_count
            + per_cell * grid::cell_count(self.cells_per_axis)
            + headers
            + self.arena_headroom
    }
}
