//! # SKEIN
//!
//! Entry point: load the config, reserve the one arena every table lives
//! in, pin the coordinator, spin up the pool, and run the frame loop.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use skein_core::{affinity, worker_table_bytes, Arena, CpuMask, FixedArray, ThreadPool};
use skein_sim::{grid, BoidState, FrameMetrics, SimConfig, Vec3};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match load_config() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(
        boids = config.boid_count,
        cells_per_axis = config.cells_per_axis,
        workers = config.worker_threads,
        frames = config.frame_count,
        "starting simulation"
    );

    // One reservation covers the worker table, the boid tables, and the
    // grid cells; nothing else allocates after this point.
    let arena_bytes = config.table_bytes() + worker_table_bytes(config.worker_threads);
    let arena = Arena::new();
    if !arena.reserve(arena_bytes, None) {
        error!(bytes = arena_bytes, "failed to reserve simulation arena");
        return ExitCode::FAILURE;
    }
    info!(bytes = arena_bytes, "arena reserved");

    // The coordinator stays on CPU 0; workers start at the affinity offset.
    let mut mask = CpuMask::new();
    mask.add(0);
    affinity::pin_current_thread(&mask);

    run(&arena, &config);

    arena.free(None);
    ExitCode::SUCCESS
}

/// Loads the config from the path in the first argument, or defaults.
fn load_config() -> Result<SimConfig, skein_sim::ConfigError> {
    match env::args().nth(1) {
        Some(path) => SimConfig::load(&PathBuf::from(path)),
        None => Ok(SimConfig::default()),
    }
}

/// The frame loop. Locals drop in reverse declaration order, which is
/// exactly the LIFO teardown the arena demands: cells, then the boid
/// tables, then the pool's worker table.
fn run(arena: &Arena, config: &SimConfig) {
    let mut pool = ThreadPool::new(arena, config.worker_threads, config.affinity_offset);
    let mut boids = BoidState::new(arena, config.boid_count);
    let mut cells: FixedArray<usize> =
        FixedArray::new(arena, grid::cell_count(config.cells_per_axis));

    let mut rng = StdRng::seed_from_u64(config.seed);
    scatter(&mut boids, &mut rng);

    let mut metrics = FrameMetrics::new();
    let frame_count = config.frame_count;
    let max_delta = 5.0 / frame_count as f32;

    for _frame in 0..frame_count {
        let delta = rng.gen_range(0.0..max_delta);
        boids.step(
            &pool,
            &mut cells,
            config.cells_per_axis,
            &config.rules,
            delta,
            &mut metrics,
        );
        metrics.update(frame_count);
    }

    let mean_position = boids.mean_position();
    let mean_velocity = boids.mean_velocity();
    info!(
        frames = frame_count,
        mean_position = ?mean_position,
        mean_velocity = ?mean_velocity,
        "simulation complete"
    );

    pool.shutdown();
}

/// Places every boid uniformly in the unit cube with a random unit heading.
fn scatter(boids: &mut BoidState<'_>, rng: &mut StdRng) {
    for position in boids.positions_mut() {
        *position = Vec3::new(
            rng.gen_range(0.0..1.0),
            rng.gen_range(0.0..1.0),
            rng.gen_range(0.0..1.0),
        );
    }
    for velocity in boids.velocities_mut() {
        *velocity = Vec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        )
        .normalized();
    }
}
