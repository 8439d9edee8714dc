//! # Boid Tables and the Frame Step
//!
//! All flock state is a struct of arena-backed tables, one entry per boid,
//! walked whole in five phases per frame: reset, hash, sum, rules,
//! integrate. Neighborhood queries never happen; each grid cell elects its
//! lowest-index boid as representative and every boid in the cell steers
//! against that representative's accumulated averages, which keeps the frame
//! linear in the boid count.
//!
//! The data-parallel phases (reset, rules, integrate) run on the worker
//! pool; hash and sum are serial because both race on the cell tables.
//!
//! ## Safety Note
//!
//! This module requires unsafe code to let pool workers write disjoint
//! chunks of the tables. All unsafe blocks are reviewed and documented.

#![allow(unsafe_code)]

use skein_core::{Arena, FixedArray, ThreadPool};

use crate::config::Ruleset;
use crate::grid;
use crate::metrics::{FrameMetrics, Phase};
use crate::vec3::Vec3;

/// A raw table pointer handed to pool workers.
///
/// `parallel_for` chunks are disjoint index ranges, so concurrent writers
/// never alias; the type exists to carry the pointer across the `Sync`
/// closure boundary that a `&mut` borrow cannot cross.
#[derive(Clone, Copy)]
struct TablePtr<T>(*mut T);

// SAFETY: every access goes through read/write at indices the caller
// guarantees are disjoint per thread. See parallel_for chunking.
unsafe impl<T: Send> Sync for TablePtr<T> {}
unsafe impl<T: Send> Send for TablePtr<T> {}

impl<T> TablePtr<T> {
    fn new(table: &mut FixedArray<'_, T>) -> Self {
        Self(table.as_mut_slice().as_mut_ptr())
    }

    /// # Safety
    ///
    /// `index` must be in bounds and not concurrently written.
    #[inline]
    unsafe fn read(self, index: usize) -> T
    where
        T: Copy,
    {
        *self.0.add(index)
    }

    /// # Safety
    ///
    /// `index` must be in bounds and written by exactly one thread.
    #[inline]
    unsafe fn write(self, index: usize, value: T) {
        *self.0.add(index) = value;
    }
}

/// The flock, as a struct of per-boid tables.
///
/// Field order is load-bearing: fields drop in declaration order, and the
/// arena requires strict LIFO teardown, so the constructor allocates the
/// tables in *reverse* field order. Keep both in sync when adding a table.
pub struct BoidState<'a> {
    /// Position inside the unit cube.
    position: FixedArray<'a, Vec3>,
    /// Unit-length heading.
    velocity: FixedArray<'a, Vec3>,
    /// Grid cell per boid, refreshed by the hash phase.
    cell_id: FixedArray<'a, usize>,
    /// Boids hashed into the same cell, accumulated at the representative.
    neighbor_count: FixedArray<'a, usize>,
    /// Position sum per cell, accumulated at the representative.
    average_position: FixedArray<'a, Vec3>,
    /// Velocity sum per cell, accumulated at the representative.
    average_velocity: FixedArray<'a, Vec3>,
    /// Wall-avoidance steering output.
    avoidance: FixedArray<'a, Vec3>,
    /// Alignment steering output.
    alignment: FixedArray<'a, Vec3>,
    /// Coherence steering output.
    coherence: FixedArray<'a, Vec3>,
    /// Separation steering output.
    separation: FixedArray<'a, Vec3>,
}

impl<'a> BoidState<'a> {
    /// Allocates tables for `boid_count` boids from `arena`.
    ///
    /// # Panics
    ///
    /// Panics if the arena cannot hold the tables; size it with
    /// [`crate::SimConfig::table_bytes`].
    #[must_use]
    pub fn new(arena: &'a Arena, boid_count: usize) -> Self {
        // Reverse field order, so field drops rewind the arena LIFO.
        let separation = FixedArray::new(arena, boid_count);
        let coherence = FixedArray::new(arena, boid_count);
        let alignment = FixedArray::new(arena, boid_count);
        let avoidance = FixedArray::new(arena, boid_count);
        let average_velocity = FixedArray::new(arena, boid_count);
        let average_position = FixedArray::new(arena, boid_count);
        let neighbor_count = FixedArray::new(arena, boid_count);
        let cell_id = FixedArray::new(arena, boid_count);
        let velocity = FixedArray::new(arena, boid_count);
        let position = FixedArray::new(arena, boid_count);

        Self {
            position,
            velocity,
            cell_id,
            neighbor_count,
            average_position,
            average_velocity,
            avoidance,
            alignment,
            coherence,
            separation,
        }
    }

    /// Returns the boid count.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.position.len()
    }

    /// Returns whether the flock is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// Returns the position table.
    #[must_use]
    pub fn positions(&self) -> &[Vec3] {
        self.position.as_slice()
    }

    /// Returns the position table mutably, for initial placement.
    pub fn positions_mut(&mut self) -> &mut [Vec3] {
        self.position.as_mut_slice()
    }

    /// Returns the velocity table.
    #[must_use]
    pub fn velocities(&self) -> &[Vec3] {
        self.velocity.as_slice()
    }

    /// Returns the velocity table mutably, for initial headings.
    pub fn velocities_mut(&mut self) -> &mut [Vec3] {
        self.velocity.as_mut_slice()
    }

    /// Returns the mean position of the flock.
    #[must_use]
    pub fn mean_position(&self) -> Vec3 {
        mean(self.position.as_slice())
    }

    /// Returns the mean velocity of the flock.
    #[must_use]
    pub fn mean_velocity(&self) -> Vec3 {
        mean(self.velocity.as_slice())
    }

    /// Advances the flock by one frame of `delta` time units.
    ///
    /// `cells` is the grid-cell representative table, sized
    /// `cells_per_axis^3`; its contents are scratch, rewritten every frame.
    ///
    /// # Panics
    ///
    /// Panics if `cells` does not match `cells_per_axis`, or if the flock is
    /// not larger than the pool (the pool cannot split such a workload).
    pub fn step(
        &mut self,
        pool: &ThreadPool<'_>,
        cells: &mut FixedArray<'_, usize>,
        cells_per_axis: usize,
        rules: &Ruleset,
        delta: f32,
        metrics: &mut FrameMetrics,
    ) {
        assert_eq!(
            cells.len(),
            grid::cell_count(cells_per_axis),
            "cell table does not match the grid resolution"
        );

        let boid_count = self.len();

        metrics.begin(Phase::Total);

        metrics.begin_from(Phase::Reset, Phase::Total);
        self.reset(pool, cells, boid_count);
        metrics.end(Phase::Reset);

        metrics.begin(Phase::Hash);
        self.hash(cells, cells_per_axis);
        metrics.end(Phase::Hash);

        metrics.begin(Phase::Sum);
        self.sum(cells);
        metrics.end(Phase::Sum);

        metrics.begin(Phase::Rules);
        self.rules(pool, cells, rules);
        metrics.end(Phase::Rules);

        metrics.begin(Phase::Integrate);
        self.integrate(pool, rules, delta);
        metrics.end(Phase::Integrate);

        metrics.end_from(Phase::Total, Phase::Integrate);
    }

    /// Clears the cell representatives to the "no boid" sentinel and zeroes
    /// every accumulator.
    fn reset(&mut self, pool: &ThreadPool<'_>, cells: &mut FixedArray<'_, usize>, sentinel: usize) {
        cells.as_mut_slice().fill(sentinel);

        let boid_count = self.len();
        let neighbor_count = TablePtr::new(&mut self.neighbor_count);
        let average_position = TablePtr::new(&mut self.average_position);
        let average_velocity = TablePtr::new(&mut self.average_velocity);

        pool.parallel_for(
            |start, end| {
                for i in start..end {
                    // SAFETY: chunks are disjoint; i is in [0, boid_count).
                    unsafe {
                        neighbor_count.write(i, 0);
                        average_position.write(i, Vec3::ZERO);
                        average_velocity.write(i, Vec3::ZERO);
                    }
                }
            },
            boid_count,
            0,
        );
    }

    /// Hashes every boid into its grid cell and elects the lowest-index
    /// boid per cell as representative. Serial: every iteration may touch
    /// the same cell slot.
    fn hash(&mut self, cells: &mut FixedArray<'_, usize>, cells_per_axis: usize) {
        let cells = cells.as_mut_slice();
        for (i, position) in self.position.iter().enumerate() {
            let cell = grid::cell_index(*position, cells_per_axis);
            self.cell_id[i] = cell;
            cells[cell] = cells[cell].min(i);
        }
    }

    /// Accumulates position and velocity sums at each cell's representative.
    /// Serial: boids sharing a cell write the same accumulator slots.
    fn sum(&mut self, cells: &FixedArray<'_, usize>) {
        for i in 0..self.len() {
            let representative = cells[self.cell_id[i]];
            self.neighbor_count[representative] += 1;
            self.average_position[representative] += self.position[i];
            self.average_velocity[representative] += self.velocity[i];
        }
    }

    /// Evaluates the four steering rules for every boid against its cell's
    /// averages.
    fn rules(&mut self, pool: &ThreadPool<'_>, cells: &FixedArray<'_, usize>, rules: &Ruleset) {
        let boid_count = self.len();
        let position = self.position.as_slice();
        let cell_id = self.cell_id.as_slice();
        let neighbor_count = self.neighbor_count.as_slice();
        let average_position = self.average_position.as_slice();
        let average_velocity = self.average_velocity.as_slice();
        let cells = cells.as_slice();

        let avoidance = TablePtr::new(&mut self.avoidance);
        let alignment = TablePtr::new(&mut self.alignment);
        let coherence = TablePtr::new(&mut self.coherence);
        let separation = TablePtr::new(&mut self.separation);

        let weights = *rules;

        pool.parallel_for(
            |start, end| {
                for i in start..end {
                    let representative = cells[cell_id[i]];
                    // The boid itself was accumulated, so the count is >= 1.
                    let count = neighbor_count[representative] as f32;
                    let center = average_position[representative] / count;
                    let heading = average_velocity[representative] / count;

                    // SAFETY: chunks are disjoint; i is in bounds.
                    unsafe {
                        avoidance
                            .write(i, wall_avoidance(position[i], weights.avoidance_margin));
                        alignment
                            .write(i, weights.alignment_weight * heading.normalized());
                        coherence.write(
                            i,
                            weights.coherence_weight * (center - position[i]).normalized(),
                        );
                        separation.write(
                            i,
                            weights.separation_weight * (position[i] - center).normalized(),
                        );
                    }
                }
            },
            boid_count,
            0,
        );
    }

    /// Blends each boid's velocity toward its desired heading and advances
    /// its position, clamped to the unit cube.
    fn integrate(&mut self, pool: &ThreadPool<'_>, rules: &Ruleset, delta: f32) {
        let boid_count = self.len();
        let avoidance = self.avoidance.as_slice();
        let alignment = self.alignment.as_slice();
        let coherence = self.coherence.as_slice();
        let separation = self.separation.as_slice();

        let position = TablePtr::new(&mut self.position);
        let velocity = TablePtr::new(&mut self.velocity);

        let max_speed = rules.max_speed;

        pool.parallel_for(
            |start, end| {
                for i in start..end {
                    let steering = alignment[i] + coherence[i] + separation[i];
                    // A wall in range overrides flocking outright.
                    let desired = if avoidance[i].length_squared() > 0.0 {
                        avoidance[i]
                    } else {
                        steering.normalized()
                    };

                    // SAFETY: chunks are disjoint; i is in bounds, and no
                    // other table read here aliases these two.
                    unsafe {
                        let old = velocity.read(i);
                        let new = (old + (desired - old) * delta).normalized();
                        velocity.write(i, new);

                        let moved = velocity.read(i) * max_speed * delta + position.read(i);
                        position.write(i, clamp_to_unit_cube(moved));
                    }
                }
            },
            boid_count,
            0,
        );
    }
}

/// Returns the steering impulse away from any wall closer than `margin`,
/// or zero when no wall is in range.
fn wall_avoidance(position: Vec3, margin: f32) -> Vec3 {
    let axis = |coordinate: f32| -> f32 {
        if coordinate < margin {
            1.0
        } else if coordinate > 1.0 - margin {
            -1.0
        } else {
            0.0
        }
    };

    Vec3::new(axis(position.x), axis(position.y), axis(position.z)).normalized()
}

/// Clamps every component of `position` into `[0, 1]`.
fn clamp_to_unit_cube(position: Vec3) -> Vec3 {
    Vec3::new(
        position.x.clamp(0.0, 1.0),
        position.y.clamp(0.0, 1.0),
        position.z.clamp(0.0, 1.0),
    )
}

fn mean(table: &[Vec3]) -> Vec3 {
    if table.is_empty() {
        return Vec3::ZERO;
    }
    let sum = table.iter().fold(Vec3::ZERO, |acc, v| acc + *v);
    sum / table.len() as f32
}
