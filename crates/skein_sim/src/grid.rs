//! # Spatial Hash
//!
//! Maps unit-cube positions onto a flat grid of `cells_per_axis^3` cells.
//! Boids in the same cell are "neighbors" for the steering rules; anything
//! further apart is ignored entirely, which is what keeps a frame linear in
//! the boid count.

use crate::vec3::Vec3;

/// Returns the flat cell index for a position inside the closed unit cube.
///
/// The top face (`coordinate == 1.0`) folds into the last cell so a boid
/// sitting exactly on a wall still lands in range.
#[inline]
#[must_use]
pub fn cell_index(position: Vec3, cells_per_axis: usize) -> usize {
    let axis = |coordinate: f32| -> usize {
        let cell = (coordinate * cells_per_axis as f32) as usize;
        cell.min(cells_per_axis - 1)
    };

    axis(position.x)
        + axis(position.y) * cells_per_axis
        + axis(position.z) * cells_per_axis * cells_per_axis
}

/// Returns the total cell count for a grid of `cells_per_axis` per side.
#[inline]
#[must_use]
pub fn cell_count(cells_per_axis: usize) -> usize {
    cells_per_axis * cells_per_axis * cells_per_axis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_is_cell_zero() {
        assert_eq!(cell_index(Vec3::ZERO, 10), 0);
    }

    #[test]
    fn test_every_corner_is_in_range() {
        let corners = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
        ];
        for corner in corners {
            assert!(cell_index(corner, 10) < cell_count(10));
        }
    }

    #[test]
    fn test_neighbors_share_a_cell() {
        let a = Vec3::new(0.41, 0.52, 0.63);
        let b = Vec3::new(0.43, 0.54, 0.69);
        assert_eq!(cell_index(a, 10), cell_index(b, 10));
    }

    #[test]
    fn test_axes_are_strided() {
        let step = 1.0 / 10.0 + 1e-4;
        assert_eq!(cell_index(Vec3::new(step, 0.0, 0.0), 10), 1);
        assert_eq!(cell_index(Vec3::new(0.0, step, 0.0), 10), 10);
        assert_eq!(cell_index(Vec3::new(0.0, 0.0, step), 10), 100);
    }
}
