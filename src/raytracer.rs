use crate::beam::{BeamDirection, DIRECTION_EPSILON};
use crate::enums::Axis;
use crate::grid::Grid;
use crate::volume::SprVolume;

use ndarray::{Array3, Zip};
use thiserror::Error;
use tracing::debug;

/// Margin added to every traversal step so the position strictly crosses
/// into the next voxel even when a boundary lands exactly on a representable
/// float. Same unit as the grid spacing (mm); fixed, not scaled to spacing.
pub const STEP_MARGIN: f32 = 1e-3;

#[derive(Debug, Error)]
pub enum RaytraceError {
    #[error("ROI mask shape {actual:?} does not match the SPR field shape {expected:?}")]
    RoiShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    #[error("WET field shape {actual:?} does not match the SPR field shape {expected:?}")]
    WetShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },
}

/// Fill `wet` with one water-equivalent thickness per ROI voxel.
///
/// For every voxel selected by `roi` (every voxel when `roi` is `None`), a
/// ray is marched from the voxel center back toward the source until it
/// leaves the grid, accumulating SPR × path length through every voxel it
/// crosses. Voxels outside the ROI are left at their caller-supplied values.
///
/// Work is fanned out with rayon. Each traversal reads only the shared SPR
/// field, mask and geometry and writes exactly one WET cell, so the result
/// does not depend on the worker count or on voxel ordering.
pub fn raytrace_wet_into(
    volume: &SprVolume,
    direction: BeamDirection,
    roi: Option<&Array3<bool>>,
    wet: &mut Array3<f32>,
) -> Result<(), RaytraceError> {
    let shape = volume.dim();
    if let Some(mask) = roi {
        if mask.dim() != shape {
            return Err(RaytraceError::RoiShapeMismatch {
                expected: shape,
                actual: mask.dim(),
            });
        }
    }
    if wet.dim() != shape {
        return Err(RaytraceError::WetShapeMismatch {
            expected: shape,
            actual: wet.dim(),
        });
    }

    debug!(
        ?shape,
        direction = ?direction.components(),
        masked = roi.is_some(),
        "computing WET map"
    );

    let tracer = Tracer::new(volume, direction);
    match roi {
        Some(mask) => {
            Zip::indexed(wet).and(mask).par_for_each(|(j, i, k), cell, &inside| {
                if inside {
                    *cell = tracer.wet_for_voxel(i, j, k);
                }
            });
        }
        None => {
            Zip::indexed(wet).par_for_each(|(j, i, k), cell| {
                *cell = tracer.wet_for_voxel(i, j, k);
            });
        }
    }

    Ok(())
}

/// Per-call traversal state: the reversed beam direction and the
/// voxel-center bounds that terminate a march.
struct Tracer<'a> {
    spr: &'a Array3<f32>,
    grid: &'a Grid,
    direction: [f32; 3],
    first_center: [f32; 3],
    last_center: [f32; 3],
}

impl<'a> Tracer<'a> {
    fn new(volume: &'a SprVolume, direction: BeamDirection) -> Self {
        let grid = volume.grid();
        let mut first_center = [0.0; 3];
        let mut last_center = [0.0; 3];
        for axis in Axis::ALL {
            let a = axis.index();
            first_center[a] = grid.voxel_center(axis, 0);
            last_center[a] = grid.voxel_center(axis, grid.len(axis) - 1);
        }
        Self {
            spr: volume.data(),
            grid,
            direction: direction.reversed(),
            first_center,
            last_center,
        }
    }

    /// March from the center of the voxel with indices `(i, j, k)` until the
    /// ray leaves the grid, accumulating SPR × step length.
    ///
    /// The exit check runs before every lookup, and each step is capped by
    /// the nearest voxel boundary, so every lookup is in bounds. Each
    /// traversed voxel contributes its own SPR over the distance spent
    /// inside it: the value read is that of the voxel the ray is leaving.
    fn wet_for_voxel(&self, i: usize, j: usize, k: usize) -> f32 {
        let grid = self.grid;
        let mut position = [
            grid.voxel_center(Axis::X, i),
            grid.voxel_center(Axis::Y, j),
            grid.voxel_center(Axis::Z, k),
        ];
        let mut wet = 0.0f32;

        loop {
            if self.has_left_grid(&position) {
                break;
            }

            let step = self.step_length(&position);

            let ix = grid.voxel_index(Axis::X, position[0]) as usize;
            let iy = grid.voxel_index(Axis::Y, position[1]) as usize;
            let iz = grid.voxel_index(Axis::Z, position[2]) as usize;
            wet += self.spr[grid.array_index(ix, iy, iz)] * step;

            for a in 0..3 {
                position[a] += step * self.direction[a];
            }
        }

        wet
    }

    /// The ray has left the grid once its coordinate on any axis is past
    /// the extreme voxel center on the side it is heading toward.
    ///
    /// Axes with a near-zero direction component are skipped, as in the
    /// step-size computation; their coordinate stays within the starting
    /// cell up to a drift far below the voxel size.
    fn has_left_grid(&self, position: &[f32; 3]) -> bool {
        for a in 0..3 {
            let dir = self.direction[a];
            if dir.abs() <= DIRECTION_EPSILON {
                continue;
            }
            if dir < 0.0 && position[a] < self.first_center[a] {
                return true;
            }
            if dir > 0.0 && position[a] > self.last_center[a] {
                return true;
            }
        }
        false
    }

    /// Distance to the nearest voxel boundary crossing along the ray, plus
    /// [`STEP_MARGIN`]. Axes with a near-zero direction component never
    /// constrain the step.
    fn step_length(&self, position: &[f32; 3]) -> f32 {
        let spacing = self.grid.spacing();
        let offset = self.grid.offset();
        let mut nearest = f32::INFINITY;
        for axis in Axis::ALL {
            let a = axis.index();
            let dir = self.direction[a];
            if dir.abs() <= DIRECTION_EPSILON {
                continue;
            }
            let cell = self.grid.voxel_index(axis, position[a]) as f32;
            let towards = if dir > 0.0 { 1.0 } else { 0.0 };
            let boundary = (cell + towards) * spacing[a] + offset[a];
            nearest = nearest.min(((boundary - position[a]) / dir).abs());
        }
        nearest + STEP_MARGIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array3;

    use crate::grid::Grid;

    fn uniform_volume(size: [usize; 3], spacing: [f32; 3], value: f32) -> SprVolume {
        let grid = Grid::new(size, spacing, [0.0; 3]).unwrap();
        SprVolume::filled(value, grid)
    }

    fn graded_volume(size: [usize; 3]) -> SprVolume {
        let grid = Grid::new(size, [1.0; 3], [0.0; 3]).unwrap();
        let data = Array3::from_shape_fn(grid.array_shape(), |(j, i, k)| {
            1.0 + 0.01 * (k + 3 * i + 7 * j) as f32
        });
        SprVolume::new(data, grid).unwrap()
    }

    #[test]
    fn boundary_voxel_contributes_half_a_cell() {
        // 1x1x1 grid, spacing 1 mm, SPR 2.0: the ray starts at the cell
        // center, 0.5 mm from the exit face
        let volume = uniform_volume([1, 1, 1], [1.0; 3], 2.0);
        let direction = BeamDirection::new(0.0, 0.0, -1.0).unwrap();
        let wet = volume.compute_wet_map(direction, None).unwrap();
        assert_abs_diff_eq!(wet[[0, 0, 0]], 1.0, epsilon = 0.01);
    }

    #[test]
    fn uniform_medium_matches_the_closed_form() {
        let spr = 1.5;
        let volume = uniform_volume([1, 1, 10], [1.0; 3], spr);
        let direction = BeamDirection::new(0.0, 0.0, -1.0).unwrap();
        let wet = volume.compute_wet_map(direction, None).unwrap();
        for k in 0..10 {
            // source-ward distance from the voxel center to the far face
            let expected = spr * (10.0 - (k as f32 + 0.5));
            assert_abs_diff_eq!(wet[[0, 0, k]], expected, epsilon = 0.05);
        }
    }

    #[test]
    fn closed_form_holds_for_anisotropic_spacing() {
        let volume = uniform_volume([6, 1, 1], [2.5, 1.0, 1.0], 1.0);
        let direction = BeamDirection::new(-1.0, 0.0, 0.0).unwrap();
        let wet = volume.compute_wet_map(direction, None).unwrap();
        for i in 0..6 {
            let center = 2.5 * (i as f32 + 0.5);
            assert_abs_diff_eq!(wet[[0, i, 0]], 15.0 - center, epsilon = 0.05);
        }
    }

    #[test]
    fn wet_grows_with_depth_along_the_beam() {
        let volume = graded_volume([4, 4, 12]);
        let direction = BeamDirection::new(0.0, 0.0, -1.0).unwrap();
        let wet = volume.compute_wet_map(direction, None).unwrap();
        // the beam enters at the high-z face; smaller k is deeper
        for j in 0..4 {
            for i in 0..4 {
                for k in 0..11 {
                    assert!(wet[[j, i, k]] > wet[[j, i, k + 1]]);
                }
            }
        }
    }

    #[test]
    fn voxels_outside_the_roi_are_untouched() {
        let volume = uniform_volume([2, 2, 2], [1.0; 3], 3.0);
        let mut roi = Array3::from_elem(volume.dim(), false);
        roi[[1, 0, 1]] = true;

        let direction = BeamDirection::new(0.0, 0.0, 1.0).unwrap();
        let wet = volume.compute_wet_map(direction, Some(&roi)).unwrap();
        for ((j, i, k), &value) in wet.indexed_iter() {
            if (j, i, k) == (1, 0, 1) {
                assert!(value > 0.0);
            } else {
                assert_eq!(value, 0.0);
            }
        }

        // the in-place variant must preserve caller-supplied values
        let mut prefilled = Array3::from_elem(volume.dim(), 7.5);
        volume
            .compute_wet_map_into(direction, Some(&roi), &mut prefilled)
            .unwrap();
        for ((j, i, k), &value) in prefilled.indexed_iter() {
            if (j, i, k) == (1, 0, 1) {
                assert_ne!(value, 7.5);
            } else {
                assert_eq!(value, 7.5);
            }
        }
    }

    #[test]
    fn mirror_voxels_match_under_direction_reversal() {
        let n = 8;
        let volume = uniform_volume([1, 1, n], [1.0; 3], 1.2);
        let forward = BeamDirection::new(0.0, 0.0, -1.0).unwrap();
        let backward = BeamDirection::new(0.0, 0.0, 1.0).unwrap();
        let wet_f = volume.compute_wet_map(forward, None).unwrap();
        let wet_b = volume.compute_wet_map(backward, None).unwrap();
        for k in 0..n {
            assert_abs_diff_eq!(wet_f[[0, 0, k]], wet_b[[0, 0, n - 1 - k]], epsilon = 1e-3);
        }
    }

    #[test]
    fn worker_count_does_not_change_the_result() {
        let volume = graded_volume([5, 6, 7]);
        let direction = BeamDirection::new(0.2, -0.5, 0.84).unwrap();

        let parallel = volume.compute_wet_map(direction, None).unwrap();
        let single = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap()
            .install(|| volume.compute_wet_map(direction, None).unwrap());

        assert_eq!(parallel, single);
    }

    #[test]
    fn wet_is_non_negative_for_non_negative_spr() {
        let volume = graded_volume([5, 5, 5]);
        let direction = BeamDirection::new(0.3, -0.5, 0.8).unwrap();
        let wet = volume.compute_wet_map(direction, None).unwrap();
        assert!(wet.iter().all(|&value| value >= 0.0));
    }

    #[test]
    fn diagonal_beam_matches_the_geometric_path() {
        // beam along (1,1,0): the target in the far corner integrates back
        // to the low-x/low-y faces, 3.5 * sqrt(2) mm away
        let volume = uniform_volume([4, 4, 1], [1.0; 3], 1.0);
        let direction = BeamDirection::new(1.0, 1.0, 0.0).unwrap();
        let wet = volume.compute_wet_map(direction, None).unwrap();
        let expected = 3.5 * std::f32::consts::SQRT_2;
        assert_abs_diff_eq!(wet[[3, 3, 0]], expected, epsilon = 0.05);
    }

    #[test]
    fn near_parallel_direction_behaves_like_axis_aligned() {
        let volume = uniform_volume([3, 3, 12], [1.0; 3], 1.0);
        let aligned = BeamDirection::new(0.0, 0.0, -1.0).unwrap();
        let skewed = BeamDirection::new(1e-8, 0.0, -1.0).unwrap();
        let wet_a = volume.compute_wet_map(aligned, None).unwrap();
        let wet_s = volume.compute_wet_map(skewed, None).unwrap();
        for (a, s) in wet_a.iter().zip(wet_s.iter()) {
            assert_abs_diff_eq!(a, s, epsilon = 1e-4);
        }
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let volume = uniform_volume([4, 4, 4], [1.0; 3], 1.0);
        let direction = BeamDirection::new(0.0, 1.0, 0.0).unwrap();

        let bad_roi = Array3::from_elem((4, 4, 5), true);
        assert!(matches!(
            volume.compute_wet_map(direction, Some(&bad_roi)),
            Err(RaytraceError::RoiShapeMismatch { .. })
        ));

        let mut bad_wet = Array3::zeros((3, 4, 4));
        assert!(matches!(
            volume.compute_wet_map_into(direction, None, &mut bad_wet),
            Err(RaytraceError::WetShapeMismatch { .. })
        ));
    }
}
