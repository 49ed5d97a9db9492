use crate::beam::BeamDirection;
use crate::enums::{Axis, Orientation};
use crate::grid::Grid;
use crate::raytracer::{self, RaytraceError};

use image::ImageBuffer;
use image::Luma;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::s;
use rayon::prelude::*;
use thiserror::Error;

/// SPR returned when sampling a position outside the grid.
pub const OUT_OF_GRID_SPR: f32 = 0.001;

#[derive(Debug, Error)]
pub enum SprVolumeError {
    #[error("SPR field shape {actual:?} does not match the grid shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },
}

/// A stopping-power-ratio field on a uniform grid.
///
/// The field is stored as `(ny, nx, nz)` with the z index varying fastest;
/// [`Grid::array_index`] maps voxel indices to storage indices. SPR is
/// dimensionless (ratio to water), so path integrals through the field are
/// in the same length unit as the grid spacing.
pub struct SprVolume {
    data: Array3<f32>,
    grid: Grid,
}

impl SprVolume {
    /// Wrap an SPR field, validating its shape against the grid.
    pub fn new(data: Array3<f32>, grid: Grid) -> Result<Self, SprVolumeError> {
        if data.dim() != grid.array_shape() {
            return Err(SprVolumeError::ShapeMismatch {
                expected: grid.array_shape(),
                actual: data.dim(),
            });
        }
        Ok(Self { data, grid })
    }

    /// Uniform volume filled with a single SPR value.
    pub fn filled(value: f32, grid: Grid) -> Self {
        Self {
            data: Array3::from_elem(grid.array_shape(), value),
            grid,
        }
    }

    /// Get the dimensions of the backing arrays (ny, nx, nz)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Get a mutable reference to the underlying data
    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// SPR at a physical position, or [`OUT_OF_GRID_SPR`] when the position
    /// falls outside the grid.
    pub fn spr_at_position(&self, position: [f32; 3]) -> f32 {
        let mut indices = [0usize; 3];
        for axis in Axis::ALL {
            let a = axis.index();
            let index = self.grid.voxel_index(axis, position[a]);
            if index < 0 || index as usize >= self.grid.len(axis) {
                return OUT_OF_GRID_SPR;
            }
            indices[a] = index as usize;
        }
        self.data[self.grid.array_index(indices[0], indices[1], indices[2])]
    }

    /// Compute the WET map for `direction`, restricted to `roi` when given.
    ///
    /// Returns a zero-initialized field holding, for each ROI voxel, the
    /// water-equivalent thickness from the grid boundary to that voxel along
    /// the incoming beam; voxels outside the ROI stay zero.
    pub fn compute_wet_map(
        &self,
        direction: BeamDirection,
        roi: Option<&Array3<bool>>,
    ) -> Result<Array3<f32>, RaytraceError> {
        let mut wet = Array3::zeros(self.grid.array_shape());
        self.compute_wet_map_into(direction, roi, &mut wet)?;
        Ok(wet)
    }

    /// In-place variant of [`SprVolume::compute_wet_map`]: voxels outside
    /// the ROI are left at their caller-supplied values.
    pub fn compute_wet_map_into(
        &self,
        direction: BeamDirection,
        roi: Option<&Array3<bool>>,
        wet: &mut Array3<f32>,
    ) -> Result<(), RaytraceError> {
        raytracer::raytrace_wet_into(self, direction, roi, wet)
    }

    /// Extract a 2D slice of the SPR field along a medical axis.
    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Option<ArrayView2<'_, f32>> {
        slice_field(&self.data, index, orientation)
    }

    /// Render a slice of the SPR field as a grayscale image.
    pub fn get_image_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let slice = self.get_slice_from_axis(index, orientation)?;
        slice_to_image(&slice)
    }
}

/// Extract a 2D slice of any field stored in the volume layout, for display
/// of SPR or WET maps.
pub fn slice_field(
    field: &Array3<f32>,
    index: usize,
    orientation: Orientation,
) -> Option<ArrayView2<'_, f32>> {
    let (ny, nx, nz) = field.dim();
    let slice = match orientation {
        Orientation::Axial if index < nz => field.slice(s![.., .., index]),
        Orientation::Coronal if index < ny => field.slice(s![index, .., ..]),
        Orientation::Sagittal if index < nx => field.slice(s![.., index, ..]),
        _ => return None,
    };
    Some(slice)
}

/// Convert a slice to an 8-bit grayscale image, scaling so the largest value
/// maps to white.
pub fn slice_to_image(slice: &ArrayView2<'_, f32>) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
    let (height, width) = slice.dim();
    let max = slice.iter().fold(0.0f32, |max, &value| max.max(value));
    let scale = if max > 0.0 { 255.0 / max } else { 0.0 };
    let pixel_data: Vec<u8> = slice
        .into_par_iter()
        .map(|&value| (value * scale).clamp(0.0, 255.0) as u8)
        .collect();
    ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
}
