use crate::enums::Axis;

use thiserror::Error;

/// Direction components at or below this magnitude are treated as "not
/// stepping along this axis" during traversal, so rays that run parallel to
/// a grid plane never divide by a vanishing component.
pub const DIRECTION_EPSILON: f32 = 1e-6;

#[derive(Debug, Error)]
pub enum BeamError {
    #[error("beam direction is degenerate (norm is zero, near-zero or not finite)")]
    DegenerateDirection,
}

/// Beam direction pointing from the radiation source toward the patient.
///
/// The vector is normalized on construction; path lengths accumulated along
/// it are therefore in the same unit as the grid spacing.
#[derive(Debug, Clone, Copy)]
pub struct BeamDirection {
    components: [f32; 3],
}

impl BeamDirection {
    /// Create a direction from its x, y and z components.
    ///
    /// # Errors
    ///
    /// Returns [`BeamError::DegenerateDirection`] when the vector's norm is
    /// not finite or too small to define a direction.
    pub fn new(u: f32, v: f32, w: f32) -> Result<Self, BeamError> {
        let norm = (u * u + v * v + w * w).sqrt();
        if !norm.is_finite() || norm <= DIRECTION_EPSILON {
            return Err(BeamError::DegenerateDirection);
        }
        Ok(Self {
            components: [u / norm, v / norm, w / norm],
        })
    }

    /// Direction for the given gantry and couch angles in degrees.
    ///
    /// Gantry and couch at 0° give a beam along +y; the gantry rotates the
    /// beam about the z axis, the couch about the y axis.
    pub fn from_gantry_couch(gantry_deg: f32, couch_deg: f32) -> Self {
        let vec = rotate([1e-10, 1.0, 1e-10], gantry_deg.to_radians(), Axis::Z);
        let vec = rotate(vec, couch_deg.to_radians(), Axis::Y);
        // the base vector is unit length and rotations preserve the norm
        Self { components: vec }
    }

    /// Normalized `[x, y, z]` components, source → patient.
    pub fn components(&self) -> [f32; 3] {
        self.components
    }

    /// Components of the reversed (patient → source) direction; the
    /// traversal marches each voxel back toward the source.
    pub(crate) fn reversed(&self) -> [f32; 3] {
        [
            -self.components[0],
            -self.components[1],
            -self.components[2],
        ]
    }
}

fn rotate(vec: [f32; 3], angle: f32, axis: Axis) -> [f32; 3] {
    let (sin, cos) = angle.sin_cos();
    let [x, y, z] = vec;
    match axis {
        Axis::X => [x, y * cos - z * sin, y * sin + z * cos],
        Axis::Y => [x * cos + z * sin, y, -x * sin + z * cos],
        Axis::Z => [x * cos - y * sin, x * sin + y * cos, z],
    }
}
