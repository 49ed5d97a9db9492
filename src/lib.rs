//! # WET-volume library
//!
//! This crate computes water-equivalent thickness (WET) maps from
//! stopping-power-ratio (SPR) volumes by volumetric ray tracing.
//!
//! For every voxel selected by a region-of-interest mask, a ray is marched
//! from the voxel center back along the beam direction until it leaves the
//! grid, visiting every voxel it crosses and accumulating SPR × path
//! length. The result is the radiological depth of the voxel in
//! millimeters of water, the quantity that drives particle-beam range
//! calculations in radiotherapy planning. Per-voxel traversals are
//! independent and run in parallel using rayon.
//!
//! Inputs are assumed to satisfy:
//!  - SPR, ROI and WET arrays share the `(ny, nx, nz)` layout with the
//!    z index varying fastest
//!  - Uniform per-axis voxel spacing (spacing may differ between axes)
//!  - A non-degenerate beam direction (normalized on construction)
//!
//! # Examples
//!
//! ## Computing a WET map for a lateral beam
//!
//! Build a uniform water volume, pick the beam direction for a 90° gantry
//! angle, and compute the WET of every voxel.
//!
//! ```
//! use wet_volume::{BeamDirection, Grid, SprVolume};
//!
//! let grid = Grid::new([16, 16, 16], [2.0, 2.0, 2.0], [-16.0, -16.0, -16.0])
//!     .expect("valid grid geometry");
//! let volume = SprVolume::filled(1.0, grid);
//! let direction = BeamDirection::from_gantry_couch(90.0, 0.0);
//! let wet = volume
//!     .compute_wet_map(direction, None)
//!     .expect("shapes match the grid");
//! assert_eq!(wet.dim(), (16, 16, 16));
//! ```

pub mod beam;
pub mod enums;
pub mod grid;
pub mod range;
pub mod raytracer;
pub mod volume;

pub use beam::BeamDirection;
pub use enums::{Axis, Orientation};
pub use grid::Grid;
pub use volume::SprVolume;
