use ndarray::Array3;

use wet_volume::volume::{slice_field, slice_to_image};
use wet_volume::{BeamDirection, Grid, Orientation, SprVolume};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // 64 mm water phantom at 2 mm spacing with a bone-like insert
    let grid = Grid::new([32, 32, 32], [2.0, 2.0, 2.0], [0.0, 0.0, 0.0]).expect("valid grid");
    let mut data = Array3::from_elem(grid.array_shape(), 1.0f32);
    for j in 12..20 {
        for i in 12..20 {
            for k in 8..24 {
                data[grid.array_index(i, j, k)] = 1.7;
            }
        }
    }
    let volume = SprVolume::new(data, grid).expect("data matches grid");

    let direction = BeamDirection::from_gantry_couch(180.0, 0.0);
    let wet = volume
        .compute_wet_map(direction, None)
        .expect("shapes match the grid");

    let min = wet.iter().fold(f32::INFINITY, |min, &v| min.min(v));
    let max = wet.iter().fold(0.0f32, |max, &v| max.max(v));
    println!("Minimum WET: {min} mm");
    println!("Maximum WET: {max} mm");

    let slice = slice_field(&wet, 16, Orientation::Axial).expect("index within grid");
    let image = slice_to_image(&slice).expect("non-empty slice");
    image.save("wet_axial.png").expect("should save image");
}
