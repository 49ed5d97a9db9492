//! Proton range ↔ energy conversions.
//!
//! Log-polynomial fits to the NIST/ICRU database from Grevillot et al.,
//! Phys Med Biol 56(16), 2011. The range is the water-equivalent r80, the
//! depth of the 80% dose point in the distal falloff, in centimeters.

/// Convert a water-equivalent range (r80, cm) to a proton beam energy (MeV).
///
/// Non-positive ranges map to zero energy.
pub fn range_to_energy(r80: f32) -> f32 {
    if r80 <= 0.0 {
        return 0.0;
    }
    let ln = r80.ln();
    (3.464048 + 0.561372013 * ln - 0.004900892 * ln.powi(2) + 0.001684756748 * ln.powi(3)).exp()
}

/// Convert a proton beam energy (MeV) to a water-equivalent range (r80, cm).
///
/// Non-positive energies map to zero range.
pub fn energy_to_range(e0: f32) -> f32 {
    if e0 <= 0.0 {
        return 0.0;
    }
    let ln = e0.ln();
    (-5.5064 + 1.2193 * ln + 0.15248 * ln.powi(2) - 0.013296 * ln.powi(3)).exp()
}
