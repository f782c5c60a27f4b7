//! Simulation constants shared by the CPU model and the GPU kernels.
//!
//! Values that also appear in WGSL (cell type codes, the empty-cell
//! sentinel, the weight fixed-point scale) must stay in sync with
//! `grid.wgsl` and `density_projection.wgsl` in the GPU crate.

/// Default simulation time step (seconds).
pub const DELTA_TIME: f32 = 1.0 / 60.0;

/// Default gravity acceleration (m/s^2) - negative Y direction
pub const GRAVITY: f32 = -9.8;

/// Particles seeded per grid cell (2x2x2 sub-lattice).
pub const PARTICLES_PER_CELL: u32 = 8;

/// FLIP grid spacing per quality tier (Low, Medium, High, Ultra).
pub const FLIP_QUALITY_SPACING: [f32; 4] = [0.5, 0.4, 0.3, 0.2];

/// Smoke grid spacing per quality tier (Low, Medium, High, Ultra).
pub const SMOKE_QUALITY_SPACING: [f32; 4] = [0.4, 0.3, 0.2, 0.1];

/// Largest grid resolution accepted along any axis.
pub const MAX_GRID_AXIS: u32 = 128;

/// Upper bound on the seeded particle count (64 MiB of particle data).
pub const MAX_PARTICLES: u32 = 1 << 21;

// =============================================================================
// CELL CLASSIFICATION
// =============================================================================

pub const CELL_AIR: u32 = 0;
pub const CELL_FLUID: u32 = 1;
pub const CELL_SOLID: u32 = 2;

/// `CellRange::first` of a cell no object maps to.
pub const EMPTY_CELL: u32 = u32::MAX;

// =============================================================================
// DENSITY PROJECTION
// =============================================================================

/// Fixed-point scale used when particle weights are accumulated atomically.
pub const WEIGHT_SCALE: f32 = 4096.0;

/// Fraction of a full cell's weight contributed by the ghost particles
/// behind 1, 2 or 3 domain walls: `1 - (7/8)^n`.
pub const GHOST_WEIGHT: [f32; 3] = [0.125, 0.234375, 0.330_078_125];

/// Largest per-step density-projection displacement, in cells.
pub const MAX_DENSITY_DISPLACEMENT: f32 = 0.5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghost_weights_follow_missing_neighbourhood_fraction() {
        for (n, &w) in GHOST_WEIGHT.iter().enumerate() {
            let expected = 1.0 - (7.0f32 / 8.0).powi(n as i32 + 1);
            assert!((w - expected).abs() < 1e-6, "n={} w={} expected={}", n + 1, w, expected);
        }
    }

    #[test]
    fn quality_spacing_decreases_with_tier() {
        for table in [FLIP_QUALITY_SPACING, SMOKE_QUALITY_SPACING] {
            assert!(table.windows(2).all(|w| w[0] > w[1]));
        }
    }
}
