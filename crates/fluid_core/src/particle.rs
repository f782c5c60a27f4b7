//! GPU-layout element types for particles and grid lookups.
//!
//! Every type here is `#[repr(C)]` + `Pod` and mirrors a WGSL struct
//! one-to-one; field order and padding must not change without updating
//! the shaders.

use bytemuck::{Pod, Zeroable};
use glam::{UVec3, Vec3};

use crate::constants::{EMPTY_CELL, MAX_PARTICLES, PARTICLES_PER_CELL};
use crate::grid::GridLayout;

/// A single particle in the FLIP simulation (32 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Particle {
    /// World position
    pub position: [f32; 3],
    pub _pad0: f32,
    /// Current velocity
    pub velocity: [f32; 3],
    pub _pad1: f32,
}

impl Particle {
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self {
            position: position.to_array(),
            _pad0: 0.0,
            velocity: velocity.to_array(),
            _pad1: 0.0,
        }
    }

    /// Create a stationary particle at the given position.
    pub fn at(position: Vec3) -> Self {
        Self::new(position, Vec3::ZERO)
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn velocity(&self) -> Vec3 {
        Vec3::from_array(self.velocity)
    }

    pub fn is_finite(&self) -> bool {
        self.position().is_finite() && self.velocity().is_finite()
    }
}

/// Packed record handed to the renderer: position plus speed.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RenderParticle {
    pub position: [f32; 3],
    pub speed: f32,
}

/// Sort record: `key` is sorted ascending, `value` travels with it.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct KeyValue {
    pub key: u32,
    pub value: u32,
}

impl KeyValue {
    pub fn new(key: u32, value: u32) -> Self {
        Self { key, value }
    }
}

/// Half-open range of sorted objects that fall into one grid cell.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct CellRange {
    /// Index of the first object, or `EMPTY_CELL`
    pub first: u32,
    /// Number of objects in the cell
    pub count: u32,
}

impl CellRange {
    pub const EMPTY: Self = Self {
        first: EMPTY_CELL,
        count: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        if self.is_empty() {
            return 0..0;
        }
        self.first as usize..(self.first + self.count) as usize
    }
}

impl Default for CellRange {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// An object the grid sort can bucket by position.
///
/// The position must be stored as three consecutive `f32` words starting
/// at word `POSITION_WORD`, and the type must be a whole number of words.
pub trait GridObject: Pod {
    const POSITION_WORD: u32;

    fn grid_position(&self) -> Vec3;
}

impl GridObject for Particle {
    const POSITION_WORD: u32 = 0;

    fn grid_position(&self) -> Vec3 {
        self.position()
    }
}

/// Lattice of seed cells the particle-init kernel fills.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleSeed {
    /// Minimum corner of the seeded volume
    pub min: Vec3,
    /// Seed cells per axis
    pub cells: UVec3,
    /// Seed cell size (equal to the grid spacing)
    pub spacing: Vec3,
    pub per_cell: u32,
}

impl ParticleSeed {
    /// Fill the part of `[init_min, init_max]` that lies inside the grid
    /// with whole cells, shrinking the volume if it would exceed
    /// `MAX_PARTICLES`. At least one cell is always seeded.
    pub fn new(layout: &GridLayout, init_min: Vec3, init_max: Vec3) -> Self {
        let lo = init_min.clamp(layout.min, layout.max);
        let hi = init_max.clamp(lo, layout.max);
        let cells = ((hi - lo) / layout.spacing).round().max(Vec3::ONE).as_uvec3();
        let mut cells = cells.min(layout.size);
        while cells.x * cells.y * cells.z * PARTICLES_PER_CELL > MAX_PARTICLES {
            let axis = if cells.x >= cells.y && cells.x >= cells.z {
                0
            } else if cells.y >= cells.z {
                1
            } else {
                2
            };
            cells[axis] -= 1;
        }
        let min = lo.min(layout.max - cells.as_vec3() * layout.spacing);
        Self {
            min,
            cells,
            spacing: layout.spacing,
            per_cell: PARTICLES_PER_CELL,
        }
    }

    pub fn num_particles(&self) -> u32 {
        self.cells.x * self.cells.y * self.cells.z * self.per_cell
    }

    pub fn max(&self) -> Vec3 {
        self.min + self.cells.as_vec3() * self.spacing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_struct_sizes() {
        assert_eq!(std::mem::size_of::<Particle>(), 32);
        assert_eq!(std::mem::size_of::<RenderParticle>(), 16);
        assert_eq!(std::mem::size_of::<KeyValue>(), 8);
        assert_eq!(std::mem::size_of::<CellRange>(), 8);
    }

    #[test]
    fn particle_position_word_is_first() {
        let p = Particle::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0));
        let words: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&p));
        let at = Particle::POSITION_WORD as usize;
        assert_eq!(&words[at..at + 3], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn empty_range_is_empty() {
        assert!(CellRange::EMPTY.is_empty());
        assert_eq!(CellRange::EMPTY.range(), 0..0);
        let r = CellRange { first: 4, count: 3 };
        assert_eq!(r.range(), 4..7);
    }

    #[test]
    fn seed_fits_inside_domain() {
        let layout = GridLayout::centered(Vec3::splat(2.0), 0.5);
        let seed = ParticleSeed::new(&layout, Vec3::splat(-1.0), Vec3::new(0.0, 0.5, 0.0));
        assert_eq!(seed.cells, UVec3::new(2, 3, 2));
        assert_eq!(seed.num_particles(), 96);
        assert!(layout.contains(seed.min) && layout.contains(seed.max()));
    }

    #[test]
    fn seed_outside_domain_still_seeds_one_cell() {
        let layout = GridLayout::centered(Vec3::splat(2.0), 0.5);
        let seed = ParticleSeed::new(&layout, Vec3::splat(5.0), Vec3::splat(6.0));
        assert_eq!(seed.cells, UVec3::ONE);
        assert!(layout.contains(seed.min) && layout.contains(seed.max()));
    }

    #[test]
    fn seed_respects_particle_cap() {
        let layout = GridLayout::centered(Vec3::splat(64.0), 0.5);
        let seed = ParticleSeed::new(&layout, layout.min, layout.max);
        assert!(seed.num_particles() <= MAX_PARTICLES);
    }
}
