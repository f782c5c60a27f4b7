//! Grid layout for the GPU simulation domain.
//!
//! Grid data lives in flat GPU buffers indexed by
//! `x + size.x * (y + size.y * z)`; this module owns that mapping together
//! with the world-space extent so host code and kernels agree on it.
//!
//! Velocity in the FLIP solver is staggered: component `a` of cell `c`
//! is stored on the face between `c - e_a` and `c`. The smoke solver keeps
//! every quantity at cell centers.

use glam::{IVec3, UVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::constants::{CELL_AIR, CELL_FLUID, CELL_SOLID, MAX_GRID_AXIS};

/// Cell classification for pressure solve.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum CellType {
    /// Empty air
    #[default]
    Air,
    /// Contains fluid particles
    Fluid,
    /// Outside the domain
    Solid,
}

impl CellType {
    pub fn as_u32(self) -> u32 {
        match self {
            CellType::Air => CELL_AIR,
            CellType::Fluid => CELL_FLUID,
            CellType::Solid => CELL_SOLID,
        }
    }

    /// Decode a GPU cell type; unknown codes are treated as solid.
    pub fn from_u32(code: u32) -> Self {
        match code {
            CELL_AIR => CellType::Air,
            CELL_FLUID => CellType::Fluid,
            _ => CellType::Solid,
        }
    }
}

/// Axis-aligned uniform grid covering the simulation domain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridLayout {
    /// Minimum corner of the domain
    pub min: Vec3,
    /// Maximum corner of the domain
    pub max: Vec3,
    /// Number of cells per axis
    pub size: UVec3,
    /// Cell size per axis (cells are not necessarily cubic)
    pub spacing: Vec3,
}

impl GridLayout {
    /// Cover `[min, max]` with cells close to `target_spacing` wide.
    ///
    /// The cell count per axis is rounded up and clamped to
    /// `[1, MAX_GRID_AXIS]`; the spacing is then stretched so the cells
    /// tile the domain exactly.
    pub fn from_bounds(min: Vec3, max: Vec3, target_spacing: f32) -> Self {
        assert!(
            target_spacing > 0.0 && target_spacing.is_finite(),
            "grid spacing must be positive, got {}",
            target_spacing
        );
        let extent = max - min;
        assert!(
            extent.min_element() > 0.0,
            "grid extent must be positive, got {:?}",
            extent
        );
        let cells = (extent / target_spacing).ceil();
        let size = UVec3::new(
            (cells.x as u32).clamp(1, MAX_GRID_AXIS),
            (cells.y as u32).clamp(1, MAX_GRID_AXIS),
            (cells.z as u32).clamp(1, MAX_GRID_AXIS),
        );
        Self {
            min,
            max,
            size,
            spacing: extent / size.as_vec3(),
        }
    }

    /// Domain of the given extent centred on the origin.
    pub fn centered(extent: Vec3, target_spacing: f32) -> Self {
        Self::from_bounds(-extent * 0.5, extent * 0.5, target_spacing)
    }

    pub fn inv_spacing(&self) -> Vec3 {
        Vec3::ONE / self.spacing
    }

    pub fn num_cells(&self) -> u32 {
        self.size.x * self.size.y * self.size.z
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Flatten a cell coordinate to its buffer index.
    pub fn linear_index(&self, cell: UVec3) -> u32 {
        debug_assert!(cell.cmplt(self.size).all(), "cell {:?} outside {:?}", cell, self.size);
        cell.x + self.size.x * (cell.y + self.size.y * cell.z)
    }

    /// Inverse of [`GridLayout::linear_index`].
    pub fn cell_coord(&self, index: u32) -> UVec3 {
        UVec3::new(
            index % self.size.x,
            (index / self.size.x) % self.size.y,
            index / (self.size.x * self.size.y),
        )
    }

    /// Cell containing `position`, clamped into the grid.
    pub fn cell_of(&self, position: Vec3) -> UVec3 {
        let c = ((position - self.min) * self.inv_spacing()).floor();
        let c = IVec3::new(c.x as i32, c.y as i32, c.z as i32);
        c.clamp(IVec3::ZERO, self.size.as_ivec3() - IVec3::ONE).as_uvec3()
    }

    /// Linear index of the cell containing `position`.
    pub fn cell_index_of(&self, position: Vec3) -> u32 {
        self.linear_index(self.cell_of(position))
    }

    pub fn cell_center(&self, cell: UVec3) -> Vec3 {
        self.min + (cell.as_vec3() + Vec3::splat(0.5)) * self.spacing
    }

    pub fn contains(&self, position: Vec3) -> bool {
        position.cmpge(self.min).all() && position.cmple(self.max).all()
    }

    /// Number of grid neighbours of `cell` that lie outside the domain
    /// along the six axis directions.
    pub fn boundary_faces(&self, cell: UVec3) -> u32 {
        let mut n = 0;
        for axis in 0..3 {
            if cell[axis] == 0 {
                n += 1;
            }
            if cell[axis] + 1 == self.size[axis] {
                n += 1;
            }
        }
        n
    }
}
