//! Blocking readbacks of the FLIP state for tests, tools and debugging.
//!
//! Each call waits for the GPU to finish all queued work, so none of these
//! belong on the per-frame path.

use fluid_core::constants::CELL_FLUID;
use fluid_core::{CellRange, Particle, RenderParticle};

use super::FlipSimulation;
use crate::gpu::filtering::FilterPredicate;
use crate::gpu::GpuError;

impl FlipSimulation {
    fn ensure_initialized(&self) -> Result<(), GpuError> {
        if self.initialized {
            Ok(())
        } else {
            Err(GpuError::NotInitialized)
        }
    }

    pub fn read_particles(&self) -> Result<Vec<Particle>, GpuError> {
        self.ensure_initialized()?;
        self.particles.read().read(&self.ctx)
    }

    pub fn read_render_particles(&self) -> Result<Vec<RenderParticle>, GpuError> {
        self.ensure_initialized()?;
        self.render_particles.read(&self.ctx)
    }

    /// Per-cell particle ranges from the last grid sort.
    pub fn read_cell_ranges(&self) -> Result<Vec<CellRange>, GpuError> {
        self.ensure_initialized()?;
        self.grid_index.read(&self.ctx)
    }

    /// Staggered face velocities, `w` unused.
    pub fn read_grid_velocity(&self) -> Result<Vec<[f32; 4]>, GpuError> {
        self.ensure_initialized()?;
        self.grid_velocity.read(&self.ctx)
    }

    pub fn read_grid_types(&self) -> Result<Vec<u32>, GpuError> {
        self.ensure_initialized()?;
        self.grid_type.read(&self.ctx)
    }

    pub fn read_pressure(&self) -> Result<Vec<f32>, GpuError> {
        self.ensure_initialized()?;
        self.pressure.pressure().read(&self.ctx)
    }

    /// Divergence of the grid velocity before the last projection.
    pub fn read_divergence(&self) -> Result<Vec<f32>, GpuError> {
        self.ensure_initialized()?;
        self.pressure.divergence().read(&self.ctx)
    }

    /// Clamped over-density `max(0, w / w_avg - 1)` from the last density
    /// projection; zero outside fluid cells.
    pub fn read_density_rhs(&self) -> Result<Vec<f32>, GpuError> {
        self.ensure_initialized()?;
        self.density.rhs().read(&self.ctx)
    }

    /// Number of cells classified as fluid, counted on the GPU by
    /// compacting a copy of the cell types.
    pub fn fluid_cell_count(&mut self) -> Result<u32, GpuError> {
        self.ensure_initialized()?;
        self.cell_scratch.copy_from(&self.ctx, &self.grid_type);
        self.filter
            .filter(&self.ctx, &self.cell_scratch, FilterPredicate::Equal(CELL_FLUID))
    }

    /// Largest particle speed, or `None` if any particle is not finite.
    pub fn max_particle_speed(&self) -> Result<Option<f32>, GpuError> {
        let particles = self.read_particles()?;
        if particles.iter().any(|p| !p.is_finite()) {
            return Ok(None);
        }
        Ok(Some(
            particles
                .iter()
                .map(|p| p.velocity().length())
                .fold(0.0, f32::max),
        ))
    }
}
