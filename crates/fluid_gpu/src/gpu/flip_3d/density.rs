//! Implicit density projection.
//!
//! Particle weights are splatted into a fixed-point atomic grid, cells
//! touching the domain walls get a ghost weight for the particles the wall
//! hides, and a Poisson solve on the over-density yields a position
//! correction that pushes particles out of crowded cells.

use fluid_core::constants::{GHOST_WEIGHT, MAX_DENSITY_DISPLACEMENT, PARTICLES_PER_CELL, WEIGHT_SCALE};
use fluid_core::{GridLayout, Particle};

use super::pressure::PressureSolver;
use crate::gpu::buffer::{DeviceBuffer, DoubleBuffer, UniformBuffer};
use crate::gpu::kernel::{bind, Access, Bindings, ComputeKernel, KernelSpec, Slot};
use crate::gpu::params::{DensityParams, SimConstants};
use crate::gpu::shaders::ShaderId;
use crate::gpu::{GpuContext, GpuError};

const ACCUMULATE_WEIGHT: KernelSpec = KernelSpec {
    entry_point: "accumulate_weight",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Params, Access::Uniform),
        bind(2, Slot::Particles, Access::ReadWrite),
        bind(4, Slot::GridUintWeight, Access::ReadWrite),
    ],
};

const BUILD_GHOST_WEIGHT: KernelSpec = KernelSpec {
    entry_point: "build_ghost_weight",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Params, Access::Uniform),
        bind(5, Slot::GridGhostWeight, Access::ReadWrite),
    ],
};

const CALC_GRID_WEIGHT: KernelSpec = KernelSpec {
    entry_point: "calc_grid_weight",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Params, Access::Uniform),
        bind(3, Slot::GridType, Access::ReadWrite),
        bind(4, Slot::GridUintWeight, Access::ReadWrite),
        bind(5, Slot::GridGhostWeight, Access::ReadWrite),
        bind(6, Slot::GridDivergence, Access::ReadWrite),
    ],
};

const CALC_POSITION_MODIFY: KernelSpec = KernelSpec {
    entry_point: "calc_position_modify",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Params, Access::Uniform),
        bind(3, Slot::GridType, Access::ReadWrite),
        bind(7, Slot::PressureIn, Access::ReadOnly),
        bind(8, Slot::GridPositionModify, Access::ReadWrite),
    ],
};

const UPDATE_POSITION: KernelSpec = KernelSpec {
    entry_point: "update_position",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Params, Access::Uniform),
        bind(2, Slot::Particles, Access::ReadWrite),
        bind(8, Slot::GridPositionModify, Access::ReadWrite),
    ],
};

impl DensityParams {
    pub fn new(layout: &GridLayout) -> Self {
        let per_cell = PARTICLES_PER_CELL as f32;
        let mut ghost_weight = [0.0; 4];
        for (slot, weight) in ghost_weight[1..].iter_mut().zip(GHOST_WEIGHT) {
            *slot = weight * per_cell;
        }
        Self {
            ghost_weight,
            inv_average_weight: 1.0 / per_cell,
            max_displacement: MAX_DENSITY_DISPLACEMENT * layout.spacing.min_element(),
            weight_scale: WEIGHT_SCALE,
            _pad: 0.0,
        }
    }
}

pub struct DensityProjection {
    accumulate_weight: ComputeKernel,
    build_ghost_weight: ComputeKernel,
    calc_grid_weight: ComputeKernel,
    calc_position_modify: ComputeKernel,
    update_position: ComputeKernel,
    params: UniformBuffer<DensityParams>,
    uint_weight: DeviceBuffer<u32>,
    ghost_weight: DeviceBuffer<f32>,
    rhs: DeviceBuffer<f32>,
    pressure: DoubleBuffer<f32>,
    position_modify: DeviceBuffer<[f32; 4]>,
}

impl DensityProjection {
    pub fn new(ctx: &GpuContext) -> Self {
        let module = ShaderId::DensityProjection.create_module(ctx);
        Self {
            accumulate_weight: ComputeKernel::new(ctx, &module, "Density Accumulate", &ACCUMULATE_WEIGHT),
            build_ghost_weight: ComputeKernel::new(ctx, &module, "Density Ghost Weight", &BUILD_GHOST_WEIGHT),
            calc_grid_weight: ComputeKernel::new(ctx, &module, "Density Grid Weight", &CALC_GRID_WEIGHT),
            calc_position_modify: ComputeKernel::new(
                ctx,
                &module,
                "Density Position Modify",
                &CALC_POSITION_MODIFY,
            ),
            update_position: ComputeKernel::new(ctx, &module, "Density Update Position", &UPDATE_POSITION),
            params: UniformBuffer::new(ctx, "Density Params"),
            uint_weight: DeviceBuffer::new("Density Uint Weight"),
            ghost_weight: DeviceBuffer::new("Density Ghost Weight"),
            rhs: DeviceBuffer::new("Density Rhs"),
            pressure: DoubleBuffer::new("Density Pressure"),
            position_modify: DeviceBuffer::new("Density Position Modify"),
        }
    }

    /// Size the grid fields for `layout` and rebuild the ghost weights,
    /// which only depend on the grid shape.
    pub fn resize(
        &mut self,
        ctx: &GpuContext,
        constants: &UniformBuffer<SimConstants>,
        layout: &GridLayout,
    ) -> Result<(), GpuError> {
        let cells = layout.num_cells() as usize;
        self.uint_weight.check_size_changed(ctx, cells)?;
        self.ghost_weight.check_size_changed(ctx, cells)?;
        self.rhs.check_size_changed(ctx, cells)?;
        self.pressure.check_size_changed(ctx, cells)?;
        self.position_modify.check_size_changed(ctx, cells)?;
        self.params.write(ctx, &DensityParams::new(layout));

        let ghost = Bindings::new()
            .uniform(Slot::Constants, constants)
            .uniform(Slot::Params, &self.params)
            .buffer(Slot::GridGhostWeight, &self.ghost_weight);
        self.build_ghost_weight.dispatch(ctx, &ghost, cells as u32);
        Ok(())
    }

    /// Move `particles` towards uniform density. Overwrites `grid_type`
    /// with the occupancy seen by the weight splat.
    pub fn apply(
        &mut self,
        ctx: &GpuContext,
        constants: &UniformBuffer<SimConstants>,
        solver: &PressureSolver,
        particles: &DeviceBuffer<Particle>,
        grid_type: &DeviceBuffer<u32>,
        iterations: u32,
    ) {
        let num_particles = particles.len() as u32;
        let num_cells = self.rhs.len() as u32;
        let base = Bindings::new()
            .uniform(Slot::Constants, constants)
            .uniform(Slot::Params, &self.params);

        self.uint_weight.clear(ctx);
        let splat = base
            .clone()
            .buffer(Slot::Particles, particles)
            .buffer(Slot::GridUintWeight, &self.uint_weight);
        self.accumulate_weight.dispatch(ctx, &splat, num_particles);

        let weight = base
            .clone()
            .buffer(Slot::GridType, grid_type)
            .buffer(Slot::GridUintWeight, &self.uint_weight)
            .buffer(Slot::GridGhostWeight, &self.ghost_weight)
            .buffer(Slot::GridDivergence, &self.rhs);
        self.calc_grid_weight.dispatch(ctx, &weight, num_cells);

        solver.solve_poisson(ctx, constants, grid_type, &self.rhs, &mut self.pressure, iterations);

        let modify = base
            .clone()
            .buffer(Slot::GridType, grid_type)
            .buffer(Slot::PressureIn, self.pressure.read())
            .buffer(Slot::GridPositionModify, &self.position_modify);
        self.calc_position_modify.dispatch(ctx, &modify, num_cells);

        let update = base
            .buffer(Slot::Particles, particles)
            .buffer(Slot::GridPositionModify, &self.position_modify);
        self.update_position.dispatch(ctx, &update, num_particles);
    }

    /// Over-density from the last [`DensityProjection::apply`].
    pub fn rhs(&self) -> &DeviceBuffer<f32> {
        &self.rhs
    }

    pub fn release(&mut self) {
        self.uint_weight.release();
        self.ghost_weight.release();
        self.rhs.release();
        self.pressure.release();
        self.position_modify.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn ghost_weights_scale_with_particles_per_cell() {
        let layout = GridLayout::centered(Vec3::splat(4.0), 0.5);
        let params = DensityParams::new(&layout);
        assert_eq!(params.ghost_weight[0], 0.0);
        assert_eq!(params.ghost_weight[1], 1.0);
        assert_eq!(params.ghost_weight[2], 1.875);
        assert!((params.ghost_weight[3] - 2.640625).abs() < 1e-6);
        assert_eq!(params.inv_average_weight, 0.125);
        assert_eq!(params.max_displacement, 0.25);
    }
}
