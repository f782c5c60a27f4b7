//! Implicit velocity diffusion by Jacobi iteration.
//!
//! Solves `(I - nu dt lap) v' = v` with the current velocity as both the
//! right-hand side and the initial guess, ping-ponging a double buffer each
//! iteration and copying the result back at the end. Shared by the FLIP
//! solver (fluid cells only) and the smoke solver (every cell).

use glam::Vec3;

use super::buffer::{DeviceBuffer, DoubleBuffer, UniformBuffer};
use super::kernel::{bind, ping_pong, Access, Bindings, ComputeKernel, KernelSpec, Slot};
use super::params::{DiffusionParams, SimConstants};
use super::shaders::ShaderId;
use super::{GpuContext, GpuError};

const DIFFUSE: KernelSpec = KernelSpec {
    entry_point: "diffuse",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Params, Access::Uniform),
        bind(2, Slot::GridType, Access::ReadOnly),
        bind(3, Slot::GridVelocity, Access::ReadOnly),
        bind(4, Slot::DiffusionIn, Access::ReadOnly),
        bind(5, Slot::DiffusionOut, Access::ReadWrite),
    ],
};

const DIFFUSE_UNMASKED: KernelSpec = KernelSpec {
    entry_point: "diffuse_unmasked",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Params, Access::Uniform),
        bind(3, Slot::GridVelocity, Access::ReadOnly),
        bind(4, Slot::DiffusionIn, Access::ReadOnly),
        bind(5, Slot::DiffusionOut, Access::ReadWrite),
    ],
};

/// Cells the diffusion solve updates.
#[derive(Clone, Copy)]
pub enum DiffusionMask<'a> {
    /// Only fluid cells of the given cell-type buffer; others keep their velocity
    FluidCells(&'a DeviceBuffer<u32>),
    AllCells,
}

pub struct DiffusionSolver {
    diffuse: ComputeKernel,
    diffuse_unmasked: ComputeKernel,
    params: UniformBuffer<DiffusionParams>,
    field: DoubleBuffer<[f32; 4]>,
}

impl DiffusionSolver {
    pub fn new(ctx: &GpuContext) -> Self {
        let module = ShaderId::Diffusion.create_module(ctx);
        Self {
            diffuse: ComputeKernel::new(ctx, &module, "Diffuse", &DIFFUSE),
            diffuse_unmasked: ComputeKernel::new(ctx, &module, "Diffuse Unmasked", &DIFFUSE_UNMASKED),
            params: UniformBuffer::new(ctx, "Diffusion Params"),
            field: DoubleBuffer::new("Diffusion Field"),
        }
    }

    /// Diffuse `velocity` in place. Does nothing when `viscosity` or
    /// `iterations` is zero.
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &mut self,
        ctx: &GpuContext,
        constants: &UniformBuffer<SimConstants>,
        mask: DiffusionMask<'_>,
        velocity: &DeviceBuffer<[f32; 4]>,
        viscosity: f32,
        delta_time: f32,
        spacing: Vec3,
        iterations: u32,
    ) -> Result<(), GpuError> {
        if viscosity <= 0.0 || iterations == 0 {
            return Ok(());
        }
        self.field.check_size_changed(ctx, velocity.len())?;
        self.params
            .write(ctx, &DiffusionParams::new(viscosity, delta_time, spacing));
        self.field.read().copy_from(ctx, velocity);

        let base = Bindings::new()
            .uniform(Slot::Constants, constants)
            .uniform(Slot::Params, &self.params)
            .buffer(Slot::GridVelocity, velocity);
        let (kernel, base) = match mask {
            DiffusionMask::FluidCells(grid_type) => (&self.diffuse, base.buffer(Slot::GridType, grid_type)),
            DiffusionMask::AllCells => (&self.diffuse_unmasked, base),
        };
        ping_pong(
            ctx,
            kernel,
            &base,
            &mut self.field,
            (Slot::DiffusionIn, Slot::DiffusionOut),
            iterations,
        );

        velocity.copy_from(ctx, self.field.read());
        Ok(())
    }

    pub fn release(&mut self) {
        self.field.release();
    }
}
