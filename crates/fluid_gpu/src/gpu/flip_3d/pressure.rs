//! Jacobi pressure projection on the staggered FLIP grid.
//!
//! Fluid cells are the unknowns, air cells hold `p = 0` and the domain
//! walls are solid. The pressure field is cleared before every solve so
//! each frame starts from the same initial guess.

use fluid_core::GridLayout;

use crate::gpu::buffer::{DeviceBuffer, DoubleBuffer, UniformBuffer};
use crate::gpu::kernel::{bind, ping_pong, Access, Bindings, ComputeKernel, KernelSpec, Slot};
use crate::gpu::params::{PressureParams, SimConstants};
use crate::gpu::shaders::ShaderId;
use crate::gpu::{GpuContext, GpuError};

const COMPUTE_DIVERGENCE: KernelSpec = KernelSpec {
    entry_point: "compute_divergence",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(2, Slot::GridType, Access::ReadOnly),
        bind(3, Slot::GridVelocity, Access::ReadWrite),
        bind(4, Slot::GridDivergence, Access::ReadWrite),
    ],
};

const JACOBI_PRESSURE: KernelSpec = KernelSpec {
    entry_point: "jacobi_pressure",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Params, Access::Uniform),
        bind(2, Slot::GridType, Access::ReadOnly),
        bind(4, Slot::GridDivergence, Access::ReadWrite),
        bind(5, Slot::PressureIn, Access::ReadOnly),
        bind(6, Slot::PressureOut, Access::ReadWrite),
    ],
};

const SUBTRACT_GRADIENT: KernelSpec = KernelSpec {
    entry_point: "subtract_gradient",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(2, Slot::GridType, Access::ReadOnly),
        bind(3, Slot::GridVelocity, Access::ReadWrite),
        bind(5, Slot::PressureIn, Access::ReadOnly),
    ],
};

fn jacobi_bindings<'a>(
    constants: &'a UniformBuffer<SimConstants>,
    params: &'a UniformBuffer<PressureParams>,
    grid_type: &'a DeviceBuffer<u32>,
    rhs: &'a DeviceBuffer<f32>,
) -> Bindings<'a> {
    Bindings::new()
        .uniform(Slot::Constants, constants)
        .uniform(Slot::Params, params)
        .buffer(Slot::GridType, grid_type)
        .buffer(Slot::GridDivergence, rhs)
}

pub struct PressureSolver {
    compute_divergence: ComputeKernel,
    jacobi: ComputeKernel,
    subtract_gradient: ComputeKernel,
    params: UniformBuffer<PressureParams>,
    divergence: DeviceBuffer<f32>,
    pressure: DoubleBuffer<f32>,
}

impl PressureSolver {
    pub fn new(ctx: &GpuContext) -> Self {
        let module = ShaderId::PressureProjection.create_module(ctx);
        Self {
            compute_divergence: ComputeKernel::new(ctx, &module, "Pressure Divergence", &COMPUTE_DIVERGENCE),
            jacobi: ComputeKernel::new(ctx, &module, "Pressure Jacobi", &JACOBI_PRESSURE),
            subtract_gradient: ComputeKernel::new(ctx, &module, "Pressure Gradient", &SUBTRACT_GRADIENT),
            params: UniformBuffer::new(ctx, "Pressure Params"),
            divergence: DeviceBuffer::new("Grid Divergence"),
            pressure: DoubleBuffer::new("Grid Pressure"),
        }
    }

    /// Size the fields for `layout` and upload its spacing.
    pub fn resize(&mut self, ctx: &GpuContext, layout: &GridLayout) -> Result<(), GpuError> {
        let cells = layout.num_cells() as usize;
        self.divergence.check_size_changed(ctx, cells)?;
        self.pressure.check_size_changed(ctx, cells)?;
        self.params.write(ctx, &PressureParams::new(layout));
        Ok(())
    }

    /// Make `velocity` divergence-free over the fluid cells of `grid_type`.
    pub fn project(
        &mut self,
        ctx: &GpuContext,
        constants: &UniformBuffer<SimConstants>,
        grid_type: &DeviceBuffer<u32>,
        velocity: &DeviceBuffer<[f32; 4]>,
        iterations: u32,
    ) {
        self.compute_divergence(ctx, constants, grid_type, velocity);
        self.solve_pressure(ctx, constants, grid_type, iterations);
        self.subtract_gradient(ctx, constants, grid_type, velocity);
    }

    pub fn compute_divergence(
        &self,
        ctx: &GpuContext,
        constants: &UniformBuffer<SimConstants>,
        grid_type: &DeviceBuffer<u32>,
        velocity: &DeviceBuffer<[f32; 4]>,
    ) {
        let bindings = Bindings::new()
            .uniform(Slot::Constants, constants)
            .buffer(Slot::GridType, grid_type)
            .buffer(Slot::GridVelocity, velocity)
            .buffer(Slot::GridDivergence, &self.divergence);
        self.compute_divergence
            .dispatch(ctx, &bindings, self.divergence.len() as u32);
    }

    /// Clear the pressure and run `iterations` Jacobi sweeps against the
    /// current divergence.
    pub fn solve_pressure(
        &mut self,
        ctx: &GpuContext,
        constants: &UniformBuffer<SimConstants>,
        grid_type: &DeviceBuffer<u32>,
        iterations: u32,
    ) {
        self.pressure.read().clear(ctx);
        let base = jacobi_bindings(constants, &self.params, grid_type, &self.divergence);
        ping_pong(
            ctx,
            &self.jacobi,
            &base,
            &mut self.pressure,
            (Slot::PressureIn, Slot::PressureOut),
            iterations,
        );
    }

    pub fn subtract_gradient(
        &self,
        ctx: &GpuContext,
        constants: &UniformBuffer<SimConstants>,
        grid_type: &DeviceBuffer<u32>,
        velocity: &DeviceBuffer<[f32; 4]>,
    ) {
        let bindings = Bindings::new()
            .uniform(Slot::Constants, constants)
            .buffer(Slot::GridType, grid_type)
            .buffer(Slot::GridVelocity, velocity)
            .buffer(Slot::PressureIn, self.pressure.read());
        self.subtract_gradient
            .dispatch(ctx, &bindings, self.divergence.len() as u32);
    }

    /// Solve `lap(field) = rhs` over the fluid cells of `grid_type` with
    /// the same kernel and boundary treatment as the pressure solve.
    pub fn solve_poisson(
        &self,
        ctx: &GpuContext,
        constants: &UniformBuffer<SimConstants>,
        grid_type: &DeviceBuffer<u32>,
        rhs: &DeviceBuffer<f32>,
        field: &mut DoubleBuffer<f32>,
        iterations: u32,
    ) {
        field.read().clear(ctx);
        let base = jacobi_bindings(constants, &self.params, grid_type, rhs);
        ping_pong(
            ctx,
            &self.jacobi,
            &base,
            field,
            (Slot::PressureIn, Slot::PressureOut),
            iterations,
        );
    }

    /// Right-hand side of the last solve.
    pub fn divergence(&self) -> &DeviceBuffer<f32> {
        &self.divergence
    }

    /// Pressure from the last solve.
    pub fn pressure(&self) -> &DeviceBuffer<f32> {
        self.pressure.read()
    }

    pub fn release(&mut self) {
        self.divergence.release();
        self.pressure.release();
    }
}
