use crate::gpu::kernel::{bind, Access, ComputeKernel, KernelSpec, Slot};
use crate::gpu::shaders::ShaderId;
use crate::gpu::texture::StorageTexture3D;
use crate::gpu::GpuContext;

const EMIT: KernelSpec = KernelSpec {
    entry_point: "emit",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Params, Access::Uniform),
        bind(2, Slot::VelocityIn, Access::ReadWrite),
        bind(3, Slot::DensityIn, Access::ReadWrite),
        bind(4, Slot::TemperatureIn, Access::ReadWrite),
    ],
};

const ADVECT_VELOCITY: KernelSpec = KernelSpec {
    entry_point: "advect_velocity",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(2, Slot::VelocityIn, Access::ReadOnly),
        bind(3, Slot::VelocityOut, Access::ReadWrite),
    ],
};

const ADVECT_SCALARS: KernelSpec = KernelSpec {
    entry_point: "advect_scalars",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Params, Access::Uniform),
        bind(2, Slot::VelocityIn, Access::ReadOnly),
        bind(4, Slot::DensityIn, Access::ReadOnly),
        bind(5, Slot::DensityOut, Access::ReadWrite),
        bind(6, Slot::TemperatureIn, Access::ReadOnly),
        bind(7, Slot::TemperatureOut, Access::ReadWrite),
    ],
};

const ADD_MOUSE_FORCE: KernelSpec = KernelSpec {
    entry_point: "add_mouse_force",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Force, Access::Uniform),
        bind(3, Slot::VelocityIn, Access::ReadWrite),
    ],
};

const ADD_BUOYANCY: KernelSpec = KernelSpec {
    entry_point: "add_buoyancy",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(2, Slot::Params, Access::Uniform),
        bind(3, Slot::VelocityIn, Access::ReadWrite),
        bind(4, Slot::DensityIn, Access::ReadOnly),
        bind(5, Slot::TemperatureIn, Access::ReadOnly),
    ],
};

const COMPUTE_VORTICITY: KernelSpec = KernelSpec {
    entry_point: "compute_vorticity",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(3, Slot::VelocityIn, Access::ReadWrite),
        bind(6, Slot::Vorticity, Access::ReadWrite),
    ],
};

const CONFINE_VORTICITY: KernelSpec = KernelSpec {
    entry_point: "confine_vorticity",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(2, Slot::Params, Access::Uniform),
        bind(3, Slot::VelocityIn, Access::ReadWrite),
        bind(6, Slot::Vorticity, Access::ReadWrite),
    ],
};

const ENFORCE_BOUNDARY: KernelSpec = KernelSpec {
    entry_point: "enforce_boundary",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Boundary, Access::Uniform),
        bind(3, Slot::VelocityIn, Access::ReadWrite),
    ],
};

const SMOKE_DIVERGENCE: KernelSpec = KernelSpec {
    entry_point: "smoke_divergence",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Boundary, Access::Uniform),
        bind(3, Slot::VelocityIn, Access::ReadWrite),
        bind(4, Slot::GridDivergence, Access::ReadWrite),
    ],
};

const SMOKE_JACOBI: KernelSpec = KernelSpec {
    entry_point: "smoke_jacobi",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Boundary, Access::Uniform),
        bind(2, Slot::Params, Access::Uniform),
        bind(4, Slot::GridDivergence, Access::ReadWrite),
        bind(5, Slot::PressureIn, Access::ReadOnly),
        bind(6, Slot::PressureOut, Access::ReadWrite),
    ],
};

const SMOKE_SUBTRACT_GRADIENT: KernelSpec = KernelSpec {
    entry_point: "smoke_subtract_gradient",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Boundary, Access::Uniform),
        bind(3, Slot::VelocityIn, Access::ReadWrite),
        bind(5, Slot::PressureIn, Access::ReadOnly),
    ],
};

const BAKE_DENSITY: KernelSpec = KernelSpec {
    entry_point: "bake_density",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Params, Access::Uniform),
        bind(2, Slot::DensityIn, Access::ReadOnly),
        bind(3, Slot::DensityTexture, Access::WriteTexture3D(StorageTexture3D::FORMAT)),
    ],
};

/// Compute pipelines of the smoke solver, grouped by shader module.
pub(super) struct SmokeKernels {
    pub emit: ComputeKernel,
    pub advect_velocity: ComputeKernel,
    pub advect_scalars: ComputeKernel,
    pub add_mouse_force: ComputeKernel,
    pub add_buoyancy: ComputeKernel,
    pub compute_vorticity: ComputeKernel,
    pub confine_vorticity: ComputeKernel,
    pub enforce_boundary: ComputeKernel,
    pub divergence: ComputeKernel,
    pub jacobi: ComputeKernel,
    pub subtract_gradient: ComputeKernel,
    pub bake_density: ComputeKernel,
}

impl SmokeKernels {
    pub fn new(ctx: &GpuContext) -> Self {
        let emitter = ShaderId::SmokeEmitter.create_module(ctx);
        let advection = ShaderId::SmokeAdvection.create_module(ctx);
        let forces = ShaderId::SmokeForces.create_module(ctx);
        let pressure = ShaderId::SmokePressure.create_module(ctx);
        let rendering = ShaderId::SmokeRendering.create_module(ctx);

        Self {
            emit: ComputeKernel::new(ctx, &emitter, "Smoke Emit", &EMIT),
            advect_velocity: ComputeKernel::new(ctx, &advection, "Smoke Advect Velocity", &ADVECT_VELOCITY),
            advect_scalars: ComputeKernel::new(ctx, &advection, "Smoke Advect Scalars", &ADVECT_SCALARS),
            add_mouse_force: ComputeKernel::new(ctx, &forces, "Smoke Mouse Force", &ADD_MOUSE_FORCE),
            add_buoyancy: ComputeKernel::new(ctx, &forces, "Smoke Buoyancy", &ADD_BUOYANCY),
            compute_vorticity: ComputeKernel::new(ctx, &forces, "Smoke Vorticity", &COMPUTE_VORTICITY),
            confine_vorticity: ComputeKernel::new(ctx, &forces, "Smoke Confinement", &CONFINE_VORTICITY),
            enforce_boundary: ComputeKernel::new(ctx, &pressure, "Smoke Boundary", &ENFORCE_BOUNDARY),
            divergence: ComputeKernel::new(ctx, &pressure, "Smoke Divergence", &SMOKE_DIVERGENCE),
            jacobi: ComputeKernel::new(ctx, &pressure, "Smoke Jacobi", &SMOKE_JACOBI),
            subtract_gradient: ComputeKernel::new(ctx, &pressure, "Smoke Gradient", &SMOKE_SUBTRACT_GRADIENT),
            bake_density: ComputeKernel::new(ctx, &rendering, "Smoke Bake", &BAKE_DENSITY),
        }
    }
}
