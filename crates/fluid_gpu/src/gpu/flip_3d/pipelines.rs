//! Kernel tables for the FLIP particle and transfer passes.

use crate::gpu::kernel::{bind, Access, ComputeKernel, KernelSpec, Slot};
use crate::gpu::shaders::ShaderId;
use crate::gpu::GpuContext;

const INIT_PARTICLES: KernelSpec = KernelSpec {
    entry_point: "init_particles",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Params, Access::Uniform),
        bind(2, Slot::Particles, Access::ReadWrite),
    ],
};

const PARTICLE_TO_GRID: KernelSpec = KernelSpec {
    entry_point: "particle_to_grid",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Particles, Access::ReadOnly),
        bind(2, Slot::GridIndex, Access::ReadOnly),
        bind(3, Slot::GridType, Access::ReadWrite),
        bind(4, Slot::GridVelocity, Access::ReadWrite),
        bind(5, Slot::GridOriginalVelocity, Access::ReadWrite),
    ],
};

const ADD_EXTERNAL_FORCE: KernelSpec = KernelSpec {
    entry_point: "add_external_force",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Params, Access::Uniform),
        bind(2, Slot::GridVelocity, Access::ReadWrite),
    ],
};

const GRID_TO_PARTICLE: KernelSpec = KernelSpec {
    entry_point: "grid_to_particle",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Particles, Access::ReadWrite),
        bind(2, Slot::GridVelocity, Access::ReadOnly),
        bind(3, Slot::GridOriginalVelocity, Access::ReadOnly),
        bind(4, Slot::Params, Access::Uniform),
    ],
};

const ADVECT_PARTICLES: KernelSpec = KernelSpec {
    entry_point: "advect_particles",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Particles, Access::ReadWrite),
        bind(2, Slot::GridVelocity, Access::ReadOnly),
    ],
};

const COPY_RENDER_PARTICLES: KernelSpec = KernelSpec {
    entry_point: "copy_render_particles",
    workgroup_size: 64,
    bindings: &[
        bind(0, Slot::Constants, Access::Uniform),
        bind(1, Slot::Particles, Access::ReadOnly),
        bind(2, Slot::RenderParticles, Access::ReadWrite),
    ],
};

/// Compute pipelines for every FLIP pass outside the solvers.
pub(super) struct FlipKernels {
    pub init_particles: ComputeKernel,
    pub particle_to_grid: ComputeKernel,
    pub add_external_force: ComputeKernel,
    pub grid_to_particle: ComputeKernel,
    pub advect_particles: ComputeKernel,
    pub copy_render_particles: ComputeKernel,
}

impl FlipKernels {
    pub fn new(ctx: &GpuContext) -> Self {
        let init = ShaderId::ParticleInit.create_module(ctx);
        let p2g = ShaderId::ParticleToGrid.create_module(ctx);
        let force = ShaderId::ExternalForce.create_module(ctx);
        let g2p = ShaderId::GridToParticle.create_module(ctx);
        let advection = ShaderId::Advection.create_module(ctx);
        let rendering = ShaderId::Rendering.create_module(ctx);

        Self {
            init_particles: ComputeKernel::new(ctx, &init, "FLIP Init Particles", &INIT_PARTICLES),
            particle_to_grid: ComputeKernel::new(ctx, &p2g, "FLIP P2G", &PARTICLE_TO_GRID),
            add_external_force: ComputeKernel::new(ctx, &force, "FLIP External Force", &ADD_EXTERNAL_FORCE),
            grid_to_particle: ComputeKernel::new(ctx, &g2p, "FLIP G2P", &GRID_TO_PARTICLE),
            advect_particles: ComputeKernel::new(ctx, &advection, "FLIP Advection", &ADVECT_PARTICLES),
            copy_render_particles: ComputeKernel::new(
                ctx,
                &rendering,
                "FLIP Render Particles",
                &COPY_RENDER_PARTICLES,
            ),
        }
    }
}
