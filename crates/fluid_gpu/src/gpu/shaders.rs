//! WGSL module composition.
//!
//! Kernels share two preludes: `dispatch.wgsl` (group-1 dispatch info and
//! thread indexing) goes in front of every module, and `grid.wgsl`
//! (simulation constants, particle/cell types, grid helpers and transfer
//! weights) in front of every simulation module. The scan module is
//! additionally specialized per group size.

use super::prefix_scan::ScanTier;
use super::GpuContext;

const DISPATCH: &str = include_str!("shaders/dispatch.wgsl");
const GRID: &str = include_str!("shaders/grid.wgsl");
const STAGGERED: &str = include_str!("shaders/staggered.wgsl");

const PREFIX_SCAN: &str = include_str!("shaders/prefix_scan.wgsl");
const RADIX_SORT: &str = include_str!("shaders/radix_sort.wgsl");
const STREAM_COMPACTION: &str = include_str!("shaders/stream_compaction.wgsl");
const GRID_SORT: &str = include_str!("shaders/grid_sort.wgsl");

const DIFFUSION: &str = include_str!("shaders/diffusion.wgsl");
const PARTICLE_INIT: &str = include_str!("shaders/particle_init.wgsl");
const PARTICLE_TO_GRID: &str = include_str!("shaders/particle_to_grid.wgsl");
const EXTERNAL_FORCE: &str = include_str!("shaders/external_force.wgsl");
const PRESSURE_PROJECTION: &str = include_str!("shaders/pressure_projection.wgsl");
const GRID_TO_PARTICLE: &str = include_str!("shaders/grid_to_particle.wgsl");
const ADVECTION: &str = include_str!("shaders/advection.wgsl");
const DENSITY_PROJECTION: &str = include_str!("shaders/density_projection.wgsl");
const RENDERING: &str = include_str!("shaders/rendering.wgsl");

const SMOKE_EMITTER: &str = include_str!("shaders/smoke_emitter.wgsl");
const SMOKE_ADVECTION: &str = include_str!("shaders/smoke_advection.wgsl");
const SMOKE_FORCES: &str = include_str!("shaders/smoke_forces.wgsl");
const SMOKE_PRESSURE: &str = include_str!("shaders/smoke_pressure.wgsl");
const SMOKE_RENDERING: &str = include_str!("shaders/smoke_rendering.wgsl");

/// Every compute module the crate builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderId {
    PrefixScan(ScanTier),
    RadixSort,
    StreamCompaction,
    GridSort,
    Diffusion,
    ParticleInit,
    ParticleToGrid,
    ExternalForce,
    PressureProjection,
    GridToParticle,
    Advection,
    DensityProjection,
    Rendering,
    SmokeEmitter,
    SmokeAdvection,
    SmokeForces,
    SmokePressure,
    SmokeRendering,
}

impl ShaderId {
    pub const ALL: [ShaderId; 20] = [
        ShaderId::PrefixScan(ScanTier::Threads128),
        ShaderId::PrefixScan(ScanTier::Threads256),
        ShaderId::PrefixScan(ScanTier::Threads512),
        ShaderId::RadixSort,
        ShaderId::StreamCompaction,
        ShaderId::GridSort,
        ShaderId::Diffusion,
        ShaderId::ParticleInit,
        ShaderId::ParticleToGrid,
        ShaderId::ExternalForce,
        ShaderId::PressureProjection,
        ShaderId::GridToParticle,
        ShaderId::Advection,
        ShaderId::DensityProjection,
        ShaderId::Rendering,
        ShaderId::SmokeEmitter,
        ShaderId::SmokeAdvection,
        ShaderId::SmokeForces,
        ShaderId::SmokePressure,
        ShaderId::SmokeRendering,
    ];

    /// Composed WGSL source, preludes included.
    pub fn source(self) -> String {
        match self {
            ShaderId::PrefixScan(tier) => format!(
                "{DISPATCH}\nconst SCAN_THREADS: u32 = {}u;\n{PREFIX_SCAN}",
                tier.threads()
            ),
            ShaderId::RadixSort => [DISPATCH, RADIX_SORT].join("\n"),
            ShaderId::StreamCompaction => [DISPATCH, STREAM_COMPACTION].join("\n"),
            ShaderId::GridSort => [DISPATCH, GRID_SORT].join("\n"),
            ShaderId::Diffusion => [DISPATCH, GRID, DIFFUSION].join("\n"),
            ShaderId::ParticleInit => [DISPATCH, GRID, PARTICLE_INIT].join("\n"),
            ShaderId::ParticleToGrid => [DISPATCH, GRID, PARTICLE_TO_GRID].join("\n"),
            ShaderId::ExternalForce => [DISPATCH, GRID, EXTERNAL_FORCE].join("\n"),
            ShaderId::PressureProjection => [DISPATCH, GRID, PRESSURE_PROJECTION].join("\n"),
            ShaderId::GridToParticle => [DISPATCH, GRID, STAGGERED, GRID_TO_PARTICLE].join("\n"),
            ShaderId::Advection => [DISPATCH, GRID, STAGGERED, ADVECTION].join("\n"),
            ShaderId::DensityProjection => [DISPATCH, GRID, DENSITY_PROJECTION].join("\n"),
            ShaderId::Rendering => [DISPATCH, GRID, RENDERING].join("\n"),
            ShaderId::SmokeEmitter => [DISPATCH, GRID, SMOKE_EMITTER].join("\n"),
            ShaderId::SmokeAdvection => [DISPATCH, GRID, SMOKE_ADVECTION].join("\n"),
            ShaderId::SmokeForces => [DISPATCH, GRID, SMOKE_FORCES].join("\n"),
            ShaderId::SmokePressure => [DISPATCH, GRID, SMOKE_PRESSURE].join("\n"),
            ShaderId::SmokeRendering => [DISPATCH, GRID, SMOKE_RENDERING].join("\n"),
        }
    }

    pub fn label(self) -> String {
        format!("{:?}", self)
    }

    pub fn create_module(self, ctx: &GpuContext) -> wgpu::ShaderModule {
        ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&self.label()),
            source: wgpu::ShaderSource::Wgsl(self.source().into()),
        })
    }
}
