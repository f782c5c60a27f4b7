//! GPU 3D FLIP/PIC liquid simulation.
//!
//! Every step runs a fixed pipeline over the particle set and a staggered
//! grid:
//! - grid sort of the particles (radix sort by cell)
//! - particle-to-grid gather and cell classification
//! - gravity and mouse force
//! - viscous diffusion (Jacobi, skipped without viscosity)
//! - pressure projection (Jacobi)
//! - grid-to-particle PIC/FLIP blend and advection
//! - optional density projection
//!
//! and finally packs `(position, speed)` records for the renderer. All
//! passes are submitted in order on one queue; nothing here waits for the
//! GPU except the diagnostics in [`diagnostics`].

pub mod density;
pub mod diagnostics;
mod pipelines;
pub mod pressure;

use fluid_core::{
    CellRange, FlipConfig, GridLayout, InteractionInput, MouseForce, Particle, RenderParticle,
};

use self::density::DensityProjection;
use self::pipelines::FlipKernels;
use self::pressure::PressureSolver;
use super::buffer::{DeviceBuffer, DoubleBuffer, UniformBuffer};
use super::diffusion::{DiffusionMask, DiffusionSolver};
use super::filtering::StreamCompaction;
use super::grid_sort::GridSortHelper;
use super::kernel::{Bindings, Slot};
use super::params::{ForceParams, ParticleInitParams, SimConstants, TransferParams};
use super::{GpuContext, GpuError};

/// Longest step accepted by [`FlipSimulation::step`].
const MAX_STEP: f32 = 0.1;

pub struct FlipSimulation {
    ctx: GpuContext,
    config: FlipConfig,
    layout: GridLayout,
    initialized: bool,
    frame: u64,

    kernels: FlipKernels,
    grid_sort: GridSortHelper<Particle>,
    diffusion: DiffusionSolver,
    pressure: PressureSolver,
    density: DensityProjection,
    filter: StreamCompaction,

    constants: UniformBuffer<SimConstants>,
    init_params: UniformBuffer<ParticleInitParams>,
    force_params: UniformBuffer<ForceParams>,
    transfer_params: UniformBuffer<TransferParams>,

    particles: DoubleBuffer<Particle>,
    render_particles: DeviceBuffer<RenderParticle>,
    grid_index: DeviceBuffer<CellRange>,
    grid_type: DeviceBuffer<u32>,
    grid_velocity: DeviceBuffer<[f32; 4]>,
    grid_original_velocity: DeviceBuffer<[f32; 4]>,
    cell_scratch: DeviceBuffer<u32>,
}

impl FlipSimulation {
    /// Build the pipelines and seed the initial particle volume.
    pub fn new(ctx: &GpuContext, config: &FlipConfig) -> Result<Self, GpuError> {
        let config = config.sanitized();
        let layout = config.grid_layout();
        let mut sim = Self {
            ctx: ctx.clone(),
            kernels: FlipKernels::new(ctx),
            grid_sort: GridSortHelper::new(ctx)?,
            diffusion: DiffusionSolver::new(ctx),
            pressure: PressureSolver::new(ctx),
            density: DensityProjection::new(ctx),
            filter: StreamCompaction::new(ctx)?,
            constants: UniformBuffer::new(ctx, "FLIP Constants"),
            init_params: UniformBuffer::new(ctx, "FLIP Init Params"),
            force_params: UniformBuffer::new(ctx, "FLIP Force Params"),
            transfer_params: UniformBuffer::new(ctx, "FLIP Transfer Params"),
            particles: DoubleBuffer::new("FLIP Particles"),
            render_particles: DeviceBuffer::new("FLIP Render Particles"),
            grid_index: DeviceBuffer::new("FLIP Grid Index"),
            grid_type: DeviceBuffer::new("FLIP Grid Type"),
            grid_velocity: DeviceBuffer::new("FLIP Grid Velocity"),
            grid_original_velocity: DeviceBuffer::new("FLIP Grid Original Velocity"),
            cell_scratch: DeviceBuffer::new("FLIP Cell Scratch"),
            config: config.clone(),
            layout,
            initialized: false,
            frame: 0,
        };
        sim.initialize(&config)?;
        Ok(sim)
    }

    /// (Re)allocate every buffer for `config` and re-seed the particles.
    ///
    /// Old allocations are released before new ones are made.
    pub fn initialize(&mut self, config: &FlipConfig) -> Result<(), GpuError> {
        self.ctx.check_device()?;
        self.release_buffers();
        self.config = config.sanitized();
        self.layout = self.config.grid_layout();
        self.frame = 0;

        let ctx = &self.ctx;
        let cells = self.layout.num_cells() as usize;
        self.grid_index.init(ctx, cells)?;
        self.grid_type.init(ctx, cells)?;
        self.grid_velocity.init(ctx, cells)?;
        self.grid_original_velocity.init(ctx, cells)?;
        self.cell_scratch.init(ctx, cells)?;
        self.pressure.resize(ctx, &self.layout)?;

        let seed = self.config.particle_seed(&self.layout);
        let num_particles = seed.num_particles();
        self.particles.init(ctx, num_particles as usize)?;
        self.render_particles.init(ctx, num_particles as usize)?;

        self.write_constants(self.config.delta_time);
        self.density.resize(ctx, &self.constants, &self.layout)?;
        self.init_params.write(
            ctx,
            &ParticleInitParams {
                init_min: seed.min.to_array(),
                per_cell: seed.per_cell,
                init_cells: seed.cells.to_array(),
                seed: 0,
                init_spacing: seed.spacing.to_array(),
                _pad: 0.0,
            },
        );
        let bindings = Bindings::new()
            .uniform(Slot::Constants, &self.constants)
            .uniform(Slot::Params, &self.init_params)
            .buffer(Slot::Particles, self.particles.read());
        self.kernels.init_particles.dispatch(ctx, &bindings, num_particles);
        self.copy_render_particles();

        self.initialized = true;
        log::info!(
            "FLIP initialized: grid {}x{}x{} (spacing {:.3}), {} particles",
            self.layout.size.x,
            self.layout.size.y,
            self.layout.size.z,
            self.layout.spacing.x,
            num_particles
        );
        Ok(())
    }

    /// Apply new parameters. Returns whether the buffers were rebuilt,
    /// which happens when the grid or the initial volume changes.
    pub fn set_config(&mut self, config: &FlipConfig) -> Result<bool, GpuError> {
        let config = config.sanitized();
        if !self.initialized || self.config.needs_reinit(&config) {
            if self.config.quality != config.quality {
                log::info!("FLIP quality {:?} -> {:?}", self.config.quality, config.quality);
            }
            self.initialize(&config)?;
            return Ok(true);
        }
        self.config = config;
        Ok(false)
    }

    /// Replace the particle set, resizing the particle buffers to fit.
    pub fn upload_particles(&mut self, particles: &[Particle]) -> Result<(), GpuError> {
        if !self.initialized {
            return Err(GpuError::NotInitialized);
        }
        assert!(!particles.is_empty(), "FLIP needs at least one particle");
        assert!(
            particles.len() <= fluid_core::constants::MAX_PARTICLES as usize,
            "{} particles exceed the {} particle limit",
            particles.len(),
            fluid_core::constants::MAX_PARTICLES
        );
        self.particles.check_size_changed(&self.ctx, particles.len())?;
        self.render_particles.check_size_changed(&self.ctx, particles.len())?;
        self.particles.read().write(&self.ctx, particles);
        self.write_constants(self.config.delta_time);
        self.copy_render_particles();
        log::debug!("FLIP particles replaced: {}", particles.len());
        Ok(())
    }

    /// Advance by `delta_time`, split into the configured sub-steps.
    ///
    /// Non-finite or non-positive steps fall back to the configured step;
    /// longer steps are clamped.
    pub fn step(&mut self, delta_time: f32, input: &InteractionInput) -> Result<(), GpuError> {
        self.ctx.check_device()?;
        if !self.initialized {
            return Err(GpuError::NotInitialized);
        }
        let delta_time = if delta_time.is_finite() && delta_time > 0.0 {
            delta_time.min(MAX_STEP)
        } else {
            self.config.delta_time
        };
        let substeps = self.config.substeps.max(1);
        let sub_dt = delta_time / substeps as f32;

        let mut mouse = MouseForce::new(input, self.config.mouse_force, self.config.mouse_force_range);
        mouse.force /= substeps as f32;
        self.force_params
            .write(&self.ctx, &ForceParams::new(self.config.gravity, &mouse));
        self.transfer_params.write(
            &self.ctx,
            &TransferParams {
                flipness: self.config.flipness,
                _pad0: 0.0,
                _pad1: 0.0,
                _pad2: 0.0,
            },
        );

        for _ in 0..substeps {
            self.write_constants(sub_dt);
            self.substep(sub_dt)?;
        }
        self.copy_render_particles();
        self.frame += 1;
        Ok(())
    }

    fn substep(&mut self, delta_time: f32) -> Result<(), GpuError> {
        let ctx = &self.ctx;
        let num_cells = self.layout.num_cells();
        let num_particles = self.particles.len() as u32;

        self.grid_sort
            .sort(ctx, &mut self.particles, &self.grid_index, &self.layout)?;

        let p2g = Bindings::new()
            .uniform(Slot::Constants, &self.constants)
            .buffer(Slot::Particles, self.particles.read())
            .buffer(Slot::GridIndex, &self.grid_index)
            .buffer(Slot::GridType, &self.grid_type)
            .buffer(Slot::GridVelocity, &self.grid_velocity)
            .buffer(Slot::GridOriginalVelocity, &self.grid_original_velocity);
        self.kernels.particle_to_grid.dispatch(ctx, &p2g, num_cells);

        let force = Bindings::new()
            .uniform(Slot::Constants, &self.constants)
            .uniform(Slot::Params, &self.force_params)
            .buffer(Slot::GridVelocity, &self.grid_velocity);
        self.kernels.add_external_force.dispatch(ctx, &force, num_cells);

        self.diffusion.solve(
            ctx,
            &self.constants,
            DiffusionMask::FluidCells(&self.grid_type),
            &self.grid_velocity,
            self.config.viscosity,
            delta_time,
            self.layout.spacing,
            self.config.diffusion_iterations,
        )?;

        self.pressure.project(
            ctx,
            &self.constants,
            &self.grid_type,
            &self.grid_velocity,
            self.config.pressure_iterations,
        );

        let g2p = Bindings::new()
            .uniform(Slot::Constants, &self.constants)
            .uniform(Slot::Params, &self.transfer_params)
            .buffer(Slot::Particles, self.particles.read())
            .buffer(Slot::GridVelocity, &self.grid_velocity)
            .buffer(Slot::GridOriginalVelocity, &self.grid_original_velocity);
        self.kernels.grid_to_particle.dispatch(ctx, &g2p, num_particles);

        let advect = Bindings::new()
            .uniform(Slot::Constants, &self.constants)
            .buffer(Slot::Particles, self.particles.read())
            .buffer(Slot::GridVelocity, &self.grid_velocity);
        self.kernels.advect_particles.dispatch(ctx, &advect, num_particles);

        if self.config.density_projection {
            self.density.apply(
                ctx,
                &self.constants,
                &self.pressure,
                self.particles.read(),
                &self.grid_type,
                self.config.density_iterations,
            );
        }
        Ok(())
    }

    fn copy_render_particles(&self) {
        let bindings = Bindings::new()
            .uniform(Slot::Constants, &self.constants)
            .buffer(Slot::Particles, self.particles.read())
            .buffer(Slot::RenderParticles, &self.render_particles);
        self.kernels
            .copy_render_particles
            .dispatch(&self.ctx, &bindings, self.particles.len() as u32);
    }

    fn write_constants(&self, delta_time: f32) {
        let mut constants = SimConstants::new(&self.layout, delta_time);
        constants.kernel_function = self.config.kernel_function.as_u32();
        constants.advection_method = self.config.advection_method.as_u32();
        constants.num_particles = self.particles.len() as u32;
        self.constants.write(&self.ctx, &constants);
    }

    fn release_buffers(&mut self) {
        self.particles.release();
        self.render_particles.release();
        self.grid_index.release();
        self.grid_type.release();
        self.grid_velocity.release();
        self.grid_original_velocity.release();
        self.cell_scratch.release();
        self.grid_sort.release();
        self.diffusion.release();
        self.pressure.release();
        self.density.release();
        self.filter.release();
    }

    /// Release every buffer. [`FlipSimulation::step`] fails with
    /// [`GpuError::NotInitialized`] until [`FlipSimulation::initialize`]
    /// is called again.
    pub fn shutdown(&mut self) {
        self.release_buffers();
        self.initialized = false;
        log::info!("FLIP shut down after {} frames", self.frame);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &FlipConfig {
        &self.config
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn num_particles(&self) -> u32 {
        self.particles.len() as u32
    }

    /// Packed `(position, speed)` records, refreshed after every step.
    pub fn render_particles(&self) -> &DeviceBuffer<RenderParticle> {
        &self.render_particles
    }

    /// Particles in cell order as of the last sort.
    pub fn particles(&self) -> &DeviceBuffer<Particle> {
        self.particles.read()
    }

    pub fn grid_velocity(&self) -> &DeviceBuffer<[f32; 4]> {
        &self.grid_velocity
    }
}
