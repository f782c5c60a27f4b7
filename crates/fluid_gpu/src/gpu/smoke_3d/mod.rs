//! GPU 3D Eulerian smoke simulation.
//!
//! Velocity, density and temperature live at cell centres. One step emits
//! from the source, advects everything semi-Lagrangian, adds mouse force,
//! buoyancy and vorticity confinement, diffuses, enforces the wall
//! conditions, projects, and bakes the density into a 3D texture for the
//! volume renderer.

mod pipelines;

use fluid_core::{GridLayout, InteractionInput, MouseForce, SmokeConfig, Vec3};

use self::pipelines::SmokeKernels;
use super::buffer::{DoubleBuffer, DeviceBuffer, UniformBuffer};
use super::diffusion::{DiffusionMask, DiffusionSolver};
use super::kernel::{ping_pong, Bindings, Slot};
use super::params::{
    BoundaryParams, EmitterParams, ForceParams, PressureParams, RenderRangeParams,
    ScalarDecayParams, SimConstants, SmokeForceParams,
};
use super::texture::StorageTexture3D;
use super::{GpuContext, GpuError};

const MAX_STEP: f32 = 0.1;

pub struct SmokeSimulation {
    ctx: GpuContext,
    config: SmokeConfig,
    layout: GridLayout,
    initialized: bool,
    frame: u64,

    kernels: SmokeKernels,
    diffusion: DiffusionSolver,

    constants: UniformBuffer<SimConstants>,
    emitter_params: UniformBuffer<EmitterParams>,
    decay_params: UniformBuffer<ScalarDecayParams>,
    force_params: UniformBuffer<ForceParams>,
    smoke_force_params: UniformBuffer<SmokeForceParams>,
    boundary_params: UniformBuffer<BoundaryParams>,
    pressure_params: UniformBuffer<PressureParams>,
    render_range: UniformBuffer<RenderRangeParams>,

    velocity: DoubleBuffer<[f32; 4]>,
    density: DoubleBuffer<f32>,
    temperature: DoubleBuffer<f32>,
    vorticity: DeviceBuffer<[f32; 4]>,
    divergence: DeviceBuffer<f32>,
    pressure: DoubleBuffer<f32>,
    density_texture: StorageTexture3D,
}

impl SmokeSimulation {
    pub fn new(ctx: &GpuContext, config: &SmokeConfig) -> Result<Self, GpuError> {
        let config = config.sanitized();
        let mut sim = Self {
            ctx: ctx.clone(),
            layout: config.grid_layout(),
            config: config.clone(),
            initialized: false,
            frame: 0,
            kernels: SmokeKernels::new(ctx),
            diffusion: DiffusionSolver::new(ctx),
            constants: UniformBuffer::new(ctx, "Smoke Constants"),
            emitter_params: UniformBuffer::new(ctx, "Smoke Emitter Params"),
            decay_params: UniformBuffer::new(ctx, "Smoke Decay Params"),
            force_params: UniformBuffer::new(ctx, "Smoke Force Params"),
            smoke_force_params: UniformBuffer::new(ctx, "Smoke Buoyancy Params"),
            boundary_params: UniformBuffer::new(ctx, "Smoke Boundary Params"),
            pressure_params: UniformBuffer::new(ctx, "Smoke Pressure Params"),
            render_range: UniformBuffer::new(ctx, "Smoke Render Range"),
            velocity: DoubleBuffer::new("Smoke Velocity"),
            density: DoubleBuffer::new("Smoke Density"),
            temperature: DoubleBuffer::new("Smoke Temperature"),
            vorticity: DeviceBuffer::new("Smoke Vorticity"),
            divergence: DeviceBuffer::new("Smoke Divergence"),
            pressure: DoubleBuffer::new("Smoke Pressure"),
            density_texture: StorageTexture3D::new("Smoke Density Texture"),
        };
        sim.initialize(&config)?;
        Ok(sim)
    }

    /// (Re)allocate every field for `config`, starting from still air.
    pub fn initialize(&mut self, config: &SmokeConfig) -> Result<(), GpuError> {
        self.ctx.check_device()?;
        self.release_buffers();
        self.config = config.sanitized();
        self.layout = self.config.grid_layout();
        self.frame = 0;

        let ctx = &self.ctx;
        let cells = self.layout.num_cells() as usize;
        self.velocity.init(ctx, cells)?;
        self.density.init(ctx, cells)?;
        self.temperature.init(ctx, cells)?;
        self.vorticity.init(ctx, cells)?;
        self.divergence.init(ctx, cells)?;
        self.pressure.init(ctx, cells)?;
        self.density_texture.init(ctx, self.layout.size)?;
        self.pressure_params.write(ctx, &PressureParams::new(&self.layout));
        self.write_constants(self.config.delta_time);
        self.write_step_params(self.config.delta_time, &InteractionInput::default());
        self.bake();

        self.initialized = true;
        log::info!(
            "Smoke initialized: grid {}x{}x{} (spacing {:.3})",
            self.layout.size.x,
            self.layout.size.y,
            self.layout.size.z,
            self.layout.spacing.x
        );
        Ok(())
    }

    /// Apply new parameters, rebuilding the fields when the grid changes.
    pub fn set_config(&mut self, config: &SmokeConfig) -> Result<bool, GpuError> {
        let config = config.sanitized();
        if !self.initialized || self.config.needs_reinit(&config) {
            if self.config.quality != config.quality {
                log::info!("Smoke quality {:?} -> {:?}", self.config.quality, config.quality);
            }
            self.initialize(&config)?;
            return Ok(true);
        }
        self.config = config;
        Ok(false)
    }

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
        self.write_constants(delta_time);
        self.write_step_params(delta_time, input);

        self.emit();
        self.advect();
        self.add_forces();
        self.diffusion.solve(
            &self.ctx,
            &self.constants,
            DiffusionMask::AllCells,
            self.velocity.read(),
            self.config.viscosity,
            delta_time,
            self.layout.spacing,
            self.config.diffusion_iterations,
        )?;
        self.enforce_boundary();
        self.project();
        self.bake();

        self.frame += 1;
        Ok(())
    }

    fn write_step_params(&self, delta_time: f32, input: &InteractionInput) {
        let ctx = &self.ctx;
        let config = &self.config;
        let emitter = &config.emitter;
        let center = (self.layout.min + self.layout.max) * 0.5 + emitter.center;
        self.emitter_params.write(
            ctx,
            &EmitterParams {
                center: center.to_array(),
                radius: emitter.radius,
                velocity: emitter.velocity.to_array(),
                density_rate: emitter.density_rate,
                temperature_rate: emitter.temperature_rate,
                _pad0: 0.0,
                _pad1: 0.0,
                _pad2: 0.0,
            },
        );
        self.decay_params.write(
            ctx,
            &ScalarDecayParams {
                density_decay: (1.0 - config.density_dissipation * delta_time).max(0.0),
                temperature_decay: (1.0 - config.temperature_dissipation * delta_time).max(0.0),
                _pad0: 0.0,
                _pad1: 0.0,
            },
        );
        let mouse = MouseForce::new(input, config.mouse_force, config.mouse_force_range);
        self.force_params.write(ctx, &ForceParams::new(Vec3::ZERO, &mouse));
        self.smoke_force_params.write(
            ctx,
            &SmokeForceParams {
                buoyancy_alpha: config.buoyancy_alpha,
                buoyancy_beta: config.buoyancy_beta,
                ambient_temperature: config.ambient_temperature,
                vorticity_epsilon: config.vorticity_epsilon,
            },
        );
        self.boundary_params.write(ctx, &BoundaryParams::new(&config.boundary));
        self.render_range.write(
            ctx,
            &RenderRangeParams {
                visible_min: config.visible_range[0],
                visible_max: config.visible_range[1],
                _pad0: 0.0,
                _pad1: 0.0,
            },
        );
    }

    fn num_cells(&self) -> u32 {
        self.layout.num_cells()
    }

    fn emit(&self) {
        let bindings = Bindings::new()
            .uniform(Slot::Constants, &self.constants)
            .uniform(Slot::Params, &self.emitter_params)
            .buffer(Slot::VelocityIn, self.velocity.read())
            .buffer(Slot::DensityIn, self.density.read())
            .buffer(Slot::TemperatureIn, self.temperature.read());
        self.kernels.emit.dispatch(&self.ctx, &bindings, self.num_cells());
    }

    /// Scalars are advected through the old velocity before it is replaced.
    fn advect(&mut self) {
        let scalars = Bindings::new()
            .uniform(Slot::Constants, &self.constants)
            .uniform(Slot::Params, &self.decay_params)
            .buffer(Slot::VelocityIn, self.velocity.read())
            .buffer(Slot::DensityIn, self.density.read())
            .buffer(Slot::DensityOut, self.density.write())
            .buffer(Slot::TemperatureIn, self.temperature.read())
            .buffer(Slot::TemperatureOut, self.temperature.write());
        self.kernels
            .advect_scalars
            .dispatch(&self.ctx, &scalars, self.num_cells());

        let velocity = Bindings::new()
            .uniform(Slot::Constants, &self.constants)
            .buffer(Slot::VelocityIn, self.velocity.read())
            .buffer(Slot::VelocityOut, self.velocity.write());
        self.kernels
            .advect_velocity
            .dispatch(&self.ctx, &velocity, self.num_cells());

        self.velocity.swap();
        self.density.swap();
        self.temperature.swap();
    }

    fn add_forces(&self) {
        let ctx = &self.ctx;
        let cells = self.num_cells();
        let base = Bindings::new()
            .uniform(Slot::Constants, &self.constants)
            .uniform(Slot::Force, &self.force_params)
            .uniform(Slot::Params, &self.smoke_force_params)
            .buffer(Slot::VelocityIn, self.velocity.read());

        self.kernels.add_mouse_force.dispatch(ctx, &base, cells);

        let buoyancy = base
            .clone()
            .buffer(Slot::DensityIn, self.density.read())
            .buffer(Slot::TemperatureIn, self.temperature.read());
        self.kernels.add_buoyancy.dispatch(ctx, &buoyancy, cells);

        if self.config.vorticity_epsilon > 0.0 {
            let vorticity = base.buffer(Slot::Vorticity, &self.vorticity);
            self.kernels.compute_vorticity.dispatch(ctx, &vorticity, cells);
            self.kernels.confine_vorticity.dispatch(ctx, &vorticity, cells);
        }
    }

    fn enforce_boundary(&self) {
        let bindings = Bindings::new()
            .uniform(Slot::Constants, &self.constants)
            .uniform(Slot::Boundary, &self.boundary_params)
            .buffer(Slot::VelocityIn, self.velocity.read());
        self.kernels
            .enforce_boundary
            .dispatch(&self.ctx, &bindings, self.num_cells());
    }

    fn project(&mut self) {
        let ctx = &self.ctx;
        let cells = self.layout.num_cells();
        let base = Bindings::new()
            .uniform(Slot::Constants, &self.constants)
            .uniform(Slot::Boundary, &self.boundary_params)
            .uniform(Slot::Params, &self.pressure_params)
            .buffer(Slot::GridDivergence, &self.divergence);

        let divergence = base.clone().buffer(Slot::VelocityIn, self.velocity.read());
        self.kernels.divergence.dispatch(ctx, &divergence, cells);

        self.pressure.read().clear(ctx);
        ping_pong(
            ctx,
            &self.kernels.jacobi,
            &base,
            &mut self.pressure,
            (Slot::PressureIn, Slot::PressureOut),
            self.config.pressure_iterations,
        );

        let gradient = base
            .buffer(Slot::VelocityIn, self.velocity.read())
            .buffer(Slot::PressureIn, self.pressure.read());
        self.kernels.subtract_gradient.dispatch(ctx, &gradient, cells);
    }

    fn bake(&self) {
        let bindings = Bindings::new()
            .uniform(Slot::Constants, &self.constants)
            .uniform(Slot::Params, &self.render_range)
            .buffer(Slot::DensityIn, self.density.read())
            .texture(Slot::DensityTexture, self.density_texture.view());
        self.kernels
            .bake_density
            .dispatch(&self.ctx, &bindings, self.num_cells());
    }

    fn write_constants(&self, delta_time: f32) {
        self.constants
            .write(&self.ctx, &SimConstants::new(&self.layout, delta_time));
    }

    fn release_buffers(&mut self) {
        self.velocity.release();
        self.density.release();
        self.temperature.release();
        self.vorticity.release();
        self.divergence.release();
        self.pressure.release();
        self.density_texture.release();
        self.diffusion.release();
    }

    pub fn shutdown(&mut self) {
        self.release_buffers();
        self.initialized = false;
        log::info!("Smoke shut down after {} frames", self.frame);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &SmokeConfig {
        &self.config
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Normalized density volume, rebaked after every step.
    pub fn density_texture(&self) -> &StorageTexture3D {
        &self.density_texture
    }

    fn ensure_initialized(&self) -> Result<(), GpuError> {
        if self.initialized {
            Ok(())
        } else {
            Err(GpuError::NotInitialized)
        }
    }

    pub fn read_density(&self) -> Result<Vec<f32>, GpuError> {
        self.ensure_initialized()?;
        self.density.read().read(&self.ctx)
    }

    pub fn read_temperature(&self) -> Result<Vec<f32>, GpuError> {
        self.ensure_initialized()?;
        self.temperature.read().read(&self.ctx)
    }

    pub fn read_velocity(&self) -> Result<Vec<[f32; 4]>, GpuError> {
        self.ensure_initialized()?;
        self.velocity.read().read(&self.ctx)
    }

    pub fn read_pressure(&self) -> Result<Vec<f32>, GpuError> {
        self.ensure_initialized()?;
        self.pressure.read().read(&self.ctx)
    }

    pub fn read_density_texture(&self) -> Result<Vec<f32>, GpuError> {
        self.ensure_initialized()?;
        self.density_texture.read(&self.ctx)
    }

    /// Sum of the density field.
    pub fn total_density(&self) -> Result<f32, GpuError> {
        Ok(self.read_density()?.iter().sum())
    }
}
