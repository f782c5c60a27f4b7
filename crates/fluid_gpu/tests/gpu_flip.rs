//! End-to-end FLIP steps on small domains.

mod common;

use common::gpu;
use fluid_core::config::Quality;
use fluid_core::constants::CELL_FLUID;
use fluid_core::{FlipConfig, InteractionInput, Particle, Vec3};
use fluid_gpu::{FlipSimulation, GpuError};

/// 4x4x4 grid with the lower-left octant filled: 2x2x2 seed cells of
/// 8 particles each.
fn small_config() -> FlipConfig {
    FlipConfig {
        quality: Quality::Low,
        domain_extent: Vec3::splat(2.0),
        init_min: Vec3::splat(-1.0),
        init_max: Vec3::ZERO,
        mouse_force: 0.0,
        viscosity: 0.0,
        ..FlipConfig::default()
    }
}

fn assert_in_domain(sim: &FlipSimulation, particles: &[Particle]) {
    let layout = sim.layout();
    let eps = 1e-4;
    for p in particles {
        let pos = p.position();
        assert!(
            pos.cmpge(layout.min - eps).all() && pos.cmple(layout.max + eps).all(),
            "particle escaped the domain: {:?}",
            pos
        );
    }
}

#[test]
fn resting_block_falls_without_gaining_upward_speed() {
    let Some(ctx) = gpu() else { return };
    let mut sim = FlipSimulation::new(&ctx, &small_config()).unwrap();
    assert_eq!(sim.layout().size.to_array(), [4, 4, 4]);
    assert_eq!(sim.num_particles(), 64);

    sim.step(1.0 / 60.0, &InteractionInput::default()).unwrap();

    let particles = sim.read_particles().unwrap();
    assert_eq!(particles.len(), 64);
    for p in &particles {
        assert!(p.is_finite(), "{:?}", p);
        assert!(p.velocity().y <= 0.05, "particle moving up: {:?}", p);
    }
    assert_in_domain(&sim, &particles);
    assert!(sim.max_particle_speed().unwrap().is_some());
    assert_eq!(sim.frame(), 1);
}

#[test]
fn many_steps_stay_finite_and_bounded() {
    let Some(ctx) = gpu() else { return };
    let config = FlipConfig {
        substeps: 2,
        ..small_config()
    };
    let mut sim = FlipSimulation::new(&ctx, &config).unwrap();
    let input = InteractionInput {
        ray_origin: Vec3::new(0.0, 0.0, -5.0),
        ray_direction: Vec3::Z,
        cursor_velocity: Vec3::new(3.0, 0.0, 0.0),
    };

    for _ in 0..30 {
        sim.step(1.0 / 60.0, &input).unwrap();
    }

    let particles = sim.read_particles().unwrap();
    assert_eq!(particles.len(), 64);
    assert!(particles.iter().all(Particle::is_finite));
    assert_in_domain(&sim, &particles);
    assert!(sim.fluid_cell_count().unwrap() > 0);
}

#[test]
fn render_particles_track_the_particle_set() {
    let Some(ctx) = gpu() else { return };
    let mut sim = FlipSimulation::new(&ctx, &small_config()).unwrap();
    sim.step(1.0 / 60.0, &InteractionInput::default()).unwrap();

    let particles = sim.read_particles().unwrap();
    let render = sim.read_render_particles().unwrap();
    assert_eq!(render.len(), particles.len());
    for (r, p) in render.iter().zip(&particles) {
        assert_eq!(r.position, p.position);
        assert!((r.speed - p.velocity().length()).abs() < 1e-5);
    }
}

#[test]
fn cell_ranges_and_fluid_cells_after_a_step() {
    let Some(ctx) = gpu() else { return };
    let mut sim = FlipSimulation::new(&ctx, &small_config()).unwrap();
    sim.step(1.0 / 60.0, &InteractionInput::default()).unwrap();

    let ranges = sim.read_cell_ranges().unwrap();
    let counted: u32 = ranges.iter().map(|r| r.count).sum();
    assert_eq!(counted, 64);

    let types = sim.read_grid_types().unwrap();
    let fluid = types
        .iter()
        .filter(|&&t| t == CELL_FLUID)
        .count() as u32;
    assert!(fluid > 0);
    assert_eq!(sim.fluid_cell_count().unwrap(), fluid);

    let pressure = sim.read_pressure().unwrap();
    assert_eq!(pressure.len(), sim.layout().num_cells() as usize);
    assert!(pressure.iter().all(|p| p.is_finite()));
}

#[test]
fn invalid_time_steps_fall_back_to_the_configured_step() {
    let Some(ctx) = gpu() else { return };
    let mut sim = FlipSimulation::new(&ctx, &small_config()).unwrap();
    for dt in [f32::NAN, -1.0, 0.0, f32::INFINITY, 10.0] {
        sim.step(dt, &InteractionInput::default()).unwrap();
    }
    let particles = sim.read_particles().unwrap();
    assert!(particles.iter().all(Particle::is_finite));
    assert_in_domain(&sim, &particles);
}

#[test]
fn upload_replaces_the_particle_set() {
    let Some(ctx) = gpu() else { return };
    let mut sim = FlipSimulation::new(&ctx, &small_config()).unwrap();
    let custom: Vec<Particle> = (0..10)
        .map(|i| Particle::at(Vec3::new(-0.75 + 0.1 * i as f32, -0.75, 0.25)))
        .collect();

    sim.upload_particles(&custom).unwrap();
    assert_eq!(sim.num_particles(), 10);
    sim.step(1.0 / 60.0, &InteractionInput::default()).unwrap();

    let particles = sim.read_particles().unwrap();
    assert_eq!(particles.len(), 10);
    assert_in_domain(&sim, &particles);
}

#[test]
fn set_config_reinitializes_only_for_layout_changes() {
    let Some(ctx) = gpu() else { return };
    let mut sim = FlipSimulation::new(&ctx, &small_config()).unwrap();
    sim.step(1.0 / 60.0, &InteractionInput::default()).unwrap();

    let tweaked = FlipConfig {
        flipness: 0.5,
        ..small_config()
    };
    assert!(!sim.set_config(&tweaked).unwrap());
    assert_eq!(sim.frame(), 1);
    assert_eq!(sim.config().flipness, 0.5);

    let finer = FlipConfig {
        quality: Quality::Medium,
        ..tweaked
    };
    assert!(sim.set_config(&finer).unwrap());
    assert_eq!(sim.frame(), 0);
    assert_eq!(*sim.layout(), finer.sanitized().grid_layout());
    assert!(sim.layout().size.x > 4);
    sim.step(1.0 / 60.0, &InteractionInput::default()).unwrap();
}

#[test]
fn density_rhs_is_clamped_to_fluid_over_density() {
    let Some(ctx) = gpu() else { return };
    let config = FlipConfig {
        density_projection: true,
        ..small_config()
    };
    let mut sim = FlipSimulation::new(&ctx, &config).unwrap();
    sim.step(1.0 / 60.0, &InteractionInput::default()).unwrap();

    let rhs = sim.read_density_rhs().unwrap();
    let types = sim.read_grid_types().unwrap();
    assert_eq!(rhs.len(), sim.layout().num_cells() as usize);
    for (i, (&r, &t)) in rhs.iter().zip(&types).enumerate() {
        assert!(r.is_finite() && r >= 0.0, "cell {}: rhs {}", i, r);
        if t != CELL_FLUID {
            assert_eq!(r, 0.0, "non-fluid cell {} has rhs {}", i, r);
        }
    }
}

#[test]
fn shutdown_stops_stepping_until_reinitialized() {
    let Some(ctx) = gpu() else { return };
    let config = small_config();
    let mut sim = FlipSimulation::new(&ctx, &config).unwrap();
    sim.shutdown();
    assert!(!sim.is_initialized());
    assert!(matches!(
        sim.step(1.0 / 60.0, &InteractionInput::default()),
        Err(GpuError::NotInitialized)
    ));
    assert!(matches!(sim.read_particles(), Err(GpuError::NotInitialized)));

    sim.initialize(&config).unwrap();
    sim.step(1.0 / 60.0, &InteractionInput::default()).unwrap();
    assert_eq!(sim.num_particles(), 64);
}
