//! Simulation parameters for the FLIP and smoke solvers.
//!
//! Hosts build a config (or load one from JSON), and the GPU layer only
//! ever sees the result of [`FlipConfig::sanitized`] /
//! [`SmokeConfig::sanitized`]: out-of-range values are clamped here so no
//! invalid parameter reaches a dispatch.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::constants::{DELTA_TIME, FLIP_QUALITY_SPACING, GRAVITY, SMOKE_QUALITY_SPACING};
use crate::grid::GridLayout;
use crate::particle::ParticleSeed;
use crate::serde_utils::{deserialize_vec3, serialize_vec3};

/// Grid resolution tier.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum Quality {
    #[default]
    Low,
    Medium,
    High,
    Ultra,
}

impl Quality {
    fn tier(self) -> usize {
        match self {
            Quality::Low => 0,
            Quality::Medium => 1,
            Quality::High => 2,
            Quality::Ultra => 3,
        }
    }

    pub fn flip_spacing(self) -> f32 {
        FLIP_QUALITY_SPACING[self.tier()]
    }

    pub fn smoke_spacing(self) -> f32 {
        SMOKE_QUALITY_SPACING[self.tier()]
    }
}

/// Particle/grid transfer weighting.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum KernelFunction {
    /// Trilinear tent, support of one cell
    #[default]
    Linear,
    /// Quadratic B-spline, support of 1.5 cells
    Quadratic,
}

impl KernelFunction {
    pub fn as_u32(self) -> u32 {
        match self {
            KernelFunction::Linear => 0,
            KernelFunction::Quadratic => 1,
        }
    }
}

/// Particle position integrator.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum AdvectionMethod {
    #[default]
    ForwardEuler,
    RungeKutta2,
    RungeKutta3,
}

impl AdvectionMethod {
    pub fn as_u32(self) -> u32 {
        match self {
            AdvectionMethod::ForwardEuler => 0,
            AdvectionMethod::RungeKutta2 => 1,
            AdvectionMethod::RungeKutta3 => 2,
        }
    }
}

fn clamp_f32(name: &str, value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if !value.is_finite() {
        log::warn!("{} is not finite, using {}", name, fallback);
        return fallback;
    }
    let clamped = value.clamp(min, max);
    if clamped != value {
        log::warn!("{} = {} clamped to {}", name, value, clamped);
    }
    clamped
}

fn clamp_u32(name: &str, value: u32, min: u32, max: u32) -> u32 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        log::warn!("{} = {} clamped to {}", name, value, clamped);
    }
    clamped
}

fn finite_vec3(name: &str, value: Vec3, fallback: Vec3) -> Vec3 {
    if value.is_finite() {
        value
    } else {
        log::warn!("{} is not finite, using {:?}", name, fallback);
        fallback
    }
}

/// Smallest accepted domain extent along any axis.
const MIN_EXTENT: f32 = 0.1;

fn sanitize_extent(name: &str, extent: Vec3, fallback: Vec3) -> Vec3 {
    let extent = finite_vec3(name, extent, fallback);
    let clamped = extent.max(Vec3::splat(MIN_EXTENT));
    if clamped != extent {
        log::warn!("{} = {:?} clamped to {:?}", name, extent, clamped);
    }
    clamped
}

/// Parameters of the FLIP liquid solver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlipConfig {
    pub quality: Quality,
    /// Size of the domain, centred at the origin
    #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
    pub domain_extent: Vec3,
    /// Minimum corner of the initially filled volume
    #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
    pub init_min: Vec3,
    /// Maximum corner of the initially filled volume
    #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
    pub init_max: Vec3,
    /// PIC/FLIP blend: 0 = pure PIC, 1 = pure FLIP
    pub flipness: f32,
    #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
    pub gravity: Vec3,
    pub viscosity: f32,
    pub mouse_force: f32,
    pub mouse_force_range: f32,
    pub kernel_function: KernelFunction,
    pub advection_method: AdvectionMethod,
    pub density_projection: bool,
    pub diffusion_iterations: u32,
    pub pressure_iterations: u32,
    pub density_iterations: u32,
    pub delta_time: f32,
    pub substeps: u32,
}

impl Default for FlipConfig {
    fn default() -> Self {
        Self {
            quality: Quality::Medium,
            domain_extent: Vec3::splat(10.0),
            init_min: Vec3::new(-5.0, -5.0, -5.0),
            init_max: Vec3::new(0.0, 2.0, 0.0),
            flipness: 0.99,
            gravity: Vec3::new(0.0, GRAVITY, 0.0),
            viscosity: 0.0,
            mouse_force: 1.32,
            mouse_force_range: 2.25,
            kernel_function: KernelFunction::Linear,
            advection_method: AdvectionMethod::ForwardEuler,
            density_projection: true,
            diffusion_iterations: 15,
            pressure_iterations: 15,
            density_iterations: 30,
            delta_time: DELTA_TIME,
            substeps: 1,
        }
    }
}

impl FlipConfig {
    /// Copy with every field clamped into its valid range.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let domain_extent = sanitize_extent("domain_extent", self.domain_extent, defaults.domain_extent);
        let init_min = finite_vec3("init_min", self.init_min, -domain_extent * 0.5);
        let init_max = finite_vec3("init_max", self.init_max, Vec3::ZERO).max(init_min);
        Self {
            quality: self.quality,
            domain_extent,
            init_min,
            init_max,
            flipness: clamp_f32("flipness", self.flipness, 0.0, 1.0, defaults.flipness),
            gravity: finite_vec3("gravity", self.gravity, defaults.gravity),
            viscosity: clamp_f32("viscosity", self.viscosity, 0.0, 10.0, 0.0),
            mouse_force: clamp_f32("mouse_force", self.mouse_force, 0.0, 5.0, defaults.mouse_force),
            mouse_force_range: clamp_f32(
                "mouse_force_range",
                self.mouse_force_range,
                0.0,
                5.0,
                defaults.mouse_force_range,
            ),
            kernel_function: self.kernel_function,
            advection_method: self.advection_method,
            density_projection: self.density_projection,
            diffusion_iterations: clamp_u32("diffusion_iterations", self.diffusion_iterations, 1, 30),
            pressure_iterations: clamp_u32("pressure_iterations", self.pressure_iterations, 1, 30),
            density_iterations: clamp_u32("density_iterations", self.density_iterations, 1, 60),
            delta_time: clamp_f32("delta_time", self.delta_time, 1e-4, 0.1, DELTA_TIME),
            substeps: clamp_u32("substeps", self.substeps, 1, 8),
        }
    }

    pub fn grid_layout(&self) -> GridLayout {
        GridLayout::centered(self.domain_extent, self.quality.flip_spacing())
    }

    pub fn particle_seed(&self, layout: &GridLayout) -> ParticleSeed {
        ParticleSeed::new(layout, self.init_min, self.init_max)
    }

    /// Whether switching from `self` to `other` requires reallocating every
    /// buffer and re-seeding the particles.
    pub fn needs_reinit(&self, other: &Self) -> bool {
        self.quality != other.quality
            || self.domain_extent != other.domain_extent
            || self.init_min != other.init_min
            || self.init_max != other.init_max
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(json).map(|c| c.sanitized())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Open/closed flags for the six domain walls of the smoke solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryConfig {
    /// Closed walls at the +X, +Y, +Z sides
    pub positive: [bool; 3],
    /// Closed walls at the -X, -Y, -Z sides
    pub negative: [bool; 3],
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            positive: [true; 3],
            negative: [true; 3],
        }
    }
}

/// Spherical density/temperature source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    /// Centre relative to the domain centre
    #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
    pub center: Vec3,
    pub radius: f32,
    /// Density added per second at the centre
    pub density_rate: f32,
    /// Temperature added per second at the centre
    pub temperature_rate: f32,
    #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
    pub velocity: Vec3,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            center: Vec3::new(0.0, -3.5, 0.0),
            radius: 1.0,
            density_rate: 4.0,
            temperature_rate: 4.0,
            velocity: Vec3::new(0.0, 1.0, 0.0),
        }
    }
}

/// Parameters of the Eulerian smoke solver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeConfig {
    pub quality: Quality,
    #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
    pub domain_extent: Vec3,
    pub mouse_force: f32,
    pub mouse_force_range: f32,
    pub density_dissipation: f32,
    pub temperature_dissipation: f32,
    pub buoyancy_alpha: f32,
    pub buoyancy_beta: f32,
    pub ambient_temperature: f32,
    pub vorticity_epsilon: f32,
    pub viscosity: f32,
    pub diffusion_iterations: u32,
    pub pressure_iterations: u32,
    pub boundary: BoundaryConfig,
    pub emitter: EmitterConfig,
    /// Density mapped to 0 and 1 in the baked texture
    pub visible_range: [f32; 2],
    pub delta_time: f32,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            quality: Quality::Medium,
            domain_extent: Vec3::splat(10.0),
            mouse_force: 2.0,
            mouse_force_range: 2.0,
            density_dissipation: 1.0,
            temperature_dissipation: 1.0,
            buoyancy_alpha: 0.08,
            buoyancy_beta: 0.97,
            ambient_temperature: 0.0,
            vorticity_epsilon: 0.1,
            viscosity: 0.0,
            diffusion_iterations: 15,
            pressure_iterations: 15,
            boundary: BoundaryConfig::default(),
            emitter: EmitterConfig::default(),
            visible_range: [0.0, 1.0],
            delta_time: DELTA_TIME,
        }
    }
}

impl SmokeConfig {
    pub fn sanitized(&self) -> Self {
        let d = Self::default();
        let domain_extent = sanitize_extent("domain_extent", self.domain_extent, d.domain_extent);
        let half = domain_extent * 0.5;
        let emitter = EmitterConfig {
            center: finite_vec3("emitter.center", self.emitter.center, d.emitter.center)
                .clamp(-half, half),
            radius: clamp_f32("emitter.radius", self.emitter.radius, 0.0, domain_extent.max_element(), d.emitter.radius),
            density_rate: clamp_f32("emitter.density_rate", self.emitter.density_rate, 0.0, 100.0, d.emitter.density_rate),
            temperature_rate: clamp_f32(
                "emitter.temperature_rate",
                self.emitter.temperature_rate,
                0.0,
                100.0,
                d.emitter.temperature_rate,
            ),
            velocity: finite_vec3("emitter.velocity", self.emitter.velocity, d.emitter.velocity),
        };
        let lo = clamp_f32("visible_range[0]", self.visible_range[0], 0.0, 100.0, 0.0);
        let hi = clamp_f32("visible_range[1]", self.visible_range[1], 0.0, 100.0, 1.0);
        // The bake divides by the range width.
        let hi = hi.max(lo + 1e-3);
        Self {
            quality: self.quality,
            domain_extent,
            mouse_force: clamp_f32("mouse_force", self.mouse_force, 0.0, 5.0, d.mouse_force),
            mouse_force_range: clamp_f32("mouse_force_range", self.mouse_force_range, 0.0, 5.0, d.mouse_force_range),
            density_dissipation: clamp_f32("density_dissipation", self.density_dissipation, 0.0, 2.0, d.density_dissipation),
            temperature_dissipation: clamp_f32(
                "temperature_dissipation",
                self.temperature_dissipation,
                0.0,
                2.0,
                d.temperature_dissipation,
            ),
            buoyancy_alpha: clamp_f32("buoyancy_alpha", self.buoyancy_alpha, 0.0, 5.0, d.buoyancy_alpha),
            buoyancy_beta: clamp_f32("buoyancy_beta", self.buoyancy_beta, 0.0, 5.0, d.buoyancy_beta),
            ambient_temperature: clamp_f32("ambient_temperature", self.ambient_temperature, -100.0, 100.0, 0.0),
            vorticity_epsilon: clamp_f32("vorticity_epsilon", self.vorticity_epsilon, 0.0, 1.0, d.vorticity_epsilon),
            viscosity: clamp_f32("viscosity", self.viscosity, 0.0, 10.0, 0.0),
            diffusion_iterations: clamp_u32("diffusion_iterations", self.diffusion_iterations, 1, 30),
            pressure_iterations: clamp_u32("pressure_iterations", self.pressure_iterations, 1, 30),
            boundary: self.boundary,
            emitter,
            visible_range: [lo, hi],
            delta_time: clamp_f32("delta_time", self.delta_time, 1e-4, 0.1, DELTA_TIME),
        }
    }

    pub fn grid_layout(&self) -> GridLayout {
        GridLayout::centered(self.domain_extent, self.quality.smoke_spacing())
    }

    pub fn needs_reinit(&self, other: &Self) -> bool {
        self.quality != other.quality || self.domain_extent != other.domain_extent
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(json).map(|c| c.sanitized())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_are_already_sane() {
        assert_eq!(FlipConfig::default().sanitized(), FlipConfig::default());
        assert_eq!(SmokeConfig::default().sanitized(), SmokeConfig::default());
    }

    #[test]
    fn both_solvers_default_to_medium_quality() {
        assert_eq!(FlipConfig::default().quality, Quality::Medium);
        assert_eq!(SmokeConfig::default().quality, Quality::Medium);
        let low = FlipConfig {
            quality: Quality::Low,
            ..FlipConfig::default()
        };
        assert!(FlipConfig::default().grid_layout().size.x > low.grid_layout().size.x);
    }

    #[test]
    fn quality_maps_to_spacing() {
        assert_eq!(Quality::Low.flip_spacing(), 0.5);
        assert_eq!(Quality::Ultra.flip_spacing(), 0.2);
        assert_eq!(Quality::Medium.smoke_spacing(), 0.3);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = FlipConfig {
            flipness: 3.0,
            viscosity: -1.0,
            mouse_force: f32::NAN,
            pressure_iterations: 0,
            density_iterations: 500,
            domain_extent: Vec3::new(0.0, 4.0, -2.0),
            ..Default::default()
        }
        .sanitized();
        assert_eq!(config.flipness, 1.0);
        assert_eq!(config.viscosity, 0.0);
        assert_eq!(config.mouse_force, 1.32);
        assert_eq!(config.pressure_iterations, 1);
        assert_eq!(config.density_iterations, 60);
        assert!(config.domain_extent.min_element() > 0.0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = FlipConfig::from_json(r#"{"quality":"High","flipness":0.5}"#).unwrap();
        assert_eq!(config.quality, Quality::High);
        assert_eq!(config.flipness, 0.5);
        assert_eq!(config.pressure_iterations, 15);
    }

    #[test]
    fn json_round_trip() {
        let config = SmokeConfig {
            quality: Quality::High,
            boundary: BoundaryConfig {
                positive: [true, false, true],
                negative: [true; 3],
            },
            ..Default::default()
        };
        let back = SmokeConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn quality_change_needs_reinit() {
        let a = FlipConfig::default();
        let b = FlipConfig {
            quality: Quality::High,
            ..a.clone()
        };
        let c = FlipConfig {
            flipness: 0.5,
            ..a.clone()
        };
        assert!(a.needs_reinit(&b));
        assert!(!a.needs_reinit(&c));
    }

    proptest! {
        #[test]
        fn sanitized_config_yields_valid_grid(
            extent in prop::array::uniform3(-10.0f32..200.0),
            flipness in -5.0f32..5.0,
            iterations in 0u32..1000,
        ) {
            let config = FlipConfig {
                domain_extent: Vec3::from_array(extent),
                flipness,
                diffusion_iterations: iterations,
                quality: Quality::Ultra,
                ..Default::default()
            }
            .sanitized();
            let layout = config.grid_layout();
            prop_assert!(layout.num_cells() >= 1);
            prop_assert!(layout.spacing.min_element() > 0.0);
            prop_assert!((0.0..=1.0).contains(&config.flipness));
            prop_assert!((1..=30).contains(&config.diffusion_iterations));
            let seed = config.particle_seed(&layout);
            prop_assert!(seed.num_particles() >= 1);
        }
    }
}
