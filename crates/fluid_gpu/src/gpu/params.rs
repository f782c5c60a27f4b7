//! GPU shader parameter structs.
//!
//! These are `#[repr(C)]` structs uploaded to uniform buffers. Each mirrors
//! a WGSL struct of the same name; vec3 members are always followed by a
//! scalar so std140-style and C layouts agree. Every struct is a multiple
//! of 16 bytes.

use bytemuck::{Pod, Zeroable};
use fluid_core::{GridLayout, MouseForce};
use glam::Vec3;

/// Per-dispatch bookkeeping bound at group 1 of every kernel (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct DispatchInfo {
    /// Logical thread count; threads at or past it exit
    pub num_threads: u32,
    /// First group of this chunk when a dispatch is split
    pub group_offset: u32,
    /// Groups of the whole logical dispatch
    pub num_groups: u32,
    pub _pad: u32,
}

/// Grid description and step constants shared by all simulation kernels (80 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SimConstants {
    pub grid_min: [f32; 3],
    pub delta_time: f32,
    pub grid_max: [f32; 3],
    pub kernel_function: u32,
    pub grid_spacing: [f32; 3],
    pub advection_method: u32,
    pub grid_inv_spacing: [f32; 3],
    pub num_particles: u32,
    pub grid_size: [u32; 3],
    pub num_cells: u32,
}

impl SimConstants {
    pub fn new(layout: &GridLayout, delta_time: f32) -> Self {
        Self {
            grid_min: layout.min.to_array(),
            delta_time,
            grid_max: layout.max.to_array(),
            kernel_function: 0,
            grid_spacing: layout.spacing.to_array(),
            advection_method: 0,
            grid_inv_spacing: layout.inv_spacing().to_array(),
            num_particles: 0,
            grid_size: layout.size.to_array(),
            num_cells: layout.num_cells(),
        }
    }
}

/// Prefix scan parameters (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ScanParams {
    pub num_elements: u32,
    /// Where a level's group totals land in the group-sum target
    pub group_sum_offset: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

/// Radix sort parameters (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SortParams {
    pub num_elements: u32,
    pub num_groups: u32,
    pub bit_shift: u32,
    pub _pad: u32,
}

/// Stream compaction parameters (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct FilterParams {
    pub num_elements: u32,
    pub num_groups: u32,
    pub predicate: u32,
    pub operand: u32,
}

/// Grid sort parameters (48 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct GridSortParams {
    pub grid_min: [f32; 3],
    pub num_objects: u32,
    pub grid_inv_spacing: [f32; 3],
    pub words_per_object: u32,
    pub grid_size: [u32; 3],
    pub position_word: u32,
}

/// Particle seeding parameters (48 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ParticleInitParams {
    pub init_min: [f32; 3],
    pub per_cell: u32,
    pub init_cells: [u32; 3],
    pub seed: u32,
    pub init_spacing: [f32; 3],
    pub _pad: f32,
}

/// Gravity and mouse force (64 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ForceParams {
    pub gravity: [f32; 3],
    pub mouse_range: f32,
    pub mouse_force: [f32; 3],
    pub _pad0: f32,
    pub ray_origin: [f32; 3],
    pub _pad1: f32,
    pub ray_direction: [f32; 3],
    pub _pad2: f32,
}

impl ForceParams {
    pub fn new(gravity: Vec3, mouse: &MouseForce) -> Self {
        Self {
            gravity: gravity.to_array(),
            mouse_range: mouse.range,
            mouse_force: mouse.force.to_array(),
            _pad0: 0.0,
            ray_origin: mouse.ray_origin.to_array(),
            _pad1: 0.0,
            ray_direction: mouse.ray_direction.to_array(),
            _pad2: 0.0,
        }
    }
}

/// Jacobi coefficients for implicit diffusion (16 bytes).
///
/// With `a = nu * dt / h^2` per axis:
/// `x' = center * b + sum_axis(neighbor[axis] * (x+ + x-))`,
/// `center = 1 / (1 + 2 * sum(a))`, `neighbor = a * center`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct DiffusionParams {
    pub neighbor_coeff: [f32; 3],
    pub center_coeff: f32,
}

impl DiffusionParams {
    pub fn new(viscosity: f32, delta_time: f32, spacing: Vec3) -> Self {
        let a = viscosity * delta_time / (spacing * spacing);
        let center = 1.0 / (1.0 + 2.0 * (a.x + a.y + a.z));
        Self {
            neighbor_coeff: (a * center).to_array(),
            center_coeff: center,
        }
    }
}

/// Poisson solve parameters (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct PressureParams {
    pub inv_spacing_sq: [f32; 3],
    pub _pad: f32,
}

impl PressureParams {
    pub fn new(layout: &GridLayout) -> Self {
        let inv = layout.inv_spacing();
        Self {
            inv_spacing_sq: (inv * inv).to_array(),
            _pad: 0.0,
        }
    }
}

/// Grid-to-particle blend (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct TransferParams {
    pub flipness: f32,
    pub _pad0: f32,
    pub _pad1: f32,
    pub _pad2: f32,
}

/// Density projection parameters (32 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct DensityParams {
    /// Ghost weight for 0..=3 touching walls, already scaled by particles per cell
    pub ghost_weight: [f32; 4],
    pub inv_average_weight: f32,
    /// Displacement clamp in world units
    pub max_displacement: f32,
    pub weight_scale: f32,
    pub _pad: f32,
}

/// Smoke emitter (48 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct EmitterParams {
    pub center: [f32; 3],
    pub radius: f32,
    pub velocity: [f32; 3],
    pub density_rate: f32,
    pub temperature_rate: f32,
    pub _pad0: f32,
    pub _pad1: f32,
    pub _pad2: f32,
}

/// Per-step decay of advected smoke scalars (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ScalarDecayParams {
    pub density_decay: f32,
    pub temperature_decay: f32,
    pub _pad0: f32,
    pub _pad1: f32,
}

/// Smoke buoyancy and vorticity confinement (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SmokeForceParams {
    pub buoyancy_alpha: f32,
    pub buoyancy_beta: f32,
    pub ambient_temperature: f32,
    pub vorticity_epsilon: f32,
}

/// Closed-wall flags, 1 = closed (32 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct BoundaryParams {
    pub positive: [u32; 3],
    pub _pad0: u32,
    pub negative: [u32; 3],
    pub _pad1: u32,
}

impl BoundaryParams {
    pub fn new(boundary: &fluid_core::BoundaryConfig) -> Self {
        Self {
            positive: boundary.positive.map(u32::from),
            _pad0: 0,
            negative: boundary.negative.map(u32::from),
            _pad1: 0,
        }
    }
}

/// Density range mapped onto [0, 1] by the texture bake (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct RenderRangeParams {
    pub visible_min: f32,
    pub visible_max: f32,
    pub _pad0: f32,
    pub _pad1: f32,
}
