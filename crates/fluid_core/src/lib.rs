//! CPU-side model of the GPU fluid simulators.
//!
//! This crate holds everything about the simulation that does not touch a
//! device: parameters and their valid ranges, the grid layout, the
//! `#[repr(C)]` element types shared with the WGSL kernels, interaction
//! input, and serial reference algorithms the GPU tests compare against.
//!
//! # Example
//!
//! ```
//! use fluid_core::{FlipConfig, Quality};
//!
//! let config = FlipConfig {
//!     quality: Quality::Medium,
//!     flipness: 1.5,
//!     ..Default::default()
//! }
//! .sanitized();
//!
//! assert_eq!(config.flipness, 1.0);
//! let layout = config.grid_layout();
//! assert_eq!(layout.num_cells(), 25 * 25 * 25);
//! ```

pub mod config;
pub mod constants;
pub mod grid;
pub mod input;
pub mod particle;
pub mod reference;
pub mod serde_utils;

pub use config::{
    AdvectionMethod, BoundaryConfig, EmitterConfig, FlipConfig, KernelFunction, Quality,
    SmokeConfig,
};
pub use glam::{UVec3, Vec3};
pub use grid::{CellType, GridLayout};
pub use input::{InteractionInput, MouseForce};
pub use particle::{CellRange, GridObject, KeyValue, Particle, ParticleSeed, RenderParticle};
