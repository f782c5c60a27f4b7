//! Interaction input supplied by the host's camera/input layer.

use glam::Vec3;

/// Cursor ray and cursor motion, already projected into world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InteractionInput {
    pub ray_origin: Vec3,
    pub ray_direction: Vec3,
    /// Recent cursor velocity in world units per second
    pub cursor_velocity: Vec3,
}

impl Default for InteractionInput {
    fn default() -> Self {
        Self {
            ray_origin: Vec3::ZERO,
            ray_direction: Vec3::Z,
            cursor_velocity: Vec3::ZERO,
        }
    }
}

/// Mouse force as the kernels consume it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MouseForce {
    pub ray_origin: Vec3,
    /// Unit ray direction
    pub ray_direction: Vec3,
    /// Velocity added at zero distance from the ray
    pub force: Vec3,
    /// Falloff radius; zero disables the force
    pub range: f32,
}

impl MouseForce {
    pub const NONE: Self = Self {
        ray_origin: Vec3::ZERO,
        ray_direction: Vec3::Z,
        force: Vec3::ZERO,
        range: 0.0,
    };

    /// Scale the cursor velocity by `strength`; degenerate rays or
    /// non-finite input disable the force.
    pub fn new(input: &InteractionInput, strength: f32, range: f32) -> Self {
        let Some(direction) = input.ray_direction.try_normalize() else {
            return Self::NONE;
        };
        let force = input.cursor_velocity * strength;
        if !force.is_finite() || !input.ray_origin.is_finite() || range <= 0.0 {
            return Self::NONE;
        }
        Self {
            ray_origin: input.ray_origin,
            ray_direction: direction,
            force,
            range,
        }
    }

    /// Falloff weight at `point`: `max(0, 1 - d / range)` for the distance
    /// `d` between the point and the ray.
    pub fn weight_at(&self, point: Vec3) -> f32 {
        if self.range <= 0.0 {
            return 0.0;
        }
        let rel = point - self.ray_origin;
        let t = rel.dot(self.ray_direction).max(0.0);
        let d = (rel - t * self.ray_direction).length();
        (1.0 - d / self.range).max(0.0)
    }
}
