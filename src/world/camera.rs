use glam::{Vec2, Vec3};

use crate::fixed::{
    Angle, FRACUNIT, Fixed, angle_from_radians, angle_to_radians, fine, fixed_mul, from_f32,
    to_f32,
};
use crate::tables::{finecosine, finesine};

/// Player view-point in world space, fixed-point.
///
/// * Only **yaw** (heading) is simulated – Doom never tilts up/down.
/// * `z` is the absolute eye height (floor height + view height).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Camera {
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    /// 0 = east, counter-clockwise.
    pub angle: Angle,
    /// Muzzle-flash style light bonus, in light levels.
    pub extra_light: i32,
    /// Forces one colormap everywhere (invulnerability, light amp).
    /// Indices past the last table are clamped to it.
    pub fixed_colormap: Option<u8>,
}

impl Camera {
    pub fn new(x: Fixed, y: Fixed, z: Fixed, angle: Angle) -> Self {
        Self {
            x,
            y,
            z,
            angle,
            extra_light: 0,
            fixed_colormap: None,
        }
    }

    /// Build from map units: `pos.z` is the absolute eye height.
    pub fn from_map(pos: Vec3, yaw: f32) -> Self {
        Self::new(
            from_f32(pos.x),
            from_f32(pos.y),
            from_f32(pos.z),
            angle_from_radians(yaw),
        )
    }

    /// World-space eye position in map units.
    #[inline]
    pub fn pos(&self) -> Vec3 {
        Vec3::new(to_f32(self.x), to_f32(self.y), to_f32(self.z))
    }

    #[inline]
    pub fn yaw(&self) -> f32 {
        angle_to_radians(self.angle)
    }

    /*──────────────────────── derived vectors ───────────────────────*/

    /// Unit vector pointing where the camera looks on the X-Y plane.
    #[inline(always)]
    pub fn forward(&self) -> Vec2 {
        let i = fine(self.angle);
        Vec2::new(
            finecosine(i) as f32 / FRACUNIT as f32,
            finesine(i) as f32 / FRACUNIT as f32,
        )
    }

    /*──────────────────────── movement helpers ──────────────────────*/

    /// Move by `forward` and `side` (strafe right) map units.
    pub fn step(&mut self, forward: Fixed, side: Fixed) {
        let i = fine(self.angle);
        let (c, s) = (finecosine(i), finesine(i));
        self.x += fixed_mul(forward, c) + fixed_mul(side, s);
        self.y += fixed_mul(forward, s) - fixed_mul(side, c);
    }

    /// Rotate around Z-axis (positive = turn left).
    pub fn turn(&mut self, delta: Angle) {
        self.angle = self.angle.wrapping_add(delta);
    }

    pub fn turn_right(&mut self, delta: Angle) {
        self.angle = self.angle.wrapping_sub(delta);
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::{ANG90, from_int};
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn forward_is_unit_length() {
        let cam = Camera::from_map(Vec3::ZERO, 0.3);
        assert!((cam.forward().length() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn map_units_round_trip() {
        let cam = Camera::from_map(Vec3::new(96.0, -32.5, 41.0), FRAC_PI_2);
        assert_eq!(cam.x, from_int(96));
        assert_eq!(cam.y, -from_int(32) - FRACUNIT / 2);
        assert!((cam.pos() - Vec3::new(96.0, -32.5, 41.0)).length() < 1e-4);
        assert!(cam.angle.abs_diff(ANG90) < 256);
    }

    #[test]
    fn step_moves_along_heading() {
        let mut cam = Camera::new(0, 0, 0, ANG90); // facing north
        cam.step(from_int(10), 0);
        assert!(cam.x.abs() < FRACUNIT / 8, "no sideways drift: {}", cam.x);
        assert!((cam.y - from_int(10)).abs() < FRACUNIT / 8);

        // strafing right while facing north goes east
        cam.step(0, from_int(4));
        assert!((cam.x - from_int(4)).abs() < FRACUNIT / 8);
    }

    #[test]
    fn turning_wraps() {
        let mut cam = Camera::new(0, 0, 0, 0);
        cam.turn_right(ANG90);
        assert_eq!(cam.angle, 0u32.wrapping_sub(ANG90));
        cam.turn(ANG90);
        assert_eq!(cam.angle, 0);
    }
}
