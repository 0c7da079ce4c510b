//! 16.16 fixed-point numbers and binary angles.
//!
//! Everything the rasterizer touches per pixel is integer math. Floats only
//! appear at the API boundary (map units coming from tools, the camera
//! constructor) and in the one-off table generators.

/// 16.16 signed fixed-point value.
pub type Fixed = i32;

/// Binary angle measurement: the full circle maps onto `0 ..= u32::MAX`.
pub type Angle = u32;

pub const FRACBITS: i32 = 16;
pub const FRACUNIT: Fixed = 1 << FRACBITS;

pub const ANG45: Angle = 0x2000_0000;
pub const ANG90: Angle = 0x4000_0000;
pub const ANG180: Angle = 0x8000_0000;
pub const ANG270: Angle = 0xC000_0000;

pub const FINEANGLES: usize = 8192;
pub const FINEMASK: usize = FINEANGLES - 1;
pub const ANGLETOFINESHIFT: u32 = 19;

/// Multiply two fixed values, keeping the full 64-bit product.
#[inline(always)]
pub fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    ((a as i64 * b as i64) >> FRACBITS) as Fixed
}

/// Divide two fixed values, saturating instead of overflowing.
///
/// A zero divisor falls into the saturating branch as well.
#[inline]
pub fn fixed_div(a: Fixed, b: Fixed) -> Fixed {
    if (a.unsigned_abs() >> 14) >= b.unsigned_abs() {
        if (a ^ b) < 0 { i32::MIN } else { i32::MAX }
    } else {
        (((a as i64) << FRACBITS) / b as i64) as Fixed
    }
}

/// Fine-table index of a binary angle.
#[inline(always)]
pub fn fine(angle: Angle) -> usize {
    (angle >> ANGLETOFINESHIFT) as usize
}

#[inline(always)]
pub const fn from_int(v: i32) -> Fixed {
    v << FRACBITS
}

/// Map units (floats) → fixed. Only for setup code.
#[inline]
pub fn from_f32(v: f32) -> Fixed {
    (v * FRACUNIT as f32) as Fixed
}

#[inline]
pub fn to_f32(v: Fixed) -> f32 {
    v as f32 / FRACUNIT as f32
}

/// Radians (0 = east, counter-clockwise) → binary angle.
pub fn angle_from_radians(rad: f32) -> Angle {
    let turns = (rad as f64 / std::f64::consts::TAU).rem_euclid(1.0);
    (turns * 4_294_967_296.0) as u64 as Angle
}

pub fn angle_to_radians(angle: Angle) -> f32 {
    (angle as f64 / 4_294_967_296.0 * std::f64::consts::TAU) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_keeps_fraction() {
        assert_eq!(fixed_mul(FRACUNIT / 2, from_int(6)), from_int(3));
        assert_eq!(fixed_mul(-FRACUNIT, from_int(7)), from_int(-7));
    }

    #[test]
    fn div_saturates_on_overflow_and_zero() {
        assert_eq!(fixed_div(from_int(1), from_int(4)), FRACUNIT / 4);
        assert_eq!(fixed_div(from_int(100), 0), i32::MAX);
        assert_eq!(fixed_div(from_int(-100), 0), i32::MIN, "sign follows a ^ b");
        assert_eq!(fixed_div(i32::MIN, 1), i32::MIN, "no abs() overflow");
    }

    #[test]
    fn radians_round_trip_to_quadrants() {
        assert_eq!(angle_from_radians(0.0), 0);
        let right = angle_from_radians(std::f32::consts::FRAC_PI_2);
        assert!(right.abs_diff(ANG90) < 256, "90° should be ANG90, got {right:#x}");
        let back = angle_from_radians(-std::f32::consts::FRAC_PI_2);
        assert!(back.abs_diff(ANG270) < 256, "-90° wraps to ANG270, got {back:#x}");
    }
}
