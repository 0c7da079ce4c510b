//! Trigonometry lookup tables and the angle helpers built on them.
//!
//! ─────────────────────────────────────────────────────────────────────────
//! Tables are generated once on first access; afterwards everything is a
//! plain slice lookup.  The layout follows the classic engine so the usual
//! index arithmetic (`angle >> ANGLETOFINESHIFT`, `+ FINEANGLES/4` for cos)
//! carries over unchanged.
//! ─────────────────────────────────────────────────────────────────────────

use std::f64::consts::TAU;

use once_cell::sync::Lazy;

use crate::fixed::{
    ANG90, ANG180, ANG270, Angle, FINEANGLES, FRACBITS, FRACUNIT, Fixed, fixed_div, fixed_mul,
};

pub const SLOPERANGE: usize = 2048;
pub const SLOPEBITS: i32 = 11;
pub const DBITS: i32 = FRACBITS - SLOPEBITS;

/// Sine over 5/4 of a period, so cosine is a quarter-period offset into it.
static FINESINE: Lazy<Vec<Fixed>> = Lazy::new(|| {
    (0..FINEANGLES * 5 / 4)
        .map(|i| {
            let a = (i as f64 + 0.5) * TAU / FINEANGLES as f64;
            (a.sin() * FRACUNIT as f64) as Fixed
        })
        .collect()
});

/// Tangent over half a period, index 0 ≈ −90°, centre = 0°.
static FINETANGENT: Lazy<Vec<Fixed>> = Lazy::new(|| {
    (0..FINEANGLES / 2)
        .map(|i| {
            let a = (i as f64 - (FINEANGLES / 4) as f64 + 0.5) * TAU / FINEANGLES as f64;
            (a.tan() * FRACUNIT as f64) as Fixed
        })
        .collect()
});

/// `atan(i / SLOPERANGE)` as a binary angle, `0 ..= ANG45`.
static TANTOANGLE: Lazy<Vec<Angle>> = Lazy::new(|| {
    (0..=SLOPERANGE)
        .map(|i| {
            let a = (i as f64 / SLOPERANGE as f64).atan();
            (a / TAU * 4_294_967_296.0) as u64 as Angle
        })
        .collect()
});

#[inline(always)]
pub fn finesine(i: usize) -> Fixed {
    FINESINE[i]
}

#[inline(always)]
pub fn finecosine(i: usize) -> Fixed {
    FINESINE[i + FINEANGLES / 4]
}

#[inline(always)]
pub fn finetangent(i: usize) -> Fixed {
    FINETANGENT[i]
}

#[inline(always)]
pub fn tantoangle(i: usize) -> Angle {
    TANTOANGLE[i]
}

/// Slope `num/den` as an index into [`tantoangle`].
#[inline]
pub fn slope_div(num: u32, den: u32) -> usize {
    if den < 512 {
        return SLOPERANGE;
    }
    let ans = ((num as u64) << 3) / (den >> 8) as u64;
    (ans as usize).min(SLOPERANGE)
}

/// Angle of the vector `(dx, dy)`; 0 = east, counter-clockwise.
pub fn point_to_angle(dx: Fixed, dy: Fixed) -> Angle {
    if dx == 0 && dy == 0 {
        return 0;
    }
    let (ax, ay) = (dx.unsigned_abs(), dy.unsigned_abs());

    match (dx >= 0, dy >= 0) {
        (true, true) => {
            if ax > ay {
                tantoangle(slope_div(ay, ax))
            } else {
                ANG90 - 1 - tantoangle(slope_div(ax, ay))
            }
        }
        (true, false) => {
            if ax > ay {
                tantoangle(slope_div(ay, ax)).wrapping_neg()
            } else {
                ANG270 + tantoangle(slope_div(ax, ay))
            }
        }
        (false, true) => {
            if ax > ay {
                ANG180 - 1 - tantoangle(slope_div(ay, ax))
            } else {
                ANG90 + tantoangle(slope_div(ax, ay))
            }
        }
        (false, false) => {
            if ax > ay {
                ANG180 + tantoangle(slope_div(ay, ax))
            } else {
                ANG270 - 1 - tantoangle(slope_div(ax, ay))
            }
        }
    }
}

/// Euclidean length of `(dx, dy)` via the angle tables.
pub fn point_to_dist(dx: Fixed, dy: Fixed) -> Fixed {
    let (mut ax, mut ay) = (dx.unsigned_abs(), dy.unsigned_abs());
    if ay > ax {
        std::mem::swap(&mut ax, &mut ay);
    }
    if ax == 0 {
        return 0;
    }
    let (ax, ay) = (ax.min(i32::MAX as u32) as Fixed, ay.min(i32::MAX as u32) as Fixed);
    let slope = ((fixed_div(ay, ax) >> DBITS) as usize).min(SLOPERANGE);
    let angle = (tantoangle(slope).wrapping_add(ANG90)) >> crate::fixed::ANGLETOFINESHIFT;
    fixed_div(ax, finesine(angle as usize))
}

/// `true` when `(x, y)` lies on the back (left) side of the directed line
/// starting at `(lx, ly)` with direction `(ldx, ldy)`.
pub fn point_on_side(x: Fixed, y: Fixed, lx: Fixed, ly: Fixed, ldx: Fixed, ldy: Fixed) -> bool {
    if ldx == 0 {
        return if x <= lx { ldy > 0 } else { ldy < 0 };
    }
    if ldy == 0 {
        return if y <= ly { ldx < 0 } else { ldx > 0 };
    }

    let dx = x.wrapping_sub(lx);
    let dy = y.wrapping_sub(ly);

    // signs alone decide it
    if (ldy ^ ldx ^ dx ^ dy) < 0 {
        return (ldy ^ dx) < 0;
    }

    let left = fixed_mul(ldy >> FRACBITS, dx);
    let right = fixed_mul(dy, ldx >> FRACBITS);
    right >= left
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::{ANG45, FINEMASK, from_int};

    #[test]
    fn sine_and_cosine_quadrants() {
        assert!(finesine(0).abs() < 64, "sin(0) ≈ 0");
        assert!((finesine(FINEANGLES / 4) - FRACUNIT).abs() < 64, "sin(90°) ≈ 1");
        assert!((finecosine(0) - FRACUNIT).abs() < 64, "cos(0) ≈ 1");
        assert!(finecosine(FINEMASK).abs() <= FRACUNIT, "last cosine index is valid");
    }

    #[test]
    fn tangent_is_centred() {
        let mid = FINEANGLES / 4;
        assert!(finetangent(mid - 1) < 0 && finetangent(mid) > 0);
        assert!(finetangent(mid).abs() < 64, "tan(≈0) ≈ 0");
    }

    #[test]
    fn point_to_angle_axes() {
        assert_eq!(point_to_angle(from_int(10), 0), 0);
        assert!(point_to_angle(0, from_int(10)).abs_diff(ANG90) < 2);
        assert!(point_to_angle(from_int(-10), 0).abs_diff(ANG180) < 2);
        assert!(point_to_angle(0, from_int(-10)).abs_diff(ANG270) < 2);
        let diag = point_to_angle(from_int(5), from_int(5));
        assert!(diag.abs_diff(ANG45) < 1 << 20, "diagonal ≈ 45°, got {diag:#x}");
    }

    #[test]
    fn point_to_dist_pythagoras() {
        let d = point_to_dist(from_int(3), from_int(-4));
        assert!((d - from_int(5)).abs() < FRACUNIT / 64, "3-4-5 triangle, got {d}");
        assert_eq!(point_to_dist(0, 0), 0);
    }

    #[test]
    fn side_test_matches_cross_product() {
        // line along +x: left (+y) is the back side
        let (lx, ly, ldx, ldy) = (0, 0, from_int(64), 0);
        assert!(point_on_side(from_int(5), from_int(3), lx, ly, ldx, ldy));
        assert!(!point_on_side(from_int(5), from_int(-3), lx, ly, ldx, ldy));

        // general direction takes the multiply path
        let (ldx, ldy) = (from_int(64), from_int(32));
        assert!(point_on_side(0, from_int(10), lx, ly, ldx, ldy));
        assert!(!point_on_side(from_int(10), 0, lx, ly, ldx, ldy));
    }
}
