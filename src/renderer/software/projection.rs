//! Screen ↔ angle mapping for the current view size.
//!
//! ─────────────────────────────────────────────────────────────────────────
//! Recomputed only when the view size or detail level changes; the per
//! frame camera state lives in [`Viewpoint`].
//! ─────────────────────────────────────────────────────────────────────────

use crate::config::RenderConfig;
use crate::fixed::{
    ANG90, ANGLETOFINESHIFT, Angle, FINEANGLES, FRACBITS, FRACUNIT, Fixed, fine, fixed_div,
    fixed_mul,
};
use crate::tables::{finecosine, finesine, finetangent};
use crate::world::camera::Camera;
use crate::world::texture::NUM_COLORMAP_TABLES;

/// Horizontal field of view in fine angles (90°).
pub const FIELDOFVIEW: usize = 2048;

/// Height the sky texture is authored for.
const SKY_BASE_HEIGHT: i64 = 200;

#[derive(Clone, Debug)]
pub struct Projection {
    /// Columns the drawers address (screen width >> detail shift).
    pub view_width: i32,
    pub view_height: i32,
    /// Framebuffer width in pixels.
    pub scaled_width: i32,
    pub detail_shift: i32,

    pub centerx: i32,
    pub centery: i32,
    pub centerxfrac: Fixed,
    pub centeryfrac: Fixed,
    pub projection: Fixed,

    /// View-relative angle of the left edge of every column, `view_width + 1`.
    pub xtoviewangle: Vec<Angle>,
    /// Column of every view-relative fine angle, `FINEANGLES / 2`.
    pub viewangletox: Vec<i32>,
    /// Half the horizontal field of view.
    pub clipangle: Angle,

    /// Row → plane distance factor.
    pub yslope: Vec<Fixed>,
    /// Column → 1/cos of its view angle.
    pub distscale: Vec<Fixed>,

    /// Vertical texel step of the sky.
    pub sky_iscale: Fixed,
}

impl Projection {
    pub fn new(cfg: &RenderConfig) -> Self {
        let detail_shift = cfg.detail.shift();
        let scaled_width = cfg.width as i32;
        let view_width = scaled_width >> detail_shift;
        let view_height = cfg.height as i32;

        let centerx = view_width / 2;
        let centery = view_height / 2;
        let centerxfrac = centerx << FRACBITS;
        let centeryfrac = centery << FRACBITS;

        let (viewangletox, xtoviewangle) = Self::texture_mapping(view_width, centerxfrac);

        let yslope = (0..view_height)
            .map(|i| {
                let dy = (((i - view_height / 2) << FRACBITS) + FRACUNIT / 2).abs();
                fixed_div((view_width << detail_shift) / 2 * FRACUNIT, dy)
            })
            .collect();

        let distscale = (0..view_width as usize)
            .map(|x| {
                let cosadj = finecosine(fine(xtoviewangle[x])).abs();
                fixed_div(FRACUNIT, cosadj)
            })
            .collect();

        Self {
            view_width,
            view_height,
            scaled_width,
            detail_shift,
            centerx,
            centery,
            centerxfrac,
            centeryfrac,
            projection: centerxfrac,
            clipangle: xtoviewangle[0],
            xtoviewangle,
            viewangletox,
            yslope,
            distscale,
            sky_iscale: ((FRACUNIT as i64 * SKY_BASE_HEIGHT) / view_height as i64) as Fixed,
        }
    }

    /// Build both directions of the column ↔ angle map.
    fn texture_mapping(view_width: i32, centerxfrac: Fixed) -> (Vec<i32>, Vec<Angle>) {
        let focallength = fixed_div(centerxfrac, finetangent(FINEANGLES / 4 + FIELDOFVIEW / 2));

        let mut viewangletox: Vec<i32> = (0..FINEANGLES / 2)
            .map(|i| {
                let tan = finetangent(i);
                if tan > FRACUNIT * 2 {
                    -1
                } else if tan < -FRACUNIT * 2 {
                    view_width + 1
                } else {
                    let t = fixed_mul(tan, focallength);
                    ((centerxfrac - t + FRACUNIT - 1) >> FRACBITS).clamp(-1, view_width + 1)
                }
            })
            .collect();

        // viewangletox never increases, so the first angle landing at or
        // left of `x` is a partition point
        let xtoviewangle = (0..=view_width)
            .map(|x| {
                let i = viewangletox.partition_point(|&t| t > x);
                ((i as u32) << ANGLETOFINESHIFT).wrapping_sub(ANG90)
            })
            .collect();

        // fence-posts at the edges of the view
        for t in viewangletox.iter_mut() {
            if *t == -1 {
                *t = 0;
            } else if *t == view_width + 1 {
                *t = view_width;
            }
        }
        (viewangletox, xtoviewangle)
    }

    /// Wall scale at screen angle `visangle` for a wall whose normal is
    /// `normal_angle` and whose perpendicular distance is `distance`.
    pub fn scale_from_global_angle(
        &self,
        visangle: Angle,
        view_angle: Angle,
        normal_angle: Angle,
        distance: Fixed,
        max_scale: Fixed,
    ) -> Fixed {
        let anglea = ANG90.wrapping_add(visangle.wrapping_sub(view_angle));
        let angleb = ANG90.wrapping_add(visangle.wrapping_sub(normal_angle));
        let sinea = finesine(fine(anglea));
        let sineb = finesine(fine(angleb));

        let num = fixed_mul(self.projection, sineb) << self.detail_shift;
        let den = fixed_mul(distance, sinea);

        if den > num >> FRACBITS {
            fixed_div(num, den).clamp(256, max_scale)
        } else {
            max_scale
        }
    }
}

/// `(max_scale, height_bits)` by `log2(sector height >> 7)`.
const PRECISION_TABLE: [(i32, i32); 9] = [
    (2048, 12),
    (1024, 12),
    (1024, 11),
    (512, 11),
    (512, 10),
    (256, 10),
    (256, 9),
    (128, 9),
    (64, 9),
];

/// Scale clamp and fractional precision of the wall height trackers.
///
/// Tall sectors multiply large heights by the scale, so they get a lower
/// clamp and fewer fraction bits to stay inside 32 bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WallPrecision {
    pub max_scale: Fixed,
    pub height_bits: i32,
}

impl WallPrecision {
    pub fn for_height(height: Fixed) -> Self {
        let mut h = (height >> FRACBITS).max(1) >> 7;
        let mut idx = 0;
        loop {
            h >>= 1;
            if h == 0 {
                break;
            }
            idx += 1;
        }
        let (scale, bits) = PRECISION_TABLE[idx.min(PRECISION_TABLE.len() - 1)];
        Self {
            max_scale: scale * FRACUNIT,
            height_bits: bits,
        }
    }

    #[inline]
    pub fn height_unit(&self) -> i32 {
        1 << self.height_bits
    }

    /// Shift from 16.16 to the tracker's fixed format.
    #[inline]
    pub fn inv_bits(&self) -> i32 {
        FRACBITS - self.height_bits
    }
}

/// Camera state frozen for one frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct Viewpoint {
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    pub angle: Angle,
    pub sin: Fixed,
    pub cos: Fixed,
    pub extra_light: i32,
    pub fixed_colormap: Option<u8>,
}

/// Out-of-range fixed colormaps fall back to the last table.
fn clamp_colormap(map: u8) -> u8 {
    let last = (NUM_COLORMAP_TABLES - 1) as u8;
    if map > last {
        log::warn!("fixed colormap {map} out of range, using {last}");
        last
    } else {
        map
    }
}

impl From<&Camera> for Viewpoint {
    fn from(cam: &Camera) -> Self {
        let i = fine(cam.angle);
        Self {
            x: cam.x,
            y: cam.y,
            z: cam.z,
            angle: cam.angle,
            sin: finesine(i),
            cos: finecosine(i),
            extra_light: cam.extra_light,
            fixed_colormap: cam.fixed_colormap.map(clamp_colormap),
        }
    }
}
