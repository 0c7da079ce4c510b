//! Distance lighting: which colormap a texel at some depth goes through.

use crate::fixed::{FRACUNIT, Fixed, fixed_div};
use crate::renderer::software::projection::Projection;

pub const LIGHTLEVELS: usize = 16;
pub const LIGHTSEGSHIFT: i32 = 4;
pub const MAXLIGHTSCALE: usize = 48;
pub const LIGHTSCALESHIFT: i32 = 12;
pub const MAXLIGHTZ: usize = 128;
pub const LIGHTZSHIFT: i32 = 20;
pub const NUMCOLORMAPS: i32 = 32;
const DISTMAP: i32 = 2;

/// Width the falloff curves were tuned at.
const BASE_WIDTH: i32 = 320;

/// Colormap index of the shadow (fuzz) effect.
pub const FUZZ_COLORMAP: u8 = 6;

#[derive(Clone, Debug)]
pub struct LightTables {
    /// Walls and sprites, indexed by scale.
    scalelight: Vec<[u8; MAXLIGHTSCALE]>,
    /// Floors and ceilings, indexed by distance.
    zlight: Vec<[u8; MAXLIGHTZ]>,
}

#[inline]
fn start_map(level: usize) -> i32 {
    ((LIGHTLEVELS - 1 - level) as i32 * 2) * NUMCOLORMAPS / LIGHTLEVELS as i32
}

impl LightTables {
    pub fn new(proj: &Projection) -> Self {
        let full_width = proj.view_width << proj.detail_shift;

        let scalelight = (0..LIGHTLEVELS)
            .map(|level| {
                let start = start_map(level);
                let mut row = [0u8; MAXLIGHTSCALE];
                for (j, out) in row.iter_mut().enumerate() {
                    let step = (j as i32 * BASE_WIDTH) / full_width / DISTMAP;
                    *out = (start - step).clamp(0, NUMCOLORMAPS - 1) as u8;
                }
                row
            })
            .collect();

        let zlight = (0..LIGHTLEVELS)
            .map(|level| {
                let start = start_map(level);
                let mut row = [0u8; MAXLIGHTZ];
                for (j, out) in row.iter_mut().enumerate() {
                    let scale = fixed_div(BASE_WIDTH / 2 * FRACUNIT, ((j + 1) as i32) << LIGHTZSHIFT)
                        >> LIGHTSCALESHIFT;
                    *out = (start - scale / DISTMAP).clamp(0, NUMCOLORMAPS - 1) as u8;
                }
                row
            })
            .collect();

        Self { scalelight, zlight }
    }

    /// Light bucket of a sector light plus bonuses.
    #[inline]
    pub fn level(sector_light: i16, extra_light: i32, contrast: i32) -> usize {
        ((sector_light as i32 >> LIGHTSEGSHIFT) + extra_light + contrast)
            .clamp(0, LIGHTLEVELS as i32 - 1) as usize
    }

    /// Colormap for a wall column or sprite at `scale`.
    #[inline]
    pub fn scaled(&self, level: usize, scale: Fixed) -> u8 {
        let idx = ((scale >> LIGHTSCALESHIFT).max(0) as usize).min(MAXLIGHTSCALE - 1);
        self.scalelight[level][idx]
    }

    /// Colormap for a plane span at `distance`.
    #[inline]
    pub fn by_distance(&self, level: usize, distance: Fixed) -> u8 {
        let idx = ((distance >> LIGHTZSHIFT).max(0) as usize).min(MAXLIGHTZ - 1);
        self.zlight[level][idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Detail, RenderConfig};
    use crate::fixed::from_int;

    fn tables(detail: Detail) -> LightTables {
        LightTables::new(&Projection::new(
            &RenderConfig::new(320, 200, detail).unwrap(),
        ))
    }

    #[test]
    fn nearer_is_brighter() {
        let lt = tables(Detail::High);
        let level = LightTables::level(144, 0, 0);
        let near = lt.scaled(level, from_int(4));
        let far = lt.scaled(level, FRACUNIT / 8);
        assert!(near < far, "lower colormap index = brighter ({near} vs {far})");

        let near = lt.by_distance(level, from_int(32));
        let far = lt.by_distance(level, from_int(1500));
        assert!(near < far);
    }

    #[test]
    fn buckets_clamp() {
        let lt = tables(Detail::High);
        assert_eq!(LightTables::level(255, 3, 1), LIGHTLEVELS - 1);
        assert_eq!(LightTables::level(0, 0, -1), 0);
        // absurd inputs land on the last bucket instead of panicking
        assert_eq!(lt.scaled(0, i32::MAX), lt.scaled(0, from_int(1000)));
        assert_eq!(lt.by_distance(0, -5), lt.by_distance(0, 0));
    }

    #[test]
    fn fully_dark_sector_stays_dark() {
        let lt = tables(Detail::Low);
        assert_eq!(lt.scaled(0, FRACUNIT), (NUMCOLORMAPS - 1) as u8);
    }
}
