//! Column and span drawers: the only code that writes framebuffer pixels.
//!
//! The blend mode is picked once per column (or once per sprite by the
//! caller) through [`BlendMode`]; each arm then runs its own tight loop.

use crate::fixed::{FRACBITS, Fixed};
use crate::renderer::software::Framebuffer;
use crate::renderer::software::lighting::FUZZ_COLORMAP;
use crate::world::texture::{Brightmap, Post, Texture, TextureBank};

/// How a column combines with what is already on screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    #[default]
    Opaque,
    /// Fuzz: darkens the neighbouring destination pixels, ignores texels.
    Shadow,
    /// 50 % mix with the destination.
    Translucent,
    Additive,
    /// Remap source indices through translation table `n` first.
    Translated(u8),
}

/// Colormaps used for a run: `lit` for ordinary texels, `bright` for texels
/// the brightmap flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LightPair {
    pub lit: u8,
    pub bright: u8,
}

impl LightPair {
    #[inline]
    pub fn lit(map: u8) -> Self {
        Self { lit: map, bright: 0 }
    }

    /// Fixed colormap: brightmaps have no effect.
    #[inline]
    pub fn fixed(map: u8) -> Self {
        Self {
            lit: map,
            bright: map,
        }
    }
}

/*──────────────────────────── texel stepping ─────────────────────────*/

#[derive(Clone, Copy, Debug)]
enum Wrap {
    /// Power-of-two height.
    Mask(i32),
    /// Any other height: `H << FRACBITS`.
    Modulo(i64),
    /// Masked post, never tiles: last valid index.
    Clamp(i32),
}

/// Walks a fixed-point texel offset down a column, wrapping at the
/// texture's natural height.
#[derive(Clone, Copy, Debug)]
pub struct TexelStepper {
    frac: Fixed,
    step: Fixed,
    wrap: Wrap,
}

impl TexelStepper {
    /// `tex_height <= 0` marks a post that must not wrap; `len` bounds it.
    pub fn new(frac: i64, step: Fixed, tex_height: i32, len: usize) -> Self {
        let wrap = if tex_height <= 0 {
            Wrap::Clamp(len as i32 - 1)
        } else if (tex_height as u32).is_power_of_two() {
            Wrap::Mask(tex_height - 1)
        } else {
            Wrap::Modulo((tex_height as i64) << FRACBITS)
        };
        let frac = match wrap {
            Wrap::Clamp(_) => frac.clamp(i32::MIN as i64, i32::MAX as i64) as Fixed,
            _ => frac.rem_euclid((tex_height as i64) << FRACBITS) as Fixed,
        };
        Self { frac, step, wrap }
    }

    #[inline(always)]
    pub fn frac(&self) -> Fixed {
        self.frac
    }

    /// Texel row for the current pixel, then advance one pixel.
    #[inline(always)]
    pub fn next_row(&mut self) -> usize {
        let row = self.frac >> FRACBITS;
        match self.wrap {
            Wrap::Mask(m) => {
                self.frac = self.frac.wrapping_add(self.step);
                (row & m) as usize
            }
            Wrap::Modulo(h) => {
                let f = self.frac as i64 + self.step as i64;
                self.frac = if (0..h).contains(&f) { f } else { f.rem_euclid(h) } as Fixed;
                row as usize
            }
            Wrap::Clamp(max) => {
                self.frac = self.frac.saturating_add(self.step);
                row.clamp(0, max.max(0)) as usize
            }
        }
    }
}

/*─────────────────────────────── columns ─────────────────────────────*/

/// One vertical run.
pub struct ColumnParams<'a> {
    /// View column (before the detail shift).
    pub x: i32,
    pub yl: i32,
    pub yh: i32,
    pub iscale: Fixed,
    pub texturemid: Fixed,
    pub source: &'a [u8],
    /// Natural tiling height; 0 for a masked post.
    pub tex_height: i32,
    pub light: LightPair,
    pub brightmap: &'a Brightmap,
}

const FUZZTABLE: usize = 50;

#[rustfmt::skip]
const FUZZOFFSET: [i8; FUZZTABLE] = [
    1, -1, 1, -1, 1, 1, -1,
    1, 1, -1, 1, 1, 1, -1,
    1, 1, 1, -1, -1, -1, -1,
    1, -1, -1, 1, 1, 1, 1, -1,
    1, -1, 1, 1, -1, -1, 1,
    1, -1, -1, -1, -1, 1, 1,
    1, 1, -1, 1, 1, -1, 1,
];

/// Draw `dc` with blend `mode`.  Requests outside the view are clipped,
/// never written out of bounds.
pub fn draw_column(fb: &mut Framebuffer, bank: &TextureBank, dc: &ColumnParams, mode: BlendMode) {
    if dc.source.is_empty() {
        log::warn!("column x={} has no texels, skipped", dc.x);
        return;
    }
    if dc.x < 0 || dc.x >= fb.view_width {
        log::warn!("column x={} outside the view, skipped", dc.x);
        return;
    }
    let mut yl = dc.yl.max(0);
    let mut yh = dc.yh.min(fb.height as i32 - 1);
    if mode == BlendMode::Shadow {
        // fuzz reads one row above and below
        yl = yl.max(1);
        yh = yh.min(fb.height as i32 - 2);
    }
    if yl > yh {
        return;
    }

    let frac = dc.texturemid as i64 + (yl - fb.centery) as i64 * dc.iscale as i64;
    let mut texel = TexelStepper::new(frac, dc.iscale, dc.tex_height, dc.source.len());

    let cm = bank.colormap();
    let maps = [&cm[dc.light.lit as usize], &cm[dc.light.bright as usize]];
    let bm = dc.brightmap;
    let src = dc.source;
    let width = fb.width;
    let px = (dc.x << fb.detail_shift) as usize;
    let span = 1usize << fb.detail_shift;

    match mode {
        BlendMode::Opaque => {
            for y in yl..=yh {
                let s = src[texel.next_row()] as usize;
                let c = maps[(bm[s] != 0) as usize][s];
                let at = y as usize * width + px;
                fb.pixels[at..at + span].fill(c);
            }
        }
        BlendMode::Translated(t) => {
            let tr = bank.translation(t);
            for y in yl..=yh {
                let s = src[texel.next_row()] as usize;
                let c = maps[(bm[s] != 0) as usize][tr[s] as usize];
                let at = y as usize * width + px;
                fb.pixels[at..at + span].fill(c);
            }
        }
        BlendMode::Translucent => {
            let blend = bank.blend();
            for y in yl..=yh {
                let s = src[texel.next_row()] as usize;
                let c = maps[(bm[s] != 0) as usize][s];
                let at = y as usize * width + px;
                for p in &mut fb.pixels[at..at + span] {
                    *p = blend.translucent(*p, c);
                }
            }
        }
        BlendMode::Additive => {
            let blend = bank.blend();
            for y in yl..=yh {
                let s = src[texel.next_row()] as usize;
                let c = maps[(bm[s] != 0) as usize][s];
                let at = y as usize * width + px;
                for p in &mut fb.pixels[at..at + span] {
                    *p = blend.additive(*p, c);
                }
            }
        }
        BlendMode::Shadow => {
            let dark = &cm[FUZZ_COLORMAP as usize];
            for y in yl..=yh {
                let at = y as usize * width + px;
                let from = (at as isize + FUZZOFFSET[fb.fuzz_pos] as isize * width as isize) as usize;
                let c = dark[fb.pixels[from] as usize];
                fb.pixels[at..at + span].fill(c);
                fb.fuzz_pos = (fb.fuzz_pos + 1) % FUZZTABLE;
            }
        }
    }
}

/// One texture column with holes, projected at `spryscale` and clipped
/// to the open rows between `ceiling_clip` and `floor_clip` (exclusive).
pub struct MaskedColumn<'a> {
    pub x: i32,
    /// Whole texture column; `posts` index into it.
    pub texels: &'a [u8],
    pub posts: &'a [Post],
    /// Screen row (fixed) of texel row 0.
    pub sprtopscreen: Fixed,
    pub spryscale: Fixed,
    pub texturemid: Fixed,
    pub iscale: Fixed,
    pub ceiling_clip: i32,
    pub floor_clip: i32,
    pub light: LightPair,
    pub brightmap: &'a Brightmap,
}

/// Draw every post of a masked column.  Posts never wrap.
pub fn draw_masked_column(fb: &mut Framebuffer, bank: &TextureBank, mc: &MaskedColumn, mode: BlendMode) {
    let base = mc.sprtopscreen as i64;
    let scale = mc.spryscale as i64;
    let unit = 1i64 << FRACBITS;

    for post in mc.posts {
        let top = base + scale * post.top as i64;
        let bottom = top + scale * post.len as i64;
        let yl = ((top + unit - 1) >> FRACBITS).max(mc.ceiling_clip as i64 + 1);
        let yh = ((bottom - 1) >> FRACBITS).min(mc.floor_clip as i64 - 1);
        if yl > yh {
            continue;
        }
        let end = (post.top as usize + post.len as usize).min(mc.texels.len());
        let Some(source) = mc.texels.get(post.top as usize..end) else {
            continue;
        };
        draw_column(
            fb,
            bank,
            &ColumnParams {
                x: mc.x,
                yl: yl as i32,
                yh: yh as i32,
                iscale: mc.iscale,
                texturemid: mc.texturemid.wrapping_sub((post.top as Fixed) << FRACBITS),
                source,
                tex_height: 0,
                light: mc.light,
                brightmap: mc.brightmap,
            },
            mode,
        );
    }
}

/*──────────────────────────────── spans ──────────────────────────────*/

/// One horizontal run of a floor or ceiling.
pub struct SpanParams<'a> {
    pub y: i32,
    pub x1: i32,
    pub x2: i32,
    pub xfrac: Fixed,
    pub yfrac: Fixed,
    pub xstep: Fixed,
    pub ystep: Fixed,
    pub flat: &'a Texture,
    pub light: LightPair,
    pub brightmap: &'a Brightmap,
}

pub fn draw_span(fb: &mut Framebuffer, bank: &TextureBank, ds: &SpanParams) {
    if ds.y < 0 || ds.y >= fb.height as i32 || ds.flat.pixels.is_empty() {
        return;
    }
    let x1 = ds.x1.max(0);
    let x2 = ds.x2.min(fb.view_width - 1);
    if x1 > x2 {
        return;
    }

    let skip = x1 - ds.x1;
    let mut xfrac = ds.xfrac.wrapping_add(ds.xstep.wrapping_mul(skip));
    let mut yfrac = ds.yfrac.wrapping_add(ds.ystep.wrapping_mul(skip));

    let cm = bank.colormap();
    let maps = [&cm[ds.light.lit as usize], &cm[ds.light.bright as usize]];
    let bm = ds.brightmap;
    let (w, h) = (ds.flat.w as i32, ds.flat.h as i32);
    let pow2 = ds.flat.w.is_power_of_two() && ds.flat.h.is_power_of_two();
    let span = 1usize << fb.detail_shift;
    let row = ds.y as usize * fb.width;

    for x in x1..=x2 {
        let (u, v) = (xfrac >> FRACBITS, yfrac >> FRACBITS);
        let (u, v) = if pow2 {
            (u & (w - 1), v & (h - 1))
        } else {
            (u.rem_euclid(w), v.rem_euclid(h))
        };
        let s = ds.flat.pixels[(u * h + v) as usize] as usize;
        let c = maps[(bm[s] != 0) as usize][s];
        let at = row + ((x as usize) << fb.detail_shift);
        fb.pixels[at..at + span].fill(c);

        xfrac = xfrac.wrapping_add(ds.xstep);
        yfrac = yfrac.wrapping_add(ds.ystep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Detail, RenderConfig};
    use crate::fixed::FRACUNIT;
    use crate::renderer::software::projection::Projection;
    use crate::world::texture::{Colormap, NO_BRIGHTMAP};

    fn framebuffer(detail: Detail) -> Framebuffer {
        let cfg = RenderConfig::new(32, 20, detail).unwrap();
        Framebuffer::new(&Projection::new(&cfg))
    }

    /// Colormap 3 adds 100 to every index; 0 is identity.
    fn bank() -> TextureBank {
        let mut bank = TextureBank::default_with_checker();
        let mut cm = Colormap::identity();
        for i in 0..156 {
            cm[3][i] = i as u8 + 100;
        }
        bank.set_colormap(cm);
        bank
    }

    fn column<'a>(src: &'a [u8], x: i32, yl: i32, yh: i32) -> ColumnParams<'a> {
        ColumnParams {
            x,
            yl,
            yh,
            iscale: FRACUNIT,
            texturemid: 0,
            source: src,
            tex_height: src.len() as i32,
            light: LightPair::lit(0),
            brightmap: &NO_BRIGHTMAP,
        }
    }

    /// Regression test for the "tutti-frutti" bug: non power-of-two
    /// heights must wrap by modulo, never by mask.
    #[test]
    fn modulo_wrap_stays_in_range() {
        for &h in &[100, 72, 3, 129] {
            let limit = (h as i64) << FRACBITS;
            for &start in &[-(7 << FRACBITS) - 3, 0, 12345, (h << FRACBITS) * 5 + 17] {
                for &step in &[FRACUNIT / 3, FRACUNIT, 5 * FRACUNIT + 11, 300 * FRACUNIT] {
                    let mut t = TexelStepper::new(start as i64, step, h, h as usize);
                    for _ in 0..1000 {
                        let f = t.frac() as i64;
                        assert!(
                            (0..limit).contains(&f),
                            "frac {f} escaped [0, {limit}) for h={h}"
                        );
                        assert!(t.next_row() < h as usize);
                    }
                }
            }
        }
    }

    #[test]
    fn power_of_two_wraps_by_mask() {
        let mut t = TexelStepper::new(-(FRACUNIT as i64), FRACUNIT, 8, 8);
        let rows: Vec<_> = (0..10).map(|_| t.next_row()).collect();
        assert_eq!(rows, vec![7, 0, 1, 2, 3, 4, 5, 6, 7, 0]);
    }

    #[test]
    fn posts_clamp_instead_of_wrapping() {
        let mut t = TexelStepper::new(-(FRACUNIT as i64) * 3, FRACUNIT * 2, 0, 4);
        let rows: Vec<_> = (0..6).map(|_| t.next_row()).collect();
        assert_eq!(rows, vec![0, 0, 1, 3, 3, 3]);
    }

    #[test]
    fn opaque_column_is_clipped_to_screen() {
        let mut fb = framebuffer(Detail::High);
        let bank = bank();
        let src: Vec<u8> = (0..64).collect();
        draw_column(&mut fb, &bank, &column(&src, 5, -10, 100), BlendMode::Opaque);

        // texturemid 0 at centery 10: row y shows texel y - 10 (mod 64)
        assert_eq!(fb.pixels[5], 54);
        assert_eq!(fb.pixels[10 * 32 + 5], 0);
        assert_eq!(fb.pixels[19 * 32 + 5], 9);

        // off-screen x is a no-op
        let before = fb.pixels.clone();
        draw_column(&mut fb, &bank, &column(&src, 32, 0, 19), BlendMode::Opaque);
        draw_column(&mut fb, &bank, &column(&src, -1, 0, 19), BlendMode::Opaque);
        assert_eq!(fb.pixels, before);
    }

    #[test]
    fn empty_source_is_skipped() {
        let mut fb = framebuffer(Detail::High);
        let bank = bank();
        let mut dc = column(&[], 5, 0, 19);
        dc.tex_height = 64;
        draw_column(&mut fb, &bank, &dc, BlendMode::Opaque);
        assert!(fb.pixels.iter().all(|&p| p == 0));
    }

    #[test]
    fn brightmap_picks_bright_colormap_per_texel() {
        let mut fb = framebuffer(Detail::High);
        let bank = bank();
        let src = [1u8, 2];
        let mut bm = NO_BRIGHTMAP;
        bm[2] = 1;
        let mut dc = column(&src, 0, 10, 11);
        dc.light = LightPair::lit(3);
        dc.brightmap = &bm;
        draw_column(&mut fb, &bank, &dc, BlendMode::Opaque);
        assert_eq!(fb.pixels[10 * 32], 101, "texel 1 goes through the lit map");
        assert_eq!(fb.pixels[11 * 32], 2, "texel 2 is full bright");
    }

    #[test]
    fn translation_remaps_before_lighting() {
        let mut fb = framebuffer(Detail::High);
        let bank = bank();
        let src = [0x72u8];
        draw_column(&mut fb, &bank, &column(&src, 1, 10, 10), BlendMode::Translated(2));
        assert_eq!(fb.pixels[10 * 32 + 1], 0x22);
    }

    #[test]
    fn low_detail_doubles_pixels() {
        let mut fb = framebuffer(Detail::Low);
        let bank = bank();
        let src = [9u8; 4];
        draw_column(&mut fb, &bank, &column(&src, 3, 0, 19), BlendMode::Opaque);
        for y in 0..20 {
            assert_eq!(&fb.pixels[y * 32 + 6..y * 32 + 8], &[9, 9], "row {y}");
        }
        assert_eq!(fb.pixels[8], 0);
    }

    #[test]
    fn masked_column_skips_holes_and_respects_clips() {
        let mut fb = framebuffer(Detail::High);
        let bank = bank();
        // rows 0..2 solid, 2..4 hole, 4..6 solid
        let tex = Texture::masked("GRATE", 1, 6, vec![7, 7, 0, 0, 7, 7], 0);
        let mc = MaskedColumn {
            x: 2,
            texels: tex.column(0),
            posts: tex.posts(0),
            sprtopscreen: 4 * FRACUNIT,
            spryscale: FRACUNIT,
            texturemid: 6 * FRACUNIT,
            iscale: FRACUNIT,
            ceiling_clip: -1,
            floor_clip: 9,
            light: LightPair::lit(0),
            brightmap: &NO_BRIGHTMAP,
        };
        draw_masked_column(&mut fb, &bank, &mc, BlendMode::Opaque);
        let col: Vec<u8> = (0..20).map(|y| fb.pixels[y * 32 + 2]).collect();
        assert_eq!(&col[3..10], &[0, 7, 7, 0, 0, 7, 0], "row 9 is clipped by the floor");
    }

    #[test]
    fn span_samples_flat_with_wrap() {
        let mut fb = framebuffer(Detail::High);
        let bank = bank();
        let flat = Texture::from_rows("F", 2, 2, &[10, 11, 12, 13]);
        draw_span(
            &mut fb,
            &bank,
            &SpanParams {
                y: 4,
                x1: -2,
                x2: 3,
                xfrac: 0,
                yfrac: FRACUNIT,
                xstep: FRACUNIT,
                ystep: 0,
                flat: &flat,
                light: LightPair::lit(0),
                brightmap: &NO_BRIGHTMAP,
            },
        );
        // clipped start skips two texels: x=0 samples u=2 → 0
        assert_eq!(&fb.pixels[4 * 32..4 * 32 + 4], &[12, 13, 12, 13]);
    }
}
