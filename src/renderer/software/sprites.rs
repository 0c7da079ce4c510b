use bitflags::bitflags;

use crate::{
    fixed::{ANG45, FRACBITS, FRACUNIT, Fixed, fixed_div, fixed_mul},
    renderer::software::{
        Software,
        columns::{BlendMode, LightPair, MaskedColumn, draw_masked_column},
        lighting::LightTables,
    },
    tables::point_to_angle,
    world::{
        geometry::{Level, SectorId, SegmentId},
        scene::{FF_FRAMEMASK, FF_FULLBRIGHT, RenderFlags, TRANSLATION_SHIFT, Thing},
        texture::{TextureBank, TextureId},
    },
};

/// Nearest depth a sprite may have.
const MINZ: Fixed = FRACUNIT * 4;
/// Farthest depth whose scale is still meaningful.
const MAXZ: Fixed = FRACUNIT * 16384;

/// Marks a masked column as already drawn.
pub const MASKED_DONE: i16 = i16::MAX;

/*──────────────────────────── openings pool ──────────────────────────*/

/// Per-column clip values shared by every draw segment of a frame.
///
/// Hands out start offsets, never references, so growing the pool leaves
/// every earlier allocation valid.
#[derive(Default)]
pub struct Openings {
    pool: Vec<i16>,
    cursor: usize,
}

impl Openings {
    /// Reserve `len` consecutive slots and return the first one.
    pub fn alloc(&mut self, len: usize) -> usize {
        let start = self.cursor;
        self.cursor += len;

        if self.cursor > self.pool.len() {
            let grown = self.cursor.next_power_of_two();
            log::debug!("openings pool grew {} -> {}", self.pool.len(), grown);
            self.pool.resize(grown, 0);
        }
        start
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Slots handed out this frame.
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    #[inline(always)]
    pub fn get(&self, i: usize) -> i16 {
        self.pool[i]
    }

    #[inline(always)]
    pub fn set(&mut self, i: usize, v: i16) {
        self.pool[i] = v;
    }

    pub fn slice_mut(&mut self, start: usize, len: usize) -> &mut [i16] {
        &mut self.pool[start..start + len]
    }
}

/// Where a draw segment keeps one of its sprite clip arrays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClipColumns {
    #[default]
    None,
    /// Column `x` lives at `start + (x - x1)` in the openings pool.
    Openings { start: usize, x1: i32 },
    /// Everything clipped from above.
    ScreenHeight,
    /// Everything clipped from below.
    NegOne,
}

impl ClipColumns {
    #[inline]
    pub fn at(&self, openings: &Openings, x: i32, view_height: i32) -> Option<i16> {
        match *self {
            ClipColumns::None => None,
            ClipColumns::Openings { start, x1 } => Some(openings.get(start + (x - x1) as usize)),
            ClipColumns::ScreenHeight => Some(view_height as i16),
            ClipColumns::NegOne => Some(-1),
        }
    }
}

/*──────────────────────────── draw segments ──────────────────────────*/

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct Silhouette: u8 {
        const NONE   = 0x0000;
        const BOTTOM = 0x0001;
        const TOP    = 0x0002;
        const BOTH   = 0x0003;
    }
}

/// What a wall range left behind for the sprite pass.
#[derive(Clone, Copy, Debug)]
pub struct DrawSeg {
    pub seg: SegmentId,
    pub x1: i32,
    pub x2: i32,

    pub scale1: Fixed,
    pub scale2: Fixed,
    pub scale_step: Fixed,

    pub silhouette: Silhouette,
    /// Sprites with feet at or above this are not clipped from below.
    pub bsil_height: Fixed,
    /// Sprites with tops at or below this are not clipped from above.
    pub tsil_height: Fixed,

    pub top_clip: ClipColumns,
    pub bottom_clip: ClipColumns,
    /// Masked mid texture columns, openings offset of column `x1`.
    pub masked_cols: Option<usize>,
}

impl DrawSeg {
    #[inline]
    fn scale_range(&self) -> (Fixed, Fixed) {
        if self.scale1 > self.scale2 {
            (self.scale2, self.scale1)
        } else {
            (self.scale1, self.scale2)
        }
    }
}

/*──────────────────────────── vissprites ─────────────────────────────*/

/// A projected object ready to be drawn.
#[derive(Clone, Copy, Debug)]
pub struct VisSprite {
    pub x1: i32,
    pub x2: i32,
    /// World position, for the side test against draw segments.
    pub gx: Fixed,
    pub gy: Fixed,
    /// Feet and head heights.
    pub gz: Fixed,
    pub gzt: Fixed,
    pub startfrac: Fixed,
    pub scale: Fixed,
    /// Texture column step per screen column, negative when mirrored.
    pub xiscale: Fixed,
    pub texturemid: Fixed,
    pub patch: TextureId,
    pub light: LightPair,
    pub blend: BlendMode,
}

/// The frame's vissprites plus the index order they are drawn in.
#[derive(Default)]
pub struct SpritePool {
    pub list: Vec<VisSprite>,
    order: Vec<usize>,
    scratch: Vec<usize>,
    /// Sectors whose objects were already projected this frame.
    done: Vec<bool>,
}

impl SpritePool {
    pub fn clear(&mut self, num_sectors: usize) {
        self.list.clear();
        self.order.clear();
        self.done.clear();
        self.done.resize(num_sectors, false);
    }

    /// Sort indices by scale, nearest first.  Records never move.
    ///
    /// Indices start out in reverse input order and the sort is stable, so
    /// equal scales stay reversed; drawing from the back then paints them
    /// in input order.
    pub fn sort(&mut self) {
        let n = self.list.len();
        self.order.clear();
        self.order.extend((0..n).rev());
        self.scratch.resize(n, 0);
        merge_sort(&mut self.order, &mut self.scratch, &self.list);
    }

    /// Sorted indices, nearest first.
    pub fn order(&self) -> &[usize] {
        &self.order
    }
}

/// Stable merge sort, descending scale.  Small runs use insertion sort,
/// which is close to linear on the nearly sorted input BSP order gives.
fn merge_sort(s: &mut [usize], tmp: &mut [usize], list: &[VisSprite]) {
    let n = s.len();
    if n < 16 {
        for i in 1..n {
            let v = s[i];
            let mut j = i;
            while j > 0 && list[s[j - 1]].scale < list[v].scale {
                s[j] = s[j - 1];
                j -= 1;
            }
            s[j] = v;
        }
        return;
    }

    let mid = n / 2;
    {
        let (a, b) = s.split_at_mut(mid);
        merge_sort(a, tmp, list);
        merge_sort(b, tmp, list);
    }

    let (mut i, mut j, mut k) = (0, mid, 0);
    while i < mid && j < n {
        // ties take the left run first
        if list[s[j]].scale > list[s[i]].scale {
            tmp[k] = s[j];
            j += 1;
        } else {
            tmp[k] = s[i];
            i += 1;
        }
        k += 1;
    }
    let rest = mid - i;
    tmp[k..k + rest].copy_from_slice(&s[i..mid]);
    k += rest;
    tmp[k..k + n - j].copy_from_slice(&s[j..n]);
    s.copy_from_slice(&tmp[..n]);
}

/*──────────────────────────── projection ─────────────────────────────*/

impl Software {
    /// Project the objects of `sector` once per frame.
    pub fn add_sprites(&mut self, sector: SectorId, level: &Level, bank: &TextureBank) {
        let s = sector as usize;
        match self.sprites.done.get_mut(s) {
            Some(done) if !*done => *done = true,
            _ => return,
        }
        let Some(count) = self.things.get(s).map(Vec::len) else {
            return;
        };
        let light = LightTables::level(level.sectors[s].light, self.view.extra_light, 0);
        for i in 0..count {
            let thing = self.things[s][i];
            if let Some(vis) = self.project_sprite(&thing, light, bank) {
                self.sprites.list.push(vis);
            }
        }
    }

    /// Screen-space descriptor of `thing`, or `None` when it cannot be seen.
    pub fn project_sprite(&self, thing: &Thing, light_level: usize, bank: &TextureBank) -> Option<VisSprite> {
        if thing.flags.contains(RenderFlags::NEVER_DRAW) {
            return None;
        }
        let view = &self.view;
        let proj = &self.proj;

        let tr_x = thing.pos.x.wrapping_sub(view.x);
        let tr_y = thing.pos.y.wrapping_sub(view.y);

        let gxt = fixed_mul(tr_x, view.cos);
        let gyt = -fixed_mul(tr_y, view.sin);
        let tz = gxt.wrapping_sub(gyt);
        if !(MINZ..=MAXZ).contains(&tz) {
            return None;
        }
        let xscale = fixed_div(proj.projection, tz);

        let gxt = -fixed_mul(tr_x, view.sin);
        let gyt = fixed_mul(tr_y, view.cos);
        let mut tx = -(gyt.wrapping_add(gxt));
        if (tx as i64).abs() > (tz as i64) << 2 {
            return None;
        }

        let def = match bank.sprite(thing.sprite) {
            Ok(def) => def,
            Err(e) => {
                log::warn!("object skipped: {e}");
                return None;
            }
        };
        let Some(frame) = def.frames.get((thing.frame & FF_FRAMEMASK) as usize) else {
            log::warn!("sprite `{}` has no frame {}", def.name, thing.frame & FF_FRAMEMASK);
            return None;
        };
        let rot = if frame.rotate {
            let ang = point_to_angle(tr_x, tr_y);
            (ang.wrapping_sub(thing.angle).wrapping_add((ANG45 / 2).wrapping_mul(9)) >> 29) as usize
        } else {
            0
        };
        let (lump, flip) = (frame.lump[rot], frame.flip[rot]);
        let tex = match bank.texture(lump) {
            Ok(tex) => tex,
            Err(e) => {
                log::warn!("sprite `{}`: {e}", def.name);
                return None;
            }
        };
        let width = (tex.w as Fixed) << FRACBITS;

        tx = tx.wrapping_sub(tex.left_offset << FRACBITS);
        let x1 = (proj.centerxfrac.wrapping_add(fixed_mul(tx, xscale))) >> FRACBITS;
        if x1 > proj.view_width {
            return None;
        }
        tx = tx.wrapping_add(width);
        let x2 = ((proj.centerxfrac.wrapping_add(fixed_mul(tx, xscale))) >> FRACBITS) - 1;
        if x2 < 0 || x1 > x2 {
            return None;
        }

        let gz = thing.pos.z;
        let gzt = gz.wrapping_add(tex.top_offset << FRACBITS);
        let below = fixed_div((proj.view_height << FRACBITS) - proj.centeryfrac, xscale);
        if gz > view.z.saturating_add(fixed_div(proj.centeryfrac, xscale)) || gzt < view.z.saturating_sub(below) {
            return None;
        }

        let scale = xscale << proj.detail_shift;
        let iscale = fixed_div(FRACUNIT, xscale);
        let (mut startfrac, xiscale) = if flip {
            (width - 1, -iscale)
        } else {
            (0, iscale)
        };
        let vx1 = x1.max(0);
        if vx1 > x1 {
            startfrac = startfrac.wrapping_add(xiscale.wrapping_mul(vx1 - x1));
        }

        let translation = (thing.flags & RenderFlags::TRANSLATION).bits() >> TRANSLATION_SHIFT;
        let blend = if thing.flags.contains(RenderFlags::SHADOW) {
            BlendMode::Shadow
        } else if translation != 0 {
            BlendMode::Translated(translation as u8 - 1)
        } else if thing.flags.contains(RenderFlags::TRANSLUCENT) {
            BlendMode::Translucent
        } else if thing.flags.contains(RenderFlags::ADDITIVE) {
            BlendMode::Additive
        } else {
            BlendMode::Opaque
        };

        let light = if let Some(map) = view.fixed_colormap {
            LightPair::fixed(map)
        } else if thing.frame & FF_FULLBRIGHT != 0 {
            LightPair::fixed(0)
        } else {
            LightPair::lit(self.lights.scaled(light_level, scale))
        };

        Some(VisSprite {
            x1: vx1,
            x2: x2.min(proj.view_width - 1),
            gx: thing.pos.x,
            gy: thing.pos.y,
            gz,
            gzt,
            startfrac,
            scale,
            xiscale,
            texturemid: gzt.wrapping_sub(view.z),
            patch: lump,
            light,
            blend,
        })
    }

    /*───────────────────────── occlusion & drawing ──────────────────────*/

    /// Fill the per-column sprite clips for `spr` from every draw segment
    /// in front of it.  Masked walls behind the sprite are drawn on the way.
    pub fn clip_sprite(&mut self, spr: &VisSprite, level: &Level, bank: &TextureBank) {
        let (x1, x2) = (spr.x1 as usize, spr.x2 as usize);
        self.clip_bot[x1..=x2].fill(-2);
        self.clip_top[x1..=x2].fill(-2);

        let vh = self.proj.view_height;
        for i in (0..self.drawsegs.len()).rev() {
            let ds = self.drawsegs[i];
            if ds.x1 > spr.x2
                || ds.x2 < spr.x1
                || (ds.silhouette.is_empty() && ds.masked_cols.is_none())
            {
                continue;
            }
            let r1 = ds.x1.max(spr.x1);
            let r2 = ds.x2.min(spr.x2);

            let (lowscale, scale) = ds.scale_range();
            if scale < spr.scale
                || (lowscale < spr.scale && !level.point_on_seg_side(ds.seg, spr.gx, spr.gy))
            {
                // wall is behind the sprite
                if ds.masked_cols.is_some() {
                    self.render_masked_seg_range(&ds, r1, r2, level, bank);
                }
                continue;
            }

            let mut sil = ds.silhouette;
            if spr.gz >= ds.bsil_height {
                sil.remove(Silhouette::BOTTOM);
            }
            if spr.gzt <= ds.tsil_height {
                sil.remove(Silhouette::TOP);
            }

            for x in r1..=r2 {
                let xi = x as usize;
                if sil.contains(Silhouette::BOTTOM) && self.clip_bot[xi] == -2 {
                    if let Some(v) = ds.bottom_clip.at(&self.openings, x, vh) {
                        self.clip_bot[xi] = v;
                    }
                }
                if sil.contains(Silhouette::TOP) && self.clip_top[xi] == -2 {
                    if let Some(v) = ds.top_clip.at(&self.openings, x, vh) {
                        self.clip_top[xi] = v;
                    }
                }
            }
        }

        for x in x1..=x2 {
            if self.clip_bot[x] == -2 {
                self.clip_bot[x] = vh as i16;
            }
            if self.clip_top[x] == -2 {
                self.clip_top[x] = -1;
            }
        }
    }

    /// Per-column clips computed by the last [`Software::clip_sprite`].
    pub fn sprite_clip(&self, x: i32) -> (i16, i16) {
        (self.clip_top[x as usize], self.clip_bot[x as usize])
    }

    pub fn draw_vis_sprite(&mut self, spr: &VisSprite, bank: &TextureBank) {
        let tex = bank.texture_or_missing(spr.patch);
        let brightmap = bank.brightmap_of(tex);
        let iscale = spr.xiscale.wrapping_abs() >> self.proj.detail_shift;
        let sprtopscreen = self.proj.centeryfrac.wrapping_sub(fixed_mul(spr.texturemid, spr.scale));

        let mut frac = spr.startfrac;
        for x in spr.x1..=spr.x2 {
            let col = frac >> FRACBITS;
            let (top, bot) = self.sprite_clip(x);
            draw_masked_column(
                &mut self.fb,
                bank,
                &MaskedColumn {
                    x,
                    texels: tex.column(col),
                    posts: tex.posts(col),
                    sprtopscreen,
                    spryscale: spr.scale,
                    texturemid: spr.texturemid,
                    iscale,
                    ceiling_clip: top as i32,
                    floor_clip: bot as i32,
                    light: spr.light,
                    brightmap,
                },
                spr.blend,
            );
            frac = frac.wrapping_add(spr.xiscale);
        }
    }

    pub fn draw_sprite(&mut self, spr: &VisSprite, level: &Level, bank: &TextureBank) {
        if spr.x1 > spr.x2 {
            return;
        }
        self.clip_sprite(spr, level, bank);
        self.draw_vis_sprite(spr, bank);
    }

    /// Sprites back to front, then whatever masked walls are left.
    pub fn draw_masked(&mut self, level: &Level, bank: &TextureBank) {
        self.sprites.sort();
        for k in (0..self.sprites.order.len()).rev() {
            let spr = self.sprites.list[self.sprites.order[k]];
            self.draw_sprite(&spr, level, bank);
        }

        for i in (0..self.drawsegs.len()).rev() {
            let ds = self.drawsegs[i];
            if ds.masked_cols.is_some() {
                self.render_masked_seg_range(&ds, ds.x1, ds.x2, level, bank);
            }
        }
    }
}
