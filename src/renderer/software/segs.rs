use crate::{
    fixed::{ANG90, ANG180, ANGLETOFINESHIFT, Angle, FINEANGLES, FRACBITS, Fixed, fine, fixed_mul},
    renderer::software::{
        Software,
        columns::{BlendMode, ColumnParams, LightPair, MaskedColumn, draw_column, draw_masked_column},
        lighting::LightTables,
        planes::is_sky,
        projection::WallPrecision,
        sprites::{ClipColumns, DrawSeg, MASKED_DONE, Silhouette},
    },
    tables::{finesine, finetangent, point_to_dist},
    world::{
        geometry::{Level, LinedefFlags, SegmentId},
        texture::{NO_TEXTURE, Texture, TextureBank, TextureId},
    },
};

/// Texture and vertical anchor of one wall tier.
#[derive(Clone, Copy, Debug)]
struct Tier {
    tex: TextureId,
    mid: Fixed,
}

/// Everything the column loop needs, fixed before the first column.
#[derive(Clone, Copy, Debug)]
struct WallSetup {
    start: i32,
    stop: i32,
    /// One-sided wall, closes every column it touches.
    mid: Option<Tier>,
    top: Option<Tier>,
    bottom: Option<Tier>,
    /// Openings offset of the first masked texture column.
    masked: Option<usize>,
    mark_ceiling: bool,
    mark_floor: bool,
    textured: bool,
    offset: Fixed,
    center_angle: Angle,
    distance: Fixed,
    light_level: usize,
    precision: WallPrecision,
}

/// Per-column increments of the trackers.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Step {
    scale: Fixed,
    top: i64,
    bottom: i64,
    high: i64,
    low: i64,
}

/// Running wall edges, marching left to right.  Heights are screen rows
/// with `bits` fraction bits; 64 bits wide so steep walls never wrap.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Cursor {
    scale: Fixed,
    top: i64,
    bottom: i64,
    high: i64,
    low: i64,
}

impl Cursor {
    #[inline(always)]
    fn advance(&mut self, s: &Step) {
        self.scale = self.scale.wrapping_add(s.scale);
        self.top += s.top;
        self.bottom += s.bottom;
        self.high += s.high;
        self.low += s.low;
    }
}

/// Screen row of a tracker value, clamped so clip arrays stay in range.
#[inline(always)]
fn to_row(frac: i64, bits: i32, view_height: i32) -> i32 {
    (frac >> bits).clamp(-1, view_height as i64) as i32
}

/// Tracker for the world height `h` (already relative to the eye).
#[inline]
fn edge(h: Fixed, scale: Fixed, scale_step: Fixed, centeryfrac: Fixed, inv: i32) -> (i64, i64) {
    let h = (h >> inv) as i64;
    let frac = ((centeryfrac >> inv) as i64) - ((h * scale as i64) >> FRACBITS);
    let step = -((h * scale_step as i64) >> FRACBITS);
    (frac, step)
}

impl Software {
    /// Draw seg `seg_id` across screen columns `start ..= stop`.
    ///
    /// `angle1` is the absolute angle from the eye to the seg's first
    /// vertex, before any clipping.
    pub fn render_wall_range(
        &mut self,
        seg_id: SegmentId,
        angle1: Angle,
        start: i32,
        stop: i32,
        level: &Level,
        bank: &TextureBank,
    ) {
        if start < 0 || stop >= self.proj.view_width || start > stop {
            log::warn!("wall range {start}..={stop} of seg {seg_id} outside the view, skipped");
            return;
        }
        let seg = &level.segs[seg_id as usize];
        let line = &level.linedefs[seg.linedef as usize];
        let side = &level.sidedefs[seg.sidedef as usize];
        let front = &level.sectors[seg.front_sector as usize];
        let back = seg.back_sector.map(|s| &level.sectors[s as usize]);
        let v1 = level.vertices[seg.v1 as usize].pos;

        if let Some(seen) = self.seen_lines.get_mut(seg.linedef as usize) {
            *seen = true;
        }
        let view = self.view;

        // perpendicular distance to the line
        let normal = seg.angle.wrapping_add(ANG90);
        let offsetangle = (normal.wrapping_sub(angle1) as i32).unsigned_abs().min(ANG90);
        let hyp = point_to_dist(v1.x.wrapping_sub(view.x), v1.y.wrapping_sub(view.y));
        let distance = fixed_mul(hyp, finesine(fine(ANG90 - offsetangle)));

        let extent = match back {
            Some(b) => front.ceil_h.max(b.ceil_h).saturating_sub(front.floor_h.min(b.floor_h)),
            None => front.ceil_h.saturating_sub(front.floor_h),
        };
        let precision = WallPrecision::for_height(extent);
        let scale_at = |x: i32| {
            self.proj.scale_from_global_angle(
                view.angle.wrapping_add(self.proj.xtoviewangle[x as usize]),
                view.angle,
                normal,
                distance,
                precision.max_scale,
            )
        };
        let scale1 = scale_at(start);
        let (scale2, scale_step) = if stop > start {
            let s2 = scale_at(stop);
            (s2, (s2 - scale1) / (stop - start))
        } else {
            (scale1, 0)
        };

        let mut ds = DrawSeg {
            seg: seg_id,
            x1: start,
            x2: stop,
            scale1,
            scale2,
            scale_step,
            silhouette: Silhouette::NONE,
            bsil_height: 0,
            tsil_height: 0,
            top_clip: ClipColumns::None,
            bottom_clip: ClipColumns::None,
            masked_cols: None,
        };

        let tex_height = |id: TextureId| (bank.texture_or_missing(id).h as Fixed) << FRACBITS;
        let mut worldtop = front.ceil_h.wrapping_sub(view.z);
        let worldbottom = front.floor_h.wrapping_sub(view.z);
        let (mut worldhigh, mut worldlow) = (0, 0);

        let mut setup = WallSetup {
            start,
            stop,
            mid: None,
            top: None,
            bottom: None,
            masked: None,
            mark_ceiling: true,
            mark_floor: true,
            textured: false,
            offset: 0,
            center_angle: 0,
            distance,
            light_level: 0,
            precision,
        };

        match back {
            None => {
                let mid = if line.flags.contains(LinedefFlags::DONT_PEG_BOTTOM) {
                    front.floor_h.wrapping_add(tex_height(side.middle)).wrapping_sub(view.z)
                } else {
                    worldtop
                };
                setup.mid = Some(Tier {
                    tex: side.middle,
                    mid: mid.wrapping_add(side.y_off),
                });

                ds.silhouette = Silhouette::BOTH;
                ds.top_clip = ClipColumns::ScreenHeight;
                ds.bottom_clip = ClipColumns::NegOne;
                ds.bsil_height = Fixed::MAX;
                ds.tsil_height = Fixed::MIN;
            }
            Some(back) => {
                if front.floor_h > back.floor_h {
                    ds.silhouette = Silhouette::BOTTOM;
                    ds.bsil_height = front.floor_h;
                } else if back.floor_h > view.z {
                    ds.silhouette = Silhouette::BOTTOM;
                    ds.bsil_height = Fixed::MAX;
                }
                if front.ceil_h < back.ceil_h {
                    ds.silhouette |= Silhouette::TOP;
                    ds.tsil_height = front.ceil_h;
                } else if back.ceil_h < view.z {
                    ds.silhouette |= Silhouette::TOP;
                    ds.tsil_height = Fixed::MIN;
                }

                let closed = back.ceil_h <= front.floor_h || back.floor_h >= front.ceil_h;
                if back.ceil_h <= front.floor_h {
                    ds.bottom_clip = ClipColumns::NegOne;
                    ds.bsil_height = Fixed::MAX;
                    ds.silhouette |= Silhouette::BOTTOM;
                }
                if back.floor_h >= front.ceil_h {
                    ds.top_clip = ClipColumns::ScreenHeight;
                    ds.tsil_height = Fixed::MIN;
                    ds.silhouette |= Silhouette::TOP;
                }

                worldhigh = back.ceil_h.wrapping_sub(view.z);
                worldlow = back.floor_h.wrapping_sub(view.z);

                // sky hack: height changes between two skies draw no upper wall
                if is_sky(bank, front.ceil_tex) && is_sky(bank, back.ceil_tex) {
                    worldtop = worldhigh;
                }

                setup.mark_floor = closed
                    || worldlow != worldbottom
                    || back.floor_tex != front.floor_tex
                    || back.light != front.light
                    || back.floor_scroll != front.floor_scroll;
                setup.mark_ceiling = closed
                    || worldhigh != worldtop
                    || back.ceil_tex != front.ceil_tex
                    || back.light != front.light
                    || back.ceil_scroll != front.ceil_scroll
                    || back.sky_line != front.sky_line;

                if worldhigh < worldtop {
                    let mid = if line.flags.contains(LinedefFlags::DONT_PEG_TOP) {
                        worldtop
                    } else {
                        back.ceil_h.wrapping_add(tex_height(side.upper)).wrapping_sub(view.z)
                    };
                    setup.top = Some(Tier {
                        tex: side.upper,
                        mid: mid.wrapping_add(side.y_off),
                    });
                }
                if worldlow > worldbottom {
                    let mid = if line.flags.contains(LinedefFlags::DONT_PEG_BOTTOM) {
                        worldtop
                    } else {
                        worldlow
                    };
                    setup.bottom = Some(Tier {
                        tex: side.lower,
                        mid: mid.wrapping_add(side.y_off),
                    });
                }

                if side.middle != NO_TEXTURE {
                    let cols = self.openings.alloc((stop - start + 1) as usize);
                    setup.masked = Some(cols);
                    ds.masked_cols = Some(cols);
                }
            }
        }

        setup.textured =
            setup.mid.is_some() || setup.top.is_some() || setup.bottom.is_some() || setup.masked.is_some();
        if setup.textured {
            let mut offsetangle = normal.wrapping_sub(angle1);
            if offsetangle > ANG180 {
                offsetangle = offsetangle.wrapping_neg();
            }
            let mut offset = fixed_mul(hyp, finesine(fine(offsetangle.min(ANG90))));
            if normal.wrapping_sub(angle1) < ANG180 {
                offset = -offset;
            }
            setup.offset = offset.wrapping_add(side.x_off).wrapping_add(seg.offset);
            setup.center_angle = ANG90.wrapping_add(view.angle).wrapping_sub(normal);
            setup.light_level =
                LightTables::level(front.light, view.extra_light, seg.fake_contrast as i32);
        }

        // planes on the far side of the eye are invisible
        if front.floor_h >= view.z {
            setup.mark_floor = false;
        }
        if front.ceil_h <= view.z && !is_sky(bank, front.ceil_tex) {
            setup.mark_ceiling = false;
        }

        let inv = precision.inv_bits();
        let cy = self.proj.centeryfrac;
        let (top, top_step) = edge(worldtop, scale1, scale_step, cy, inv);
        let (bottom, bottom_step) = edge(worldbottom, scale1, scale_step, cy, inv);
        let mut cursor = Cursor {
            scale: scale1,
            top,
            bottom,
            ..Default::default()
        };
        let mut step = Step {
            scale: scale_step,
            top: top_step,
            bottom: bottom_step,
            ..Default::default()
        };
        if back.is_some() {
            if worldhigh < worldtop {
                (cursor.high, step.high) = edge(worldhigh, scale1, scale_step, cy, inv);
            }
            if worldlow > worldbottom {
                (cursor.low, step.low) = edge(worldlow, scale1, scale_step, cy, inv);
            }
        }

        if setup.mark_ceiling {
            self.ceilingplane = self.ceilingplane.map(|id| self.planes.check(id, start, stop));
            setup.mark_ceiling = self.ceilingplane.is_some();
        }
        if setup.mark_floor {
            self.floorplane = self.floorplane.map(|id| self.planes.check(id, start, stop));
            setup.mark_floor = self.floorplane.is_some();
        }

        self.render_seg_loop(&setup, cursor, &step, bank);

        // sprite clipping info
        let masked = setup.masked.is_some();
        let len = (stop - start + 1) as usize;
        let (s, e) = (start as usize, stop as usize + 1);
        if (ds.silhouette.contains(Silhouette::TOP) || masked) && ds.top_clip == ClipColumns::None {
            let at = self.openings.alloc(len);
            self.openings.slice_mut(at, len).copy_from_slice(&self.ceilingclip[s..e]);
            ds.top_clip = ClipColumns::Openings { start: at, x1: start };
        }
        if (ds.silhouette.contains(Silhouette::BOTTOM) || masked) && ds.bottom_clip == ClipColumns::None {
            let at = self.openings.alloc(len);
            self.openings.slice_mut(at, len).copy_from_slice(&self.floorclip[s..e]);
            ds.bottom_clip = ClipColumns::Openings { start: at, x1: start };
        }
        if masked && !ds.silhouette.contains(Silhouette::TOP) {
            ds.silhouette |= Silhouette::TOP;
            ds.tsil_height = Fixed::MIN;
        }
        if masked && !ds.silhouette.contains(Silhouette::BOTTOM) {
            ds.silhouette |= Silhouette::BOTTOM;
            ds.bsil_height = Fixed::MAX;
        }

        self.drawsegs.push(ds);
    }

    /// Walk the columns of one wall range: mark planes, draw tiers and
    /// tighten the clip arrays.
    fn render_seg_loop(&mut self, w: &WallSetup, mut cur: Cursor, step: &Step, bank: &TextureBank) {
        let Self {
            proj,
            lights,
            view,
            fb,
            ceilingclip,
            floorclip,
            planes,
            openings,
            ceilingplane,
            floorplane,
            solid_columns,
            solid_count,
            ..
        } = self;

        let vh = proj.view_height;
        let bits = w.precision.height_bits;
        let unit = w.precision.height_unit() as i64;
        let tier_tex = |t: Option<Tier>| t.map(|t| (t, bank.texture_or_missing(t.tex)));
        let mid = tier_tex(w.mid);
        let top = tier_tex(w.top);
        let bottom = tier_tex(w.bottom);

        let mut wall_column = |x: i32, yl: i32, yh: i32, iscale: Fixed, light: LightPair, col: i32, tier: &(Tier, &Texture)| {
            let (t, tex) = *tier;
            draw_column(
                fb,
                bank,
                &ColumnParams {
                    x,
                    yl,
                    yh,
                    iscale,
                    texturemid: t.mid,
                    source: tex.column(col),
                    tex_height: tex.h as i32,
                    light,
                    brightmap: bank.brightmap_of(tex),
                },
                BlendMode::Opaque,
            );
        };

        for x in w.start..=w.stop {
            let xi = x as usize;

            let yl = to_row(cur.top + unit - 1, bits, vh).max(ceilingclip[xi] as i32 + 1);
            if w.mark_ceiling {
                let top = ceilingclip[xi] as i32 + 1;
                let bottom = (yl - 1).min(floorclip[xi] as i32 - 1);
                if let (Some(id), true) = (*ceilingplane, top <= bottom) {
                    planes.get_mut(id).set_span(x, top, bottom);
                }
            }

            let yh = to_row(cur.bottom, bits, vh).min(floorclip[xi] as i32 - 1);
            if w.mark_floor {
                let top = (yh + 1).max(ceilingclip[xi] as i32 + 1);
                let bottom = floorclip[xi] as i32 - 1;
                if let (Some(id), true) = (*floorplane, top <= bottom) {
                    planes.get_mut(id).set_span(x, top, bottom);
                }
            }

            let (mut texcol, mut iscale, mut light) = (0, 0, LightPair::fixed(0));
            if w.textured {
                let angle = (w.center_angle.wrapping_add(proj.xtoviewangle[xi]) >> ANGLETOFINESHIFT)
                    .min(FINEANGLES as u32 / 2 - 1);
                texcol = w.offset.wrapping_sub(fixed_mul(finetangent(angle as usize), w.distance))
                    >> FRACBITS;
                light = match view.fixed_colormap {
                    Some(map) => LightPair::fixed(map),
                    None => LightPair::lit(lights.scaled(w.light_level, cur.scale)),
                };
                iscale = (0xffff_ffffu32 / cur.scale.max(1) as u32) as Fixed;
            }

            if let Some(tier) = &mid {
                wall_column(x, yl, yh, iscale, light, texcol, tier);
                ceilingclip[xi] = vh as i16;
                floorclip[xi] = -1;
            } else {
                if let Some(tier) = &top {
                    let mid = to_row(cur.high, bits, vh).min(floorclip[xi] as i32 - 1);
                    if mid >= yl {
                        wall_column(x, yl, mid, iscale, light, texcol, tier);
                        ceilingclip[xi] = mid as i16;
                    } else {
                        ceilingclip[xi] = (yl - 1) as i16;
                    }
                } else if w.mark_ceiling {
                    ceilingclip[xi] = (yl - 1) as i16;
                }

                if let Some(tier) = &bottom {
                    let mid = to_row(cur.low + unit - 1, bits, vh).max(ceilingclip[xi] as i32 + 1);
                    if mid <= yh {
                        wall_column(x, mid, yh, iscale, light, texcol, tier);
                        floorclip[xi] = mid as i16;
                    } else {
                        floorclip[xi] = (yh + 1) as i16;
                    }
                } else if w.mark_floor {
                    floorclip[xi] = (yh + 1) as i16;
                }

                if let Some(cols) = w.masked {
                    openings.set(cols + (x - w.start) as usize, texcol as i16);
                }
            }

            if ceilingclip[xi] as i32 + 1 >= floorclip[xi] as i32 && !solid_columns[xi] {
                solid_columns[xi] = true;
                *solid_count += 1;
            }

            cur.advance(step);
        }
    }

    /// Draw the masked mid texture of `ds` across `x1 ..= x2`, skipping
    /// columns already drawn this frame.
    pub fn render_masked_seg_range(&mut self, ds: &DrawSeg, x1: i32, x2: i32, level: &Level, bank: &TextureBank) {
        let Some(cols) = ds.masked_cols else {
            return;
        };
        let seg = &level.segs[ds.seg as usize];
        let Some(back) = seg.back_sector.map(|s| &level.sectors[s as usize]) else {
            return;
        };
        let front = &level.sectors[seg.front_sector as usize];
        let side = &level.sidedefs[seg.sidedef as usize];
        let line = &level.linedefs[seg.linedef as usize];

        let tex = bank.texture_or_missing(side.middle);
        let brightmap = bank.brightmap_of(tex);
        let tex_h = (tex.h as i64) << FRACBITS;
        let light_level = LightTables::level(front.light, self.view.extra_light, seg.fake_contrast as i32);

        let anchor = if line.flags.contains(LinedefFlags::DONT_PEG_BOTTOM) {
            front.floor_h.max(back.floor_h).wrapping_add(tex_h as Fixed)
        } else {
            front.ceil_h.min(back.ceil_h)
        };
        let texturemid = anchor.wrapping_sub(self.view.z).wrapping_add(side.y_off);

        let vh = self.proj.view_height;
        let mut spryscale = ds.scale1.wrapping_add((x1 - ds.x1).wrapping_mul(ds.scale_step));
        for x in x1..=x2 {
            let idx = cols + (x - ds.x1) as usize;
            let col = self.openings.get(idx);
            if col != MASKED_DONE {
                let light = match self.view.fixed_colormap {
                    Some(map) => LightPair::fixed(map),
                    None => LightPair::lit(self.lights.scaled(light_level, spryscale)),
                };

                // columns whose top would not fit in 16.16 are skipped
                let t = ((self.proj.centeryfrac as i64) << FRACBITS) - texturemid as i64 * spryscale as i64;
                let fits = t + tex_h * spryscale as i64 >= 0 && t <= (vh as i64) << (2 * FRACBITS);
                if fits {
                    let ceiling_clip = ds.top_clip.at(&self.openings, x, vh).unwrap_or(-1);
                    let floor_clip = ds.bottom_clip.at(&self.openings, x, vh).unwrap_or(vh as i16);
                    draw_masked_column(
                        &mut self.fb,
                        bank,
                        &MaskedColumn {
                            x,
                            texels: tex.column(col as i32),
                            posts: tex.posts(col as i32),
                            sprtopscreen: (t >> FRACBITS) as Fixed,
                            spryscale,
                            texturemid,
                            iscale: (0xffff_ffffu32 / spryscale.max(1) as u32) as Fixed,
                            ceiling_clip: ceiling_clip as i32,
                            floor_clip: floor_clip as i32,
                            light,
                            brightmap,
                        },
                        BlendMode::Opaque,
                    );
                }
                self.openings.set(idx, MASKED_DONE);
            }
            spryscale = spryscale.wrapping_add(ds.scale_step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::{FRACUNIT, from_int};

    #[test]
    fn rows_clamp_to_the_clip_range() {
        assert_eq!(to_row(5 << 12, 12, 200), 5);
        assert_eq!(to_row(-(1 << 40), 12, 200), -1);
        assert_eq!(to_row(1 << 40, 12, 200), 200);
    }

    #[test]
    fn trackers_do_not_wrap_on_steep_walls() {
        // a 2048 unit tall wall at the maximum scale overflows 32 bits
        let (frac, _) = edge(from_int(2048), from_int(2048), 0, from_int(100), 4);
        assert!(frac < 0, "top edge far above the screen, got {frac}");
        assert_eq!(to_row(frac + (1 << 12) - 1, 12, 200), -1);

        let (frac, _) = edge(-from_int(2048), from_int(2048), 0, from_int(100), 4);
        assert_eq!(to_row(frac, 12, 200), 200);
    }

    #[test]
    fn horizon_tracker_sits_on_the_centre_row() {
        // an edge at eye height projects to the centre row at any scale
        let (frac, step) = edge(0, FRACUNIT * 3, FRACUNIT / 7, from_int(100), 4);
        assert_eq!(to_row(frac, 12, 200), 100);
        assert_eq!(step, 0);
    }

    #[test]
    fn cursor_advances_every_tracker() {
        let mut c = Cursor::default();
        let s = Step {
            scale: 2,
            top: -3,
            bottom: 4,
            high: 5,
            low: -6,
        };
        c.advance(&s);
        c.advance(&s);
        assert_eq!(
            c,
            Cursor {
                scale: 4,
                top: -6,
                bottom: 8,
                high: 10,
                low: -12,
            }
        );
    }
}
