use crate::{
    config::{ConfigError, RenderConfig},
    renderer::software::{
        Framebuffer,
        clipper::SolidSegs,
        lighting::LightTables,
        planes::{PlaneKey, PlaneMap, PlaneSpecial, VisplaneId, is_sky},
        projection::{Projection, Viewpoint},
        sprites::{DrawSeg, Openings, SpritePool},
    },
    renderer::{Renderer, Rgba},
    world::{
        camera::Camera,
        geometry::{Level, SubsectorId},
        scene::{Scene, Thing},
        texture::TextureBank,
    },
};

/// Per-frame counters, informational only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Segs that survived angle clipping.
    pub segs: usize,
    pub drawsegs: usize,
    pub planes: usize,
    /// Openings pool slots handed out.
    pub openings: usize,
    pub sprites: usize,
}

/// Fixed-point software renderer and all of its per-frame state.
pub struct Software {
    pub config: RenderConfig,
    pub proj: Projection,
    pub lights: LightTables,
    pub view: Viewpoint,
    pub fb: Framebuffer,

    /// Lowest row closed from above, per column.
    pub ceilingclip: Vec<i16>,
    /// Highest row closed from below, per column.
    pub floorclip: Vec<i16>,

    pub planes: PlaneMap,
    pub floorplane: Option<VisplaneId>,
    pub ceilingplane: Option<VisplaneId>,

    pub openings: Openings,
    pub drawsegs: Vec<DrawSeg>,
    pub sprites: SpritePool,
    /// Sprite clip scratch.
    pub clip_top: Vec<i16>,
    pub clip_bot: Vec<i16>,

    pub clipper: SolidSegs,
    /// Lines drawn at least once, kept across frames.
    pub seen_lines: Vec<bool>,
    /// Columns with no open rows left.
    pub solid_columns: Vec<bool>,
    pub(crate) solid_count: usize,

    /// Objects per sector for the current frame.
    pub things: Vec<Vec<Thing>>,
    pub stats: FrameStats,
    rgba: Vec<Rgba>,
}

impl Software {
    pub fn new(config: RenderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let proj = Projection::new(&config);
        let lights = LightTables::new(&proj);
        let fb = Framebuffer::new(&proj);
        let vw = proj.view_width as usize;
        let vh = proj.view_height;

        let mut planes = PlaneMap::default();
        planes.clear(vw as i32, vh);
        let mut clipper = SolidSegs::default();
        clipper.reset(vw as i32);

        log::debug!(
            "software renderer {}x{} ({} columns)",
            config.width,
            config.height,
            vw
        );

        Ok(Self {
            config,
            view: Viewpoint::default(),
            rgba: vec![0; fb.pixels.len()],
            fb,
            ceilingclip: vec![-1; vw],
            floorclip: vec![vh as i16; vw],
            planes,
            floorplane: None,
            ceilingplane: None,
            openings: Openings::default(),
            drawsegs: Vec::new(),
            sprites: SpritePool::default(),
            clip_top: vec![-1; vw],
            clip_bot: vec![vh as i16; vw],
            clipper,
            seen_lines: Vec::new(),
            solid_columns: vec![false; vw],
            solid_count: 0,
            things: Vec::new(),
            stats: FrameStats::default(),
            proj,
            lights,
        })
    }

    /// Switch resolution or detail.  The seen-lines map survives.
    pub fn set_config(&mut self, config: RenderConfig) -> Result<(), ConfigError> {
        if config == self.config {
            return Ok(());
        }
        let mut next = Self::new(config)?;
        next.seen_lines = std::mem::take(&mut self.seen_lines);
        *self = next;
        Ok(())
    }

    /// Forget which lines were seen, e.g. on level change.
    pub fn clear_seen_lines(&mut self) {
        self.seen_lines.clear();
    }

    /// Return every per-frame structure to its empty state.  Idempotent.
    pub fn reset(&mut self) {
        let vw = self.proj.view_width;
        let vh = self.proj.view_height;

        self.fb.pixels.fill(0);
        self.ceilingclip.fill(-1);
        self.floorclip.fill(vh as i16);
        self.planes.clear(vw, vh);
        self.floorplane = None;
        self.ceilingplane = None;
        self.openings.reset();
        self.drawsegs.clear();
        self.sprites.clear(0);
        self.clipper.reset(vw);
        self.solid_columns.fill(false);
        self.solid_count = 0;
        self.stats = FrameStats::default();
    }

    /// `true` once no column has any open rows.
    pub fn all_columns_solid(&self) -> bool {
        self.solid_count == self.solid_columns.len() || self.clipper.is_full(self.proj.view_width)
    }

    /// Find the sector planes, project its objects and draw its segs.
    pub fn render_subsector(&mut self, ss_id: SubsectorId, level: &Level, bank: &TextureBank) {
        let Some(ss) = level.subsectors.get(ss_id as usize) else {
            log::warn!("subsector {ss_id} does not exist, skipped");
            return;
        };
        let sector = &level.sectors[ss.sector as usize];

        self.floorplane = (sector.floor_h < self.view.z).then(|| {
            let key = PlaneKey {
                height: sector.floor_h,
                pic: sector.floor_tex,
                light: sector.light,
                special: PlaneSpecial {
                    xoffs: sector.floor_scroll.x,
                    yoffs: sector.floor_scroll.y,
                    sky_line: None,
                },
            };
            self.planes.find(key, is_sky(bank, sector.floor_tex))
        });

        let ceil_sky = is_sky(bank, sector.ceil_tex);
        self.ceilingplane = (sector.ceil_h > self.view.z || ceil_sky).then(|| {
            let key = PlaneKey {
                height: sector.ceil_h,
                pic: sector.ceil_tex,
                light: sector.light,
                special: PlaneSpecial {
                    xoffs: sector.ceil_scroll.x,
                    yoffs: sector.ceil_scroll.y,
                    sky_line: sector.sky_line,
                },
            };
            self.planes.find(key, ceil_sky)
        });

        self.add_sprites(ss.sector, level, bank);

        let first = ss.first_seg;
        for seg in first..first + ss.seg_count {
            self.add_line(seg, level, bank);
        }
    }
}

impl Renderer for Software {
    fn begin_frame(&mut self, camera: &Camera) {
        self.view = Viewpoint::from(camera);
        self.reset();
    }

    fn draw_level(&mut self, subsectors: &[SubsectorId], level: &Level, scene: &Scene, bank: &TextureBank) {
        let sectors = level.sectors.len();
        scene.bucket_by_sector(&mut self.things, sectors);
        self.sprites.clear(sectors);
        if self.seen_lines.len() != level.linedefs.len() {
            self.seen_lines.resize(level.linedefs.len(), false);
        }

        for &ss in subsectors {
            if self.all_columns_solid() {
                break;
            }
            self.render_subsector(ss, level, bank);
        }

        self.draw_planes(level, bank);
        self.draw_masked(level, bank);

        self.stats.drawsegs = self.drawsegs.len();
        self.stats.planes = self.planes.len();
        self.stats.openings = self.openings.len();
        self.stats.sprites = self.sprites.list.len();
        log::trace!("frame stats: {:?}", self.stats);
    }

    fn end_frame<F>(&mut self, bank: &TextureBank, submit: F)
    where
        F: FnOnce(&[Rgba], usize, usize),
    {
        let palette = bank.palette();
        for (out, &idx) in self.rgba.iter_mut().zip(self.fb.pixels.iter()) {
            *out = palette[idx as usize];
        }
        submit(&self.rgba, self.fb.width, self.fb.height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fixed::{ANG90, from_int},
        renderer::software::sprites::{ClipColumns, MASKED_DONE},
        world::{
            builder::{LevelBuilder, WallDesc, room},
            scene::{Position, RenderFlags, SpriteState},
            texture::{NUM_COLORMAP_TABLES, SpriteDef, SpriteFrame, Texture},
        },
    };
    use glam::{Vec2, vec2};

    fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<Vec2> {
        vec![vec2(x0, y0), vec2(x0, y1), vec2(x1, y1), vec2(x1, y0)]
    }

    fn bank() -> TextureBank {
        let mut bank = TextureBank::default_with_checker();
        bank.insert("FLOOR", Texture::opaque("FLOOR", 64, 64, vec![3; 64 * 64]))
            .unwrap();
        bank.insert("WALL", Texture::opaque("WALL", 64, 128, vec![7; 64 * 128]))
            .unwrap();
        bank
    }

    fn render(level: &Level, scene: &Scene, bank: &TextureBank, cam: &Camera) -> Software {
        let mut sw = Software::new(RenderConfig::default()).unwrap();
        let order: Vec<SubsectorId> = (0..level.subsectors.len() as SubsectorId).collect();
        sw.begin_frame(cam);
        sw.draw_level(&order, level, scene, bank);
        sw
    }

    fn single_room(bank: &TextureBank) -> Level {
        let floor = bank.id("FLOOR").unwrap();
        let wall = bank.id("WALL").unwrap();
        let mut b = LevelBuilder::new("room");
        let s = b.add_sector(room(0.0, 128.0, floor, floor, 160));
        b.polygon(s, &rect(0.0, 0.0, 512.0, 256.0), WallDesc::solid(wall));
        b.build().unwrap()
    }

    #[test]
    fn rectangular_room_makes_one_plane_of_each() {
        let bank = bank();
        let level = single_room(&bank);
        // near the west wall, looking east down the long axis
        let cam = Camera::new(from_int(32), from_int(128), from_int(41), 0);
        let sw = render(&level, &Scene::new(), &bank, &cam);

        // east wall plus the visible parts of north and south
        assert_eq!(sw.drawsegs.len(), 3);
        assert_eq!(sw.planes.len(), 2, "one floor and one ceiling");

        let width = sw.proj.view_width;
        for (_, pl) in sw.planes.iter() {
            assert_eq!((pl.minx, pl.maxx), (0, width - 1), "plane spans the screen");
        }
        let heights: Vec<_> = sw.planes.iter().map(|(_, p)| p.key.height).collect();
        assert!(heights.contains(&0) && heights.contains(&from_int(128)));

        assert!(sw.all_columns_solid(), "walls close every column");
        assert!(sw.fb.pixels.iter().all(|&p| p == 3 || p == 7), "no column left unpainted");
        assert_eq!(sw.stats.drawsegs, 3);
        assert_eq!(sw.seen_lines.iter().filter(|&&s| s).count(), 3);
    }

    #[test]
    fn adjacent_floors_get_distinct_planes() {
        let bank = bank();
        let floor = bank.id("FLOOR").unwrap();
        let wall = bank.id("WALL").unwrap();
        let mut b = LevelBuilder::new("step");
        let low = b.add_sector(room(0.0, 128.0, floor, floor, 160));
        let high = b.add_sector(room(24.0, 128.0, floor, floor, 160));
        let portal = WallDesc::portal(wall, wall);
        b.polygon_walls(
            low,
            &rect(0.0, 0.0, 256.0, 256.0),
            &[WallDesc::solid(wall), WallDesc::solid(wall), portal, WallDesc::solid(wall)],
        );
        b.polygon(high, &rect(256.0, 0.0, 512.0, 256.0), WallDesc::solid(wall));
        let level = b.build().unwrap();

        let cam = Camera::new(from_int(32), from_int(128), from_int(41), 0);
        let sw = render(&level, &Scene::new(), &bank, &cam);

        let floors: Vec<VisplaneId> = sw
            .planes
            .iter()
            .filter(|(_, p)| p.key.height < from_int(41))
            .map(|(id, _)| id)
            .collect();
        assert_eq!(floors.len(), 2, "one floor plane per sector");
        assert_ne!(floors[0], floors[1]);
        let (a, b) = (sw.planes.get(floors[0]), sw.planes.get(floors[1]));
        assert_ne!(a.key.height, b.key.height);

        // a step up hides nothing standing behind it
        let portal = sw
            .drawsegs
            .iter()
            .find(|ds| level.segs[ds.seg as usize].back_sector.is_some())
            .expect("portal is visible");
        assert!(portal.silhouette.is_empty());
        assert_eq!(portal.masked_cols, None);
        assert!(sw.fb.pixels.iter().all(|&p| p == 3 || p == 7));
    }

    #[test]
    fn masked_mid_texture_is_drawn_once_with_holes() {
        let mut bank = bank();
        // 8 texel wide bars, 8 texel wide gaps
        let bars: Vec<u8> = (0..64 * 128).map(|i| if (i / 128) % 16 < 8 { 5 } else { 0 }).collect();
        let grate = bank.insert("GRATE", Texture::masked("GRATE", 64, 128, bars, 0)).unwrap();
        let floor = bank.id("FLOOR").unwrap();
        let wall = bank.id("WALL").unwrap();

        let mut b = LevelBuilder::new("fence");
        let near = b.add_sector(room(0.0, 128.0, floor, floor, 160));
        let far = b.add_sector(room(0.0, 128.0, floor, floor, 160));
        let fence = WallDesc {
            middle: grate,
            ..WallDesc::portal(wall, wall)
        };
        b.polygon_walls(
            near,
            &rect(0.0, 0.0, 256.0, 256.0),
            &[WallDesc::solid(wall), WallDesc::solid(wall), fence, WallDesc::solid(wall)],
        );
        b.polygon_walls(
            far,
            &rect(256.0, 0.0, 512.0, 256.0),
            &[fence, WallDesc::solid(wall), WallDesc::solid(wall), WallDesc::solid(wall)],
        );
        let level = b.build().unwrap();

        let cam = Camera::new(from_int(32), from_int(128), from_int(41), 0);
        let sw = render(&level, &Scene::new(), &bank, &cam);

        let ds = sw
            .drawsegs
            .iter()
            .find(|ds| ds.masked_cols.is_some())
            .expect("fence is visible");
        let cols = ds.masked_cols.unwrap();
        for x in ds.x1..=ds.x2 {
            assert_eq!(sw.openings.get(cols + (x - ds.x1) as usize), MASKED_DONE, "column {x}");
        }
        assert!(sw.fb.pixels.contains(&5), "bars are drawn");
        assert!(sw.fb.pixels.contains(&7), "far wall shows through the gaps");
    }

    #[test]
    fn out_of_range_fixed_colormap_still_renders() {
        let bank = bank();
        let level = single_room(&bank);
        let mut cam = Camera::new(from_int(32), from_int(128), from_int(41), 0);
        cam.fixed_colormap = Some(200);
        let sw = render(&level, &Scene::new(), &bank, &cam);

        assert_eq!(sw.view.fixed_colormap, Some(NUM_COLORMAP_TABLES as u8 - 1));
        // identity colormaps: the clamped table leaves every texel as is
        assert!(sw.fb.pixels.iter().all(|&p| p == 3 || p == 7));
    }

    #[test]
    fn early_clip_columns_survive_pool_growth() {
        let mut bank = bank();
        let floor = bank.id("FLOOR").unwrap();
        let wall = bank.id("WALL").unwrap();

        // stairs climbing east, every riser above eye height
        let mut b = LevelBuilder::new("stairs");
        let steps = 8;
        let portal = WallDesc::portal(wall, wall);
        let solid = WallDesc::solid(wall);
        for k in 0..steps {
            let s = b.add_sector(room(48.0 * k as f32, 1024.0, floor, floor, 160));
            let west = if k == 0 { solid } else { portal };
            let east = if k == steps - 1 { solid } else { portal };
            let x0 = 64.0 * k as f32;
            b.polygon_walls(s, &rect(x0, 0.0, x0 + 64.0, 256.0), &[west, solid, east, solid]);
        }
        let level = b.build().unwrap();

        let tex = bank
            .insert("BAR1A0", Texture::opaque("BAR1A0", 16, 32, vec![9; 16 * 32]).with_offsets(8, 32))
            .unwrap();
        let sprite = bank.add_sprite(SpriteDef {
            name: "BAR1".into(),
            frames: vec![SpriteFrame::single(tex)],
        });
        // just behind the first riser
        let mut scene = Scene::new();
        let pos = Position {
            x: from_int(96),
            y: from_int(128),
            z: from_int(48),
        };
        scene.spawn(pos, 0, SpriteState { sprite, frame: 0 }, 1, RenderFlags::empty());

        let cam = Camera::new(from_int(32), from_int(128), from_int(41), 0);
        let sw = render(&level, &scene, &bank, &cam);

        let first = sw.drawsegs[0];
        let ClipColumns::Openings { start, .. } = first.bottom_clip else {
            panic!("first riser keeps its floor clip in the pool: {:?}", first.bottom_clip);
        };
        assert_eq!(start, 0);
        let len = (first.x2 - first.x1 + 1) as usize;
        assert!(sw.openings.len() > len.next_power_of_two(), "later risers grew the pool");

        let vh = sw.proj.view_height;
        let spr = sw.sprites.list[0];
        for x in spr.x1..=spr.x2 {
            let recorded = first.bottom_clip.at(&sw.openings, x, vh).unwrap();
            assert!(recorded < sw.proj.centery as i16, "riser top is above the horizon");
            assert_eq!(sw.sprite_clip(x).1, recorded, "column {x}");
        }
    }

    #[test]
    fn reset_is_idempotent() {
        let bank = bank();
        let level = single_room(&bank);
        let cam = Camera::new(from_int(32), from_int(128), from_int(41), ANG90);
        let mut sw = render(&level, &Scene::new(), &bank, &cam);

        sw.reset();
        let first = (sw.planes.len(), sw.openings.len(), sw.drawsegs.len(), sw.stats);
        sw.reset();
        assert_eq!(first, (sw.planes.len(), sw.openings.len(), sw.drawsegs.len(), sw.stats));
        assert_eq!(first.0, 0);
        assert!(!sw.all_columns_solid());
        assert!(sw.ceilingclip.iter().all(|&c| c == -1));
    }

    #[test]
    fn objects_in_view_are_drawn_and_hidden_ones_are_not() {
        let mut bank = bank();
        let level = single_room(&bank);
        let tex = bank
            .insert("BAR1A0", Texture::opaque("BAR1A0", 16, 32, vec![9; 16 * 32]).with_offsets(8, 32))
            .unwrap();
        let sprite = bank.add_sprite(SpriteDef {
            name: "BAR1".into(),
            frames: vec![SpriteFrame::single(tex)],
        });

        let mut scene = Scene::new();
        let state = SpriteState { sprite, frame: 0 };
        let pos = |x: i32| Position {
            x: from_int(x),
            y: from_int(128),
            z: 0,
        };
        scene.spawn(pos(256), 0, state, 0, RenderFlags::empty());
        scene.spawn(pos(300), 0, state, 0, RenderFlags::NEVER_DRAW);

        let cam = Camera::new(from_int(32), from_int(128), from_int(41), 0);
        let sw = render(&level, &scene, &bank, &cam);

        assert_eq!(sw.stats.sprites, 1);
        let centre = (sw.proj.centery as usize + 10) * sw.fb.width + sw.proj.centerx as usize;
        assert_eq!(sw.fb.pixels[centre], 9, "barrel in front of the east wall");
    }

    #[test]
    fn end_frame_resolves_the_palette() {
        let mut bank = bank();
        let mut pal = crate::world::texture::Palette::default();
        pal[7] = 0x00ff_0000;
        pal[3] = 0x0000_ff00;
        bank.set_palette(pal);

        let level = single_room(&bank);
        let cam = Camera::new(from_int(32), from_int(128), from_int(41), 0);
        let mut sw = render(&level, &Scene::new(), &bank, &cam);

        let mut seen = None;
        sw.end_frame(&bank, |buf, w, h| {
            assert_eq!((w, h), (320, 200));
            seen = Some(buf.iter().all(|&c| c == 0x00ff_0000 || c == 0x0000_ff00));
        });
        assert_eq!(seen, Some(true));
    }

    #[test]
    fn config_change_keeps_seen_lines() {
        let bank = bank();
        let level = single_room(&bank);
        let cam = Camera::new(from_int(32), from_int(128), from_int(41), 0);
        let mut sw = render(&level, &Scene::new(), &bank, &cam);

        let low = RenderConfig::new(320, 200, crate::config::Detail::Low).unwrap();
        sw.set_config(low).unwrap();
        assert_eq!(sw.proj.view_width, 160);
        assert_eq!(sw.seen_lines.iter().filter(|&&s| s).count(), 3);
        assert!(sw.set_config(RenderConfig { width: 3, ..low }).is_err());
    }
}
