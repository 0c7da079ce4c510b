//! Walk through a small procedurally built map with the software renderer.
//!
//! ```bash
//! cargo run --release -- --width 640 --height 400
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::{Vec2, vec2};
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use yadoom_raster::{
    config::{Detail, RenderConfig},
    fixed::{ANG90, FRACUNIT, Fixed, from_int},
    renderer::{RendererExt, software::Software},
    world::{
        Camera, Colormap, Level, LevelBuilder, Palette, RenderFlags, Scene, SectorId, SpriteDef,
        SpriteFrame, SubsectorId, Texture, TextureBank, WallDesc,
        builder::room,
        scene::{FF_FULLBRIGHT, Position, SpriteState, TRANSLATION_SHIFT},
        texture::BlendTables,
    },
};

const VIEW_HEIGHT: i32 = 41;
const WALK: Fixed = 6 * FRACUNIT;
const TURN: u32 = ANG90 / 24;

#[derive(Parser, Debug)]
#[command(about = "Software renderer demo map")]
struct Args {
    /// Horizontal resolution in pixels.
    #[arg(long, default_value_t = 640)]
    width: usize,
    /// Vertical resolution in pixels.
    #[arg(long, default_value_t = 400)]
    height: usize,
    /// Start in low detail (half horizontal resolution).
    #[arg(long)]
    low: bool,
}

/*──────────────────────────── materials ─────────────────────────────*/

/// Sixteen ramps of sixteen shades; ramp 7 is green so the colour
/// translations have something to remap.
fn palette() -> Palette {
    const HUES: [(u32, u32, u32); 16] = [
        (255, 255, 255),
        (200, 60, 40),
        (150, 100, 60),
        (220, 190, 140),
        (240, 80, 80),
        (255, 160, 40),
        (80, 120, 240),
        (60, 220, 60),
        (120, 130, 150),
        (255, 240, 120),
        (140, 90, 200),
        (90, 200, 220),
        (180, 180, 120),
        (100, 70, 50),
        (200, 200, 230),
        (255, 120, 200),
    ];
    let mut pal = Palette::default();
    for (ramp, &(r, g, b)) in HUES.iter().enumerate() {
        for shade in 0..16u32 {
            let k = shade + 1;
            pal[ramp * 16 + shade as usize] = (r * k / 16) << 16 | (g * k / 16) << 8 | (b * k / 16);
        }
    }
    pal
}

/// Column-major pixels from a `(x, y)` painter.
fn paint(w: usize, h: usize, f: impl Fn(usize, usize) -> u8) -> Vec<u8> {
    let mut px = Vec::with_capacity(w * h);
    for x in 0..w {
        for y in 0..h {
            px.push(f(x, y));
        }
    }
    px
}

fn materials() -> anyhow::Result<TextureBank> {
    let mut bank = TextureBank::default_with_checker();
    let pal = palette();
    bank.set_colormap(Colormap::from_palette(&pal));
    bank.set_blend_tables(BlendTables::build(&pal));
    bank.set_palette(pal);

    let brick = paint(64, 128, |x, y| {
        let row = y / 16;
        let shift = if row % 2 == 0 { 0 } else { 16 };
        if y % 16 == 15 || (x + shift) % 32 == 31 { 0x0a } else { 0x1c + ((x ^ y) & 3) as u8 }
    });
    bank.insert("BRICK", Texture::opaque("BRICK", 64, 128, brick))?;
    let metal = paint(64, 64, |x, y| if x % 16 == 0 || y % 16 == 0 { 0x86 } else { 0x8b });
    bank.insert("METAL", Texture::opaque("METAL", 64, 64, metal))?;
    let floor = paint(64, 64, |x, y| if (x / 32 + y / 32) % 2 == 0 { 0x2a } else { 0x26 });
    bank.insert("FLOOR", Texture::opaque("FLOOR", 64, 64, floor))?;
    let ceil = paint(64, 64, |x, y| if x % 32 == 0 || y % 32 == 0 { 0x08 } else { 0x0c });
    bank.insert("CEIL", Texture::opaque("CEIL", 64, 64, ceil))?;
    bank.insert("F_SKY", Texture::opaque("F_SKY", 64, 64, vec![0x6f; 64 * 64]))?;

    let sky = paint(256, 128, |x, y| {
        let ridge = 90 + ((x as f32 * 0.07).sin() * 12.0) as i32;
        if y as i32 > ridge { 0x84 } else { 0x60 + (y / 9).min(15) as u8 }
    });
    bank.insert("SKY", Texture::opaque("SKY", 256, 128, sky))?;
    bank.sky_flat = bank.id_or_missing("F_SKY");
    bank.sky_texture = bank.id_or_missing("SKY");

    let grate = paint(64, 128, |x, y| if x % 8 < 2 || y % 32 < 3 { 0x8e } else { 0 });
    bank.insert("GRATE", Texture::masked("GRATE", 64, 128, grate, 0))?;

    // objects stand on their feet: left offset at the middle, top at the height
    let barrel = paint(24, 32, |x, y| {
        let dx = x as i32 - 12;
        if dx * dx > 120 { 0 } else if y % 10 < 2 { 0x88 } else { 0x7a }
    });
    let barrel = bank.insert(
        "BARLA0",
        Texture::masked("BARLA0", 24, 32, barrel, 0).with_offsets(12, 32),
    )?;
    let torch = paint(12, 48, |x, y| match y {
        0..=11 if (x as i32 - 6).abs() < 5 => 0x5f - (y / 2) as u8,
        12.. if (4..8).contains(&x) => 0x28,
        _ => 0,
    });
    let torch = bank.insert(
        "TORCA0",
        Texture::masked("TORCA0", 12, 48, torch, 0).with_offsets(6, 48),
    )?;
    let ghost = paint(32, 56, |x, y| {
        let dx = x as i32 - 16;
        if dx * dx + (y as i32 - 20).pow(2) / 2 < 220 { 0x0f } else { 0 }
    });
    let ghost = bank.insert(
        "GHSTA0",
        Texture::masked("GHSTA0", 32, 56, ghost, 0).with_offsets(16, 56),
    )?;

    for (name, lump) in [("BARL", barrel), ("TORC", torch), ("GHST", ghost)] {
        bank.add_sprite(SpriteDef {
            name: name.into(),
            frames: vec![SpriteFrame::single(lump)],
        });
    }
    Ok(bank)
}

/*────────────────────────────── map ─────────────────────────────────*/

/// Hall → low corridor → open courtyard, in a row along +x.
fn build_map(bank: &TextureBank) -> anyhow::Result<Level> {
    let brick = bank.id_or_missing("BRICK");
    let metal = bank.id_or_missing("METAL");
    let floor = bank.id_or_missing("FLOOR");
    let ceil = bank.id_or_missing("CEIL");
    let grate = bank.id_or_missing("GRATE");

    let mut b = LevelBuilder::new("demo");
    let hall = b.add_sector(room(0.0, 128.0, floor, ceil, 192));
    let corridor = b.add_sector(room(16.0, 104.0, floor, ceil, 144));
    let yard = b.add_sector(room(-16.0, 256.0, floor, bank.sky_flat, 255));

    let wall = WallDesc::solid(brick);
    let step = WallDesc::portal(metal, metal);
    let fenced = WallDesc {
        middle: grate,
        ..step
    };

    let p = |pts: &[(f32, f32)]| pts.iter().map(|&(x, y)| vec2(x, y)).collect::<Vec<Vec2>>();
    b.polygon_walls(
        hall,
        &p(&[(0., 0.), (0., 256.), (384., 256.), (384., 192.), (384., 64.), (384., 0.)]),
        &[wall, wall, wall, step, wall, wall],
    );
    b.polygon_walls(
        corridor,
        &p(&[(384., 64.), (384., 192.), (640., 192.), (640., 64.)]),
        &[step, wall, fenced, wall],
    );
    b.polygon_walls(
        yard,
        &p(&[(640., -64.), (640., 64.), (640., 192.), (640., 320.), (1024., 320.), (1024., -64.)]),
        &[wall, fenced, wall, wall, wall, wall],
    );
    Ok(b.build()?)
}

fn populate(scene: &mut Scene, level: &Level) {
    let barrel = SpriteState { sprite: 0, frame: 0 };
    let torch = SpriteState {
        sprite: 1,
        frame: FF_FULLBRIGHT,
    };
    let ghost = SpriteState { sprite: 2, frame: 0 };

    let mut put = |x: i32, y: i32, state: SpriteState, flags: RenderFlags| {
        let (x, y) = (from_int(x), from_int(y));
        if let Some(sector) = sector_at(level, x, y) {
            let z = level.sectors[sector as usize].floor_h;
            scene.spawn(Position { x, y, z }, 0, state, sector, flags);
        }
    };
    put(300, 60, barrel, RenderFlags::empty());
    put(320, 200, barrel, RenderFlags::from_bits_truncate(1 << TRANSLATION_SHIFT));
    put(380, 40, torch, RenderFlags::empty());
    put(380, 216, torch, RenderFlags::empty());
    put(520, 128, ghost, RenderFlags::SHADOW);
    put(800, 100, barrel, RenderFlags::TRANSLUCENT);
    put(860, 200, torch, RenderFlags::ADDITIVE);
}

/*──────────────────────────── traversal ─────────────────────────────*/

/// Sector whose convex outline contains `(x, y)`.
fn sector_at(level: &Level, x: Fixed, y: Fixed) -> Option<SectorId> {
    level.subsectors.iter().find_map(|ss| {
        let first = ss.first_seg;
        let inside = (first..first + ss.seg_count).all(|seg| !level.point_on_seg_side(seg, x, y));
        inside.then_some(ss.sector)
    })
}

/// Breadth-first over the portals from the camera's subsector.
///
/// The rooms are convex and chained, which makes this front to back.
fn front_to_back(level: &Level, start: SubsectorId, out: &mut Vec<SubsectorId>) {
    out.clear();
    let mut seen = vec![false; level.subsectors.len()];
    let mut queue = VecDeque::from([start]);
    seen[start as usize] = true;
    while let Some(ss_id) = queue.pop_front() {
        out.push(ss_id);
        let ss = &level.subsectors[ss_id as usize];
        let segs = &level.segs[ss.first_seg as usize..(ss.first_seg + ss.seg_count) as usize];
        for back in segs.iter().filter_map(|s| s.back_sector) {
            // one subsector per sector
            let next = back as SubsectorId;
            if !seen[next as usize] {
                seen[next as usize] = true;
                queue.push_back(next);
            }
        }
    }
}

/*────────────────────────────── main ────────────────────────────────*/

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let detail = if args.low { Detail::Low } else { Detail::High };
    let mut config = RenderConfig::new(args.width, args.height, detail)?;

    let bank = materials()?;
    let level = build_map(&bank)?;
    let mut scene = Scene::new();
    populate(&mut scene, &level);
    println!(
        "{}: {} sectors, {} segs, {} objects",
        level.name,
        level.sectors.len(),
        level.segs.len(),
        scene.len()
    );

    let mut camera = Camera::new(from_int(64), from_int(128), from_int(VIEW_HEIGHT), 0);
    let mut renderer = Software::new(config)?;

    let mut win = Window::new(
        "yadoom raster",
        config.width,
        config.height,
        WindowOptions::default(),
    )?;
    win.set_target_fps(35);

    let mut acc_time = Duration::ZERO;
    let mut acc_frames = 0usize;
    let mut last_print = Instant::now();
    let mut order: Vec<SubsectorId> = Vec::new();
    let mut here: SectorId = 0;

    while win.is_open() && !win.is_key_down(Key::Escape) {
        let t0 = Instant::now();

        /* movement --------------------------------------------------------- */
        let run = if win.is_key_down(Key::LeftShift) { 2 } else { 1 };
        let mut forward = 0;
        let mut side = 0;
        if win.is_key_down(Key::Up) || win.is_key_down(Key::W) {
            forward += WALK * run;
        }
        if win.is_key_down(Key::Down) || win.is_key_down(Key::S) {
            forward -= WALK * run;
        }
        if win.is_key_down(Key::A) {
            side -= WALK * run;
        }
        if win.is_key_down(Key::D) {
            side += WALK * run;
        }
        if win.is_key_down(Key::Left) {
            camera.turn(TURN);
        }
        if win.is_key_down(Key::Right) {
            camera.turn_right(TURN);
        }

        // stay inside the map: undo steps that land in no sector
        let before = camera;
        camera.step(forward, side);
        match sector_at(&level, camera.x, camera.y) {
            Some(s) => here = s,
            None => camera = before,
        }
        camera.z = level.sectors[here as usize].floor_h + from_int(VIEW_HEIGHT);

        /* toggles ---------------------------------------------------------- */
        if win.is_key_pressed(Key::F5, KeyRepeat::No) {
            config.detail = match config.detail {
                Detail::High => Detail::Low,
                Detail::Low => Detail::High,
            };
            if let Err(e) = renderer.set_config(config) {
                eprintln!("detail change rejected: {e}");
            }
        }
        if win.is_key_pressed(Key::I, KeyRepeat::No) {
            camera.fixed_colormap = match camera.fixed_colormap {
                None => Some(yadoom_raster::world::texture::INVULN_MAP),
                Some(_) => None,
            };
        }
        camera.extra_light = if win.is_key_down(Key::LeftCtrl) { 2 } else { 0 };

        /* draw ------------------------------------------------------------- */
        front_to_back(&level, here as SubsectorId, &mut order);
        let mut result = Ok(());
        renderer.draw_frame(&camera, &order, &level, &scene, &bank, |fb, w, h| {
            acc_time += t0.elapsed();
            acc_frames += 1;
            result = win.update_with_buffer(fb, w, h);
        });
        result?;

        if last_print.elapsed() >= Duration::from_secs(3) {
            let avg_ms = acc_time.as_secs_f64() * 1000.0 / acc_frames as f64;
            let fps = 1000.0 / avg_ms;
            let stats = renderer.stats;
            println!(
                "avg render: {:.2} ms  ({:.1} FPS)  segs {} planes {} sprites {}",
                avg_ms, fps, stats.segs, stats.planes, stats.sprites
            );
            acc_time = Duration::ZERO;
            acc_frames = 0;
            last_print = Instant::now();
        }
    }
    Ok(())
}
