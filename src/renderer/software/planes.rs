use smallvec::SmallVec;

use crate::{
    fixed::{ANG90, Angle, FRACUNIT, Fixed, fine, fixed_div, fixed_mul},
    renderer::software::{
        Framebuffer, Software,
        columns::{BlendMode, ColumnParams, LightPair, SpanParams, draw_column, draw_span},
        lighting::LightTables,
        projection::{Projection, Viewpoint},
    },
    tables::{finecosine, finesine},
    world::{
        geometry::{Level, LinedefId, SKY_TRANSFER_FLIPPED},
        texture::{NO_TEXTURE, TextureBank, TextureId},
    },
};

pub type VisplaneId = u16;

/// `top` value of a column the plane does not cover.
pub const NO_TOP: u16 = u16::MAX;

const HASH_SIZE: usize = 128;
const ANGLETOSKYSHIFT: u32 = 22;
const SKY_TEXTURE_MID: Fixed = 100 * FRACUNIT;
/// Transferred skies sit lower than the default one.
const SKY_TRANSFER_DROP: Fixed = 28 * FRACUNIT;

/// Plane attributes beyond height, picture and light.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaneSpecial {
    /// Flat scroll offsets.
    pub xoffs: Fixed,
    pub yoffs: Fixed,
    /// Sky planes: line whose upper texture replaces the default sky.
    pub sky_line: Option<LinedefId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneKey {
    pub height: Fixed,
    pub pic: TextureId,
    pub light: i16,
    pub special: PlaneSpecial,
}

impl PlaneKey {
    #[inline]
    fn bucket(&self) -> usize {
        (self.pic as u32)
            .wrapping_mul(3)
            .wrapping_add(self.light as u32)
            .wrapping_add((self.height as u32).wrapping_mul(7)) as usize
            & (HASH_SIZE - 1)
    }
}

#[derive(Clone, Debug)]
pub struct Visplane {
    pub key: PlaneKey,
    /// Inclusive column range; empty while `minx > maxx`.
    pub minx: i32,
    pub maxx: i32,
    /// Open rows per column, padded by one on each side so the span
    /// builder can look at `minx - 1` and `maxx + 1`.
    top: Vec<u16>,
    bottom: Vec<u16>,
}

impl Visplane {
    fn reset(&mut self, key: PlaneKey, width: i32) {
        self.key = key;
        self.minx = width;
        self.maxx = -1;
        self.top.clear();
        self.top.resize(width as usize + 2, NO_TOP);
        self.bottom.clear();
        self.bottom.resize(width as usize + 2, 0);
    }

    #[inline(always)]
    pub fn top(&self, x: i32) -> u16 {
        self.top[(x + 1) as usize]
    }

    #[inline(always)]
    pub fn bottom(&self, x: i32) -> u16 {
        self.bottom[(x + 1) as usize]
    }

    /// Open rows `top ..= bottom` of column `x`.
    #[inline(always)]
    pub fn set_span(&mut self, x: i32, top: i32, bottom: i32) {
        self.top[(x + 1) as usize] = top as u16;
        self.bottom[(x + 1) as usize] = bottom as u16;
    }
}

/// Per screen row: the plane height last mapped on it and what it implied.
#[derive(Clone, Copy, Debug)]
struct RowCache {
    height: Fixed,
    distance: Fixed,
    xstep: Fixed,
    ystep: Fixed,
}

impl RowCache {
    const EMPTY: Self = Self {
        height: -1,
        distance: 0,
        xstep: 0,
        ystep: 0,
    };
}

/// Hash table of the frame's visplanes.
///
/// Plane records live in an arena and are recycled through a free list;
/// ids handed out stay valid until the next [`PlaneMap::clear`].
#[derive(Default)]
pub struct PlaneMap {
    planes: Vec<Visplane>,
    free: Vec<VisplaneId>,
    buckets: Vec<SmallVec<[VisplaneId; 4]>>,
    width: i32,
    rows: Vec<RowCache>,
    spanstart: Vec<i32>,
}

impl PlaneMap {
    /// Return every plane to the free list and forget the row cache.
    pub fn clear(&mut self, width: i32, height: i32) {
        self.width = width;
        if self.buckets.len() != HASH_SIZE {
            self.buckets = vec![SmallVec::new(); HASH_SIZE];
        }
        for bucket in self.buckets.iter_mut() {
            self.free.extend(bucket.drain(..));
        }
        self.rows.clear();
        self.rows.resize(height as usize, RowCache::EMPTY);
        self.spanstart.resize(height as usize, 0);
    }

    /// Planes in use this frame.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(SmallVec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, id: VisplaneId) -> &Visplane {
        &self.planes[id as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, id: VisplaneId) -> &mut Visplane {
        &mut self.planes[id as usize]
    }

    /// Every live plane, bucket by bucket, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (VisplaneId, &Visplane)> + '_ {
        self.buckets
            .iter()
            .flat_map(|b| b.iter())
            .map(|&id| (id, &self.planes[id as usize]))
    }

    fn alloc(&mut self, key: PlaneKey) -> VisplaneId {
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                let id = self.planes.len() as VisplaneId;
                self.planes.push(Visplane {
                    key,
                    minx: 0,
                    maxx: -1,
                    top: Vec::new(),
                    bottom: Vec::new(),
                });
                if self.planes.len().is_power_of_two() {
                    log::debug!("visplane arena grew to {}", self.planes.len());
                }
                id
            }
        };
        self.planes[id as usize].reset(key, self.width);
        self.buckets[key.bucket()].push(id);
        id
    }

    /// Plane for `key`, reusing the newest record with the same key.
    ///
    /// Sky planes ignore height and light so every sky shares one record.
    pub fn find(&mut self, mut key: PlaneKey, is_sky: bool) -> VisplaneId {
        if is_sky {
            key.height = 0;
            key.light = 0;
        }
        let found = self.buckets[key.bucket()]
            .iter()
            .rev()
            .copied()
            .find(|&id| self.planes[id as usize].key == key);
        match found {
            Some(id) => id,
            None => self.alloc(key),
        }
    }

    /// Make `id` cover `start ..= stop`.
    ///
    /// Extends the plane when none of the overlapping columns is open yet,
    /// otherwise returns a fresh record with the same key owning only the
    /// requested range.
    pub fn check(&mut self, id: VisplaneId, start: i32, stop: i32) -> VisplaneId {
        let pl = &mut self.planes[id as usize];
        let (intrl, unionl) = if start < pl.minx {
            (pl.minx, start)
        } else {
            (start, pl.minx)
        };
        let (intrh, unionh) = if stop > pl.maxx {
            (pl.maxx, stop)
        } else {
            (stop, pl.maxx)
        };

        if (intrl..=intrh).all(|x| pl.top(x) == NO_TOP) {
            pl.minx = unionl;
            pl.maxx = unionh;
            return id;
        }

        let key = pl.key;
        let dup = self.alloc(key);
        let pl = &mut self.planes[dup as usize];
        pl.minx = start;
        pl.maxx = stop;
        dup
    }
}

#[inline]
pub fn is_sky(bank: &TextureBank, pic: TextureId) -> bool {
    pic == bank.sky_flat && bank.sky_flat != NO_TEXTURE
}

/*──────────────────────────── rasterising ────────────────────────────*/

/// State shared by every span of one non-sky plane.
struct SpanMapper<'a> {
    fb: &'a mut Framebuffer,
    bank: &'a TextureBank,
    proj: &'a Projection,
    view: &'a Viewpoint,
    rows: &'a mut [RowCache],
    zlight: &'a LightTables,
    level: usize,
    basexscale: Fixed,
    baseyscale: Fixed,
    height: Fixed,
    special: PlaneSpecial,
    pic: TextureId,
}

impl SpanMapper<'_> {
    fn map_plane(&mut self, y: i32, x1: i32, x2: i32) {
        if x2 < x1 || y < 0 || y >= self.proj.view_height {
            return;
        }
        let row = &mut self.rows[y as usize];
        if row.height != self.height {
            row.height = self.height;
            row.distance = fixed_mul(self.height, self.proj.yslope[y as usize]);
            row.xstep = fixed_mul(row.distance, self.basexscale);
            row.ystep = fixed_mul(row.distance, self.baseyscale);
        }
        let RowCache {
            distance,
            xstep,
            ystep,
            ..
        } = *row;

        let length = fixed_mul(distance, self.proj.distscale[x1 as usize]);
        let angle = fine(self.view.angle.wrapping_add(self.proj.xtoviewangle[x1 as usize]));
        let xfrac = self
            .view
            .x
            .wrapping_add(fixed_mul(finecosine(angle), length))
            .wrapping_add(self.special.xoffs);
        let yfrac = self
            .view
            .y
            .wrapping_neg()
            .wrapping_sub(fixed_mul(finesine(angle), length))
            .wrapping_add(self.special.yoffs);

        let light = match self.view.fixed_colormap {
            Some(map) => LightPair::fixed(map),
            None => LightPair::lit(self.zlight.by_distance(self.level, distance)),
        };

        let flat = self.bank.texture_or_missing(self.pic);
        draw_span(
            self.fb,
            self.bank,
            &SpanParams {
                y,
                x1,
                x2,
                xfrac,
                yfrac,
                xstep,
                ystep,
                flat,
                light,
                brightmap: self.bank.brightmap_of(flat),
            },
        );
    }

    /// Close the rows that end at column `x - 1` and open those that start
    /// at `x`.
    fn make_spans(&mut self, spanstart: &mut [i32], x: i32, mut t1: i32, mut b1: i32, mut t2: i32, mut b2: i32) {
        while t1 < t2 && t1 <= b1 {
            self.map_plane(t1, spanstart[t1 as usize], x - 1);
            t1 += 1;
        }
        while b1 > b2 && b1 >= t1 {
            self.map_plane(b1, spanstart[b1 as usize], x - 1);
            b1 -= 1;
        }
        while t2 < t1 && t2 <= b2 {
            spanstart[t2 as usize] = x;
            t2 += 1;
        }
        while b2 > b1 && b2 >= t2 {
            spanstart[b2 as usize] = x;
            b2 -= 1;
        }
    }
}

impl Software {
    /// Rasterise every plane collected this frame.  Runs after all walls.
    pub fn draw_planes(&mut self, level: &Level, bank: &TextureBank) {
        let Self {
            planes,
            fb,
            proj,
            lights,
            view,
            ..
        } = self;
        let PlaneMap {
            planes: arena,
            buckets,
            rows,
            spanstart,
            ..
        } = planes;

        let base = fine(view.angle.wrapping_sub(ANG90));
        let basexscale = fixed_div(finecosine(base), proj.centerxfrac);
        let baseyscale = fixed_div(finesine(base), proj.centerxfrac).wrapping_neg();

        for &id in buckets.iter().flat_map(|b| b.iter()) {
            let pl = &mut arena[id as usize];
            if pl.minx > pl.maxx {
                continue;
            }

            if is_sky(bank, pl.key.pic) {
                draw_sky(fb, bank, proj, view, level, pl);
                continue;
            }

            // sentinels so spans close at both ends
            let (minx, maxx) = (pl.minx, pl.maxx);
            pl.top[minx as usize] = NO_TOP;
            pl.top[(maxx + 2) as usize] = NO_TOP;

            let mut mapper = SpanMapper {
                fb: &mut *fb,
                bank,
                proj,
                view,
                rows: rows.as_mut_slice(),
                zlight: lights,
                level: LightTables::level(pl.key.light, view.extra_light, 0),
                basexscale,
                baseyscale,
                height: (pl.key.height.wrapping_sub(view.z)).abs(),
                special: pl.key.special,
                pic: pl.key.pic,
            };

            let pl = &arena[id as usize];
            for x in minx..=maxx + 1 {
                mapper.make_spans(
                    spanstart,
                    x,
                    pl.top(x - 1) as i32,
                    pl.bottom(x - 1) as i32,
                    pl.top(x) as i32,
                    pl.bottom(x) as i32,
                );
            }
        }
    }
}

/// Sky planes are drawn as wall columns addressed by view angle.
fn draw_sky(
    fb: &mut Framebuffer,
    bank: &TextureBank,
    proj: &Projection,
    view: &Viewpoint,
    level: &Level,
    pl: &Visplane,
) {
    let transfer = pl
        .key
        .special
        .sky_line
        .and_then(|l| level.linedefs.get(l as usize))
        .map(|line| (line, &level.sidedefs[line.front_sidedef as usize]));

    let (texture, texturemid, flip, an): (TextureId, Fixed, Angle, Angle) = match transfer {
        Some((line, side)) => (
            side.upper,
            side.y_off - SKY_TRANSFER_DROP,
            if line.special == SKY_TRANSFER_FLIPPED { 0 } else { !0 },
            side.x_off as Angle,
        ),
        None => (bank.sky_texture, SKY_TEXTURE_MID, 0, 0),
    };

    let tex = bank.texture_or_missing(texture);
    let brightmap = bank.brightmap_of(tex);
    let light = LightPair::fixed(view.fixed_colormap.unwrap_or(0));
    let an = an.wrapping_add(view.angle);

    for x in pl.minx..=pl.maxx {
        let (yl, yh) = (pl.top(x), pl.bottom(x));
        if yl == NO_TOP || yl > yh {
            continue;
        }
        let col = (an.wrapping_add(proj.xtoviewangle[x as usize]) ^ flip) >> ANGLETOSKYSHIFT;
        draw_column(
            fb,
            bank,
            &ColumnParams {
                x,
                yl: yl as i32,
                yh: yh as i32,
                iscale: proj.sky_iscale,
                texturemid,
                source: tex.column(col as i32),
                tex_height: tex.h as i32,
                light,
                brightmap,
            },
            BlendMode::Opaque,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(pic: TextureId, height: i32) -> PlaneKey {
        PlaneKey {
            height: height * FRACUNIT,
            pic,
            light: 160,
            special: PlaneSpecial::default(),
        }
    }

    fn map() -> PlaneMap {
        let mut m = PlaneMap::default();
        m.clear(320, 200);
        m
    }

    /// Deterministic pseudo-random stream for the property test.
    struct Lcg(u32);
    impl Lcg {
        fn next(&mut self, bound: i32) -> i32 {
            self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            ((self.0 >> 8) % bound as u32) as i32
        }
    }

    #[test]
    fn same_key_same_plane() {
        let mut m = map();
        let a = m.find(key(3, 0), false);
        let b = m.find(key(3, 0), false);
        let c = m.find(key(3, 8), false);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn sky_planes_collapse_height_and_light() {
        let mut m = map();
        let mut low = key(9, 0);
        low.light = 10;
        let mut high = key(9, 512);
        high.light = 250;
        let id = m.find(low, true);
        assert_eq!(id, m.find(high, true));
        assert_eq!(m.get(id).key.height, 0);
    }

    #[test]
    fn disjoint_ranges_merge_into_one_plane() {
        let mut m = map();
        let mut id = m.find(key(1, 0), false);
        for (start, stop) in [(0, 99), (100, 219), (220, 319)] {
            id = m.check(id, start, stop);
            for x in start..=stop {
                m.get_mut(id).set_span(x, 100, 199);
            }
        }
        assert_eq!(m.len(), 1);
        let pl = m.get(id);
        assert_eq!((pl.minx, pl.maxx), (0, 319));
    }

    #[test]
    fn overlapping_open_columns_force_duplicate() {
        let mut m = map();
        let first = m.find(key(1, 0), false);
        let first = m.check(first, 10, 20);
        m.get_mut(first).set_span(15, 0, 5);

        let second = m.check(first, 15, 30);
        assert_ne!(first, second, "column 15 is already open in the first record");
        assert_eq!((m.get(second).minx, m.get(second).maxx), (15, 30));
        assert_eq!(m.get(second).key, m.get(first).key);
        // the newest record is what the next lookup finds
        assert_eq!(m.find(key(1, 0), false), second);
    }

    /// For any request sequence no record ever has a column written twice,
    /// and every requested column ends up open in some record of the key.
    #[test]
    fn merge_or_duplicate_never_double_books_a_column() {
        let mut rng = Lcg(0x5eed);
        for _ in 0..50 {
            let mut m = map();
            let k = key(4, 16);
            let mut id = m.find(k, false);
            let mut requested = vec![false; 320];

            for _ in 0..40 {
                let start = rng.next(320);
                let stop = (start + rng.next(64)).min(319);
                id = m.check(id, start, stop);
                let pl = m.get_mut(id);
                assert!(pl.minx <= start && stop <= pl.maxx);
                for x in start..=stop {
                    // a real wall only marks columns not yet claimed in
                    // this record; the check guarantees there are none
                    assert_eq!(pl.top(x), NO_TOP, "column {x} double-booked in plane {id}");
                    pl.set_span(x, 0, 1);
                    requested[x as usize] = true;
                }
            }

            for x in 0..320 {
                let owners = m
                    .iter()
                    .filter(|(_, pl)| pl.key == k && pl.top(x) != NO_TOP)
                    .count();
                assert_eq!(owners > 0, requested[x as usize], "column {x}");
            }
        }
    }

    #[test]
    fn clear_recycles_records() {
        let mut m = map();
        for h in 0..10 {
            m.find(key(1, h), false);
        }
        assert_eq!(m.len(), 10);
        m.clear(320, 200);
        assert!(m.is_empty());
        let id = m.find(key(2, 0), false);
        assert!((id as usize) < 10, "ids come back from the free list");
        assert_eq!(m.planes.len(), 10);
        assert_eq!(m.get(id).top(5), NO_TOP);
    }
}
