use smallvec::SmallVec;

use crate::{
    fixed::{ANG90, ANG180, ANGLETOFINESHIFT, Angle},
    renderer::software::Software,
    tables::point_to_angle,
    world::{
        geometry::{Level, SegmentId},
        texture::{NO_TEXTURE, TextureBank},
    },
};

#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub struct ClipRange {
    pub first: i32,
    pub last: i32,
}

/// Screen columns already closed by one-sided walls, sorted and disjoint.
#[derive(Default, Debug)]
pub struct SolidSegs {
    pub ranges: Vec<ClipRange>,
}

/// How a seg interacts with the solid column list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WallClass {
    /// Closes its columns: one-sided walls and shut doors.
    Solid,
    /// Drawn where visible, leaves the columns open behind it.
    Pass,
}

impl SolidSegs {
    pub fn reset(&mut self, width: i32) {
        self.ranges.clear();
        // Two sentinels so the add routine never has to worry
        // about running off the ends of the array.
        self.ranges.push(ClipRange {
            first: -width,
            last: -1,
        });
        self.ranges.push(ClipRange {
            first: width,
            last: width * 2,
        });
    }

    pub fn add_solid_seg(&mut self, first: i32, last: i32) {
        let mut i = 0;
        // 1) skip all ranges that end before ours minus one
        while i < self.ranges.len() && self.ranges[i].last < first - 1 {
            i += 1;
        }

        // swallowed by an existing range: done early
        if i < self.ranges.len() && first >= self.ranges[i].first && last <= self.ranges[i].last {
            return;
        }

        // 2) merge any overlapping or adjacent ranges
        let mut new_first = first;
        let mut new_last = last;
        while i < self.ranges.len() && self.ranges[i].first <= new_last + 1 {
            new_first = new_first.min(self.ranges[i].first);
            new_last = new_last.max(self.ranges[i].last);
            self.ranges.remove(i);
        }

        // 3) insert the coalesced range in its sorted place
        self.ranges.insert(
            i,
            ClipRange {
                first: new_first,
                last: new_last,
            },
        );
    }

    /// Parts of `first ..= last` not covered by any solid range.
    pub fn visible_fragments(&self, first: i32, last: i32) -> SmallVec<[(i32, i32); 4]> {
        let mut out = SmallVec::new();
        let mut x = first;
        for r in &self.ranges {
            if x > last {
                break;
            }
            if r.last < x {
                continue;
            }
            if r.first > x {
                out.push((x, (r.first - 1).min(last)));
            }
            x = x.max(r.last + 1);
        }
        if x <= last {
            out.push((x, last));
        }
        out
    }

    /// `true` once `0 .. width` is closed.
    pub fn is_full(&self, width: i32) -> bool {
        self.ranges.iter().any(|r| r.first <= 0 && r.last >= width - 1)
    }
}

impl Software {
    /// Clip seg `seg_id` to the view, classify it and draw every part not
    /// hidden behind solid walls.
    pub fn add_line(&mut self, seg_id: SegmentId, level: &Level, bank: &TextureBank) {
        let seg = &level.segs[seg_id as usize];
        let v1 = level.vertices[seg.v1 as usize].pos;
        let v2 = level.vertices[seg.v2 as usize].pos;
        let view = self.view;

        let mut angle1 = point_to_angle(v1.x.wrapping_sub(view.x), v1.y.wrapping_sub(view.y));
        let mut angle2 = point_to_angle(v2.x.wrapping_sub(view.x), v2.y.wrapping_sub(view.y));

        // back side
        let span = angle1.wrapping_sub(angle2);
        if span >= ANG180 {
            return;
        }
        let rw_angle1 = angle1;

        angle1 = angle1.wrapping_sub(view.angle);
        angle2 = angle2.wrapping_sub(view.angle);

        let clip = self.proj.clipangle;
        let fov = clip.wrapping_mul(2);
        let mut tspan = angle1.wrapping_add(clip);
        if tspan > fov {
            tspan = tspan.wrapping_sub(fov);
            if tspan >= span {
                return;
            }
            angle1 = clip;
        }
        tspan = clip.wrapping_sub(angle2);
        if tspan > fov {
            tspan = tspan.wrapping_sub(fov);
            if tspan >= span {
                return;
            }
            angle2 = clip.wrapping_neg();
        }

        let to_x = |a: Angle| self.proj.viewangletox[(a.wrapping_add(ANG90) >> ANGLETOFINESHIFT) as usize];
        let x1 = to_x(angle1);
        let x2 = to_x(angle2);
        // too thin to cover a column
        if x1 >= x2 {
            return;
        }

        let Some(class) = wall_class(seg_id, level) else {
            return;
        };
        self.stats.segs += 1;

        for (first, last) in self.clipper.visible_fragments(x1, x2 - 1) {
            self.render_wall_range(seg_id, rw_angle1, first, last, level, bank);
        }
        if class == WallClass::Solid {
            self.clipper.add_solid_seg(x1, x2 - 1);
        }
    }
}

/// `None` for two-sided lines with nothing to draw and no plane change.
fn wall_class(seg_id: SegmentId, level: &Level) -> Option<WallClass> {
    let seg = &level.segs[seg_id as usize];
    let Some(back) = seg.back_sector.map(|s| &level.sectors[s as usize]) else {
        return Some(WallClass::Solid);
    };
    let front = &level.sectors[seg.front_sector as usize];

    if back.ceil_h <= front.floor_h || back.floor_h >= front.ceil_h {
        return Some(WallClass::Solid);
    }
    if back.ceil_h != front.ceil_h || back.floor_h != front.floor_h {
        return Some(WallClass::Pass);
    }

    let identical = back.ceil_tex == front.ceil_tex
        && back.floor_tex == front.floor_tex
        && back.light == front.light
        && back.floor_scroll == front.floor_scroll
        && back.ceil_scroll == front.ceil_scroll
        && back.sky_line == front.sky_line
        && level.sidedefs[seg.sidedef as usize].middle == NO_TEXTURE;
    if identical { None } else { Some(WallClass::Pass) }
}
