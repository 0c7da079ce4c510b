use bitflags::bitflags;
use glam::{IVec2, Vec2};

use crate::fixed::{Angle, Fixed, from_f32};
use crate::tables::{point_on_side, point_to_angle, point_to_dist};
use crate::world::texture::TextureId;

pub type SubsectorId = u16;
pub type LinedefId = u16;
pub type SegmentId = u16;
pub type VertexId = u16;
pub type SidedefId = u16;
pub type SectorId = u16;

/// Corrupt level data.  Fatal: the level must not be rendered.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("linedef {line} references missing vertex {vertex}")]
    LineVertex { line: LinedefId, vertex: VertexId },

    #[error("linedef {line} references missing sidedef {side}")]
    LineSide { line: LinedefId, side: SidedefId },

    #[error("linedef {line} is two-sided but has no back sidedef")]
    MissingBackSide { line: LinedefId },

    #[error("sidedef {side} references missing sector {sector}")]
    SideSector { side: SidedefId, sector: SectorId },

    #[error("segment {seg} references missing vertex {vertex}")]
    SegVertex { seg: SegmentId, vertex: VertexId },

    #[error("segment {seg} references missing linedef {line}")]
    SegLine { seg: SegmentId, line: LinedefId },

    #[error("segment {seg} uses side {side} of linedef {line}, which has no such sidedef")]
    SegSide { seg: SegmentId, line: LinedefId, side: u8 },

    #[error("segment {seg} has zero length")]
    DegenerateSeg { seg: SegmentId },

    #[error("subsector {ss} covers segments {first}..{end} but only {count} exist")]
    SubsectorSegs {
        ss: SubsectorId,
        first: usize,
        end: usize,
        count: usize,
    },

    #[error("subsector {ss} references missing sector {sector}")]
    SubsectorSector { ss: SubsectorId, sector: SectorId },

    #[error("sector {sector} takes its sky from missing linedef {line}")]
    SkyLine { sector: SectorId, line: LinedefId },
}

/// Runtime snapshot of one map (immutable after [`Level::finalise`]).
#[derive(Debug, Default)]
pub struct Level {
    pub name: String,
    pub linedefs: Vec<Linedef>,
    pub sidedefs: Vec<Sidedef>,
    pub vertices: Vec<Vertex>,
    pub segs: Vec<Seg>,
    pub subsectors: Vec<Subsector>,
    pub sectors: Vec<Sector>,
}

/*--------------------------- linedefs -------------------------------*/

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct LinedefFlags: u16 {
        const IMPASSABLE      = 0x0001;
        const BLOCK_MONSTERS  = 0x0002;
        const TWO_SIDED       = 0x0004;
        const DONT_PEG_TOP    = 0x0008;
        const DONT_PEG_BOTTOM = 0x0010;
        const SECRET          = 0x0020;
        const BLOCK_SOUND     = 0x0040;
        const NOT_ON_MAP      = 0x0080;
        const ALREADY_ON_MAP  = 0x0100;
    }
}

/// Line special that flips a transferred sky horizontally.
pub const SKY_TRANSFER_FLIPPED: u16 = 272;

#[derive(Clone, Debug)]
pub struct Linedef {
    pub v1: VertexId,
    pub v2: VertexId,
    pub flags: LinedefFlags,
    pub special: u16,
    pub tag: u16,
    pub front_sidedef: SidedefId,
    pub back_sidedef: Option<SidedefId>,
}

/*--------------------------- sidedefs -------------------------------*/

#[derive(Clone, Debug)]
pub struct Sidedef {
    pub x_off: Fixed,
    pub y_off: Fixed,
    pub upper: TextureId,
    pub lower: TextureId,
    pub middle: TextureId,
    pub sector: SectorId,
}

/*----------------------- simple primitives --------------------------*/

/// Map vertex, both coordinates 16.16 fixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Vertex {
    pub pos: IVec2,
}

impl Vertex {
    pub fn from_map(p: Vec2) -> Self {
        Self {
            pos: IVec2::new(from_f32(p.x), from_f32(p.y)),
        }
    }

    #[inline(always)]
    pub fn x(&self) -> Fixed {
        self.pos.x
    }

    #[inline(always)]
    pub fn y(&self) -> Fixed {
        self.pos.y
    }
}

/// Wall piece.  The first five fields come from the map; the rest is
/// filled in by [`Level::finalise`].
#[derive(Clone, Debug)]
pub struct Seg {
    pub v1: VertexId,
    pub v2: VertexId,
    pub linedef: LinedefId,
    /// 0 = front side of the linedef, 1 = back side.
    pub side: u8,
    /// Distance along the linedef to the seg start.
    pub offset: Fixed,

    pub angle: Angle,
    pub length: Fixed,
    pub sidedef: SidedefId,
    pub front_sector: SectorId,
    pub back_sector: Option<SectorId>,
    /// Light bonus for axis-aligned walls: −1 along x, +1 along y.
    pub fake_contrast: i8,
}

impl Seg {
    pub fn new(v1: VertexId, v2: VertexId, linedef: LinedefId, side: u8, offset: Fixed) -> Self {
        Self {
            v1,
            v2,
            linedef,
            side,
            offset,
            angle: 0,
            length: 0,
            sidedef: 0,
            front_sector: 0,
            back_sector: None,
            fake_contrast: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Subsector {
    pub sector: SectorId,
    pub first_seg: SegmentId,
    pub seg_count: u16,
}

#[derive(Clone, Debug, Default)]
pub struct Sector {
    pub floor_h: Fixed,
    pub ceil_h: Fixed,
    pub floor_tex: TextureId,
    pub ceil_tex: TextureId,
    /// 0..=255
    pub light: i16,
    pub special: i16,
    pub tag: i16,
    /// Flat scrolling offsets, fixed map units.
    pub floor_scroll: IVec2,
    pub ceil_scroll: IVec2,
    /// Sky ceilings in this sector use the upper texture of this line.
    pub sky_line: Option<LinedefId>,
}

impl Level {
    /// Validate every reference and fill the derived per-seg data.
    ///
    /// Must succeed before the level is handed to the renderer.
    pub fn finalise(&mut self) -> Result<(), GeometryError> {
        let nverts = self.vertices.len();
        let nsides = self.sidedefs.len();
        let nsectors = self.sectors.len();

        for (i, side) in self.sidedefs.iter().enumerate() {
            if side.sector as usize >= nsectors {
                return Err(GeometryError::SideSector {
                    side: i as SidedefId,
                    sector: side.sector,
                });
            }
        }

        for (i, line) in self.linedefs.iter().enumerate() {
            let line_id = i as LinedefId;
            for v in [line.v1, line.v2] {
                if v as usize >= nverts {
                    return Err(GeometryError::LineVertex {
                        line: line_id,
                        vertex: v,
                    });
                }
            }
            for s in std::iter::once(line.front_sidedef).chain(line.back_sidedef) {
                if s as usize >= nsides {
                    return Err(GeometryError::LineSide {
                        line: line_id,
                        side: s,
                    });
                }
            }
            if line.flags.contains(LinedefFlags::TWO_SIDED) && line.back_sidedef.is_none() {
                return Err(GeometryError::MissingBackSide { line: line_id });
            }
        }

        for (i, sector) in self.sectors.iter().enumerate() {
            if let Some(line) = sector.sky_line {
                if line as usize >= self.linedefs.len() {
                    return Err(GeometryError::SkyLine {
                        sector: i as SectorId,
                        line,
                    });
                }
            }
        }

        for (i, seg) in self.segs.iter_mut().enumerate() {
            let seg_id = i as SegmentId;
            for v in [seg.v1, seg.v2] {
                if v as usize >= nverts {
                    return Err(GeometryError::SegVertex {
                        seg: seg_id,
                        vertex: v,
                    });
                }
            }
            let line = self
                .linedefs
                .get(seg.linedef as usize)
                .ok_or(GeometryError::SegLine {
                    seg: seg_id,
                    line: seg.linedef,
                })?;

            let (this, other) = match seg.side {
                0 => (Some(line.front_sidedef), line.back_sidedef),
                1 => (line.back_sidedef, Some(line.front_sidedef)),
                _ => (None, None),
            };
            let sidedef = this.ok_or(GeometryError::SegSide {
                seg: seg_id,
                line: seg.linedef,
                side: seg.side,
            })?;

            let a = self.vertices[seg.v1 as usize].pos;
            let b = self.vertices[seg.v2 as usize].pos;
            let (dx, dy) = (b.x.wrapping_sub(a.x), b.y.wrapping_sub(a.y));
            if dx == 0 && dy == 0 {
                return Err(GeometryError::DegenerateSeg { seg: seg_id });
            }

            seg.sidedef = sidedef;
            seg.front_sector = self.sidedefs[sidedef as usize].sector;
            seg.back_sector = if line.flags.contains(LinedefFlags::TWO_SIDED) {
                other.map(|s| self.sidedefs[s as usize].sector)
            } else {
                None
            };
            seg.angle = point_to_angle(dx, dy);
            seg.length = point_to_dist(dx, dy);
            seg.fake_contrast = if dy == 0 {
                -1
            } else if dx == 0 {
                1
            } else {
                0
            };
        }

        for (i, ss) in self.subsectors.iter().enumerate() {
            let ss_id = i as SubsectorId;
            let first = ss.first_seg as usize;
            let end = first + ss.seg_count as usize;
            if end > self.segs.len() {
                return Err(GeometryError::SubsectorSegs {
                    ss: ss_id,
                    first,
                    end,
                    count: self.segs.len(),
                });
            }
            if ss.sector as usize >= nsectors {
                return Err(GeometryError::SubsectorSector {
                    ss: ss_id,
                    sector: ss.sector,
                });
            }
        }

        log::debug!(
            "level `{}` finalised: {} sectors, {} lines, {} segs, {} subsectors",
            self.name,
            self.sectors.len(),
            self.linedefs.len(),
            self.segs.len(),
            self.subsectors.len()
        );
        Ok(())
    }

    /// `true` when `(x, y)` is behind the seg's facing side.
    pub fn point_on_seg_side(&self, seg: SegmentId, x: Fixed, y: Fixed) -> bool {
        let seg = &self.segs[seg as usize];
        let a = self.vertices[seg.v1 as usize].pos;
        let b = self.vertices[seg.v2 as usize].pos;
        point_on_side(
            x,
            y,
            a.x,
            a.y,
            b.x.wrapping_sub(a.x),
            b.y.wrapping_sub(a.y),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::{ANG90, FRACUNIT, from_int};

    fn square() -> Level {
        let v = |x, y| Vertex {
            pos: IVec2::new(from_int(x), from_int(y)),
        };
        Level {
            name: "square".into(),
            vertices: vec![v(0, 0), v(0, 64), v(64, 64), v(64, 0)],
            sectors: vec![Sector {
                ceil_h: from_int(128),
                light: 160,
                ..Default::default()
            }],
            sidedefs: vec![Sidedef {
                x_off: 0,
                y_off: 0,
                upper: 0,
                lower: 0,
                middle: 1,
                sector: 0,
            }],
            linedefs: (0..4)
                .map(|i| Linedef {
                    v1: i,
                    v2: (i + 1) % 4,
                    flags: LinedefFlags::IMPASSABLE,
                    special: 0,
                    tag: 0,
                    front_sidedef: 0,
                    back_sidedef: None,
                })
                .collect(),
            segs: (0..4).map(|i| Seg::new(i, (i + 1) % 4, i, 0, 0)).collect(),
            subsectors: vec![Subsector {
                sector: 0,
                first_seg: 0,
                seg_count: 4,
            }],
        }
    }

    #[test]
    fn finalise_derives_seg_data() {
        let mut level = square();
        level.finalise().unwrap();

        let west = &level.segs[0]; // (0,0) → (0,64)
        assert!(west.angle.abs_diff(ANG90) < 2, "west wall runs north");
        assert!((west.length - from_int(64)).abs() < FRACUNIT / 256);
        assert_eq!(west.fake_contrast, 1, "vertical wall is brighter");
        assert_eq!(level.segs[1].fake_contrast, -1, "horizontal wall is darker");
        assert_eq!(west.back_sector, None);
    }

    #[test]
    fn dangling_references_are_fatal() {
        let mut level = square();
        level.segs[2].linedef = 40;
        assert_eq!(
            level.finalise(),
            Err(GeometryError::SegLine { seg: 2, line: 40 })
        );

        let mut level = square();
        level.segs[1].side = 1;
        assert_eq!(
            level.finalise(),
            Err(GeometryError::SegSide {
                seg: 1,
                line: 1,
                side: 1
            })
        );

        let mut level = square();
        level.sidedefs[0].sector = 7;
        let err = level.finalise().unwrap_err();
        assert_eq!(err.to_string(), "sidedef 0 references missing sector 7");

        let mut level = square();
        level.linedefs[3].flags |= LinedefFlags::TWO_SIDED;
        assert_eq!(
            level.finalise(),
            Err(GeometryError::MissingBackSide { line: 3 })
        );
    }

    #[test]
    fn interior_is_on_the_front_side() {
        let mut level = square();
        level.finalise().unwrap();
        // clockwise walls: the room's inside is on every seg's front side
        for seg in 0..4 {
            assert!(
                !level.point_on_seg_side(seg, from_int(32), from_int(32)),
                "centre should be in front of seg {seg}"
            );
        }
    }
}
