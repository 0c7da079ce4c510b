//! In-memory level construction from convex sector outlines.
//!
//! Every sector becomes one subsector, so each outline must be convex and
//! wound **clockwise** (interior on the right of every edge, y up).  An
//! edge that appears reversed in a second outline becomes a two-sided line
//! between the two sectors.

use std::collections::HashMap;

use glam::{IVec2, Vec2};

use crate::fixed::from_f32;
use crate::world::geometry::{
    GeometryError, Level, Linedef, LinedefFlags, LinedefId, Sector, SectorId, Seg, Sidedef,
    SidedefId, Subsector, Vertex, VertexId,
};
use crate::world::texture::{NO_TEXTURE, TextureId};

/// Textures and flags of one outline edge.
#[derive(Clone, Copy, Debug, Default)]
pub struct WallDesc {
    pub upper: TextureId,
    pub lower: TextureId,
    pub middle: TextureId,
    pub flags: LinedefFlags,
    pub special: u16,
    pub x_off: f32,
    pub y_off: f32,
}

impl WallDesc {
    /// Solid wall (middle texture only).
    pub fn solid(middle: TextureId) -> Self {
        Self {
            middle,
            ..Default::default()
        }
    }

    /// Portal edge: upper/lower step textures, no middle.
    pub fn portal(upper: TextureId, lower: TextureId) -> Self {
        Self {
            upper,
            lower,
            middle: NO_TEXTURE,
            ..Default::default()
        }
    }
}

/// Flat-floored sector from map units.
pub fn room(floor: f32, ceil: f32, floor_tex: TextureId, ceil_tex: TextureId, light: i16) -> Sector {
    Sector {
        floor_h: from_f32(floor),
        ceil_h: from_f32(ceil),
        floor_tex,
        ceil_tex,
        light,
        ..Default::default()
    }
}

struct Edge {
    a: VertexId,
    b: VertexId,
    sector: SectorId,
    wall: WallDesc,
}

#[derive(Default)]
pub struct LevelBuilder {
    name: String,
    vertices: Vec<Vertex>,
    vertex_ids: HashMap<IVec2, VertexId>,
    sectors: Vec<Sector>,
    edges: Vec<Edge>,
}

impl LevelBuilder {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_sector(&mut self, sector: Sector) -> SectorId {
        self.sectors.push(sector);
        (self.sectors.len() - 1) as SectorId
    }

    fn vertex(&mut self, p: Vec2) -> VertexId {
        let v = Vertex::from_map(p);
        if let Some(&id) = self.vertex_ids.get(&v.pos) {
            return id;
        }
        let id = self.vertices.len() as VertexId;
        self.vertices.push(v);
        self.vertex_ids.insert(v.pos, id);
        id
    }

    /// Outline `sector` with the same wall on every edge.
    pub fn polygon(&mut self, sector: SectorId, points: &[Vec2], wall: WallDesc) {
        let walls = vec![wall; points.len()];
        self.polygon_walls(sector, points, &walls);
    }

    /// Outline `sector`; `walls[i]` describes the edge `points[i] → points[i+1]`.
    pub fn polygon_walls(&mut self, sector: SectorId, points: &[Vec2], walls: &[WallDesc]) {
        for (i, &p) in points.iter().enumerate() {
            let a = self.vertex(p);
            let b = self.vertex(points[(i + 1) % points.len()]);
            let wall = walls.get(i).copied().unwrap_or_default();
            self.edges.push(Edge { a, b, sector, wall });
        }
    }

    fn sidedef(wall: &WallDesc, sector: SectorId) -> Sidedef {
        Sidedef {
            x_off: from_f32(wall.x_off),
            y_off: from_f32(wall.y_off),
            upper: wall.upper,
            lower: wall.lower,
            middle: wall.middle,
            sector,
        }
    }

    /// Pair up edges into linedefs, emit segs per sector and validate.
    pub fn build(self) -> Result<Level, GeometryError> {
        let by_ends: HashMap<(VertexId, VertexId), usize> = self
            .edges
            .iter()
            .enumerate()
            .map(|(i, e)| ((e.a, e.b), i))
            .collect();

        let mut linedefs = Vec::new();
        let mut sidedefs = Vec::new();
        // per edge: which line and which side of it
        let mut owner: Vec<Option<(LinedefId, u8)>> = vec![None; self.edges.len()];

        for (i, e) in self.edges.iter().enumerate() {
            if owner[i].is_some() {
                continue;
            }
            let line_id = linedefs.len() as LinedefId;
            let front = sidedefs.len() as SidedefId;
            sidedefs.push(Self::sidedef(&e.wall, e.sector));

            let twin = by_ends
                .get(&(e.b, e.a))
                .copied()
                .filter(|&j| owner[j].is_none() && j != i);

            let (flags, back) = match twin {
                Some(j) => {
                    let back = sidedefs.len() as SidedefId;
                    sidedefs.push(Self::sidedef(&self.edges[j].wall, self.edges[j].sector));
                    owner[j] = Some((line_id, 1));
                    (LinedefFlags::TWO_SIDED | e.wall.flags, Some(back))
                }
                None => (LinedefFlags::IMPASSABLE | e.wall.flags, None),
            };
            owner[i] = Some((line_id, 0));

            linedefs.push(Linedef {
                v1: e.a,
                v2: e.b,
                flags,
                special: e.wall.special,
                tag: 0,
                front_sidedef: front,
                back_sidedef: back,
            });
        }

        let mut segs = Vec::new();
        let mut subsectors = Vec::new();
        for sector in 0..self.sectors.len() as SectorId {
            let first = segs.len();
            for (i, e) in self.edges.iter().enumerate() {
                if e.sector != sector {
                    continue;
                }
                if let Some((line, side)) = owner[i] {
                    segs.push(Seg::new(e.a, e.b, line, side, 0));
                }
            }
            subsectors.push(Subsector {
                sector,
                first_seg: first as u16,
                seg_count: (segs.len() - first) as u16,
            });
        }

        let mut level = Level {
            name: self.name,
            linedefs,
            sidedefs,
            vertices: self.vertices,
            segs,
            subsectors,
            sectors: self.sectors,
        };
        level.finalise()?;
        Ok(level)
    }
}
