//! Dynamic objects the renderer turns into sprites.
//!
//! Objects are plain ECS entities; the renderer only ever reads them.  Once
//! per frame [`Scene::bucket_by_sector`] flattens them into per-sector lists
//! so each sector's objects are projected exactly once.

use bitflags::bitflags;
use hecs::{Entity, World};

use crate::fixed::{Angle, Fixed};
use crate::world::geometry::SectorId;
use crate::world::texture::SpriteId;

/// Frame bit: draw this frame at full brightness.
pub const FF_FULLBRIGHT: u32 = 0x8000;
pub const FF_FRAMEMASK: u32 = 0x7fff;

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct RenderFlags: u32 {
        const NEVER_DRAW  = 0x0001;
        /// Fuzz effect, spectre style.
        const SHADOW      = 0x0002;
        const TRANSLUCENT = 0x0004;
        const ADDITIVE    = 0x0008;
        /// 2-bit player colour translation, 0 = none.
        const TRANSLATION = 0x0030;
    }
}

pub const TRANSLATION_SHIFT: u32 = 4;

/*──────────────────────────── components ─────────────────────────────*/

/// World-space position; `z` is the object's feet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Facing(pub Angle);

#[derive(Debug, Clone, Copy, Default)]
pub struct SpriteState {
    pub sprite: SpriteId,
    /// Frame index, optionally or-ed with [`FF_FULLBRIGHT`].
    pub frame: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct SectorLink(pub SectorId);

/// Flattened copy of one object, as the sprite projector consumes it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Thing {
    pub pos: Position,
    pub angle: Angle,
    pub sprite: SpriteId,
    pub frame: u32,
    pub flags: RenderFlags,
}

/// Owns the ECS world holding every renderable object.
#[derive(Default)]
pub struct Scene {
    world: World,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            world: World::new(),
        }
    }

    #[inline]
    pub fn world(&self) -> &World {
        &self.world
    }

    #[inline]
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn len(&self) -> usize {
        self.world.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.world.is_empty()
    }

    /// Spawn an object standing in `sector`.
    pub fn spawn(
        &mut self,
        pos: Position,
        angle: Angle,
        sprite: SpriteState,
        sector: SectorId,
        flags: RenderFlags,
    ) -> Entity {
        self.world
            .spawn((pos, Facing(angle), sprite, SectorLink(sector), flags))
    }

    /// Move an object to another sector after it crossed a line.
    pub fn relink(&mut self, e: Entity, sector: SectorId) -> bool {
        match self.world.get::<&mut SectorLink>(e) {
            Ok(mut link) => {
                link.0 = sector;
                true
            }
            Err(_) => false,
        }
    }

    /// Refill `buckets[sector]` with that sector's objects.
    ///
    /// Objects linked to a sector outside `0..num_sectors` are ignored.
    pub fn bucket_by_sector(&self, buckets: &mut Vec<Vec<Thing>>, num_sectors: usize) {
        buckets.resize_with(num_sectors, Vec::new);
        buckets.truncate(num_sectors);
        for b in buckets.iter_mut() {
            b.clear();
        }

        let mut query = self.world.query::<(
            &Position,
            &Facing,
            &SpriteState,
            &SectorLink,
            Option<&RenderFlags>,
        )>();
        for (_, (pos, facing, spr, link, flags)) in query.iter() {
            if let Some(bucket) = buckets.get_mut(link.0 as usize) {
                bucket.push(Thing {
                    pos: *pos,
                    angle: facing.0,
                    sprite: spr.sprite,
                    frame: spr.frame,
                    flags: flags.copied().unwrap_or_default(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_at(scene: &mut Scene, sector: SectorId) -> Entity {
        scene.spawn(
            Position::default(),
            0,
            SpriteState::default(),
            sector,
            RenderFlags::empty(),
        )
    }

    #[test]
    fn buckets_follow_sector_links() {
        let mut scene = Scene::new();
        spawn_at(&mut scene, 0);
        let mover = spawn_at(&mut scene, 1);
        spawn_at(&mut scene, 1);
        spawn_at(&mut scene, 9); // bogus sector, ignored

        let mut buckets = Vec::new();
        scene.bucket_by_sector(&mut buckets, 2);
        assert_eq!(buckets.iter().map(Vec::len).collect::<Vec<_>>(), vec![1, 2]);

        assert!(scene.relink(mover, 0));
        scene.bucket_by_sector(&mut buckets, 2);
        assert_eq!(
            buckets.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![2, 1],
            "buckets are rebuilt, not appended to"
        );
    }

    #[test]
    fn flags_default_when_missing() {
        let mut scene = Scene::new();
        scene.world_mut().spawn((
            Position::default(),
            Facing(0),
            SpriteState::default(),
            SectorLink(0),
        ));
        let mut buckets = Vec::new();
        scene.bucket_by_sector(&mut buckets, 1);
        assert_eq!(buckets[0][0].flags, RenderFlags::empty());
    }
}
