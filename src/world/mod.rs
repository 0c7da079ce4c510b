pub mod builder;
pub mod camera;
pub mod geometry;
pub mod scene;
pub mod texture;

pub use geometry::{
    GeometryError, Level, Linedef, LinedefFlags, LinedefId, Sector, SectorId, Seg, SegmentId,
    Sidedef, SidedefId, Subsector, SubsectorId, Vertex, VertexId,
};

pub use builder::{LevelBuilder, WallDesc};

pub use camera::Camera;

pub use scene::{RenderFlags, Scene, Thing};

pub use texture::{
    BlendTables, Brightmap, Colormap, NO_TEXTURE, Palette, SpriteDef, SpriteFrame, SpriteId,
    Texture, TextureBank, TextureError, TextureId, Translations,
};
