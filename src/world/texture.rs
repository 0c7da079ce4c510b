// Format-agnostic repository of materials handed over by the asset loader.
// The renderer and world logic interact through `TextureId` only.

use std::collections::HashMap;

use std::ops::{Index, IndexMut};

use smallvec::{SmallVec, smallvec};

/// Runtime handle for a texture in this bank.
///
/// *Guaranteed* to remain stable for the lifetime of the bank.
pub type TextureId = u16;

/// `TextureId` whose pixels are the checkerboard fallback.
/// Always = 0 because `TextureBank::new()` inserts it first.  Sidedefs use
/// it to say "no texture on this tier".
pub const NO_TEXTURE: TextureId = 0;

pub type BrightmapId = u16;
pub type SpriteId = u16;

/// Per palette index: non-zero = always drawn full bright.
pub type Brightmap = [u8; 256];

pub static NO_BRIGHTMAP: Brightmap = [0; 256];

/// Run of opaque texels inside one texture column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Post {
    pub top: u16,
    pub len: u16,
}

/// CPU-side storage: palette indices in **column-major** order, the natural
/// layout for a column renderer.  Flats use the same layout; the span
/// drawer indexes `x * h + y`.
#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
    pub name: String,
    pub w: usize,
    pub h: usize,
    pub pixels: Vec<u8>,
    /// Sprite hot-spot, in texels (0 for walls and flats).
    pub left_offset: i32,
    pub top_offset: i32,
    pub brightmap: Option<BrightmapId>,
    posts: Vec<SmallVec<[Post; 2]>>,
}

impl Texture {
    /// Fully opaque texture, every column one post.
    pub fn opaque<S: Into<String>>(name: S, w: usize, h: usize, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), w * h);
        let post = Post {
            top: 0,
            len: h as u16,
        };
        Self {
            name: name.into(),
            w,
            h,
            pixels,
            left_offset: 0,
            top_offset: 0,
            brightmap: None,
            posts: vec![smallvec![post]; w],
        }
    }

    /// Texture with holes: texels equal to `transparent` are left out of
    /// the post lists and never drawn by the masked drawer.
    pub fn masked<S: Into<String>>(
        name: S,
        w: usize,
        h: usize,
        pixels: Vec<u8>,
        transparent: u8,
    ) -> Self {
        let mut tex = Self::opaque(name, w, h, pixels);
        for x in 0..w {
            let col = &tex.pixels[x * h..(x + 1) * h];
            let mut posts = SmallVec::new();
            let mut y = 0;
            while y < h {
                if col[y] == transparent {
                    y += 1;
                    continue;
                }
                let top = y;
                while y < h && col[y] != transparent {
                    y += 1;
                }
                posts.push(Post {
                    top: top as u16,
                    len: (y - top) as u16,
                });
            }
            tex.posts[x] = posts;
        }
        tex
    }

    /// Build from row-major pixels (how most tools produce images).
    pub fn from_rows<S: Into<String>>(name: S, w: usize, h: usize, rows: &[u8]) -> Self {
        let mut pixels = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                pixels[x * h + y] = rows[y * w + x];
            }
        }
        Self::opaque(name, w, h, pixels)
    }

    pub fn with_offsets(mut self, left: i32, top: i32) -> Self {
        self.left_offset = left;
        self.top_offset = top;
        self
    }

    pub fn with_brightmap(mut self, id: BrightmapId) -> Self {
        self.brightmap = Some(id);
        self
    }

    #[inline]
    fn wrap_column(&self, col: i32) -> usize {
        if self.w.is_power_of_two() {
            (col & (self.w as i32 - 1)) as usize
        } else {
            col.rem_euclid(self.w as i32) as usize
        }
    }

    /// Texels of column `col`, wrapping horizontally.
    #[inline]
    pub fn column(&self, col: i32) -> &[u8] {
        let x = self.wrap_column(col);
        &self.pixels[x * self.h..(x + 1) * self.h]
    }

    /// Opaque runs of column `col`, wrapping horizontally.
    #[inline]
    pub fn posts(&self, col: i32) -> &[Post] {
        &self.posts[self.wrap_column(col)]
    }

    /// `true` when some column has a hole.
    pub fn is_masked(&self) -> bool {
        self.posts
            .iter()
            .any(|p| p.len() != 1 || p[0].top != 0 || p[0].len as usize != self.h)
    }
}

/// Convenience checkerboard 8×8 (dark/light grey).
impl Default for Texture {
    fn default() -> Self {
        const LIGHT_IDX: u8 = 8;
        const DARK_IDX: u8 = 16;
        let mut pix = vec![0u8; 8 * 8];
        for x in 0..8 {
            for y in 0..8 {
                pix[x * 8 + y] = if (x ^ y) & 1 == 0 {
                    LIGHT_IDX
                } else {
                    DARK_IDX
                };
            }
        }
        Texture::opaque("CHECKER", 8, 8, pix)
    }
}

/// Things that can go wrong when using the bank.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextureError {
    /// Attempted to insert a second texture with an existing name.
    #[error("texture name `{0}` already present in bank")]
    Duplicate(String),

    /// Requested ID is outside `0 .. bank.len()`.
    #[error("texture id {0} out of range")]
    BadId(TextureId),

    #[error("sprite id {0} out of range")]
    BadSprite(SpriteId),

    #[error("brightmap id {0} out of range")]
    BadBrightmap(BrightmapId),
}

/*──────────────────────── palette-side tables ────────────────────────*/

pub struct Palette(pub [u32; 256]);
impl Default for Palette {
    fn default() -> Self {
        Palette([0u32; 256])
    }
}
impl Index<usize> for Palette {
    type Output = u32;
    fn index(&self, idx: usize) -> &u32 {
        &self.0[idx]
    }
}
impl IndexMut<usize> for Palette {
    fn index_mut(&mut self, idx: usize) -> &mut u32 {
        &mut self.0[idx]
    }
}

#[inline]
fn rgb(c: u32) -> (i32, i32, i32) {
    (((c >> 16) & 0xff) as i32, ((c >> 8) & 0xff) as i32, (c & 0xff) as i32)
}

impl Palette {
    /// Index of the palette entry closest to `(r, g, b)`.
    pub fn nearest(&self, r: i32, g: i32, b: i32) -> u8 {
        let mut best = 0;
        let mut best_d = i32::MAX;
        for (i, &c) in self.0.iter().enumerate() {
            let (pr, pg, pb) = rgb(c);
            let d = (pr - r).pow(2) + (pg - g).pow(2) + (pb - b).pow(2);
            if d < best_d {
                best_d = d;
                best = i;
                if d == 0 {
                    break;
                }
            }
        }
        best as u8
    }
}

/// Colormap 0..32 = light levels (0 full bright), 32 = invulnerability,
/// 33 = all black.
pub const INVULN_MAP: u8 = 32;
pub const NUM_COLORMAP_TABLES: usize = 34;

pub struct Colormap(pub [[u8; 256]; NUM_COLORMAP_TABLES]);
impl Default for Colormap {
    fn default() -> Self {
        Colormap([[0u8; 256]; NUM_COLORMAP_TABLES])
    }
}
impl Index<usize> for Colormap {
    type Output = [u8; 256];
    fn index(&self, idx: usize) -> &Self::Output {
        &self.0[idx]
    }
}
impl IndexMut<usize> for Colormap {
    fn index_mut(&mut self, idx: usize) -> &mut [u8; 256] {
        &mut self.0[idx]
    }
}

impl Colormap {
    /// Every map is the identity; handy when lighting is irrelevant.
    pub fn identity() -> Self {
        let mut cm = Self::default();
        for map in cm.0.iter_mut() {
            for (i, v) in map.iter_mut().enumerate() {
                *v = i as u8;
            }
        }
        cm
    }

    /// Fade every entry linearly towards black, plus the inverted grey
    /// invulnerability map and a black map.
    pub fn from_palette(pal: &Palette) -> Self {
        let mut cm = Self::default();
        for level in 0..32 {
            let keep = 32 - level as i32;
            for i in 0..256 {
                let (r, g, b) = rgb(pal[i]);
                cm[level][i] = pal.nearest(r * keep / 32, g * keep / 32, b * keep / 32);
            }
        }
        for i in 0..256 {
            let (r, g, b) = rgb(pal[i]);
            let grey = 255 - (r * 30 + g * 59 + b * 11) / 100;
            cm[INVULN_MAP as usize][i] = pal.nearest(grey, grey, grey);
        }
        let black = pal.nearest(0, 0, 0);
        cm[33] = [black; 256];
        cm
    }
}

/// `dest << 8 | source` lookup tables for the blending drawers.
pub struct BlendTables {
    tranmap: Vec<u8>,
    addmap: Vec<u8>,
}

impl Default for BlendTables {
    fn default() -> Self {
        Self::identity()
    }
}

impl BlendTables {
    /// Both modes simply replace the destination.
    pub fn identity() -> Self {
        let map: Vec<u8> = (0..65536usize).map(|i| (i & 0xff) as u8).collect();
        Self {
            tranmap: map.clone(),
            addmap: map,
        }
    }

    /// 50 % mix and saturating sum, matched back into `pal`.
    pub fn build(pal: &Palette) -> Self {
        // 5 bits per channel is plenty for matching and keeps this quick
        let mut cube: Vec<Option<u8>> = vec![None; 1 << 15];
        let mut lookup = |r: i32, g: i32, b: i32| -> u8 {
            let key = ((r >> 3) << 10 | (g >> 3) << 5 | (b >> 3)) as usize;
            *cube[key].get_or_insert_with(|| pal.nearest(r, g, b))
        };

        let mut tranmap = vec![0u8; 65536];
        let mut addmap = vec![0u8; 65536];
        for dest in 0..256 {
            let (dr, dg, db) = rgb(pal[dest]);
            for src in 0..256 {
                let (sr, sg, sb) = rgb(pal[src]);
                let i = dest << 8 | src;
                tranmap[i] = lookup((dr + sr) / 2, (dg + sg) / 2, (db + sb) / 2);
                addmap[i] = lookup((dr + sr).min(255), (dg + sg).min(255), (db + sb).min(255));
            }
        }
        Self { tranmap, addmap }
    }

    #[inline(always)]
    pub fn translucent(&self, dest: u8, src: u8) -> u8 {
        self.tranmap[(dest as usize) << 8 | src as usize]
    }

    #[inline(always)]
    pub fn additive(&self, dest: u8, src: u8) -> u8 {
        self.addmap[(dest as usize) << 8 | src as usize]
    }
}

/// Player colour remaps: the green ramp `0x70..=0x7f` moved to grey,
/// brown and red.
pub struct Translations(pub [[u8; 256]; 3]);

impl Default for Translations {
    fn default() -> Self {
        let mut t = [[0u8; 256]; 3];
        for i in 0..256 {
            let green = (0x70..=0x7f).contains(&i);
            t[0][i] = if green { 0x60 + (i as u8 & 0xf) } else { i as u8 };
            t[1][i] = if green { 0x40 + (i as u8 & 0xf) } else { i as u8 };
            t[2][i] = if green { 0x20 + (i as u8 & 0xf) } else { i as u8 };
        }
        Translations(t)
    }
}

/*──────────────────────────── sprites ────────────────────────────────*/

/// One animation frame: either a single view for every angle or eight
/// rotations, each optionally mirrored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpriteFrame {
    pub rotate: bool,
    pub lump: [TextureId; 8],
    pub flip: [bool; 8],
}

impl SpriteFrame {
    pub fn single(tex: TextureId) -> Self {
        Self {
            rotate: false,
            lump: [tex; 8],
            flip: [false; 8],
        }
    }

    pub fn rotated(lump: [TextureId; 8], flip: [bool; 8]) -> Self {
        Self {
            rotate: true,
            lump,
            flip,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SpriteDef {
    pub name: String,
    pub frames: Vec<SpriteFrame>,
}

/*───────────────────────────── bank ──────────────────────────────────*/

/// A palette-agnostic, format-agnostic cache of materials.
///
/// * Does **not** know about WADs, PNG, OpenGL — that’s the loader’s job.
/// * Stores exactly one copy of every name.
/// * ID **0** is always the “missing” checkerboard.
///
/// **Thread-safety:** access `TextureBank` from a single thread or wrap it
/// in `RwLock`; the struct itself is not `Sync`.
pub struct TextureBank {
    by_name: HashMap<String, TextureId>,
    data: Vec<Texture>,
    palette: Palette,
    colormap: Colormap,
    blend: BlendTables,
    translations: Translations,
    brightmaps: Vec<Brightmap>,
    sprites: Vec<SpriteDef>,
    /// Flat that marks a ceiling (or floor) as open sky.
    pub sky_flat: TextureId,
    /// Wall texture drawn wherever `sky_flat` shows.
    pub sky_texture: TextureId,
}

impl TextureBank {
    // ---------------------------------------------------------------------
    // Constructors
    // ---------------------------------------------------------------------

    /// Create an empty bank with a mandatory *missing* texture used as
    /// fallback.  The texture is inserted under the fixed name `"MISSING"`
    /// and obtains the handle **0**.
    pub fn new(missing_tex: Texture) -> Self {
        let mut by_name = HashMap::new();
        by_name.insert("MISSING".into(), NO_TEXTURE);
        Self {
            by_name,
            data: vec![missing_tex],
            palette: Palette::default(),
            colormap: Colormap::identity(),
            blend: BlendTables::identity(),
            translations: Translations::default(),
            brightmaps: Vec::new(),
            sprites: Vec::new(),
            sky_flat: NO_TEXTURE,
            sky_texture: NO_TEXTURE,
        }
    }

    pub fn default_with_checker() -> Self {
        Self::new(Texture::default())
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.palette = palette;
    }

    pub fn set_colormap(&mut self, colormap: Colormap) {
        self.colormap = colormap;
    }

    pub fn set_blend_tables(&mut self, blend: BlendTables) {
        self.blend = blend;
    }

    pub fn set_translations(&mut self, translations: Translations) {
        self.translations = translations;
    }

    // ---------------------------------------------------------------------
    // Query helpers
    // ---------------------------------------------------------------------

    /// Number of textures stored (including the “missing” one).
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.len() == 1
    } // only checker

    /// Obtain the id for a *loaded* texture by name.
    /// Returns `None` if the name is unknown.
    pub fn id(&self, name: &str) -> Option<TextureId> {
        self.by_name.get(name).copied()
    }

    /// Fallback-safe query: unknown names resolve to the checkerboard id.
    pub fn id_or_missing(&self, name: &str) -> TextureId {
        self.id(name).unwrap_or(NO_TEXTURE)
    }

    /// Borrow a texture by id, with bounds-checking.
    pub fn texture(&self, id: TextureId) -> Result<&Texture, TextureError> {
        self.data.get(id as usize).ok_or(TextureError::BadId(id))
    }

    /// Renderer-side lookup: unknown ids draw the checkerboard.
    #[inline]
    pub fn texture_or_missing(&self, id: TextureId) -> &Texture {
        self.data.get(id as usize).unwrap_or(&self.data[0])
    }

    /// Mutable borrow (e.g. for post-load mip-generation).
    pub fn texture_mut(&mut self, id: TextureId) -> Result<&mut Texture, TextureError> {
        self.data
            .get_mut(id as usize)
            .ok_or(TextureError::BadId(id))
    }

    /// Brightmap of `tex`, or the all-zero map.
    #[inline]
    pub fn brightmap_of(&self, tex: &Texture) -> &Brightmap {
        tex.brightmap
            .and_then(|b| self.brightmaps.get(b as usize))
            .unwrap_or(&NO_BRIGHTMAP)
    }

    pub fn sprite(&self, id: SpriteId) -> Result<&SpriteDef, TextureError> {
        self.sprites
            .get(id as usize)
            .ok_or(TextureError::BadSprite(id))
    }

    #[inline]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    #[inline]
    pub fn colormap(&self) -> &Colormap {
        &self.colormap
    }

    #[inline]
    pub fn blend(&self) -> &BlendTables {
        &self.blend
    }

    #[inline]
    pub fn translation(&self, idx: u8) -> &[u8; 256] {
        &self.translations.0[(idx as usize).min(2)]
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Insert a texture under `name`.
    ///
    /// * Returns the newly assigned `TextureId`.
    /// * Fails if the name already exists (`Duplicate`).
    pub fn insert<S: Into<String>>(
        &mut self,
        name: S,
        tex: Texture,
    ) -> Result<TextureId, TextureError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(TextureError::Duplicate(name));
        }
        let id = self.data.len() as TextureId;
        self.data.push(tex);
        self.by_name.insert(name, id);
        Ok(id)
    }

    pub fn add_brightmap(&mut self, map: Brightmap) -> BrightmapId {
        self.brightmaps.push(map);
        (self.brightmaps.len() - 1) as BrightmapId
    }

    /// Attach brightmap `map` to texture `id`.
    pub fn set_brightmap(&mut self, id: TextureId, map: BrightmapId) -> Result<(), TextureError> {
        if map as usize >= self.brightmaps.len() {
            return Err(TextureError::BadBrightmap(map));
        }
        self.texture_mut(id)?.brightmap = Some(map);
        Ok(())
    }

    pub fn add_sprite(&mut self, def: SpriteDef) -> SpriteId {
        self.sprites.push(def);
        (self.sprites.len() - 1) as SpriteId
    }
}

/*======================================================================*/
/*                               Tests                                  */
/*======================================================================*/
#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_tex(color: u8) -> Texture {
        Texture::opaque("Dummy", 2, 2, vec![color; 4])
    }

    #[test]
    fn insert_and_lookup() {
        let mut bank = TextureBank::default_with_checker();
        let red = bank.insert("RED", dummy_tex(0x00)).unwrap();
        let blue = bank.insert("BLUE", dummy_tex(0xFF)).unwrap();

        assert_ne!(red, NO_TEXTURE);
        assert_ne!(blue, red);
        assert_eq!(bank.id("RED"), Some(red));
        assert_eq!(bank.id("BLUE"), Some(blue));
        assert_eq!(bank.id("NOPE"), None);

        assert_eq!(bank.texture(red).unwrap().pixels[0], 0x00);
        assert_eq!(bank.texture(blue).unwrap().pixels[0], 0xFF);
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut bank = TextureBank::default_with_checker();
        bank.insert("WOOD", dummy_tex(1)).unwrap();
        let err = bank.insert("WOOD", dummy_tex(2)).unwrap_err();
        assert_eq!(err, TextureError::Duplicate("WOOD".into()));
        // texture count still 2 (checker + first WOOD)
        assert_eq!(bank.len(), 2);
    }

    #[test]
    fn bad_id_guard() {
        let bank = TextureBank::default_with_checker();
        let bad = TextureId::MAX;
        assert_eq!(bank.texture(bad).unwrap_err(), TextureError::BadId(bad));
        assert_eq!(bank.texture_or_missing(bad).name, "CHECKER");
        assert_eq!(bank.sprite(3).unwrap_err(), TextureError::BadSprite(3));
    }

    #[test]
    fn masked_texture_posts_skip_holes() {
        // one column: . X X . X   (0 = transparent)
        let tex = Texture::masked("GRATE", 1, 5, vec![0, 4, 4, 0, 9], 0);
        assert_eq!(
            tex.posts(0),
            &[Post { top: 1, len: 2 }, Post { top: 4, len: 1 }]
        );
        assert!(tex.is_masked());
        assert!(!dummy_tex(3).is_masked());
    }

    #[test]
    fn columns_wrap_for_any_width() {
        let tex = Texture::from_rows("ODD", 3, 1, &[10, 11, 12]);
        assert_eq!(tex.column(4), &[11], "4 mod 3 = 1");
        assert_eq!(tex.column(-1), &[12], "negative columns wrap too");
    }

    #[test]
    fn brightmap_is_per_texture() {
        let mut bank = TextureBank::default_with_checker();
        let lamp = bank.insert("LAMP", dummy_tex(7)).unwrap();
        let wall = bank.insert("WALL", dummy_tex(7)).unwrap();
        let mut map = NO_BRIGHTMAP;
        map[7] = 1;
        let bm = bank.add_brightmap(map);
        bank.set_brightmap(lamp, bm).unwrap();
        assert_eq!(bank.set_brightmap(wall, 9), Err(TextureError::BadBrightmap(9)));

        assert_eq!(bank.brightmap_of(bank.texture(lamp).unwrap())[7], 1);
        assert_eq!(bank.brightmap_of(bank.texture(wall).unwrap())[7], 0);
    }

    #[test]
    fn translations_only_touch_green_ramp() {
        let t = Translations::default();
        assert_eq!(t.0[2][0x73], 0x23);
        assert_eq!(t.0[0][0x10], 0x10);
    }
}
