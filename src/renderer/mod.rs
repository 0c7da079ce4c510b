//! Rendering abstraction layer.
//!
//! *The rest of the program never touches a pixel buffer directly.*
//! It hands a camera, the level, the objects and the materials to a type
//! that implements [`Renderer`] and receives a finished frame back.
//!
//! * BSP traversal stays outside: callers pass subsectors front to back.
//! * A helper blanket-impl [`RendererExt`] adds `draw_frame` so call-sites
//!   stay short.

use crate::world::{
    camera::Camera,
    geometry::{Level, SubsectorId},
    scene::Scene,
    texture::TextureBank,
};

/// Pixel format handed to `submit` (0x00RRGGBB).
pub type Rgba = u32;

/// A renderer that owns an internal scratch buffer for the whole frame.
///
/// `end_frame` hands the finished buffer to a user-supplied closure.
pub trait Renderer {
    /// Freeze the camera and clear every per-frame structure.
    fn begin_frame(&mut self, camera: &Camera);

    /// Render `subsectors`, ordered front to back, with their objects.
    fn draw_level(&mut self, subsectors: &[SubsectorId], level: &Level, scene: &Scene, bank: &TextureBank);

    /// Finish the frame and **loan** the finished buffer to `submit`.
    ///
    /// * `submit(&[Rgba], w, h)` is run exactly once per frame.
    /// * A window front-end passes
    ///   `|fb, w, h| window.update_with_buffer(fb, w, h)`.
    fn end_frame<F>(&mut self, bank: &TextureBank, submit: F)
    where
        F: FnOnce(&[Rgba], usize, usize);
}

/// Convenience blanket-impl with a one-liner `draw_frame` adaptor.
pub trait RendererExt: Renderer {
    fn draw_frame<F>(
        &mut self,
        camera: &Camera,
        subsectors: &[SubsectorId],
        level: &Level,
        scene: &Scene,
        bank: &TextureBank,
        submit: F,
    ) where
        F: FnOnce(&[Rgba], usize, usize),
    {
        self.begin_frame(camera);
        self.draw_level(subsectors, level, scene, bank);
        self.end_frame(bank, submit);
    }
}
impl<T: Renderer + ?Sized> RendererExt for T {}

pub mod software;
