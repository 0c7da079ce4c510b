//! ---------------------------------------------------------------------------
//! Classic software (CPU) column renderer, all fixed point.
//!
//! * Walls are drawn front to back as the BSP order hands subsectors over;
//!   the clip arrays make overdraw impossible, so no depth buffer exists.
//! * Floors and ceilings are collected into visplanes while walls are
//!   drawn and rasterised as horizontal spans afterwards.
//! * Objects and masked mid textures come last, back to front, clipped
//!   against the silhouettes the walls left behind.
//!
//! Pixels are palette indices; [`Renderer::end_frame`] resolves them.
//!
//! [`Renderer::end_frame`]: crate::renderer::Renderer::end_frame
//! ---------------------------------------------------------------------------

pub mod clipper;
pub mod columns;
pub mod lighting;
pub mod planes;
pub mod projection;
mod renderer;
pub mod segs;
pub mod sprites;

pub use renderer::{FrameStats, Software};

use projection::Projection;

/// Indexed-colour target of the drawers.
///
/// `width` is in pixels, `view_width` in drawer columns; they differ by the
/// detail shift.
pub struct Framebuffer {
    pub width: usize,
    pub height: usize,
    pub view_width: i32,
    pub detail_shift: i32,
    pub centery: i32,
    pub pixels: Vec<u8>,
    /// Position in the fuzz offset table, carried across columns.
    pub fuzz_pos: usize,
}

impl Framebuffer {
    pub fn new(proj: &Projection) -> Self {
        let width = proj.scaled_width as usize;
        let height = proj.view_height as usize;
        Self {
            width,
            height,
            view_width: proj.view_width,
            detail_shift: proj.detail_shift,
            centery: proj.centery,
            pixels: vec![0; width * height],
            fuzz_pos: 0,
        }
    }
}
