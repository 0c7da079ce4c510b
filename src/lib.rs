//! Fixed-point Doom-style software rasterizer.
//!
//! * [`fixed`] and [`tables`] hold the 16.16 arithmetic and the trig tables.
//! * [`world`] is the read-only input: level geometry, objects, materials.
//! * [`renderer`] turns one camera into one palette-indexed frame.

pub mod config;
pub mod fixed;
pub mod renderer;
pub mod tables;
pub mod world;
