//! # vtrender
//!
//! Packing and rendering core for vector tile maps.
//!
//! Raw tile features are packed off the render thread into numeric vertex and index buffers
//! ([`pack`]). The [`render::VectorTileRenderer`] receives those buffers, turns them into meshes
//! through a closed set of painters and composites tiles from several zoom levels with a stencil
//! protocol, so that only the most detailed tile covering a pixel is drawn.
//!
//! The GPU is abstracted behind [`render::backend::GpuBackend`]. A software
//! [`render::headless::HeadlessBackend`] is included for tests and offscreen use.

pub mod coords;
pub mod error;
pub mod io;
pub mod pack;
pub mod render;
pub mod style;
pub mod tile;
pub mod util;

pub use error::Error;
