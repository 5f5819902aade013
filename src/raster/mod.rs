// src/raster/mod.rs

//! Raster playback.
//!
//! - [`source`] defines what can be played back ([`RasterSource`]) and a
//!   display-list implementation.
//! - [`canvas`] is the software surface sources draw into.
//! - [`playback`] fills caller memory in one of the supported formats.
//! - [`image`] covers decoded images and the decoders that produce them.

pub mod canvas;
pub mod geometry;
pub mod image;
pub mod playback;
pub mod source;

pub use canvas::{Canvas, PixelGeometry, SurfaceProps};
pub use geometry::{Color, Rect, Size};
pub use image::{
    DecodedImage, DecodedImageStore, ImageDecoder, ImageId, ImagePattern, PatternImageDecoder,
};
pub use playback::{NATIVE_FORMAT, playback_to_memory};
pub use source::{DisplayItem, RasterSource, RecordedRasterSource};
