// src/raster/image.rs

//! Images referenced by raster sources and the decode step that feeds them.
//!
//! There is no real codec here: an [`ImageDecoder`] produces premultiplied
//! RGBA8888 pixels from whatever it wraps. [`PatternImageDecoder`] generates
//! procedural content, which is enough to exercise decode dependencies.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::Deserialize;

use crate::raster::geometry::{Color, Size};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(Arc<str>);

impl ImageId {
    pub fn new(name: &str) -> Self {
        ImageId(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ImageId {
    fn from(name: &str) -> Self {
        ImageId::new(name)
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Premultiplied RGBA8888, row-major, tightly packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub size: Size,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.size.width as usize + x as usize) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}

pub trait ImageDecoder: Send + Sync {
    fn size(&self) -> Size;
    fn decode(&self) -> DecodedImage;
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImagePattern {
    Solid { color: Color },
    Checker { cell: u32, a: Color, b: Color },
    HorizontalGradient { from: Color, to: Color },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternImageDecoder {
    size: Size,
    pattern: ImagePattern,
}

impl PatternImageDecoder {
    pub fn new(size: Size, pattern: ImagePattern) -> Self {
        Self { size, pattern }
    }

    fn color_at(&self, x: u32, y: u32) -> Color {
        match self.pattern {
            ImagePattern::Solid { color } => color,
            ImagePattern::Checker { cell, a, b } => {
                let cell = cell.max(1);
                if ((x / cell) + (y / cell)) % 2 == 0 {
                    a
                } else {
                    b
                }
            }
            ImagePattern::HorizontalGradient { from, to } => {
                let span = self.size.width.saturating_sub(1).max(1);
                let t = x.min(span) as f32 / span as f32;
                let lerp = |a: u8, b: u8| {
                    (f32::from(a) + (f32::from(b) - f32::from(a)) * t).round() as u8
                };
                Color::rgba(
                    lerp(from.r, to.r),
                    lerp(from.g, to.g),
                    lerp(from.b, to.b),
                    lerp(from.a, to.a),
                )
            }
        }
    }
}

impl ImageDecoder for PatternImageDecoder {
    fn size(&self) -> Size {
        self.size
    }

    fn decode(&self) -> DecodedImage {
        let mut pixels = Vec::with_capacity(self.size.area() * 4);
        for y in 0..self.size.height {
            for x in 0..self.size.width {
                pixels.extend_from_slice(&self.color_at(x, y).premultiplied());
            }
        }
        DecodedImage {
            size: self.size,
            pixels,
        }
    }
}

/// Decoded images shared between decode tasks (writers) and raster sources
/// (readers).
#[derive(Debug, Clone, Default)]
pub struct DecodedImageStore {
    images: Arc<RwLock<HashMap<ImageId, Arc<DecodedImage>>>>,
}

impl DecodedImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: ImageId, image: Arc<DecodedImage>) {
        self.images
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, image);
    }

    pub fn get(&self, id: &ImageId) -> Option<Arc<DecodedImage>> {
        self.images
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &ImageId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.images
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
