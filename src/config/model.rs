// src/config/model.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Deserialize;

use crate::graph::PriorityBands;
use crate::raster::{
    Color, DecodedImageStore, DisplayItem, ImageDecoder, ImageId, ImagePattern,
    PatternImageDecoder, RasterSource, RecordedRasterSource, Rect, Size,
};
use crate::tiles::{Scene, TileGrid};
use crate::types::ResourceFormat;

/// Configuration exactly as read from TOML, before validation.
///
/// ```toml
/// [pool]
/// workers = 4
///
/// [playback]
/// format = "bgra8888"
/// tile_width = 64
/// tile_height = 64
///
/// [scene]
/// width = 256
/// height = 256
/// background = [255, 255, 255, 255]
/// viewport = { x = 0, y = 0, width = 128, height = 128 }
///
/// [[scene.rect]]
/// rect = { x = 16, y = 16, width = 96, height = 48 }
/// color = [200, 30, 30, 255]
///
/// [[scene.draw_image]]
/// image = "logo"
/// rect = { x = 64, y = 96, width = 32, height = 32 }
///
/// [image.logo]
/// width = 8
/// height = 8
/// pattern = { kind = "checker", cell = 2, a = [0, 0, 0, 255], b = [255, 255, 255, 255] }
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub pool: PoolSection,

    #[serde(default)]
    pub priority: PriorityBands,

    #[serde(default)]
    pub playback: PlaybackSection,

    #[serde(default)]
    pub scene: SceneSection,

    /// Images from `[image.<name>]`, keyed by name.
    #[serde(default)]
    pub image: BTreeMap<String, ImageConfig>,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub pool: PoolSection,
    pub priority: PriorityBands,
    pub playback: PlaybackSection,
    pub scene: SceneSection,
    pub image: BTreeMap<String, ImageConfig>,
}

/// `[pool]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolSection {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4))
        .unwrap_or(2)
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// `[playback]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackSection {
    pub format: ResourceFormat,
    pub tile_width: u32,
    pub tile_height: u32,
    pub scale: f32,
}

impl Default for PlaybackSection {
    fn default() -> Self {
        Self {
            format: ResourceFormat::Rgba8888,
            tile_width: 64,
            tile_height: 64,
            scale: 1.0,
        }
    }
}

/// `[scene]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SceneSection {
    pub width: u32,
    pub height: u32,
    pub background: Color,
    pub lcd_text: bool,
    /// Visible area in scaled space for the first round.
    pub viewport: Rect,
    /// Viewport offset applied per round, as `[dx, dy]`.
    pub viewport_step: [i32; 2],
    pub rounds: u32,
    pub rect: Vec<RectItem>,
    pub draw_image: Vec<ImageItem>,
}

impl Default for SceneSection {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            background: Color::WHITE,
            lcd_text: false,
            viewport: Rect::new(0, 0, 128, 128),
            viewport_step: [0, 0],
            rounds: 1,
            rect: Vec::new(),
            draw_image: Vec::new(),
        }
    }
}

/// `[[scene.rect]]` entry.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RectItem {
    pub rect: Rect,
    pub color: Color,
}

/// `[[scene.draw_image]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageItem {
    pub image: String,
    pub rect: Rect,
}

/// `[image.<name>]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ImageConfig {
    pub width: u32,
    pub height: u32,
    pub pattern: ImagePattern,
}

impl ConfigFile {
    /// Internal constructor used after validation.
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            pool: raw.pool,
            priority: raw.priority,
            playback: raw.playback,
            scene: raw.scene,
            image: raw.image,
        }
    }

    pub fn grid(&self) -> TileGrid {
        TileGrid::new(
            Size::new(self.scene.width, self.scene.height),
            Size::new(self.playback.tile_width, self.playback.tile_height),
            self.playback.scale,
        )
    }

    /// Viewport of round `round` (zero based).
    pub fn viewport_at(&self, round: u32) -> Rect {
        let steps = i32::try_from(round).unwrap_or(i32::MAX);
        let [dx, dy] = self.scene.viewport_step;
        self.scene
            .viewport
            .offset(dx.saturating_mul(steps), dy.saturating_mul(steps))
    }

    /// Build the display list and decoders. Rects are drawn before images,
    /// each group in file order.
    pub fn scene(&self) -> Scene {
        let images = DecodedImageStore::new();
        let mut source = RecordedRasterSource::new(
            Size::new(self.scene.width, self.scene.height),
            self.scene.background,
            images.clone(),
        )
        .with_lcd_text(self.scene.lcd_text);

        for item in &self.scene.rect {
            source = source.with_item(DisplayItem::FillRect {
                rect: item.rect,
                color: item.color,
            });
        }
        for item in &self.scene.draw_image {
            source = source.with_item(DisplayItem::DrawImage {
                image: ImageId::new(&item.image),
                rect: item.rect,
            });
        }

        let decoders: HashMap<ImageId, Arc<dyn ImageDecoder>> = self
            .image
            .iter()
            .map(|(name, image)| {
                let decoder: Arc<dyn ImageDecoder> = Arc::new(PatternImageDecoder::new(
                    Size::new(image.width, image.height),
                    image.pattern,
                ));
                (ImageId::new(name), decoder)
            })
            .collect();

        let source: Arc<dyn RasterSource> = Arc::new(source);
        Scene {
            source,
            decoders,
            images,
        }
    }
}
