// src/raster/source.rs

use tracing::warn;

use crate::raster::canvas::Canvas;
use crate::raster::geometry::{Color, Rect, Size};
use crate::raster::image::{DecodedImageStore, ImageId};

/// Recorded drawing content that can be replayed into a canvas.
pub trait RasterSource: Send + Sync {
    /// Content size at scale 1.
    fn size(&self) -> Size;

    fn can_use_lcd_text(&self) -> bool;

    /// Colour the playback area is cleared to before drawing.
    fn background_color(&self) -> Color {
        Color::TRANSPARENT
    }

    /// Images whose scaled destination intersects `rect` (in scaled space).
    fn images_in_rect(&self, rect: Rect, scale: f32) -> Vec<ImageId>;

    /// Draw the content in content space. Clip and transform are already set.
    fn draw(&self, canvas: &mut Canvas<'_>);

    /// Replay into `canvas`, which backs `bitmap_rect` (scaled space).
    ///
    /// Only `playback_rect` is touched; pixels of the canvas outside it keep
    /// their previous contents.
    fn playback_to_canvas(
        &self,
        canvas: &mut Canvas<'_>,
        bitmap_rect: Rect,
        playback_rect: Rect,
        scale: f32,
    ) {
        canvas.clip_rect(playback_rect.offset(-bitmap_rect.x, -bitmap_rect.y));
        canvas.translate(-(bitmap_rect.x as f32), -(bitmap_rect.y as f32));
        canvas.clear(self.background_color());
        canvas.scale(scale);
        self.draw(canvas);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayItem {
    FillRect { rect: Rect, color: Color },
    DrawImage { image: ImageId, rect: Rect },
}

/// A display list over a background colour.
#[derive(Debug, Clone)]
pub struct RecordedRasterSource {
    size: Size,
    background: Color,
    items: Vec<DisplayItem>,
    images: DecodedImageStore,
    lcd_text: bool,
}

impl RecordedRasterSource {
    pub fn new(size: Size, background: Color, images: DecodedImageStore) -> Self {
        Self {
            size,
            background,
            items: Vec::new(),
            images,
            lcd_text: false,
        }
    }

    pub fn with_item(mut self, item: DisplayItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_lcd_text(mut self, lcd_text: bool) -> Self {
        self.lcd_text = lcd_text;
        self
    }

    pub fn items(&self) -> &[DisplayItem] {
        &self.items
    }
}

impl RasterSource for RecordedRasterSource {
    fn size(&self) -> Size {
        self.size
    }

    fn can_use_lcd_text(&self) -> bool {
        // LCD text needs an opaque background to blend against.
        self.lcd_text && self.background.is_opaque()
    }

    fn background_color(&self) -> Color {
        self.background
    }

    fn images_in_rect(&self, rect: Rect, scale: f32) -> Vec<ImageId> {
        let mut images: Vec<ImageId> = Vec::new();
        for item in &self.items {
            if let DisplayItem::DrawImage { image, rect: dest } = item
                && dest.scale_to_enclosing(scale).intersects(&rect)
                && !images.contains(image)
            {
                images.push(image.clone());
            }
        }
        images
    }

    fn draw(&self, canvas: &mut Canvas<'_>) {
        for item in &self.items {
            match item {
                DisplayItem::FillRect { rect, color } => canvas.fill_rect(*rect, *color),
                DisplayItem::DrawImage { image, rect } => match self.images.get(image) {
                    Some(decoded) => canvas.draw_image(&decoded, *rect),
                    None => warn!(image = %image, "image not decoded at playback; skipping"),
                },
            }
        }
    }
}
