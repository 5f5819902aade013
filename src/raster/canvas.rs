// src/raster/canvas.rs

//! Software drawing surface used by raster playback.
//!
//! A [`Canvas`] borrows a byte buffer laid out as premultiplied RGBA8888 rows
//! of `stride` bytes. Drawing goes through a scale + translate transform and
//! is limited to the current device-space clip.

use crate::raster::geometry::{Color, Rect, Size, mul_div255};
use crate::raster::image::DecodedImage;

const BYTES_PER_PIXEL: usize = 4;

/// Sub-pixel layout of the surface, which decides whether LCD text is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelGeometry {
    #[default]
    Unknown,
    RgbHorizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceProps {
    pub pixel_geometry: PixelGeometry,
}

impl SurfaceProps {
    pub fn for_lcd_text(use_lcd_text: bool) -> Self {
        let pixel_geometry = if use_lcd_text {
            PixelGeometry::RgbHorizontal
        } else {
            PixelGeometry::Unknown
        };
        Self { pixel_geometry }
    }
}

pub struct Canvas<'a> {
    pixels: &'a mut [u8],
    size: Size,
    stride: usize,
    clip: Rect,
    scale: f32,
    origin_x: f32,
    origin_y: f32,
    props: SurfaceProps,
}

impl<'a> Canvas<'a> {
    /// Wrap `pixels`. Panics if the buffer cannot hold `size` at `stride`.
    pub fn new(pixels: &'a mut [u8], size: Size, stride: usize, props: SurfaceProps) -> Self {
        let row_bytes = size.width as usize * BYTES_PER_PIXEL;
        assert!(
            size.is_empty() || stride >= row_bytes,
            "stride {stride} is smaller than a row of {} pixels",
            size.width
        );
        let required = required_bytes(size, stride, row_bytes);
        assert!(
            pixels.len() >= required,
            "canvas buffer holds {} bytes, {required} required",
            pixels.len()
        );

        Self {
            pixels,
            size,
            stride,
            clip: Rect::from_size(size),
            scale: 1.0,
            origin_x: 0.0,
            origin_y: 0.0,
            props,
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn props(&self) -> SurfaceProps {
        self.props
    }

    pub fn can_draw_lcd_text(&self) -> bool {
        self.props.pixel_geometry == PixelGeometry::RgbHorizontal
    }

    /// Current clip in device space.
    pub fn clip_bounds(&self) -> Rect {
        self.clip
    }

    /// Intersect the clip with a device-space rectangle.
    pub fn clip_rect(&mut self, rect: Rect) {
        self.clip = self.clip.intersect(&rect);
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.origin_x += dx * self.scale;
        self.origin_y += dy * self.scale;
    }

    pub fn scale(&mut self, factor: f32) {
        self.scale *= factor;
    }

    /// Replace every pixel inside the clip with `color`.
    pub fn clear(&mut self, color: Color) {
        let premul = color.premultiplied();
        let clip = self.clip;
        self.for_each_pixel(clip, |_, _, px| px.copy_from_slice(&premul));
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        if color.a == 0 {
            return;
        }
        let src = color.premultiplied();
        let device = self.map_rect(rect).intersect(&self.clip);
        self.for_each_pixel(device, |_, _, px| {
            let out = src_over([px[0], px[1], px[2], px[3]], src);
            px.copy_from_slice(&out);
        });
    }

    /// Draw `image` stretched over `dest`, sampling the nearest texel.
    pub fn draw_image(&mut self, image: &DecodedImage, dest: Rect) {
        if image.size.is_empty() {
            return;
        }
        let mapped = self.map_rect(dest);
        if mapped.is_empty() {
            return;
        }
        let device = mapped.intersect(&self.clip);
        let (image_w, image_h) = (image.size.width, image.size.height);
        self.for_each_pixel(device, |x, y, px| {
            let u = ((i64::from(x) - i64::from(mapped.x)) as u64 * u64::from(image_w)
                / u64::from(mapped.width)) as u32;
            let v = ((i64::from(y) - i64::from(mapped.y)) as u64 * u64::from(image_h)
                / u64::from(mapped.height)) as u32;
            let texel = image.pixel(u.min(image_w - 1), v.min(image_h - 1));
            let out = src_over([px[0], px[1], px[2], px[3]], texel);
            px.copy_from_slice(&out);
        });
    }

    /// Map a content-space rectangle to device space, snapping edges to the
    /// nearest pixel boundary.
    fn map_rect(&self, rect: Rect) -> Rect {
        let map = |v: f64, origin: f32| (v * f64::from(self.scale) + f64::from(origin)).round();
        let left = map(f64::from(rect.x), self.origin_x);
        let top = map(f64::from(rect.y), self.origin_y);
        let right = map(rect.right() as f64, self.origin_x);
        let bottom = map(rect.bottom() as f64, self.origin_y);
        if right <= left || bottom <= top {
            return Rect::default();
        }
        Rect::new(
            left as i32,
            top as i32,
            (right - left) as u32,
            (bottom - top) as u32,
        )
    }

    fn for_each_pixel(&mut self, area: Rect, mut f: impl FnMut(i32, i32, &mut [u8])) {
        let area = area.intersect(&Rect::from_size(self.size));
        if area.is_empty() {
            return;
        }
        for y in area.y..area.bottom() as i32 {
            let row = y as usize * self.stride;
            for x in area.x..area.right() as i32 {
                let i = row + x as usize * BYTES_PER_PIXEL;
                f(x, y, &mut self.pixels[i..i + BYTES_PER_PIXEL]);
            }
        }
    }
}

/// Bytes needed for `size` rows at `stride`, where the last row only needs
/// `row_bytes`.
pub(crate) fn required_bytes(size: Size, stride: usize, row_bytes: usize) -> usize {
    if size.is_empty() {
        0
    } else {
        stride * (size.height as usize - 1) + row_bytes
    }
}

/// Premultiplied source-over.
fn src_over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    if src[3] == 255 {
        return src;
    }
    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
    }
    out
}
