// src/raster/playback.rs

//! Format-aware playback of a raster source into caller-owned memory.

use tracing::trace;

use crate::raster::canvas::{Canvas, SurfaceProps, required_bytes};
use crate::raster::geometry::{Rect, Size};
use crate::raster::source::RasterSource;
use crate::types::ResourceFormat;

/// Channel order of the working surface playback renders into.
pub const NATIVE_FORMAT: ResourceFormat = ResourceFormat::Rgba8888;

/// Replay `source` into `memory`, laid out as `format` rows of `stride` bytes.
///
/// `memory` backs `bitmap_rect`; only the part covered by `playback_rect` is
/// written. A `stride` of zero means the minimum row size of `format`. When
/// `format` is the working format the canvas draws straight into `memory`.
/// Otherwise playback goes to a scratch surface which is then converted, with
/// the destination stride rounded up to 4 bytes.
///
/// # Panics
///
/// If `format` cannot be played back to memory, or `memory` is too small.
#[allow(clippy::too_many_arguments)]
pub fn playback_to_memory(
    memory: &mut [u8],
    format: ResourceFormat,
    size: Size,
    stride: usize,
    source: &dyn RasterSource,
    bitmap_rect: Rect,
    playback_rect: Rect,
    scale: f32,
) {
    assert!(
        format.supports_playback_to_memory(),
        "playback to memory does not support format {format}"
    );

    if size.is_empty() {
        return;
    }

    let stride = if stride == 0 {
        format.min_row_bytes(size.width)
    } else {
        stride
    };

    if format == NATIVE_FORMAT {
        let props = SurfaceProps::for_lcd_text(source.can_use_lcd_text());
        trace!(%format, stride, "playback directly into destination");
        let mut canvas = Canvas::new(memory, size, stride, props);
        source.playback_to_canvas(&mut canvas, bitmap_rect, playback_rect, scale);
        return;
    }

    playback_through_scratch(
        memory,
        format,
        size,
        stride,
        source,
        bitmap_rect,
        playback_rect,
        scale,
    );
}

/// Render into a working-format scratch surface, then convert into `memory`.
///
/// `stride` must already be resolved (non-zero).
#[allow(clippy::too_many_arguments)]
pub(crate) fn playback_through_scratch(
    memory: &mut [u8],
    format: ResourceFormat,
    size: Size,
    stride: usize,
    source: &dyn RasterSource,
    bitmap_rect: Rect,
    playback_rect: Rect,
    scale: f32,
) {
    let props = SurfaceProps::for_lcd_text(source.can_use_lcd_text());
    let scratch_stride = NATIVE_FORMAT.min_row_bytes(size.width);
    let mut scratch = vec![0u8; scratch_stride * size.height as usize];
    {
        let mut canvas = Canvas::new(&mut scratch, size, scratch_stride, props);
        source.playback_to_canvas(&mut canvas, bitmap_rect, playback_rect, scale);
    }

    let dst_stride = stride.next_multiple_of(4);
    let dst_row_bytes = format.min_row_bytes(size.width);
    assert!(
        dst_stride >= dst_row_bytes,
        "stride {dst_stride} is smaller than a {format} row of {} pixels",
        size.width
    );
    let required = required_bytes(size, dst_stride, dst_row_bytes);
    assert!(
        memory.len() >= required,
        "destination holds {} bytes, {required} required",
        memory.len()
    );

    let region = playback_rect
        .offset(-bitmap_rect.x, -bitmap_rect.y)
        .intersect(&Rect::from_size(size));
    trace!(%format, dst_stride, ?region, "converting scratch surface");
    convert_region(&scratch, scratch_stride, memory, dst_stride, format, region);
}

fn convert_region(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    format: ResourceFormat,
    region: Rect,
) {
    if region.is_empty() {
        return;
    }
    let bytes_per_pixel = format.bits_per_pixel() / 8;
    for y in region.y as usize..region.bottom() as usize {
        for x in region.x as usize..region.right() as usize {
            let s = y * src_stride + x * 4;
            let d = y * dst_stride + x * bytes_per_pixel;
            let pixel = [src[s], src[s + 1], src[s + 2], src[s + 3]];
            store_pixel(format, pixel, &mut dst[d..d + bytes_per_pixel]);
        }
    }
}

/// Write one premultiplied RGBA8888 pixel in `format`.
fn store_pixel(format: ResourceFormat, [r, g, b, a]: [u8; 4], out: &mut [u8]) {
    match format {
        ResourceFormat::Rgba8888 => out.copy_from_slice(&[r, g, b, a]),
        ResourceFormat::Bgra8888 => out.copy_from_slice(&[b, g, r, a]),
        ResourceFormat::Argb8888 => out.copy_from_slice(&[a, r, g, b]),
        ResourceFormat::Rgba4444 => {
            let packed = (to_4bit(r) << 12) | (to_4bit(g) << 8) | (to_4bit(b) << 4) | to_4bit(a);
            out.copy_from_slice(&packed.to_le_bytes());
        }
        other => unreachable!("no pixel conversion for {other}"),
    }
}

fn to_4bit(channel: u8) -> u16 {
    (u16::from(channel) * 15 + 127) / 255
}
