// tests/playback.rs

use std::sync::Mutex;

use tilegraph::raster::{
    Canvas, Color, DecodedImageStore, DisplayItem, ImageId, NATIVE_FORMAT, RasterSource,
    RecordedRasterSource, Rect, Size, SurfaceProps, playback_to_memory,
};
use tilegraph::types::ResourceFormat;

const SIZE: Size = Size::new(8, 6);

fn scene() -> RecordedRasterSource {
    RecordedRasterSource::new(Size::new(32, 32), Color::rgba(10, 20, 30, 255), DecodedImageStore::new())
        .with_item(DisplayItem::FillRect {
            rect: Rect::new(2, 1, 5, 3),
            color: Color::rgba(200, 100, 50, 255),
        })
        .with_item(DisplayItem::FillRect {
            rect: Rect::new(4, 2, 6, 6),
            color: Color::rgba(0, 255, 0, 128),
        })
}

fn render(format: ResourceFormat, stride: usize, bytes: usize) -> Vec<u8> {
    let mut memory = vec![0u8; bytes];
    playback_to_memory(
        &mut memory,
        format,
        SIZE,
        stride,
        &scene(),
        Rect::new(1, 1, 8, 6),
        Rect::new(1, 1, 8, 6),
        1.0,
    );
    memory
}

fn native_reference() -> Vec<u8> {
    let stride = SIZE.width as usize * 4;
    let mut scratch = vec![0u8; stride * SIZE.height as usize];
    let mut canvas = Canvas::new(&mut scratch, SIZE, stride, SurfaceProps::default());
    scene().playback_to_canvas(&mut canvas, Rect::new(1, 1, 8, 6), Rect::new(1, 1, 8, 6), 1.0);
    scratch
}

#[test]
fn native_format_matches_scratch_render_copied_verbatim() {
    assert_eq!(NATIVE_FORMAT, ResourceFormat::Rgba8888);
    let direct = render(ResourceFormat::Rgba8888, 32, 32 * 6);
    assert_eq!(direct, native_reference());
}

#[test]
fn zero_stride_matches_explicit_minimum_stride() {
    for (format, min_stride) in [
        (ResourceFormat::Rgba8888, 32),
        (ResourceFormat::Bgra8888, 32),
        (ResourceFormat::Argb8888, 32),
        (ResourceFormat::Rgba4444, 16),
    ] {
        // Tightly packed: any wider implicit stride would overrun the buffer.
        let bytes = min_stride * SIZE.height as usize;
        let implicit = render(format, 0, bytes);
        let explicit = render(format, min_stride, bytes);
        assert_eq!(implicit, explicit, "{format}");
    }
}

#[test]
fn rgba4444_zero_stride_fills_a_packed_buffer() {
    let source = RecordedRasterSource::new(Size::new(4, 2), Color::WHITE, DecodedImageStore::new());
    let render = |stride: usize| {
        let mut memory = vec![0u8; 16];
        playback_to_memory(
            &mut memory,
            ResourceFormat::Rgba4444,
            Size::new(4, 2),
            stride,
            &source,
            Rect::new(0, 0, 4, 2),
            Rect::new(0, 0, 4, 2),
            1.0,
        );
        memory
    };

    let implicit = render(0);
    assert_eq!(implicit, render(8));
    assert_eq!(implicit, 0xFFFFu16.to_le_bytes().repeat(8));
}

#[test]
fn swapped_formats_reorder_native_channels() {
    let native = native_reference();
    let bgra = render(ResourceFormat::Bgra8888, 32, 32 * 6);
    let argb = render(ResourceFormat::Argb8888, 32, 32 * 6);

    for (i, px) in native.chunks_exact(4).enumerate() {
        let [r, g, b, a] = [px[0], px[1], px[2], px[3]];
        assert_eq!(&bgra[i * 4..i * 4 + 4], &[b, g, r, a], "bgra pixel {i}");
        assert_eq!(&argb[i * 4..i * 4 + 4], &[a, r, g, b], "argb pixel {i}");
    }
}

#[test]
fn rgba4444_packs_nibbles_with_aligned_stride() {
    let source = RecordedRasterSource::new(
        Size::new(3, 1),
        Color::rgba(255, 0, 255, 255),
        DecodedImageStore::new(),
    );
    // 3 pixels * 2 bytes = 6, rounded up to 8.
    let mut memory = vec![0xAAu8; 8 * 2];
    playback_to_memory(
        &mut memory,
        ResourceFormat::Rgba4444,
        Size::new(3, 2),
        6,
        &source,
        Rect::new(0, 0, 3, 2),
        Rect::new(0, 0, 3, 2),
        1.0,
    );

    let expected = 0xF0FFu16.to_le_bytes();
    for row in 0..2 {
        for x in 0..3 {
            let i = row * 8 + x * 2;
            assert_eq!(&memory[i..i + 2], &expected, "row {row} pixel {x}");
        }
        // Row padding is untouched.
        assert_eq!(&memory[row * 8 + 6..row * 8 + 8], &[0xAA, 0xAA]);
    }
}

#[test]
fn only_the_playback_rect_is_written() {
    for format in [ResourceFormat::Rgba8888, ResourceFormat::Bgra8888] {
        let source = RecordedRasterSource::new(Size::new(16, 16), Color::WHITE, DecodedImageStore::new());
        let mut memory = vec![7u8; 4 * 4 * 4];
        playback_to_memory(
            &mut memory,
            format,
            Size::new(4, 4),
            16,
            &source,
            Rect::new(4, 4, 4, 4),
            Rect::new(6, 6, 2, 2),
            1.0,
        );

        for y in 0..4 {
            for x in 0..4 {
                let px = &memory[y * 16 + x * 4..y * 16 + x * 4 + 4];
                if x >= 2 && y >= 2 {
                    assert_eq!(px, &[255, 255, 255, 255], "{format} ({x}, {y})");
                } else {
                    assert_eq!(px, &[7, 7, 7, 7], "{format} ({x}, {y})");
                }
            }
        }
    }
}

#[test]
fn scale_is_applied_before_drawing() {
    let source = RecordedRasterSource::new(Size::new(4, 4), Color::BLACK, DecodedImageStore::new())
        .with_item(DisplayItem::FillRect {
            rect: Rect::new(1, 0, 1, 1),
            color: Color::WHITE,
        });
    let mut memory = vec![0u8; 8 * 8 * 4];
    playback_to_memory(
        &mut memory,
        ResourceFormat::Rgba8888,
        Size::new(8, 8),
        0,
        &source,
        Rect::new(0, 0, 8, 8),
        Rect::new(0, 0, 8, 8),
        2.0,
    );

    let px = |x: usize, y: usize| memory[(y * 8 + x) * 4];
    assert_eq!(px(2, 0), 255);
    assert_eq!(px(3, 1), 255);
    assert_eq!(px(1, 0), 0);
    assert_eq!(px(4, 0), 0);
}

#[test]
fn missing_image_is_skipped() {
    let source = RecordedRasterSource::new(Size::new(2, 2), Color::WHITE, DecodedImageStore::new())
        .with_item(DisplayItem::DrawImage {
            image: ImageId::new("absent"),
            rect: Rect::new(0, 0, 2, 2),
        });
    let mut memory = vec![0u8; 16];
    playback_to_memory(
        &mut memory,
        ResourceFormat::Rgba8888,
        Size::new(2, 2),
        0,
        &source,
        Rect::new(0, 0, 2, 2),
        Rect::new(0, 0, 2, 2),
        1.0,
    );
    assert!(memory.iter().all(|&b| b == 255));
}

/// Records whether the canvas it draws into allows LCD text.
struct LcdProbe {
    lcd: bool,
    seen: Mutex<Option<bool>>,
}

impl RasterSource for LcdProbe {
    fn size(&self) -> Size {
        Size::new(1, 1)
    }

    fn can_use_lcd_text(&self) -> bool {
        self.lcd
    }

    fn images_in_rect(&self, _rect: Rect, _scale: f32) -> Vec<ImageId> {
        Vec::new()
    }

    fn draw(&self, canvas: &mut Canvas<'_>) {
        *self.seen.lock().unwrap() = Some(canvas.can_draw_lcd_text());
    }
}

#[test]
fn surface_props_follow_lcd_text_support() {
    for (lcd, format) in [
        (true, ResourceFormat::Rgba8888),
        (false, ResourceFormat::Rgba8888),
        (true, ResourceFormat::Argb8888),
    ] {
        let probe = LcdProbe {
            lcd,
            seen: Mutex::new(None),
        };
        let mut memory = vec![0u8; 4];
        playback_to_memory(
            &mut memory,
            format,
            Size::new(1, 1),
            0,
            &probe,
            Rect::new(0, 0, 1, 1),
            Rect::new(0, 0, 1, 1),
            1.0,
        );
        assert_eq!(*probe.seen.lock().unwrap(), Some(lcd));
    }

    // A translucent background rules LCD text out.
    let translucent = RecordedRasterSource::new(
        Size::new(1, 1),
        Color::rgba(0, 0, 0, 100),
        DecodedImageStore::new(),
    )
    .with_lcd_text(true);
    assert!(!translucent.can_use_lcd_text());
}

#[test]
#[should_panic(expected = "does not support format")]
fn unsupported_format_panics() {
    let mut memory = vec![0u8; 64];
    playback_to_memory(
        &mut memory,
        ResourceFormat::Alpha8,
        Size::new(4, 4),
        0,
        &scene(),
        Rect::new(0, 0, 4, 4),
        Rect::new(0, 0, 4, 4),
        1.0,
    );
}
