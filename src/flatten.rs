use std::io::Cursor;

use ab_glyph::{point, Font, FontArc, PxScale};
use egui::Rect as PxRect;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, RgbImage, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::translate;
use imageproc::morphology::dilate;
use serde::{Deserialize, Serialize};
use tiny_skia::{ColorU8, Mask, Paint, Pixmap, PixmapPaint, Rect, Transform};
use tracing::debug;

use crate::annotation::TextAnnotation;
use crate::error::{TextMarkError, TextMarkResult};
use crate::fonts::FontBook;
use crate::layout::{self, FixedMetrics, TextLayout};

const SHADOW_OFFSET: (i32, i32) = (4, 4);
const SHADOW_SIGMA: f32 = 2.5;
const SHADOW_COLOR: [u8; 4] = [0, 0, 0, 128];

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
        }
    }

    /// `<label>-<unix millis>.<ext>`
    pub fn file_name(self, label: &str, unix_millis: i64) -> String {
        let label = label.trim();
        let label = if label.is_empty() { "textmark" } else { label };
        format!("{label}-{unix_millis}.{}", self.extension())
    }
}

/// Draws every annotation over `image` at its native size and refreshes each annotation's cached bounds.
/// Fails when visible text has no font to draw with.
pub fn flatten(
    image: &DynamicImage,
    annotations: &mut [TextAnnotation],
    fonts: &mut FontBook,
) -> TextMarkResult<RgbaImage> {
    let (width, height) = (image.width(), image.height());
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| TextMarkError::Render(format!("cannot allocate {width}x{height} surface")))?;

    copy_image_to_pixmap(image, &mut pixmap);

    for annotation in annotations.iter_mut() {
        let style = annotation.style().clone();
        let anchor = annotation.anchor_pixel(width, height);
        let font = fonts.resolve(&style.family, style.weight);

        let layout = match font.as_ref() {
            Some(font) => {
                let scaled = font.as_scaled(PxScale::from(style.size.px()));
                layout::layout_text(annotation.content(), &style, anchor, &scaled)
            }
            None => layout::layout_text(
                annotation.content(),
                &style,
                anchor,
                &FixedMetrics::new(style.size.px()),
            ),
        };
        annotation.cache_geometry(layout.bounds);

        match font.as_ref() {
            Some(font) => draw_annotation(&mut pixmap, annotation, &layout, font)?,
            None if annotation.content().trim().is_empty() => {}
            None => {
                return Err(TextMarkError::Render(format!(
                    "no font available for {}",
                    style.family
                )));
            }
        }
    }

    Ok(pixmap_to_image(&pixmap))
}

pub fn encode(image: &RgbaImage, format: ExportFormat, quality: f32) -> TextMarkResult<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    match format {
        ExportFormat::Png => {
            image
                .write_to(&mut buffer, ImageFormat::Png)
                .map_err(|err| TextMarkError::Encode {
                    format: format.label(),
                    reason: err.to_string(),
                })?;
        }
        ExportFormat::Jpeg => {
            let rgb = flatten_alpha(image);
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, jpeg_quality(quality));
            encoder
                .encode_image(&rgb)
                .map_err(|err| TextMarkError::Encode {
                    format: format.label(),
                    reason: err.to_string(),
                })?;
        }
    }
    Ok(buffer.into_inner())
}

/// Maps `[0, 1]` onto the encoder's 1..=100 scale.
pub fn jpeg_quality(quality: f32) -> u8 {
    (quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8
}

/// JPEG has no alpha channel; transparent pixels are laid over white.
fn flatten_alpha(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = a as f32 / 255.0;
        let over_white = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        image::Rgb([over_white(r), over_white(g), over_white(b)])
    })
}

fn copy_image_to_pixmap(image: &DynamicImage, pixmap: &mut Pixmap) {
    let rgba = image.to_rgba8();
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(rgba.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
}

fn pixmap_to_image(pixmap: &Pixmap) -> RgbaImage {
    let mut raw = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        raw.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), raw)
        .unwrap_or_else(|| RgbaImage::new(pixmap.width(), pixmap.height()))
}

/// Integer region of the surface an annotation can touch, shadow and outline included.
fn layer_region(bounds: PxRect, margin: f32, width: u32, height: u32) -> Option<(i32, i32, u32, u32)> {
    let grown = bounds.expand(margin);
    let x0 = grown.min.x.floor().max(0.0) as i32;
    let y0 = grown.min.y.floor().max(0.0) as i32;
    let x1 = grown.max.x.ceil().min(width as f32) as i32;
    let y1 = grown.max.y.ceil().min(height as f32) as i32;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0, y0, (x1 - x0) as u32, (y1 - y0) as u32))
}

/// Each annotation is drawn into its own layer, so fill, outline, shadow and
/// opacity never carry over to the next one.
fn draw_annotation(
    surface: &mut Pixmap,
    annotation: &TextAnnotation,
    layout: &TextLayout,
    font: &FontArc,
) -> TextMarkResult<()> {
    let style = annotation.style();
    if layout.glyphs.is_empty() || style.opacity <= 0.0 {
        return Ok(());
    }

    let outline_width = if style.outline.enabled {
        style.outline.width as f32
    } else {
        0.0
    };
    let margin = SHADOW_OFFSET.0.max(SHADOW_OFFSET.1) as f32 + SHADOW_SIGMA * 3.0 + outline_width + 2.0;
    let Some((x0, y0, w, h)) = layer_region(layout.bounds, margin, surface.width(), surface.height())
    else {
        debug!(id = %annotation.id, "annotation is outside the surface");
        return Ok(());
    };

    let coverage = rasterize(layout, font, style.size.px(), x0, y0, w, h);
    let mut layer = Pixmap::new(w, h)
        .ok_or_else(|| TextMarkError::Render(format!("cannot allocate {w}x{h} layer")))?;

    if style.shadow {
        let shadow = gaussian_blur_f32(&translate(&coverage, SHADOW_OFFSET), SHADOW_SIGMA);
        fill_through_mask(&mut layer, &shadow, SHADOW_COLOR)?;
    }
    if style.outline.enabled && style.outline.width > 0 {
        let outline = dilate(&coverage, Norm::LInf, style.outline.width);
        fill_through_mask(&mut layer, &outline, style.outline.color)?;
    }
    fill_through_mask(&mut layer, &coverage, style.color)?;

    let paint = PixmapPaint {
        opacity: style.opacity.clamp(0.0, 1.0),
        ..PixmapPaint::default()
    };
    surface.draw_pixmap(x0, y0, layer.as_ref(), &paint, Transform::identity(), None);
    Ok(())
}

fn rasterize(
    layout: &TextLayout,
    font: &FontArc,
    size: f32,
    x0: i32,
    y0: i32,
    w: u32,
    h: u32,
) -> GrayImage {
    let mut coverage = GrayImage::new(w, h);
    let scale = PxScale::from(size);

    for placed in &layout.glyphs {
        if placed.ch.is_whitespace() {
            continue;
        }
        let glyph = font.glyph_id(placed.ch).with_scale_and_position(
            scale,
            point(placed.origin.x - x0 as f32, placed.origin.y - y0 as f32),
        );
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|gx, gy, c| {
            let px = bounds.min.x as i32 + gx as i32;
            let py = bounds.min.y as i32 + gy as i32;
            if px < 0 || py < 0 || px as u32 >= w || py as u32 >= h {
                return;
            }
            let value = (c.clamp(0.0, 1.0) * 255.0).round() as u8;
            let pixel = coverage.get_pixel_mut(px as u32, py as u32);
            if value > pixel.0[0] {
                *pixel = Luma([value]);
            }
        });
    }

    coverage
}

fn fill_through_mask(layer: &mut Pixmap, coverage: &GrayImage, color: [u8; 4]) -> TextMarkResult<()> {
    let mut mask = Mask::new(coverage.width(), coverage.height())
        .ok_or_else(|| TextMarkError::Render("cannot allocate coverage mask".to_string()))?;
    mask.data_mut().copy_from_slice(coverage.as_raw());

    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = false;

    let rect = Rect::from_xywh(0.0, 0.0, layer.width() as f32, layer.height() as f32)
        .ok_or_else(|| TextMarkError::Render("empty layer".to_string()))?;
    layer.fill_rect(rect, &paint, Transform::identity(), Some(&mask));
    Ok(())
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

    use super::{encode, flatten, jpeg_quality, layer_region, ExportFormat};
    use crate::annotation::{Anchor, AnnotationId, TextAnnotation, TextStyle};
    use crate::error::TextMarkError;
    use crate::fonts::FontBook;

    fn blank(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([40, 90, 160, 255]),
        ))
    }

    fn hello() -> TextAnnotation {
        TextAnnotation::new(
            AnnotationId {
                generation: 1,
                seq: 1,
            },
            "Hello",
            TextStyle::default(),
        )
    }

    /// Whitespace only: lays out without needing a font.
    fn blank_text() -> TextAnnotation {
        TextAnnotation::new(
            AnnotationId {
                generation: 1,
                seq: 2,
            },
            "   ",
            TextStyle::default(),
        )
    }

    #[test]
    fn flatten_keeps_native_size_and_caches_bounds() {
        let image = blank(800, 600);
        let mut annotations = vec![blank_text()];
        let result = flatten(&image, &mut annotations, &mut FontBook::empty())
            .expect("flatten should succeed");

        assert_eq!(result.dimensions(), (800, 600));
        let bounds = annotations[0].cached_geometry().expect("bounds cached");
        assert!(bounds.contains(egui::pos2(400.0, 300.0)));
    }

    #[test]
    fn flatten_without_a_font_for_visible_text_fails() {
        let image = blank(200, 100);
        let mut annotations = vec![hello()];
        let result = flatten(&image, &mut annotations, &mut FontBook::empty());
        match result {
            Err(TextMarkError::Render(message)) => assert!(message.contains("sans-serif")),
            other => panic!("expected a render error, got {other:?}"),
        }
    }

    #[test]
    fn flatten_with_system_font_changes_pixels_under_text() {
        let mut fonts = FontBook::load(&[]);
        if fonts.face_count() == 0 {
            return;
        }
        let image = blank(400, 200);
        let mut annotations = vec![hello()];
        let result = flatten(&image, &mut annotations, &mut fonts).expect("flatten should succeed");
        assert_eq!(result.dimensions(), (400, 200));
        assert_ne!(result.as_raw(), image.to_rgba8().as_raw());
        // Far corner is outside text, shadow and outline.
        assert_eq!(result.get_pixel(0, 0), &Rgba([40, 90, 160, 255]));
    }

    #[test]
    fn effects_do_not_carry_over_to_the_next_annotation() {
        let mut fonts = FontBook::load(&[]);
        if fonts.face_count() == 0 {
            return;
        }
        let image = blank(800, 200);

        let mut styled = TextStyle {
            opacity: 0.3,
            shadow: true,
            ..TextStyle::default()
        };
        styled.outline.enabled = true;
        styled.outline.width = 4;
        let mut first = TextAnnotation::new(AnnotationId { generation: 1, seq: 1 }, "Hi", styled);
        first.set_anchor(Anchor::new(0.15, 0.5));

        let plain = TextStyle {
            shadow: false,
            ..TextStyle::default()
        };
        let mut second = TextAnnotation::new(AnnotationId { generation: 1, seq: 2 }, "Hi", plain);
        second.set_anchor(Anchor::new(0.8, 0.5));

        let mut both = vec![first, second.clone()];
        let together = flatten(&image, &mut both, &mut fonts).expect("flatten both");
        let mut only_second = vec![second];
        let alone = flatten(&image, &mut only_second, &mut fonts).expect("flatten one");

        for y in 0..200 {
            for x in 400..800 {
                assert_eq!(
                    together.get_pixel(x, y),
                    alone.get_pixel(x, y),
                    "pixel {x},{y} differs"
                );
            }
        }
        assert_ne!(together.as_raw(), alone.as_raw());
    }

    #[test]
    fn png_and_jpeg_exports_decode_at_native_size() {
        let image = blank(800, 600);
        let mut annotations = vec![blank_text()];
        let flattened = flatten(&image, &mut annotations, &mut FontBook::empty())
            .expect("flatten should succeed");

        let png = encode(&flattened, ExportFormat::Png, 0.0).expect("png encodes");
        assert_eq!(image::guess_format(&png).expect("format"), ImageFormat::Png);
        let decoded = image::load_from_memory(&png).expect("png decodes");
        assert_eq!((decoded.width(), decoded.height()), (800, 600));

        let jpeg = encode(&flattened, ExportFormat::Jpeg, 0.9).expect("jpeg encodes");
        assert_eq!(image::guess_format(&jpeg).expect("format"), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&jpeg).expect("jpeg decodes");
        assert_eq!((decoded.width(), decoded.height()), (800, 600));
    }

    #[test]
    fn jpeg_quality_maps_unit_range() {
        assert_eq!(jpeg_quality(0.9), 90);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(7.0), 100);
    }

    #[test]
    fn layer_region_is_clipped_to_the_surface() {
        let bounds = egui::Rect::from_min_max(egui::pos2(-20.0, 10.0), egui::pos2(30.0, 500.0));
        assert_eq!(layer_region(bounds, 5.0, 100, 100), Some((0, 5, 35, 95)));

        let outside = egui::Rect::from_min_max(egui::pos2(200.0, 200.0), egui::pos2(210.0, 210.0));
        assert_eq!(layer_region(outside, 0.0, 100, 100), None);
    }

    #[test]
    fn export_file_name_uses_label_and_timestamp() {
        assert_eq!(
            ExportFormat::Jpeg.file_name("poster", 1_700_000_000_123),
            "poster-1700000000123.jpg"
        );
        assert_eq!(ExportFormat::Png.file_name("  ", 5), "textmark-5.png");
    }
}
