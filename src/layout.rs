//! Glyph placement for horizontal and vertical text blocks.
//!
//! Layout is pure geometry: it only needs advances and vertical metrics, so it
//! runs the same against a real font and against [`FixedMetrics`].

use ab_glyph::{Font, PxScaleFont, ScaleFont};
use egui::{pos2, Rect};

use crate::annotation::{Orientation, Point, TextStyle};

/// Line height of horizontal text, in em.
pub const LINE_HEIGHT: f32 = 1.2;
/// Distance between glyph centres inside a vertical column, in em, before char spacing.
pub const VERTICAL_PITCH: f32 = 1.2;
/// Distance between vertical columns, in em, before line spacing.
pub const COLUMN_PITCH: f32 = 1.5;

pub trait GlyphMetrics {
    fn advance(&self, ch: char) -> f32;
    fn ascent(&self) -> f32;
    /// Negative below the baseline.
    fn descent(&self) -> f32;
}

impl<F: Font> GlyphMetrics for PxScaleFont<F> {
    fn advance(&self, ch: char) -> f32 {
        ScaleFont::h_advance(self, ScaleFont::glyph_id(self, ch))
    }

    fn ascent(&self) -> f32 {
        ScaleFont::ascent(self)
    }

    fn descent(&self) -> f32 {
        ScaleFont::descent(self)
    }
}

/// Metrics used when no font face is available: ASCII is half-width, everything else full-width.
#[derive(Clone, Copy, Debug)]
pub struct FixedMetrics {
    size: f32,
}

impl FixedMetrics {
    pub fn new(size: f32) -> Self {
        Self { size }
    }
}

impl GlyphMetrics for FixedMetrics {
    fn advance(&self, ch: char) -> f32 {
        if ch.is_ascii() {
            self.size * 0.6
        } else {
            self.size
        }
    }

    fn ascent(&self) -> f32 {
        self.size * 0.8
    }

    fn descent(&self) -> f32 {
        -self.size * 0.2
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacedGlyph {
    pub ch: char,
    /// Left end of the baseline, where the rasterizer positions the glyph.
    pub origin: Point,
    /// Centre of the glyph cell.
    pub center: Point,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextLayout {
    pub glyphs: Vec<PlacedGlyph>,
    pub bounds: Rect,
}

pub fn layout_text(
    content: &str,
    style: &TextStyle,
    anchor: Point,
    metrics: &dyn GlyphMetrics,
) -> TextLayout {
    match style.orientation {
        Orientation::Horizontal => layout_horizontal(content, style, anchor, metrics),
        Orientation::Vertical => layout_vertical(content, style, anchor, metrics),
    }
}

fn lines(content: &str) -> Vec<&str> {
    content
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .collect()
}

/// Offset from a cell's vertical centre down to its baseline.
fn baseline_offset(metrics: &dyn GlyphMetrics) -> f32 {
    (metrics.ascent() + metrics.descent()) * 0.5
}

fn layout_horizontal(
    content: &str,
    style: &TextStyle,
    anchor: Point,
    metrics: &dyn GlyphMetrics,
) -> TextLayout {
    let size = style.size.px();
    let tracking = style.char_spacing * size;
    let line_height = size * LINE_HEIGHT * style.line_spacing;
    let lines = lines(content);
    let block_height = line_height * lines.len() as f32;
    let top = anchor.y - block_height * 0.5;
    let to_baseline = baseline_offset(metrics);

    let mut glyphs = Vec::new();
    let mut min_x = anchor.x;
    let mut max_x = anchor.x;

    for (row, line) in lines.iter().enumerate() {
        let advances: Vec<f32> = line.chars().map(|ch| metrics.advance(ch)).collect();
        let gaps = advances.len().saturating_sub(1) as f32;
        let width = advances.iter().sum::<f32>() + tracking * gaps;
        let middle = top + line_height * (row as f32 + 0.5);
        let baseline = middle + to_baseline;

        let mut x = anchor.x - width * 0.5;
        min_x = min_x.min(x);
        max_x = max_x.max(x + width);

        for (ch, advance) in line.chars().zip(advances) {
            glyphs.push(PlacedGlyph {
                ch,
                origin: Point::new(x, baseline),
                center: Point::new(x + advance * 0.5, middle),
            });
            x += advance + tracking;
        }
    }

    TextLayout {
        glyphs,
        bounds: Rect::from_min_max(pos2(min_x, top), pos2(max_x, top + block_height)),
    }
}

fn layout_vertical(
    content: &str,
    style: &TextStyle,
    anchor: Point,
    metrics: &dyn GlyphMetrics,
) -> TextLayout {
    let size = style.size.px();
    let pitch = size * (VERTICAL_PITCH + style.char_spacing);
    let column_pitch = size * COLUMN_PITCH * style.line_spacing;
    let lines = lines(content);
    let to_baseline = baseline_offset(metrics);

    let mut glyphs = Vec::new();
    let mut longest = 1usize;

    // Columns run right to left, starting on the anchor.
    for (column, line) in lines.iter().enumerate() {
        let center_x = anchor.x - column_pitch * column as f32;
        let mut count = 0usize;
        for (row, ch) in line.chars().enumerate() {
            let center_y = anchor.y + pitch * row as f32;
            let advance = metrics.advance(ch);
            glyphs.push(PlacedGlyph {
                ch,
                origin: Point::new(center_x - advance * 0.5, center_y + to_baseline),
                center: Point::new(center_x, center_y),
            });
            count += 1;
        }
        longest = longest.max(count);
    }

    let half = size * 0.5;
    let columns = lines.len().max(1) as f32;
    let left = anchor.x - column_pitch * (columns - 1.0) - half;
    let bottom = anchor.y + pitch * (longest as f32 - 1.0) + half;

    TextLayout {
        glyphs,
        bounds: Rect::from_min_max(pos2(left, anchor.y - half), pos2(anchor.x + half, bottom)),
    }
}

#[cfg(test)]
mod tests {
    use super::{layout_text, FixedMetrics, GlyphMetrics};
    use crate::annotation::{FontSize, Orientation, Point, TextStyle};

    fn style(orientation: Orientation, size: u16) -> TextStyle {
        TextStyle {
            orientation,
            size: FontSize::from_px(size),
            ..TextStyle::default()
        }
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn vertical_hello_stacks_five_glyphs_from_the_anchor() {
        let style = style(Orientation::Vertical, 40);
        let anchor = Point::new(400.0, 300.0);
        let layout = layout_text("Hello", &style, anchor, &FixedMetrics::new(40.0));

        assert_eq!(layout.glyphs.len(), 5);
        assert_eq!(layout.glyphs[0].center, anchor);
        for pair in layout.glyphs.windows(2) {
            assert!(close(pair[1].center.y - pair[0].center.y, 48.0));
            assert!(close(pair[1].center.x, pair[0].center.x));
        }
    }

    #[test]
    fn vertical_char_spacing_widens_pitch() {
        let mut style = style(Orientation::Vertical, 40);
        style.char_spacing = 0.3;
        let layout = layout_text("ab", &style, Point::new(0.0, 0.0), &FixedMetrics::new(40.0));
        assert!(close(layout.glyphs[1].center.y - layout.glyphs[0].center.y, 60.0));
    }

    #[test]
    fn vertical_lines_become_columns_right_to_left() {
        let style = style(Orientation::Vertical, 20);
        let anchor = Point::new(200.0, 50.0);
        let layout = layout_text("一二\n三", &style, anchor, &FixedMetrics::new(20.0));

        assert_eq!(layout.glyphs.len(), 3);
        assert_eq!(layout.glyphs[2].ch, '三');
        assert!(close(layout.glyphs[2].center.x, 200.0 - 30.0));
        assert!(close(layout.glyphs[2].center.y, 50.0));
        assert!(layout.bounds.min.x < 170.0);
    }

    #[test]
    fn horizontal_block_is_centred_on_the_anchor() {
        let style = style(Orientation::Horizontal, 40);
        let anchor = Point::new(400.0, 300.0);
        let metrics = FixedMetrics::new(40.0);
        let layout = layout_text("ab\ncd", &style, anchor, &metrics);

        assert_eq!(layout.glyphs.len(), 4);
        assert!(close(layout.bounds.center().x, 400.0));
        assert!(close(layout.bounds.center().y, 300.0));
        assert!(close(layout.bounds.height(), 2.0 * 48.0));

        let first_line_width = 2.0 * metrics.advance('a');
        assert!(close(layout.glyphs[0].origin.x, 400.0 - first_line_width * 0.5));
        assert!(layout.glyphs[2].center.y > layout.glyphs[0].center.y);
    }

    #[test]
    fn horizontal_char_spacing_adds_tracking_between_glyphs() {
        let mut style = style(Orientation::Horizontal, 40);
        let plain = layout_text("ab", &style, Point::new(0.0, 0.0), &FixedMetrics::new(40.0));
        style.char_spacing = 0.25;
        let spaced = layout_text("ab", &style, Point::new(0.0, 0.0), &FixedMetrics::new(40.0));
        assert!(close(spaced.bounds.width() - plain.bounds.width(), 10.0));
    }

    #[test]
    fn empty_content_still_has_bounds() {
        let style = style(Orientation::Horizontal, 40);
        let layout = layout_text("", &style, Point::new(10.0, 10.0), &FixedMetrics::new(40.0));
        assert!(layout.glyphs.is_empty());
        assert!(layout.bounds.height() > 0.0);
    }
}
