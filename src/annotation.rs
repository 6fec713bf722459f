use std::fmt;

use egui::{Pos2, Rect};
use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};

use crate::layout::{self, FixedMetrics};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AnnotationId {
    pub generation: u32,
    pub seq: u32,
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.generation, self.seq)
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

impl FontWeight {
    pub fn to_fontdb(self) -> fontdb::Weight {
        match self {
            Self::Normal => fontdb::Weight::NORMAL,
            Self::Bold => fontdb::Weight::BOLD,
        }
    }
}

/// Font size in surface pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FontSize(u16);

impl FontSize {
    pub const MIN: u16 = 8;
    pub const MAX: u16 = 400;
    pub const DEFAULT: Self = Self(48);

    pub fn from_px(px: u16) -> Self {
        Self(px.clamp(Self::MIN, Self::MAX))
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }

    pub fn px(self) -> f32 {
        self.0 as f32
    }
}

impl Default for FontSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Serialize for FontSize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u16(self.0)
    }
}

impl<'de> Deserialize<'de> for FontSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FontSizeVisitor;

        impl<'de> Visitor<'de> for FontSizeVisitor {
            type Value = FontSize;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("font size in pixels, as a number or a \"40px\" string")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(FontSize::from_px(value.min(FontSize::MAX as u64) as u16))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let clamped = value.clamp(FontSize::MIN as i64, FontSize::MAX as i64) as u16;
                Ok(FontSize::from_px(clamped))
            }

            fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let clamped = value
                    .round()
                    .clamp(FontSize::MIN as f64, FontSize::MAX as f64) as u16;
                Ok(FontSize::from_px(clamped))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let digits = value.trim().trim_end_matches("px").trim();
                let parsed = digits.parse::<f64>().map_err(|_| {
                    E::custom(format!("invalid font size '{value}', expected pixels"))
                })?;
                self.visit_f64(parsed)
            }
        }

        deserializer.deserialize_any(FontSizeVisitor)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn to_pos2(self) -> Pos2 {
        Pos2::new(self.x, self.y)
    }

    pub fn from_pos2(value: Pos2) -> Self {
        Self {
            x: value.x,
            y: value.y,
        }
    }
}

/// Position relative to the surface, both axes in `[0, 1]`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Anchor {
    pub x: f32,
    pub y: f32,
}

impl Anchor {
    pub const CENTER: Self = Self { x: 0.5, y: 0.5 };

    /// Clamps into `[0, 1]`; a non-finite axis falls back to the centre.
    pub fn new(x: f32, y: f32) -> Self {
        let axis = |value: f32| {
            if value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                0.5
            }
        };
        Self {
            x: axis(x),
            y: axis(y),
        }
    }

    pub fn to_pixel(self, width: u32, height: u32) -> Point {
        Point::new(self.x * width as f32, self.y * height as f32)
    }

    /// Clamps into the surface before normalizing.
    pub fn from_pixel(pixel: Point, width: u32, height: u32) -> Self {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        Self::new(pixel.x.clamp(0.0, w) / w, pixel.y.clamp(0.0, h) / h)
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Self::CENTER
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Outline {
    pub enabled: bool,
    pub color: [u8; 4],
    pub width: u8,
}

impl Default for Outline {
    fn default() -> Self {
        Self {
            enabled: false,
            color: [0, 0, 0, 255],
            width: 2,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextStyle {
    pub family: String,
    pub size: FontSize,
    pub weight: FontWeight,
    pub color: [u8; 4],
    pub orientation: Orientation,
    pub opacity: f32,
    /// Extra gap between glyphs, in em.
    pub char_spacing: f32,
    pub line_spacing: f32,
    pub outline: Outline,
    pub shadow: bool,
}

impl TextStyle {
    pub const CHAR_SPACING_MAX: f32 = 0.3;
    pub const LINE_SPACING_MIN: f32 = 0.5;
    pub const LINE_SPACING_MAX: f32 = 3.0;

    /// Brings out-of-range values (hand-edited settings, old records) back in range.
    pub fn sanitized(mut self) -> Self {
        self.opacity = self.opacity.clamp(0.0, 1.0);
        self.char_spacing = self.char_spacing.clamp(0.0, Self::CHAR_SPACING_MAX);
        self.line_spacing = self
            .line_spacing
            .clamp(Self::LINE_SPACING_MIN, Self::LINE_SPACING_MAX);
        if self.family.trim().is_empty() {
            self.family = "sans-serif".to_string();
        }
        self
    }
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            family: "sans-serif".to_string(),
            size: FontSize::DEFAULT,
            weight: FontWeight::Bold,
            color: [255, 255, 255, 255],
            orientation: Orientation::Horizontal,
            opacity: 1.0,
            char_spacing: 0.0,
            line_spacing: 1.0,
            outline: Outline::default(),
            shadow: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TextAnnotation {
    pub id: AnnotationId,
    content: String,
    style: TextStyle,
    anchor: Anchor,
    /// Pixel bounds from the last layout pass; cleared by every setter.
    #[serde(skip)]
    geometry: Option<Rect>,
}

impl PartialEq for TextAnnotation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.content == other.content
            && self.style == other.style
            && self.anchor == other.anchor
    }
}

impl TextAnnotation {
    pub fn new(id: AnnotationId, content: impl Into<String>, style: TextStyle) -> Self {
        Self {
            id,
            content: content.into(),
            style: style.sanitized(),
            anchor: Anchor::CENTER,
            geometry: None,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn style(&self) -> &TextStyle {
        &self.style
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.geometry = None;
    }

    pub fn set_style(&mut self, style: TextStyle) {
        self.style = style.sanitized();
        self.geometry = None;
    }

    pub fn set_anchor(&mut self, anchor: Anchor) {
        self.anchor = Anchor::new(anchor.x, anchor.y);
        self.geometry = None;
    }

    pub fn anchor_pixel(&self, width: u32, height: u32) -> Point {
        self.anchor.to_pixel(width, height)
    }

    pub fn set_anchor_pixel(&mut self, pixel: Point, width: u32, height: u32) {
        self.set_anchor(Anchor::from_pixel(pixel, width, height));
    }

    pub(crate) fn cache_geometry(&mut self, bounds: Rect) {
        self.geometry = Some(bounds);
    }

    pub fn cached_geometry(&self) -> Option<Rect> {
        self.geometry
    }

    /// Bounds from the last render, or an estimate from fixed metrics if it has not been laid out.
    pub fn bounds(&self, width: u32, height: u32) -> Rect {
        if let Some(bounds) = self.cached_geometry() {
            return bounds;
        }
        let metrics = FixedMetrics::new(self.style.size.px());
        layout::layout_text(
            &self.content,
            &self.style,
            self.anchor_pixel(width, height),
            &metrics,
        )
        .bounds
    }

    pub fn contains(&self, point: Point, tolerance: f32, width: u32, height: u32) -> bool {
        self.bounds(width, height)
            .expand(tolerance)
            .contains(point.to_pos2())
    }
}
