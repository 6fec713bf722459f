use egui::{Pos2, Rect};

use crate::annotation::{AnnotationId, Point};

/// Where the surface is shown on screen. The surface keeps its native pixel
/// size; only this mapping knows about display zoom.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayMapping {
    pub image_rect: Rect,
    pub surface_width: u32,
    pub surface_height: u32,
}

impl DisplayMapping {
    pub fn new(image_rect: Rect, surface_width: u32, surface_height: u32) -> Self {
        Self {
            image_rect,
            surface_width,
            surface_height,
        }
    }

    /// Surface pixels per display point.
    pub fn scale_factor(&self) -> f32 {
        self.surface_width as f32 / self.image_rect.width().max(f32::EPSILON)
    }

    pub fn display_to_surface(&self, pos: Pos2) -> Point {
        let scale = self.scale_factor();
        Point::new(
            (pos.x - self.image_rect.min.x) * scale,
            (pos.y - self.image_rect.min.y) * scale,
        )
    }

    pub fn surface_to_display(&self, point: Point) -> Pos2 {
        let scale = self.scale_factor();
        Pos2::new(
            self.image_rect.min.x + point.x / scale,
            self.image_rect.min.y + point.y / scale,
        )
    }

    pub fn surface_rect_to_display(&self, rect: Rect) -> Rect {
        Rect::from_min_max(
            self.surface_to_display(Point::from_pos2(rect.min)),
            self.surface_to_display(Point::from_pos2(rect.max)),
        )
    }
}

/// Lives from pointer-down to pointer-up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DragState {
    pub annotation_id: AnnotationId,
    /// Pointer minus anchor, in surface pixels, fixed for the whole drag.
    pub offset: Point,
    pub start_anchor: Point,
}

impl DragState {
    pub fn begin(annotation_id: AnnotationId, pointer: Point, anchor: Point) -> Self {
        Self {
            annotation_id,
            offset: Point::new(pointer.x - anchor.x, pointer.y - anchor.y),
            start_anchor: anchor,
        }
    }

    /// Recomputed from the absolute pointer every move so small steps never accumulate error.
    pub fn anchor_for(&self, pointer: Point, surface_width: u32, surface_height: u32) -> Point {
        Point::new(
            (pointer.x - self.offset.x).clamp(0.0, surface_width as f32),
            (pointer.y - self.offset.y).clamp(0.0, surface_height as f32),
        )
    }
}

#[cfg(test)]
mod tests {
    use egui::{pos2, Rect};

    use super::{DisplayMapping, DragState};
    use crate::annotation::{AnnotationId, Point};

    fn mapping() -> DisplayMapping {
        // 800x600 surface shown at half size, offset inside the window.
        DisplayMapping::new(
            Rect::from_min_max(pos2(100.0, 50.0), pos2(500.0, 350.0)),
            800,
            600,
        )
    }

    #[test]
    fn scale_factor_is_surface_over_display_width() {
        assert_eq!(mapping().scale_factor(), 2.0);
    }

    #[test]
    fn display_and_surface_coordinates_invert() {
        let mapping = mapping();
        let surface = mapping.display_to_surface(pos2(300.0, 200.0));
        assert_eq!(surface, Point::new(400.0, 300.0));
        assert_eq!(mapping.surface_to_display(surface), pos2(300.0, 200.0));
    }

    #[test]
    fn drag_keeps_the_grab_offset() {
        let id = AnnotationId {
            generation: 1,
            seq: 1,
        };
        let drag = DragState::begin(id, Point::new(410.0, 320.0), Point::new(400.0, 300.0));
        let anchor = drag.anchor_for(Point::new(510.0, 320.0), 800, 600);
        assert_eq!(anchor, Point::new(500.0, 300.0));
    }

    #[test]
    fn drag_clamps_to_the_surface() {
        let id = AnnotationId {
            generation: 1,
            seq: 1,
        };
        let drag = DragState::begin(id, Point::new(400.0, 300.0), Point::new(400.0, 300.0));
        assert_eq!(
            drag.anchor_for(Point::new(-50.0, 900.0), 800, 600),
            Point::new(0.0, 600.0)
        );
    }
}
