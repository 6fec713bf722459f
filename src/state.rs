use egui::{ColorImage, Context as EguiContext, TextureHandle, TextureOptions, Vec2};
use image::RgbaImage;
use tracing::{debug, info};

use crate::annotation::{AnnotationId, Point, TextAnnotation, TextStyle};
use crate::drag::{DisplayMapping, DragState};
use crate::error::{TextMarkError, TextMarkResult};
use crate::flatten::{self, ExportFormat};
use crate::fonts::FontBook;
use crate::loader::SourceImage;
use crate::settings::UserSettings;

pub const ZOOM_STEPS: &[f32] = &[0.1, 0.25, 0.33, 0.5, 0.67, 0.75, 1.0, 1.5, 2.0, 3.0, 4.0];
const HIT_TOLERANCE_PX: f32 = 6.0;

/// The surface: background image at native resolution plus the last composed preview.
pub struct EditorImage {
    pub source: SourceImage,
    pub texture: Option<TextureHandle>,
    pub preview_revision: Option<u64>,
    /// Why the last preview shows the bare background, if it does.
    pub preview_error: Option<String>,
}

impl EditorImage {
    pub fn new(source: SourceImage) -> Self {
        Self {
            source,
            texture: None,
            preview_revision: None,
            preview_error: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.source.width()
    }

    pub fn height(&self) -> u32 {
        self.source.height()
    }

    pub fn size_vec2(&self) -> Vec2 {
        Vec2::new(self.width() as f32, self.height() as f32)
    }

    pub fn upload_preview(&mut self, ctx: &EguiContext, composed: &RgbaImage, revision: u64) {
        let size = [composed.width() as usize, composed.height() as usize];
        let color = ColorImage::from_rgba_unmultiplied(size, composed.as_raw());
        match self.texture.as_mut() {
            Some(texture) => texture.set(color, TextureOptions::LINEAR),
            None => self.texture = Some(ctx.load_texture("surface", color, TextureOptions::LINEAR)),
        }
        self.preview_revision = Some(revision);
    }

    pub fn preview_is_current(&self, revision: u64) -> bool {
        self.preview_revision == Some(revision)
    }
}

/// One editing session. Everything the UI does goes through here.
pub struct EditorState {
    pub image: Option<EditorImage>,
    pub annotations: Vec<TextAnnotation>,
    pub selection: Option<AnnotationId>,
    pub drag_state: Option<DragState>,
    pub active_style: TextStyle,
    pub settings: UserSettings,
    pub load_error: Option<String>,
    pub zoom: f32,
    pub fit_zoom_to_view: bool,
    pub exported: bool,
    pub has_edited: bool,
    generation: u32,
    next_seq: u32,
    revision: u64,
}

impl EditorState {
    pub fn new(settings: UserSettings) -> Self {
        Self {
            image: None,
            annotations: Vec::new(),
            selection: None,
            drag_state: None,
            active_style: settings.last_style.clone(),
            settings,
            load_error: None,
            zoom: 1.0,
            fit_zoom_to_view: true,
            exported: false,
            has_edited: false,
            generation: 0,
            next_seq: 1,
            revision: 0,
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// Bumped on every visible change; the preview re-renders when it moves.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn surface_size(&self) -> Option<(u32, u32)> {
        self.image.as_ref().map(|image| (image.width(), image.height()))
    }

    pub fn mark_changed(&mut self) {
        self.revision = self.revision.wrapping_add(1);
        self.has_edited = true;
        self.exported = false;
    }

    /// Discards the surface and every annotation; ids issued before this call stop resolving.
    pub fn reset(&mut self, source: SourceImage) -> u32 {
        info!(
            width = source.width(),
            height = source.height(),
            "surface reset"
        );
        self.image = Some(EditorImage::new(source));
        self.annotations.clear();
        self.selection = None;
        self.drag_state = None;
        self.load_error = None;
        self.generation = self.generation.wrapping_add(1);
        self.next_seq = 1;
        self.zoom = 1.0;
        self.fit_zoom_to_view = true;
        self.mark_changed();
        self.has_edited = false;
        self.generation
    }

    /// Swaps the background and keeps the annotations; normalized anchors follow the new size.
    pub fn replace_background(&mut self, source: SourceImage) {
        if self.image.is_none() {
            self.reset(source);
            return;
        }
        info!(
            width = source.width(),
            height = source.height(),
            kept = self.annotations.len(),
            "background replaced"
        );
        self.image = Some(EditorImage::new(source));
        self.drag_state = None;
        self.load_error = None;
        self.fit_zoom_to_view = true;
        for annotation in &mut self.annotations {
            let anchor = annotation.anchor();
            annotation.set_anchor(anchor);
        }
        self.mark_changed();
    }

    /// Closes the image entirely.
    pub fn clear(&mut self) {
        self.image = None;
        self.annotations.clear();
        self.selection = None;
        self.drag_state = None;
        self.generation = self.generation.wrapping_add(1);
        self.next_seq = 1;
        self.exported = false;
        self.has_edited = false;
        self.revision = self.revision.wrapping_add(1);
    }

    /// A failed open only takes over the canvas when nothing is loaded yet.
    /// Returns false when an existing surface was kept; the caller reports the failure.
    pub fn set_load_error(&mut self, message: String) -> bool {
        if self.image.is_some() {
            return false;
        }
        self.load_error = Some(message);
        self.drag_state = None;
        self.revision = self.revision.wrapping_add(1);
        true
    }

    fn next_annotation_id(&mut self) -> AnnotationId {
        let id = AnnotationId {
            generation: self.generation,
            seq: self.next_seq,
        };
        self.next_seq = self.next_seq.saturating_add(1);
        id
    }

    /// New annotation at the surface centre using the active style; it becomes the selection.
    pub fn add_annotation(&mut self, content: Option<String>) -> TextMarkResult<AnnotationId> {
        if self.image.is_none() {
            return Err(TextMarkError::NoImage);
        }
        let content = content.unwrap_or_else(|| self.settings.default_text.clone());
        let id = self.next_annotation_id();
        self.annotations
            .push(TextAnnotation::new(id, content, self.active_style.clone()));
        self.selection = Some(id);
        self.mark_changed();
        debug!(%id, "annotation added");
        Ok(id)
    }

    pub fn remove_annotation(&mut self, id: AnnotationId) -> TextMarkResult<()> {
        let before = self.annotations.len();
        self.annotations.retain(|annotation| annotation.id != id);
        if self.annotations.len() == before {
            return Err(TextMarkError::UnknownAnnotation(id));
        }
        if self.selection == Some(id) {
            self.selection = None;
        }
        if self.drag_state.map(|drag| drag.annotation_id) == Some(id) {
            self.drag_state = None;
        }
        self.mark_changed();
        Ok(())
    }

    pub fn delete_selected(&mut self) {
        if let Some(selected) = self.selection {
            let _ = self.remove_annotation(selected);
        }
    }

    pub fn select(&mut self, id: Option<AnnotationId>) {
        let id = id.filter(|id| self.find_annotation(*id).is_some());
        if self.selection != id {
            self.selection = id;
            self.revision = self.revision.wrapping_add(1);
        }
        if let Some(style) = id
            .and_then(|id| self.find_annotation(id))
            .map(|annotation| annotation.style().clone())
        {
            self.active_style = style;
        }
    }

    pub fn find_annotation(&self, id: AnnotationId) -> Option<&TextAnnotation> {
        self.annotations
            .iter()
            .find(|annotation| annotation.id == id)
    }

    pub fn find_annotation_mut(&mut self, id: AnnotationId) -> Option<&mut TextAnnotation> {
        self.annotations
            .iter_mut()
            .find(|annotation| annotation.id == id)
    }

    pub fn selected(&self) -> Option<&TextAnnotation> {
        self.selection.and_then(|id| self.find_annotation(id))
    }

    /// Applies a control-panel edit to the active style, the remembered settings and the selection.
    pub fn edit_style(&mut self, edit: impl FnOnce(&mut TextStyle)) {
        let mut style = self.active_style.clone();
        edit(&mut style);
        let style = style.sanitized();
        if style == self.active_style {
            return;
        }
        self.active_style = style.clone();
        self.settings.last_style = style.clone();

        if let Some(id) = self.selection {
            if let Some(annotation) = self.find_annotation_mut(id) {
                annotation.set_style(style);
            }
        }
        self.mark_changed();
    }

    pub fn set_selected_content(&mut self, content: &str) {
        let Some(id) = self.selection else {
            return;
        };
        let changed = match self.find_annotation_mut(id) {
            Some(annotation) if annotation.content() != content => {
                annotation.set_content(content);
                true
            }
            _ => false,
        };
        if changed {
            self.mark_changed();
        }
    }

    fn pick_annotation(&self, point: Point, tolerance: f32) -> Option<AnnotationId> {
        let (width, height) = self.surface_size()?;
        self.annotations
            .iter()
            .rev()
            .find(|annotation| annotation.contains(point, tolerance, width, height))
            .map(|annotation| annotation.id)
    }

    /// Pointer-down. Returns true when a drag started.
    pub fn begin_drag(&mut self, pointer: egui::Pos2, mapping: &DisplayMapping) -> bool {
        let Some((width, height)) = self.surface_size() else {
            return false;
        };
        let surface_point = mapping.display_to_surface(pointer);
        let tolerance = HIT_TOLERANCE_PX * mapping.scale_factor();

        let Some(id) = self.pick_annotation(surface_point, tolerance) else {
            self.select(None);
            self.drag_state = None;
            return false;
        };
        self.select(Some(id));
        let Some(annotation) = self.find_annotation(id) else {
            return false;
        };
        let anchor = annotation.anchor_pixel(width, height);
        self.drag_state = Some(DragState::begin(id, surface_point, anchor));
        debug!(%id, scale = mapping.scale_factor(), "drag started");
        true
    }

    pub fn update_drag(&mut self, pointer: egui::Pos2, mapping: &DisplayMapping) {
        let Some(drag) = self.drag_state else {
            return;
        };
        let Some((width, height)) = self.surface_size() else {
            return;
        };
        let target = drag.anchor_for(mapping.display_to_surface(pointer), width, height);
        let moved = match self.find_annotation_mut(drag.annotation_id) {
            Some(annotation) if annotation.anchor_pixel(width, height) != target => {
                annotation.set_anchor_pixel(target, width, height);
                true
            }
            Some(_) => false,
            None => {
                self.drag_state = None;
                false
            }
        };
        if moved {
            self.mark_changed();
        }
    }

    /// Pointer-up. Returns whether the annotation ended somewhere else.
    pub fn end_drag(&mut self) -> bool {
        let Some(drag) = self.drag_state.take() else {
            return false;
        };
        let Some((width, height)) = self.surface_size() else {
            return false;
        };
        self.find_annotation(drag.annotation_id)
            .map(|annotation| annotation.anchor_pixel(width, height) != drag.start_anchor)
            .unwrap_or(false)
    }

    /// Keyboard nudge in surface pixels.
    pub fn nudge_selected(&mut self, delta: Vec2) {
        let (Some(id), Some((width, height))) = (self.selection, self.surface_size()) else {
            return;
        };
        if let Some(annotation) = self.find_annotation_mut(id) {
            let current = annotation.anchor_pixel(width, height);
            annotation.set_anchor_pixel(
                Point::new(current.x + delta.x, current.y + delta.y),
                width,
                height,
            );
            self.mark_changed();
        }
    }

    /// Composes the surface at native resolution and refreshes cached annotation bounds.
    pub fn compose(&mut self, fonts: &mut FontBook) -> TextMarkResult<RgbaImage> {
        let image = self.image.as_ref().ok_or(TextMarkError::NoImage)?;
        flatten::flatten(&image.source.image, &mut self.annotations, fonts)
    }

    /// Drops the selection while composing so no affordance can end up in the
    /// output, then selects the same annotation again.
    pub fn export(
        &mut self,
        fonts: &mut FontBook,
        format: ExportFormat,
        quality: f32,
    ) -> TextMarkResult<Vec<u8>> {
        let previous = self.selection;
        self.select(None);
        self.drag_state = None;
        let encoded = self
            .compose(fonts)
            .and_then(|composed| {
                flatten::encode(&composed, format, quality).map(|bytes| (composed, bytes))
            });
        self.select(previous);
        let (composed, bytes) = encoded?;
        info!(
            format = format.label(),
            width = composed.width(),
            height = composed.height(),
            bytes = bytes.len(),
            "surface exported"
        );
        self.exported = true;
        Ok(bytes)
    }

    /// Reinstates a saved annotation set on top of a freshly reset surface.
    pub fn restore(&mut self, source: SourceImage, annotations: Vec<TextAnnotation>, next_seq: u32) {
        let generation = self.reset(source);
        self.annotations = annotations
            .into_iter()
            .map(|mut annotation| {
                annotation.id.generation = generation;
                annotation
            })
            .collect();
        let highest = self
            .annotations
            .iter()
            .map(|annotation| annotation.id.seq)
            .max()
            .unwrap_or(0);
        self.next_seq = next_seq.max(highest.saturating_add(1));
        self.mark_changed();
    }

    pub fn nearest_zoom_step(&self) -> usize {
        let mut best_idx = 0usize;
        let mut best_diff = f32::MAX;
        for (idx, step) in ZOOM_STEPS.iter().enumerate() {
            let diff = (self.zoom - step).abs();
            if diff < best_diff {
                best_diff = diff;
                best_idx = idx;
            }
        }
        best_idx
    }

    pub fn zoom_in(&mut self) {
        let idx = self.nearest_zoom_step();
        if idx + 1 < ZOOM_STEPS.len() {
            self.zoom = ZOOM_STEPS[idx + 1];
        }
    }

    pub fn zoom_out(&mut self) {
        let idx = self.nearest_zoom_step();
        if idx > 0 {
            self.zoom = ZOOM_STEPS[idx - 1];
        }
    }

    pub fn set_fit_zoom(&mut self, image_size: Vec2, view_size: Vec2) {
        let width_scale = (view_size.x / image_size.x).max(0.01);
        let height_scale = (view_size.y / image_size.y).max(0.01);
        self.zoom = width_scale.min(height_scale).clamp(0.05, 4.0);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use egui::{pos2, vec2, Rect};
    use image::{DynamicImage, ImageFormat, RgbaImage};

    use super::EditorState;
    use crate::annotation::{Orientation, Point};
    use crate::drag::DisplayMapping;
    use crate::error::TextMarkError;
    use crate::flatten::ExportFormat;
    use crate::fonts::FontBook;
    use crate::loader::SourceImage;
    use crate::settings::UserSettings;

    fn source(width: u32, height: u32) -> SourceImage {
        SourceImage {
            image: Arc::new(DynamicImage::ImageRgba8(RgbaImage::new(width, height))),
            bytes: Arc::new(Vec::new()),
            path: None,
        }
    }

    fn loaded(width: u32, height: u32) -> EditorState {
        let mut state = EditorState::new(UserSettings::default());
        state.reset(source(width, height));
        state
    }

    /// 800x600 surface shown at 400x300: every display point is two surface pixels.
    fn half_size_mapping() -> DisplayMapping {
        DisplayMapping::new(
            Rect::from_min_max(pos2(20.0, 40.0), pos2(420.0, 340.0)),
            800,
            600,
        )
    }

    #[test]
    fn surface_matches_native_image_size() {
        let state = loaded(1920, 1080);
        assert_eq!(state.surface_size(), Some((1920, 1080)));
    }

    #[test]
    fn add_annotation_needs_an_image_and_lands_in_the_centre() {
        let mut empty = EditorState::new(UserSettings::default());
        assert!(matches!(
            empty.add_annotation(None),
            Err(TextMarkError::NoImage)
        ));

        let mut state = loaded(800, 600);
        let id = state.add_annotation(Some("Hello".into())).expect("add");
        let annotation = state.find_annotation(id).expect("present");
        assert_eq!(annotation.anchor_pixel(800, 600), Point::new(400.0, 300.0));
        assert_eq!(state.selection, Some(id));
    }

    #[test]
    fn reset_invalidates_previous_ids() {
        let mut state = loaded(800, 600);
        let old = state.add_annotation(None).expect("add");
        state.reset(source(640, 480));
        assert!(state.annotations.is_empty());
        assert!(matches!(
            state.remove_annotation(old),
            Err(TextMarkError::UnknownAnnotation(_))
        ));

        let fresh = state.add_annotation(None).expect("add");
        assert_eq!(fresh.seq, old.seq);
        assert_ne!(fresh, old);
    }

    #[test]
    fn remove_annotation_clears_selection() {
        let mut state = loaded(800, 600);
        let id = state.add_annotation(None).expect("add");
        state.remove_annotation(id).expect("remove");
        assert!(state.annotations.is_empty());
        assert_eq!(state.selection, None);
    }

    #[test]
    fn drag_moves_anchor_by_scaled_display_delta() {
        let mut state = loaded(800, 600);
        let id = state.add_annotation(Some("Hello".into())).expect("add");
        let mapping = half_size_mapping();

        // Grab a little off the anchor (display centre is 220,190).
        assert!(state.begin_drag(pos2(225.0, 192.0), &mapping));
        state.update_drag(pos2(255.0, 182.0), &mapping);
        assert!(state.end_drag());

        let anchor = state.find_annotation(id).expect("present").anchor_pixel(800, 600);
        assert!((anchor.x - (400.0 + 30.0 * 2.0)).abs() < 1e-3);
        assert!((anchor.y - (300.0 - 10.0 * 2.0)).abs() < 1e-3);
    }

    #[test]
    fn many_small_moves_do_not_drift() {
        let mut state = loaded(800, 600);
        let id = state.add_annotation(Some("Hello".into())).expect("add");
        let mapping = half_size_mapping();

        assert!(state.begin_drag(pos2(220.0, 190.0), &mapping));
        for step in 1..=200 {
            let offset = step as f32 * 0.37;
            state.update_drag(pos2(220.0 + offset, 190.0 + offset * 0.5), &mapping);
        }
        state.end_drag();

        let anchor = state.find_annotation(id).expect("present").anchor_pixel(800, 600);
        let expected = 200.0 * 0.37 * 2.0;
        assert!((anchor.x - (400.0 + expected)).abs() < 1e-2);
        assert!((anchor.y - (300.0 + expected * 0.5)).abs() < 1e-2);
    }

    #[test]
    fn pointer_down_on_empty_space_deselects() {
        let mut state = loaded(800, 600);
        state.add_annotation(Some("Hello".into())).expect("add");
        assert!(!state.begin_drag(pos2(22.0, 42.0), &half_size_mapping()));
        assert_eq!(state.selection, None);
        assert!(state.drag_state.is_none());
    }

    #[test]
    fn replace_background_rescales_normalized_anchors() {
        let mut state = loaded(800, 600);
        let id = state.add_annotation(Some("Hello".into())).expect("add");
        state.nudge_selected(vec2(-200.0, -150.0));
        state.replace_background(source(1600, 1200));

        let annotation = state.find_annotation(id).expect("kept");
        assert_eq!(annotation.anchor_pixel(1600, 1200), Point::new(400.0, 300.0));
    }

    #[test]
    fn edit_style_updates_selection_and_remembered_style() {
        let mut state = loaded(800, 600);
        let id = state.add_annotation(Some("Hello".into())).expect("add");
        state.edit_style(|style| style.orientation = Orientation::Vertical);

        let annotation = state.find_annotation(id).expect("present");
        assert_eq!(annotation.style().orientation, Orientation::Vertical);
        assert_eq!(state.settings.last_style.orientation, Orientation::Vertical);
    }

    #[test]
    fn export_keeps_native_size_and_restores_selection() {
        let mut state = loaded(800, 600);
        let id = state.add_annotation(Some("   ".into())).expect("add");
        let bytes = state
            .export(&mut FontBook::empty(), ExportFormat::Jpeg, 0.9)
            .expect("export");

        assert_eq!(state.selection, Some(id));
        assert!(state.exported);
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).expect("jpeg");
        assert_eq!((decoded.width(), decoded.height()), (800, 600));
    }

    #[test]
    fn export_without_a_font_reports_an_error() {
        let mut state = loaded(200, 100);
        let id = state.add_annotation(Some("Hello".into())).expect("add");
        assert!(matches!(
            state.export(&mut FontBook::empty(), ExportFormat::Png, 1.0),
            Err(TextMarkError::Render(_))
        ));
        assert!(!state.exported);
        assert_eq!(state.selection, Some(id));
    }

    #[test]
    fn failed_open_keeps_the_current_session() {
        let mut state = loaded(800, 600);
        let id = state.add_annotation(Some("Hello".into())).expect("add");

        assert!(!state.set_load_error("not an image".into()));
        assert_eq!(state.surface_size(), Some((800, 600)));
        assert!(state.find_annotation(id).is_some());
        assert_eq!(state.load_error, None);

        let mut empty = EditorState::new(UserSettings::default());
        assert!(empty.set_load_error("not an image".into()));
        assert_eq!(empty.load_error.as_deref(), Some("not an image"));
    }

    #[test]
    fn export_without_image_is_refused() {
        let mut state = EditorState::new(UserSettings::default());
        assert!(matches!(
            state.export(&mut FontBook::empty(), ExportFormat::Png, 1.0),
            Err(TextMarkError::NoImage)
        ));
    }

    #[test]
    fn restore_restamps_ids_into_the_new_generation() {
        let mut state = loaded(800, 600);
        state.add_annotation(Some("one".into())).expect("add");
        state.add_annotation(Some("two".into())).expect("add");
        let saved = state.annotations.clone();

        state.restore(source(800, 600), saved.clone(), 3);
        assert_eq!(state.annotations.len(), 2);
        for (restored, original) in state.annotations.iter().zip(&saved) {
            assert_eq!(restored.id.generation, state.generation());
            assert_eq!(restored.content(), original.content());
            assert_eq!(restored.anchor(), original.anchor());
        }
        let next = state.add_annotation(None).expect("add");
        assert_eq!(next.seq, 3);
    }
}
