use egui::{
    vec2, Align2, Color32, Context, CursorIcon, FontId, Painter, Pos2, Rect, Response, ScrollArea,
    Sense, Stroke, Ui,
};
use tracing::warn;

use crate::drag::DisplayMapping;
use crate::fonts::FontBook;
use crate::state::EditorState;
use crate::theme::{self, AppTheme};

const CANVAS_MARGIN: f32 = 48.0;

pub fn show_canvas(
    ui: &mut Ui,
    ctx: &Context,
    state: &mut EditorState,
    fonts: Option<&mut FontBook>,
    loading: bool,
) {
    let theme = theme::dark_theme();

    if let Some(message) = state.load_error.clone() {
        message_canvas(ui, &theme, &format!("Could not open image\n{message}"), true);
        return;
    }
    if state.image.is_none() {
        let text = if loading {
            "Loading image…"
        } else {
            "Open an image (Ctrl+O) or drop one here"
        };
        message_canvas(ui, &theme, text, false);
        return;
    }
    let Some(fonts) = fonts else {
        message_canvas(ui, &theme, "Loading fonts…", false);
        ctx.request_repaint();
        return;
    };

    refresh_preview(ctx, state, fonts);

    let Some((texture_id, image_size, surface_width, surface_height)) =
        state.image.as_ref().and_then(|image| {
            image
                .texture
                .as_ref()
                .map(|texture| (texture.id(), image.size_vec2(), image.width(), image.height()))
        })
    else {
        message_canvas(ui, &theme, "Could not render the image", true);
        return;
    };

    let available = ui.available_size();
    if state.fit_zoom_to_view {
        state.set_fit_zoom(image_size, available - vec2(CANVAS_MARGIN, CANVAS_MARGIN));
        state.fit_zoom_to_view = false;
    }

    let scaled = image_size * state.zoom;
    let canvas_size = vec2(
        (scaled.x + CANVAS_MARGIN).max(available.x),
        (scaled.y + CANVAS_MARGIN).max(available.y),
    );

    ScrollArea::both()
        .id_source("textmark_canvas_scroll")
        .show(ui, |ui| {
            let (canvas_rect, response) =
                ui.allocate_exact_size(canvas_size, Sense::click_and_drag());
            let image_rect = Rect::from_center_size(canvas_rect.center(), scaled);
            let mapping = DisplayMapping::new(image_rect, surface_width, surface_height);

            let painter = ui.painter_at(canvas_rect);
            painter.rect_filled(canvas_rect, 0.0, theme.surfaces.canvas_bg);
            draw_checkerboard(&painter, image_rect);
            painter.image(
                texture_id,
                image_rect,
                Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );

            handle_pointer(ctx, state, &response, &mapping);
            draw_selection(&painter, state, &mapping, &theme);

            if let Some(message) = state
                .image
                .as_ref()
                .and_then(|image| image.preview_error.as_deref())
            {
                painter.text(
                    canvas_rect.left_top() + vec2(12.0, 12.0),
                    Align2::LEFT_TOP,
                    format!("Text not drawn: {message}"),
                    FontId::proportional(14.0),
                    theme.surfaces.danger,
                );
            }
        });
}

fn refresh_preview(ctx: &Context, state: &mut EditorState, fonts: &mut FontBook) {
    let revision = state.revision();
    if state
        .image
        .as_ref()
        .map_or(true, |image| image.preview_is_current(revision))
    {
        return;
    }
    let composed = state.compose(fonts);
    let Some(image) = state.image.as_mut() else {
        return;
    };
    match composed {
        Ok(composed) => {
            image.upload_preview(ctx, &composed, revision);
            image.preview_error = None;
        }
        Err(err) => {
            // Keep the session; show the bare background until the next edit.
            warn!("preview render failed: {err}");
            let background = image.source.image.to_rgba8();
            image.upload_preview(ctx, &background, revision);
            image.preview_error = Some(err.to_string());
        }
    }
}

fn message_canvas(ui: &mut Ui, theme: &AppTheme, text: &str, is_error: bool) {
    let (rect, _) = ui.allocate_exact_size(ui.available_size(), Sense::hover());
    let painter = ui.painter_at(rect);
    painter.rect_filled(rect, theme.layout.rounding, theme.surfaces.canvas_bg);
    painter.rect_stroke(
        rect,
        theme.layout.rounding,
        Stroke::new(1.0, theme.surfaces.stroke_soft),
    );
    let color = if is_error {
        theme.surfaces.danger
    } else {
        theme.text.secondary
    };
    painter.text(
        rect.center(),
        Align2::CENTER_CENTER,
        text,
        FontId::proportional(18.0),
        color,
    );
}

/// Shows through wherever the image itself is transparent.
fn draw_checkerboard(painter: &Painter, rect: Rect) {
    let cell = 12.0;
    let light = Color32::from_gray(58);
    let dark = Color32::from_gray(44);
    painter.rect_filled(rect, 0.0, dark);

    let clip = painter.clip_rect().intersect(rect);
    if !clip.is_positive() {
        return;
    }
    let first_col = ((clip.min.x - rect.min.x) / cell).floor().max(0.0) as usize;
    let first_row = ((clip.min.y - rect.min.y) / cell).floor().max(0.0) as usize;
    let cols = ((clip.max.x - rect.min.x) / cell).ceil() as usize;
    let rows = ((clip.max.y - rect.min.y) / cell).ceil() as usize;

    for row in first_row..rows {
        for col in first_col..cols {
            if (row + col) % 2 == 0 {
                continue;
            }
            let min = rect.min + vec2(col as f32 * cell, row as f32 * cell);
            let tile = Rect::from_min_size(min, vec2(cell, cell)).intersect(rect);
            painter.rect_filled(tile, 0.0, light);
        }
    }
}

fn handle_pointer(
    ctx: &Context,
    state: &mut EditorState,
    response: &Response,
    mapping: &DisplayMapping,
) {
    if response.drag_started() {
        let origin = ctx
            .input(|input| input.pointer.press_origin())
            .or_else(|| response.interact_pointer_pos());
        if let Some(origin) = origin {
            state.begin_drag(origin, mapping);
        }
    }

    if response.dragged() && state.drag_state.is_some() {
        if let Some(pointer) = response.interact_pointer_pos() {
            state.update_drag(pointer, mapping);
        }
        ctx.set_cursor_icon(CursorIcon::Grabbing);
    }

    if response.drag_stopped() {
        state.end_drag();
    }

    if response.clicked() {
        if let Some(pointer) = response.interact_pointer_pos() {
            state.begin_drag(pointer, mapping);
            state.end_drag();
        }
    }
}

/// Overlay only; never part of the composed surface.
fn draw_selection(painter: &Painter, state: &EditorState, mapping: &DisplayMapping, theme: &AppTheme) {
    let Some(annotation) = state.selected() else {
        return;
    };
    let bounds = annotation.bounds(mapping.surface_width, mapping.surface_height);
    let rect = mapping.surface_rect_to_display(bounds).expand(4.0);

    painter.rect_stroke(rect, 3.0, Stroke::new(1.5, theme.surfaces.accent));
    for corner in [
        rect.left_top(),
        rect.right_top(),
        rect.left_bottom(),
        rect.right_bottom(),
    ] {
        painter.rect_filled(
            Rect::from_center_size(corner, vec2(7.0, 7.0)),
            2.0,
            theme.surfaces.accent,
        );
    }
}
