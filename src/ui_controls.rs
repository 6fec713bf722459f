use std::ops::RangeInclusive;

use egui::{vec2, Color32, Frame, Margin, RichText, Rounding, Stroke, Ui, Vec2};

use crate::theme::AppTheme;

pub fn bar_frame(theme: &AppTheme) -> Frame {
    Frame::none()
        .fill(theme.surfaces.panel_bg)
        .inner_margin(Margin::symmetric(
            theme.layout.panel_padding_x,
            theme.layout.panel_padding_y,
        ))
}

pub fn side_panel_frame(theme: &AppTheme) -> Frame {
    Frame::none()
        .fill(theme.surfaces.panel_bg)
        .stroke(Stroke::new(1.0, theme.surfaces.stroke_soft))
        .inner_margin(Margin::same(theme.layout.space_3))
}

pub fn segmented(ui: &mut Ui, theme: &AppTheme, label: &str, selected: bool) -> egui::Response {
    let fill = if selected {
        theme.surfaces.accent_soft
    } else {
        theme.surfaces.card_bg
    };
    let stroke = if selected {
        Stroke::new(1.0, theme.surfaces.accent)
    } else {
        Stroke::new(1.0, theme.surfaces.stroke_soft)
    };
    ui.add(
        egui::Button::new(RichText::new(label).size(13.0))
            .min_size(vec2(36.0, theme.layout.control_height))
            .fill(fill)
            .stroke(stroke)
            .rounding(Rounding::same(theme.layout.rounding)),
    )
}

pub fn color_chip(ui: &mut Ui, theme: &AppTheme, color: Color32, selected: bool) -> egui::Response {
    let stroke = if selected {
        Stroke::new(2.0, theme.surfaces.accent)
    } else {
        Stroke::new(1.0, theme.surfaces.stroke_strong)
    };
    ui.add(
        egui::Button::new("")
            .min_size(vec2(20.0, 20.0))
            .fill(color)
            .stroke(stroke)
            .rounding(Rounding::same(10.0)),
    )
}

pub fn primary_button(ui: &mut Ui, theme: &AppTheme, label: &str, min_size: Vec2) -> egui::Response {
    ui.add(
        egui::Button::new(RichText::new(label).strong().color(theme.text.primary))
            .min_size(min_size)
            .fill(theme.surfaces.accent_soft)
            .stroke(Stroke::new(1.0, theme.surfaces.accent))
            .rounding(Rounding::same(theme.layout.rounding)),
    )
}

pub fn ghost_button(ui: &mut Ui, theme: &AppTheme, label: &str, min_size: Vec2) -> egui::Response {
    ui.add(
        egui::Button::new(RichText::new(label).color(theme.text.secondary))
            .min_size(min_size)
            .fill(theme.surfaces.card_bg)
            .stroke(Stroke::new(1.0, theme.surfaces.stroke_soft))
            .rounding(Rounding::same(theme.layout.rounding)),
    )
}

pub fn caption(ui: &mut Ui, theme: &AppTheme, text: &str) {
    ui.label(RichText::new(text).size(12.0).color(theme.text.muted));
}

/// Caption plus slider. Returns true when the value moved this frame.
pub fn labeled_slider(
    ui: &mut Ui,
    theme: &AppTheme,
    label: &str,
    value: &mut f32,
    range: RangeInclusive<f32>,
    width: f32,
) -> bool {
    caption(ui, theme, label);
    ui.spacing_mut().slider_width = width;
    ui.add(egui::Slider::new(value, range).show_value(false))
        .changed()
}

pub fn notice_badge(ui: &mut Ui, theme: &AppTheme, text: &str, color: Color32) {
    Frame::none()
        .fill(Color32::from_rgba_unmultiplied(color.r(), color.g(), color.b(), 36))
        .stroke(Stroke::new(1.0, color))
        .rounding(Rounding::same(10.0))
        .inner_margin(Margin::symmetric(8.0, 3.0))
        .show(ui, |ui| {
            ui.label(RichText::new(text).size(12.0).strong().color(theme.text.primary));
        });
}

pub fn rgba_to_color32(rgba: [u8; 4]) -> Color32 {
    Color32::from_rgba_unmultiplied(rgba[0], rgba[1], rgba[2], rgba[3])
}

pub fn color32_to_rgba(color: Color32) -> [u8; 4] {
    color.to_srgba_unmultiplied()
}
