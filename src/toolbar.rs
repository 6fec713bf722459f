use egui::{vec2, Align, ComboBox, Layout, RichText, Ui};

use crate::annotation::{FontSize, FontWeight, Orientation, TextStyle};
use crate::state::EditorState;
use crate::theme::{self, AppTheme, WidthClass};
use crate::ui_controls;

const PALETTE: [[u8; 4]; 8] = [
    [0xFF, 0xFF, 0xFF, 0xFF],
    [0x11, 0x12, 0x16, 0xFF],
    [0xE5, 0x3E, 0x3E, 0xFF],
    [0xF2, 0x9A, 0x2E, 0xFF],
    [0xF5, 0xD3, 0x3D, 0xFF],
    [0x38, 0xA1, 0x69, 0xFF],
    [0x31, 0x82, 0xCE, 0xFF],
    [0x80, 0x5A, 0xD5, 0xFF],
];

const SIZE_PRESETS: [u16; 12] = [12, 16, 20, 24, 32, 40, 48, 64, 80, 96, 128, 192];

#[derive(Default)]
pub struct ToolbarOutput {
    pub open: bool,
    pub add_text: bool,
    pub delete: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct ToolbarPlan {
    pub visible_color_count: usize,
    pub show_spacing_inline: bool,
    pub show_effects_inline: bool,
    pub show_overflow: bool,
}

pub fn plan_toolbar_items(width_class: WidthClass) -> ToolbarPlan {
    let visible_color_count = match width_class {
        WidthClass::Compact => 3,
        WidthClass::Regular => 5,
        WidthClass::Wide => PALETTE.len(),
    };
    let show_spacing_inline = width_class == WidthClass::Wide;
    let show_effects_inline = width_class != WidthClass::Compact;

    ToolbarPlan {
        visible_color_count,
        show_spacing_inline,
        show_effects_inline,
        show_overflow: visible_color_count < PALETTE.len()
            || !show_spacing_inline
            || !show_effects_inline,
    }
}

pub fn show_toolbar(
    ui: &mut Ui,
    state: &mut EditorState,
    families: &[String],
    width_class: WidthClass,
) -> ToolbarOutput {
    let theme = theme::dark_theme();
    let plan = plan_toolbar_items(width_class);
    let has_image = state.image.is_some();
    let mut out = ToolbarOutput::default();

    ui.with_layout(Layout::left_to_right(Align::Center), |ui| {
        ui.spacing_mut().item_spacing = vec2(theme.layout.space_2, 0.0);

        if ui_controls::ghost_button(ui, &theme, "Open…", vec2(64.0, 28.0))
            .on_hover_text("Open an image (Ctrl+O)")
            .clicked()
        {
            out.open = true;
        }
        let add = ui.add_enabled_ui(has_image, |ui| {
            ui_controls::primary_button(ui, &theme, "Add text", vec2(80.0, 28.0))
        });
        out.add_text = add.inner.clicked();
        let delete = ui.add_enabled_ui(state.selection.is_some(), |ui| {
            ui_controls::ghost_button(ui, &theme, "Delete", vec2(60.0, 28.0))
        });
        out.delete = delete.inner.on_hover_text("Delete selected text (Del)").clicked();

        ui.separator();
        orientation_group(ui, state, &theme);
        weight_group(ui, state, &theme);
        family_combo(ui, state, families);
        size_combo(ui, state);

        ui.separator();
        palette_group(ui, state, &theme, plan.visible_color_count);
        opacity_slider(ui, state, &theme);

        if plan.show_spacing_inline {
            ui.separator();
            spacing_sliders(ui, state, &theme);
        }
        if plan.show_effects_inline {
            ui.separator();
            effect_toggles(ui, state, &theme);
        }

        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
            if !plan.show_overflow {
                return;
            }
            ui.menu_button("…", |ui| {
                ui.spacing_mut().item_spacing = vec2(theme.layout.space_2, theme.layout.space_2);
                if plan.visible_color_count < PALETTE.len() {
                    ui_controls::caption(ui, &theme, "Colors");
                    ui.horizontal_wrapped(|ui| {
                        palette_range(ui, state, &theme, plan.visible_color_count, PALETTE.len());
                    });
                }
                if !plan.show_spacing_inline {
                    ui.separator();
                    ui.horizontal(|ui| spacing_sliders(ui, state, &theme));
                }
                if !plan.show_effects_inline {
                    ui.separator();
                    ui.horizontal(|ui| effect_toggles(ui, state, &theme));
                }
            });
        });
    });

    out
}

fn orientation_group(ui: &mut Ui, state: &mut EditorState, theme: &AppTheme) {
    let current = state.active_style.orientation;
    for (orientation, label, hint) in [
        (Orientation::Horizontal, "A→", "Horizontal text"),
        (Orientation::Vertical, "A↓", "Vertical text"),
    ] {
        if ui_controls::segmented(ui, theme, label, current == orientation)
            .on_hover_text(hint)
            .clicked()
        {
            state.edit_style(|style| style.orientation = orientation);
        }
    }
}

fn weight_group(ui: &mut Ui, state: &mut EditorState, theme: &AppTheme) {
    let bold = state.active_style.weight == FontWeight::Bold;
    if ui_controls::segmented(ui, theme, "B", bold)
        .on_hover_text("Bold")
        .clicked()
    {
        state.edit_style(|style| {
            style.weight = if bold {
                FontWeight::Normal
            } else {
                FontWeight::Bold
            };
        });
    }
}

fn family_combo(ui: &mut Ui, state: &mut EditorState, families: &[String]) {
    let mut family = state.active_style.family.clone();
    ComboBox::from_id_source("textmark_font_family")
        .selected_text(RichText::new(&family).size(13.0))
        .width(140.0)
        .show_ui(ui, |ui| {
            if families.is_empty() {
                ui.label("Loading fonts…");
            }
            for name in families {
                ui.selectable_value(&mut family, name.clone(), name);
            }
        });
    if family != state.active_style.family {
        state.edit_style(|style| style.family = family);
    }
}

fn size_combo(ui: &mut Ui, state: &mut EditorState) {
    let mut px = state.active_style.size.as_u16();
    ComboBox::from_id_source("textmark_font_size")
        .selected_text(format!("{px}px"))
        .width(72.0)
        .show_ui(ui, |ui| {
            for size in SIZE_PRESETS {
                ui.selectable_value(&mut px, size, format!("{size}px"));
            }
        });
    ui.add(
        egui::DragValue::new(&mut px)
            .clamp_range(FontSize::MIN..=FontSize::MAX)
            .speed(1.0),
    );
    if px != state.active_style.size.as_u16() {
        state.edit_style(|style| style.size = FontSize::from_px(px));
    }
}

fn palette_group(ui: &mut Ui, state: &mut EditorState, theme: &AppTheme, count: usize) {
    palette_range(ui, state, theme, 0, count);

    let mut color = ui_controls::rgba_to_color32(state.active_style.color);
    if ui
        .color_edit_button_srgba(&mut color)
        .on_hover_text("Custom color")
        .changed()
    {
        state.edit_style(|style| style.color = ui_controls::color32_to_rgba(color));
    }
}

fn palette_range(ui: &mut Ui, state: &mut EditorState, theme: &AppTheme, from: usize, to: usize) {
    for rgba in PALETTE.iter().take(to).skip(from) {
        let selected = state.active_style.color == *rgba;
        if ui_controls::color_chip(ui, theme, ui_controls::rgba_to_color32(*rgba), selected)
            .on_hover_text("Text color")
            .clicked()
        {
            state.edit_style(|style| style.color = *rgba);
        }
    }
}

fn opacity_slider(ui: &mut Ui, state: &mut EditorState, theme: &AppTheme) {
    let mut opacity = state.active_style.opacity;
    if ui_controls::labeled_slider(ui, theme, "Opacity", &mut opacity, 0.0..=1.0, 70.0) {
        state.edit_style(|style| style.opacity = opacity);
    }
}

fn spacing_sliders(ui: &mut Ui, state: &mut EditorState, theme: &AppTheme) {
    let mut char_spacing = state.active_style.char_spacing;
    if ui_controls::labeled_slider(
        ui,
        theme,
        "Letter",
        &mut char_spacing,
        0.0..=TextStyle::CHAR_SPACING_MAX,
        60.0,
    ) {
        state.edit_style(|style| style.char_spacing = char_spacing);
    }

    let mut line_spacing = state.active_style.line_spacing;
    if ui_controls::labeled_slider(
        ui,
        theme,
        "Line",
        &mut line_spacing,
        TextStyle::LINE_SPACING_MIN..=TextStyle::LINE_SPACING_MAX,
        60.0,
    ) {
        state.edit_style(|style| style.line_spacing = line_spacing);
    }
}

fn effect_toggles(ui: &mut Ui, state: &mut EditorState, theme: &AppTheme) {
    let outline = state.active_style.outline;
    if ui_controls::segmented(ui, theme, "Stroke", outline.enabled)
        .on_hover_text("Outline around the glyphs")
        .clicked()
    {
        state.edit_style(|style| style.outline.enabled = !outline.enabled);
    }
    if outline.enabled {
        let mut color = ui_controls::rgba_to_color32(outline.color);
        if ui.color_edit_button_srgba(&mut color).changed() {
            state.edit_style(|style| style.outline.color = ui_controls::color32_to_rgba(color));
        }
        let mut width = outline.width;
        if ui
            .add(egui::DragValue::new(&mut width).clamp_range(1..=12).suffix("px"))
            .changed()
        {
            state.edit_style(|style| style.outline.width = width);
        }
    }

    let shadow = state.active_style.shadow;
    if ui_controls::segmented(ui, theme, "Shadow", shadow).clicked() {
        state.edit_style(|style| style.shadow = !shadow);
    }
}
