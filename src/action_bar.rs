use egui::{vec2, Align, Layout, RichText, Ui};

use crate::flatten::ExportFormat;
use crate::state::EditorState;
use crate::theme::{self, WidthClass};
use crate::ui_controls;

#[derive(Default)]
pub struct ActionBarOutput {
    pub export: bool,
    pub save_session: bool,
    pub restore_session: bool,
}

/// Transient message shown at the left of the action bar.
pub struct Notice {
    pub text: String,
    pub warning: bool,
    pub until: f64,
}

pub fn should_show_shortcut_hint(width_class: WidthClass, available_width: f32) -> bool {
    match width_class {
        WidthClass::Compact => available_width >= 520.0,
        WidthClass::Regular | WidthClass::Wide => true,
    }
}

pub fn show_action_bar(
    ui: &mut Ui,
    state: &mut EditorState,
    session_available: bool,
    notice: Option<&Notice>,
    width_class: WidthClass,
) -> ActionBarOutput {
    let theme = theme::dark_theme();
    let height = theme.layout.control_height;
    let can_export = state.image.is_some() && state.load_error.is_none();
    let shortcut_visible = should_show_shortcut_hint(width_class, ui.available_width());
    let mut out = ActionBarOutput::default();

    ui.horizontal(|ui| {
        ui.spacing_mut().item_spacing = vec2(theme.layout.space_2, 0.0);

        if let Some(notice) = notice {
            let color = if notice.warning {
                theme.surfaces.warning
            } else {
                theme.surfaces.accent
            };
            ui_controls::notice_badge(ui, &theme, &notice.text, color);
        } else if let Some((width, height)) = state.surface_size() {
            ui_controls::caption(ui, &theme, &format!("{width} × {height}px"));
        }

        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
            let export = ui.add_enabled_ui(can_export, |ui| {
                ui_controls::primary_button(ui, &theme, "Export", vec2(96.0, height))
            });
            let mut export = export.inner;
            if !shortcut_visible {
                export = export.on_hover_text("Ctrl+S");
            }
            out.export = export.clicked();

            if shortcut_visible {
                ui.label(RichText::new("Ctrl+S").size(11.0).color(theme.text.muted));
            }

            if state.settings.export_format == ExportFormat::Jpeg {
                let mut quality = state.settings.jpeg_quality;
                ui.spacing_mut().slider_width = 90.0;
                if ui
                    .add(
                        egui::Slider::new(&mut quality, 0.0..=1.0)
                            .custom_formatter(|value, _| format!("{:.0}%", value * 100.0)),
                    )
                    .changed()
                {
                    state.settings.jpeg_quality = quality;
                }
                ui_controls::caption(ui, &theme, "Quality");
            }

            for format in [ExportFormat::Jpeg, ExportFormat::Png] {
                if ui_controls::segmented(
                    ui,
                    &theme,
                    format.label(),
                    state.settings.export_format == format,
                )
                .clicked()
                {
                    state.settings.export_format = format;
                }
            }

            ui.separator();

            let restore = ui.add_enabled_ui(session_available, |ui| {
                ui_controls::ghost_button(ui, &theme, "Restore session", vec2(120.0, height))
            });
            out.restore_session = restore.inner.clicked();

            let save = ui.add_enabled_ui(state.image.is_some(), |ui| {
                ui_controls::ghost_button(ui, &theme, "Save session", vec2(108.0, height))
            });
            out.save_session = save.inner.clicked();
        });
    });

    out
}

#[cfg(test)]
mod tests {
    use super::should_show_shortcut_hint;
    use crate::theme::WidthClass;

    #[test]
    fn compact_bar_hides_shortcut_hint_first() {
        assert!(!should_show_shortcut_hint(WidthClass::Compact, 400.0));
        assert!(should_show_shortcut_hint(WidthClass::Compact, 600.0));
        assert!(should_show_shortcut_hint(WidthClass::Wide, 200.0));
    }
}
