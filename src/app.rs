use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use eframe::egui::{self, Context as EguiContext, Key, RichText, TopBottomPanel};
use eframe::{App, Frame};
use rfd::{MessageButtons, MessageDialog, MessageLevel};
use tracing::{debug, info, warn};

use crate::action_bar::{self, Notice};
use crate::annotation::AnnotationId;
use crate::canvas;
use crate::error::TextMarkError;
use crate::fonts::FontGate;
use crate::loader::{ImageLoader, LoaderEvent};
use crate::persist::SessionStore;
use crate::settings::UserSettings;
use crate::state::EditorState;
use crate::theme;
use crate::toolbar;
use crate::ui_controls;

const NOTICE_SECONDS: f64 = 4.0;

pub struct TextMarkApp {
    pub state: EditorState,
    fonts: FontGate,
    loader: ImageLoader,
    sessions: Option<SessionStore>,
    session_available: bool,
    theme: theme::AppTheme,
    notice: Option<Notice>,
    text_buffer: String,
    buffer_for: Option<AnnotationId>,
    families: Vec<String>,
}

impl TextMarkApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let theme = theme::dark_theme();
        theme::apply_theme(&cc.egui_ctx, &theme);

        let settings = UserSettings::load_or_default();
        let fonts = FontGate::spawn(settings.font_dirs.clone());
        let loader = ImageLoader::new(settings.large_file_warning_bytes);
        let sessions = SessionStore::in_data_dir();
        let session_available = sessions.as_ref().is_some_and(SessionStore::exists);

        Self {
            state: EditorState::new(settings),
            fonts,
            loader,
            sessions,
            session_available,
            theme,
            notice: None,
            text_buffer: String::new(),
            buffer_for: None,
            families: Vec::new(),
        }
    }

    fn notify(&mut self, ctx: &EguiContext, text: impl Into<String>, warning: bool) {
        self.notice = Some(Notice {
            text: text.into(),
            warning,
            until: ctx.input(|input| input.time) + NOTICE_SECONDS,
        });
    }

    fn open_dialog(&mut self, ctx: &EguiContext) {
        let picked = rfd::FileDialog::new()
            .set_title("Open image")
            .add_filter("Images", &["png", "jpg", "jpeg"])
            .pick_file();
        // Cancelled dialog: nothing to do.
        if let Some(path) = picked {
            self.open_path(ctx, path);
        }
    }

    fn open_path(&mut self, ctx: &EguiContext, path: PathBuf) {
        let ticket = self.loader.open(path);
        debug!(token = ticket.token, "image requested");
        if let Some(warning) = ticket.warning {
            self.notify(ctx, format!("Large file, loading may be slow ({warning})"), true);
        }
    }

    fn poll_loader(&mut self, ctx: &EguiContext) {
        let Some(event) = self.loader.poll() else {
            return;
        };
        match event {
            LoaderEvent::Loaded(source) => {
                let keep_text =
                    self.state.settings.keep_text_on_new_image && !self.state.annotations.is_empty();
                if keep_text {
                    self.state.replace_background(source);
                } else {
                    self.state.reset(source);
                    if let Err(err) = self.state.add_annotation(None) {
                        warn!("cannot place default text: {err}");
                    }
                }
                debug!(generation = self.state.generation(), "image ready");
            }
            LoaderEvent::Failed { path, error } => {
                warn!(path = %path.display(), "image load failed: {error}");
                if !self.state.set_load_error(error.to_string()) {
                    show_alert(
                        "Could not open image",
                        &format!("{}: {error}", path.display()),
                    );
                }
            }
        }
    }

    fn handle_dropped_files(&mut self, ctx: &EguiContext) {
        let dropped = ctx.input(|input| {
            input
                .raw
                .dropped_files
                .iter()
                .find_map(|file| file.path.clone())
        });
        if let Some(path) = dropped {
            self.open_path(ctx, path);
        }
    }

    fn handle_shortcuts(&mut self, ctx: &EguiContext) {
        let cmd = ctx.input(|input| input.modifiers.command || input.modifiers.ctrl);

        if cmd {
            if ctx.input(|input| input.key_pressed(Key::O)) {
                self.open_dialog(ctx);
            }
            if ctx.input(|input| input.key_pressed(Key::S)) {
                self.run_export(ctx);
            }
            if ctx.input(|input| input.key_pressed(Key::Plus) || input.key_pressed(Key::Equals)) {
                self.state.zoom_in();
            }
            if ctx.input(|input| input.key_pressed(Key::Minus)) {
                self.state.zoom_out();
            }
            if ctx.input(|input| input.key_pressed(Key::Num0)) {
                self.state.fit_zoom_to_view = true;
            }
            if ctx.input(|input| input.key_pressed(Key::W)) {
                self.state.clear();
            }
            return;
        }

        // Typing in the text editor owns the keyboard.
        if ctx.wants_keyboard_input() {
            return;
        }

        if ctx.input(|input| input.key_pressed(Key::Escape)) {
            self.state.select(None);
        }
        if ctx.input(|input| input.key_pressed(Key::Delete) || input.key_pressed(Key::Backspace)) {
            self.state.delete_selected();
        }

        let step = if ctx.input(|input| input.modifiers.shift) {
            10.0
        } else {
            1.0
        };
        let nudge = ctx.input(|input| {
            let mut delta = egui::Vec2::ZERO;
            if input.key_pressed(Key::ArrowLeft) {
                delta.x -= step;
            }
            if input.key_pressed(Key::ArrowRight) {
                delta.x += step;
            }
            if input.key_pressed(Key::ArrowUp) {
                delta.y -= step;
            }
            if input.key_pressed(Key::ArrowDown) {
                delta.y += step;
            }
            delta
        });
        if nudge != egui::Vec2::ZERO {
            self.state.nudge_selected(nudge);
        }
    }

    fn run_export(&mut self, ctx: &EguiContext) {
        match self.export() {
            Ok(Some(path)) => self.notify(ctx, format!("Saved {}", path.display()), false),
            Ok(None) => {}
            Err(err) => {
                warn!("export failed: {err:#}");
                show_alert("Export failed", &format!("{err:#}"));
            }
        }
    }

    fn export(&mut self) -> Result<Option<PathBuf>> {
        if self.state.image.is_none() {
            show_alert("Nothing to export", "Open an image first.");
            return Ok(None);
        }
        let Some(fonts) = self.fonts.poll() else {
            show_alert("Fonts are loading", "Try again in a moment.");
            return Ok(None);
        };
        let format = self.state.settings.export_format;
        let quality = self.state.settings.jpeg_quality;

        let bytes = match self.state.export(fonts, format, quality) {
            Ok(bytes) => bytes,
            Err(TextMarkError::NoImage) => {
                show_alert("Nothing to export", "Open an image first.");
                return Ok(None);
            }
            Err(err) => return Err(err).context("cannot render the image"),
        };

        let file_name = format.file_name(
            &self.state.settings.file_label,
            chrono::Utc::now().timestamp_millis(),
        );

        let path = if self.state.settings.ask_for_location {
            let picked = rfd::FileDialog::new()
                .set_title("Export image")
                .set_directory(self.state.settings.resolve_output_dir())
                .set_file_name(&file_name)
                .add_filter(format.label(), &[format.extension()])
                .save_file();
            let Some(path) = picked else {
                return Ok(None);
            };
            path
        } else {
            self.state.settings.resolve_output_dir().join(&file_name)
        };

        match std::fs::write(&path, &bytes) {
            Ok(()) => {
                info!(path = %path.display(), "export written");
                Ok(Some(path))
            }
            Err(err) => {
                warn!(path = %path.display(), "cannot write export, opening a temporary copy: {err}");
                open_temporary_copy(&file_name, &bytes)?;
                show_alert(
                    "Export not saved",
                    &format!(
                        "Could not write {} ({err}). A copy was opened in your image viewer so you can save it manually.",
                        path.display()
                    ),
                );
                Ok(None)
            }
        }
    }

    fn save_session(&mut self, ctx: &EguiContext) {
        let Some(store) = self.sessions.as_ref() else {
            show_alert("Session", "No data directory is available on this system.");
            return;
        };
        match store.save(&self.state) {
            Ok(()) => {
                self.session_available = true;
                self.notify(ctx, "Session saved", false);
            }
            Err(err) => {
                warn!("session save failed: {err}");
                show_alert("Could not save session", &err.to_string());
            }
        }
    }

    fn restore_session(&mut self, ctx: &EguiContext) {
        let Some(store) = self.sessions.as_ref() else {
            return;
        };
        match store.load() {
            Ok(restored) => {
                self.state
                    .restore(restored.source, restored.annotations, restored.next_seq);
                self.notify(ctx, "Session restored", false);
            }
            Err(err) => {
                warn!("session restore failed: {err}");
                if matches!(err, TextMarkError::Persistence(_)) {
                    if let Err(discard_err) = store.discard() {
                        warn!("cannot discard broken session: {discard_err}");
                    }
                    self.session_available = false;
                }
                show_alert("Could not restore session", &err.to_string());
            }
        }
    }

    fn sync_text_buffer(&mut self) {
        if self.buffer_for == self.state.selection {
            return;
        }
        self.buffer_for = self.state.selection;
        self.text_buffer = self
            .state
            .selected()
            .map(|annotation| annotation.content().to_string())
            .unwrap_or_default();
    }

    fn show_text_panel(&mut self, ctx: &EguiContext) {
        self.sync_text_buffer();
        let theme = &self.theme;
        let state = &mut self.state;
        let buffer = &mut self.text_buffer;

        egui::SidePanel::right("text_panel")
            .exact_width(theme.layout.side_panel_width)
            .resizable(false)
            .frame(ui_controls::side_panel_frame(theme))
            .show(ctx, |ui| {
                ui.label(RichText::new("Text").strong());
                ui.add_space(theme.layout.space_1);

                if state.selection.is_some() {
                    let response = ui.add(
                        egui::TextEdit::multiline(buffer)
                            .desired_rows(6)
                            .desired_width(f32::INFINITY),
                    );
                    if response.changed() {
                        state.set_selected_content(buffer);
                    }
                    ui_controls::caption(ui, theme, "Enter starts a new line or column.");
                } else {
                    ui_controls::caption(ui, theme, "Text for new annotations");
                    ui.add(
                        egui::TextEdit::multiline(&mut state.settings.default_text)
                            .desired_rows(3)
                            .desired_width(f32::INFINITY),
                    );
                    ui.add_space(theme.layout.space_2);
                    ui_controls::caption(ui, theme, "Select text on the image to edit it.");
                }

                ui.add_space(theme.layout.space_3);
                ui.checkbox(
                    &mut state.settings.keep_text_on_new_image,
                    "Keep text when opening a new image",
                );
                ui.checkbox(
                    &mut state.settings.ask_for_location,
                    "Ask where to save exports",
                );
            });
    }
}

fn show_alert(title: &str, message: &str) {
    MessageDialog::new()
        .set_level(MessageLevel::Warning)
        .set_title(title)
        .set_description(message)
        .set_buttons(MessageButtons::Ok)
        .show();
}

fn open_temporary_copy(file_name: &str, bytes: &[u8]) -> Result<()> {
    let path = std::env::temp_dir().join(file_name);
    write_and_open(&path, bytes)
}

fn write_and_open(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes)
        .with_context(|| format!("cannot write fallback copy to {}", path.display()))?;
    open::that(path).with_context(|| format!("cannot open {}", path.display()))?;
    Ok(())
}

impl Drop for TextMarkApp {
    fn drop(&mut self) {
        if let Err(err) = self.state.settings.save() {
            warn!("cannot save settings: {err:#}");
        }
    }
}

impl App for TextMarkApp {
    fn update(&mut self, ctx: &EguiContext, _frame: &mut Frame) {
        self.poll_loader(ctx);
        self.handle_dropped_files(ctx);
        self.handle_shortcuts(ctx);

        if self
            .notice
            .as_ref()
            .is_some_and(|notice| ctx.input(|input| input.time) > notice.until)
        {
            self.notice = None;
        }

        let width_class = self.theme.width_class(ctx.screen_rect().width());
        if self.families.is_empty() {
            if let Some(book) = self.fonts.poll() {
                debug!(faces = book.face_count(), "fonts ready");
                self.families = book.family_names();
            }
        }

        let toolbar_output = TopBottomPanel::top("toolbar")
            .exact_height(self.theme.layout.toolbar_height)
            .frame(ui_controls::bar_frame(&self.theme))
            .show(ctx, |ui| {
                toolbar::show_toolbar(ui, &mut self.state, &self.families, width_class)
            })
            .inner;

        if toolbar_output.open {
            self.open_dialog(ctx);
        }
        if toolbar_output.add_text {
            if let Err(err) = self.state.add_annotation(None) {
                show_alert("Cannot add text", &err.to_string());
            }
        }
        if toolbar_output.delete {
            self.state.delete_selected();
        }

        let action_output = TopBottomPanel::bottom("action_bar")
            .exact_height(self.theme.layout.action_bar_height)
            .frame(ui_controls::bar_frame(&self.theme))
            .show(ctx, |ui| {
                action_bar::show_action_bar(
                    ui,
                    &mut self.state,
                    self.session_available,
                    self.notice.as_ref(),
                    width_class,
                )
            })
            .inner;

        if action_output.export {
            self.run_export(ctx);
        }
        if action_output.save_session {
            self.save_session(ctx);
        }
        if action_output.restore_session {
            self.restore_session(ctx);
        }

        if self.state.image.is_some() {
            self.show_text_panel(ctx);
        }

        let loading = self.loader.is_loading();
        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(self.theme.surfaces.app_bg))
            .show(ctx, |ui| {
                canvas::show_canvas(ui, ctx, &mut self.state, self.fonts.poll(), loading);
            });

        if loading || !self.fonts.is_ready() || self.notice.is_some() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}
