mod action_bar;
mod annotation;
mod app;
mod canvas;
mod drag;
mod error;
mod flatten;
mod fonts;
mod layout;
mod loader;
mod persist;
mod settings;
mod state;
mod theme;
mod toolbar;
mod ui_controls;

use eframe::egui;
use tracing_subscriber::prelude::*;

/// Stdout always; debug builds also append to `logs/textmark.log`.
fn setup_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,textmark=debug"));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true);

    let (file_layer, guard) = if cfg!(debug_assertions) {
        match file_writer() {
            Some((writer, guard)) => (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true),
                ),
                Some(guard),
            ),
            None => (None, None),
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    guard
}

fn file_writer() -> Option<(
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
)> {
    use std::io::Write;

    let logs_dir = std::path::Path::new("logs");
    if std::fs::create_dir_all(logs_dir).is_err() {
        eprintln!("Failed to create logs directory");
        return None;
    }

    if let Ok(mut file) = std::fs::OpenOptions::new()
        .append(true)
        .open(logs_dir.join("textmark.log"))
    {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let _ = writeln!(file, "\n=== session started {timestamp} ===\n");
    }

    let appender = tracing_appender::rolling::never(logs_dir, "textmark.log");
    Some(tracing_appender::non_blocking(appender))
}

fn main() -> eframe::Result<()> {
    let _log_guard = setup_logging();

    let viewport = egui::ViewportBuilder::default()
        .with_title("TextMark")
        .with_inner_size([1280.0, 820.0])
        .with_min_inner_size([720.0, 480.0])
        .with_drag_and_drop(true);

    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    eframe::run_native(
        "TextMark",
        options,
        Box::new(|cc| Box::new(app::TextMarkApp::new(cc))),
    )
}
