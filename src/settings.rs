use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::annotation::TextStyle;
use crate::flatten::ExportFormat;

pub const OUTPUT_DIR_ENV: &str = "TEXTMARK_OUTPUT_DIR";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserSettings {
    pub last_style: TextStyle,
    pub default_text: String,
    pub export_format: ExportFormat,
    pub jpeg_quality: f32,
    pub file_label: String,
    pub output_dir: Option<PathBuf>,
    pub ask_for_location: bool,
    pub keep_text_on_new_image: bool,
    pub font_dirs: Vec<PathBuf>,
    pub large_file_warning_bytes: u64,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            last_style: TextStyle::default(),
            default_text: "Your text here".to_string(),
            export_format: ExportFormat::Png,
            jpeg_quality: 0.9,
            file_label: "textmark".to_string(),
            output_dir: None,
            ask_for_location: false,
            keep_text_on_new_image: true,
            font_dirs: Vec::new(),
            large_file_warning_bytes: 5 * 1024 * 1024,
        }
    }
}

impl UserSettings {
    fn file_path() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("com", "textmark", "textmark")?;
        let config_dir = dirs.config_dir();
        std::fs::create_dir_all(config_dir).ok()?;
        Some(config_dir.join("settings.json"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::file_path().context("cannot resolve settings path")?;
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let mut settings: Self = serde_json::from_str(&raw)
            .with_context(|| format!("cannot parse {}", path.display()))?;
        settings.last_style = settings.last_style.sanitized();
        settings.jpeg_quality = settings.jpeg_quality.clamp(0.0, 1.0);
        Ok(settings)
    }

    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(settings) => settings,
            Err(err) => {
                warn!("using default settings: {err:#}");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::file_path().context("cannot resolve settings path")?;
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// `TEXTMARK_OUTPUT_DIR`, then the configured directory, then Downloads, then the working directory.
    pub fn resolve_output_dir(&self) -> PathBuf {
        if let Some(dir) = std::env::var_os(OUTPUT_DIR_ENV) {
            let dir = PathBuf::from(dir);
            if dir.is_dir() {
                return dir;
            }
            warn!(dir = %dir.display(), "{OUTPUT_DIR_ENV} is not a directory, ignoring");
        }
        if let Some(dir) = self.output_dir.as_ref().filter(|dir| dir.is_dir()) {
            return dir.clone();
        }
        UserDirs::new()
            .and_then(|dirs| dirs.download_dir().map(|dir| dir.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::UserSettings;
    use crate::annotation::Orientation;
    use crate::flatten::ExportFormat;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: UserSettings =
            serde_json::from_str(r#"{ "export_format": "Jpeg", "jpeg_quality": 0.7 }"#)
                .expect("partial settings");
        assert_eq!(settings.export_format, ExportFormat::Jpeg);
        assert_eq!(settings.jpeg_quality, 0.7);
        assert_eq!(settings.file_label, "textmark");
        assert_eq!(settings.large_file_warning_bytes, 5 * 1024 * 1024);
        assert_eq!(settings.last_style.orientation, Orientation::Horizontal);
    }

    #[test]
    fn configured_output_dir_is_used_when_it_exists() {
        let dir = tempfile::tempdir().expect("temp dir");
        let settings = UserSettings {
            output_dir: Some(dir.path().to_path_buf()),
            ..UserSettings::default()
        };
        if std::env::var_os(super::OUTPUT_DIR_ENV).is_none() {
            assert_eq!(settings.resolve_output_dir(), dir.path());
        }
    }
}
