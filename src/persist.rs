use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::annotation::TextAnnotation;
use crate::error::{TextMarkError, TextMarkResult};
use crate::loader::{self, SourceImage};
use crate::state::EditorState;

pub const SESSION_KEY: &str = "textmark.session";
const RECORD_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BackgroundRecord {
    pub file: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub original_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub version: u32,
    pub saved_at: String,
    pub background: BackgroundRecord,
    pub annotations: Vec<TextAnnotation>,
    pub next_seq: u32,
}

pub struct RestoredSession {
    pub source: SourceImage,
    pub annotations: Vec<TextAnnotation>,
    pub next_seq: u32,
}

/// One saved session under a fixed key: a JSON record next to a copy of the background bytes.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store in the per-user data directory.
    pub fn in_data_dir() -> Option<Self> {
        let dirs = ProjectDirs::from("com", "textmark", "textmark")?;
        Some(Self::new(dirs.data_dir()))
    }

    fn record_path(&self) -> PathBuf {
        self.dir.join(format!("{SESSION_KEY}.json"))
    }

    fn background_path(&self) -> PathBuf {
        self.dir.join(format!("{SESSION_KEY}.background"))
    }

    pub fn exists(&self) -> bool {
        self.record_path().is_file()
    }

    pub fn save(&self, state: &EditorState) -> TextMarkResult<()> {
        let image = state.image.as_ref().ok_or(TextMarkError::NoImage)?;
        fs::create_dir_all(&self.dir)?;

        let background_path = self.background_path();
        write_atomically(&background_path, &image.source.bytes)?;

        let record = SessionRecord {
            version: RECORD_VERSION,
            saved_at: chrono::Utc::now().to_rfc3339(),
            background: BackgroundRecord {
                file: format!("{SESSION_KEY}.background"),
                width: image.width(),
                height: image.height(),
                original_name: image.source.file_name(),
            },
            annotations: state.annotations.clone(),
            next_seq: state.next_seq(),
        };
        let json = serde_json::to_vec_pretty(&record)?;
        write_atomically(&self.record_path(), &json)?;

        info!(
            annotations = record.annotations.len(),
            dir = %self.dir.display(),
            "session saved"
        );
        Ok(())
    }

    pub fn load(&self) -> TextMarkResult<RestoredSession> {
        let raw = fs::read(self.record_path())?;
        let record: SessionRecord = serde_json::from_slice(&raw)?;
        if record.version != RECORD_VERSION {
            return Err(TextMarkError::Persistence(format!(
                "unsupported record version {}",
                record.version
            )));
        }

        let bytes = fs::read(self.dir.join(&record.background.file))?;
        let mut source = loader::decode_bytes(bytes, None)?;
        if (source.width(), source.height()) != (record.background.width, record.background.height) {
            return Err(TextMarkError::Persistence(format!(
                "background is {}x{} but the record expects {}x{}",
                source.width(),
                source.height(),
                record.background.width,
                record.background.height
            )));
        }
        source.path = record.background.original_name.map(PathBuf::from);

        let annotations = record
            .annotations
            .into_iter()
            .map(|mut annotation| {
                let style = annotation.style().clone().sanitized();
                annotation.set_style(style);
                annotation.set_anchor(annotation.anchor());
                annotation
            })
            .collect::<Vec<_>>();
        debug!(annotations = annotations.len(), saved_at = %record.saved_at, "session loaded");

        Ok(RestoredSession {
            source,
            annotations,
            next_seq: record.next_seq,
        })
    }

    pub fn discard(&self) -> TextMarkResult<()> {
        for path in [self.record_path(), self.background_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), "cannot remove session file: {err}");
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> TextMarkResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
