use std::path::PathBuf;

use thiserror::Error;

use crate::annotation::AnnotationId;

pub type TextMarkResult<T> = Result<T, TextMarkError>;

/// Failures of a single editor action. None of them end the session.
#[derive(Debug, Error)]
pub enum TextMarkError {
    #[error("no image is loaded")]
    NoImage,

    #[error("{} is {size} bytes, above the {limit} byte soft limit", path.display())]
    OversizedFile {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    #[error("cannot decode image: {0}")]
    Decode(String),

    #[error("cannot render surface: {0}")]
    Render(String),

    #[error("cannot encode {format} output: {reason}")]
    Encode {
        format: &'static str,
        reason: String,
    },

    #[error("annotation {0} does not exist in this session")]
    UnknownAnnotation(AnnotationId),

    #[error("session record: {0}")]
    Persistence(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for TextMarkError {
    fn from(err: serde_json::Error) -> Self {
        TextMarkError::Persistence(err.to_string())
    }
}
