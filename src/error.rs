use std::path::PathBuf;

use crate::cores::{EngineVersion, StyleId, StyleKind};

/// Errors produced by the registry, router, managers and pipelines.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to load core at {}: {reason}", path.display())]
    EngineLoad { path: PathBuf, reason: String },
    #[error("Style {style_id} is advertised by both core {first} and core {second}")]
    StyleIdConflict {
        style_id: StyleId,
        first: EngineVersion,
        second: EngineVersion,
    },
    #[error("Style {0} not found")]
    UnknownStyle(StyleId),
    #[error("Style {style_id} is a {actual} style, expected a {expected} style")]
    StyleKindMismatch {
        style_id: StyleId,
        expected: StyleKind,
        actual: StyleKind,
    },
    #[error(
        "Voice model {model_id} uses manifest version {found}, \
         this build supports up to {supported}"
    )]
    UnsupportedManifestVersion {
        model_id: String,
        found: String,
        supported: String,
    },
    #[error("Voice model {model_id} is still used by styles {styles:?}")]
    ModelInUse {
        model_id: String,
        styles: Vec<StyleId>,
    },
    #[error("Voice model {0} not found")]
    UnknownModel(String),
    #[error("Core {version} unavailable: {reason}")]
    EngineUnavailable {
        version: EngineVersion,
        reason: String,
    },
    #[error("Request cancelled")]
    Cancelled,
    #[error("Invalid manifest {}: {reason}", path.display())]
    InvalidManifest { path: PathBuf, reason: String },
    #[error("Invalid kana at position {position}: {reason}")]
    InvalidKana { position: usize, reason: String },
    #[error("Invalid score at note {index}: {reason}")]
    InvalidScore { index: usize, reason: String },
    #[error("Invalid dictionary word {surface:?}: {reason}")]
    InvalidDictionary { surface: String, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Package archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Resampler setup error: {0}")]
    ResamplerSetup(#[from] rubato::ResamplerConstructionError),
    #[error("Resampling error: {0}")]
    Resample(#[from] rubato::ResampleError),
    #[cfg(feature = "onnx")]
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[cfg(feature = "onnx")]
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn unavailable(version: &EngineVersion, reason: impl Into<String>) -> Self {
        Error::EngineUnavailable {
            version: version.clone(),
            reason: reason.into(),
        }
    }
}
