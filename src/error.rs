//! Error taxonomy shared by the loaders, the real-time reader and the renderers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NmbsError {
    /// Network, timeout or non-success HTTP status while talking to the remote API.
    #[error("fetch error for {source_name}: {message}")]
    Fetch {
        source_name: String,
        message: String,
    },
    /// Malformed protobuf or XML payload.
    #[error("decode error for {source_name}: {message}")]
    Decode {
        source_name: String,
        message: String,
    },
    #[error("unsupported planning file format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },
    #[error("corrupt archive {}: {reason}", path.display())]
    CorruptArchive { path: PathBuf, reason: String },
    /// Nothing usable to build an artifact from.
    #[error("missing source: {0}")]
    MissingSource(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl NmbsError {
    pub fn fetch(source_name: impl Into<String>, message: impl ToString) -> Self {
        NmbsError::Fetch {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    pub fn decode(source_name: impl Into<String>, message: impl ToString) -> Self {
        NmbsError::Decode {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Short machine-readable name, used in CSV history rows and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            NmbsError::Fetch { .. } => "fetch_error",
            NmbsError::Decode { .. } => "decode_error",
            NmbsError::UnsupportedFormat { .. } => "unsupported_format",
            NmbsError::CorruptArchive { .. } => "corrupt_archive",
            NmbsError::MissingSource(_) => "missing_source",
            NmbsError::Io(_) => "io_error",
            NmbsError::Json(_) => "json_error",
            NmbsError::Csv(_) => "csv_error",
            NmbsError::Zip(_) => "zip_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, NmbsError>;
