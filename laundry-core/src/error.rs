use thiserror::Error;

/// All errors produced by laundry-core.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("wav decode error: {0}")]
    Decode(#[from] hound::Error),

    #[error("clip contains no samples")]
    EmptyClip,

    #[error("unsupported wav layout: {0}")]
    UnsupportedFormat(String),

    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("object key rejected: {0}")]
    InvalidKey(String),

    #[error("malformed notification record: {0}")]
    MalformedRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AlertError>;
