use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeekError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unknown gacha id: {0}")]
    UnknownGacha(String),
    #[error("unknown item name in target sequence: {0}")]
    UnknownItem(String),
    #[error("target sequence has {len} elements, at most {max} are supported")]
    TargetTooLong { len: usize, max: usize },
    #[error("packed gacha data is malformed: {0}")]
    Pack(String),
}

pub type Result<T> = std::result::Result<T, SeekError>;
