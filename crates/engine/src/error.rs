use thiserror::Error;

pub type Result<T> = std::result::Result<T, FindingsError>;

#[derive(Error, Debug)]
pub enum FindingsError {
    #[error("Store error: {0}")]
    StoreError(#[from] findings_store::StoreError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Classification failed: {0}")]
    ClassificationError(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("{0}")]
    Other(String),
}
