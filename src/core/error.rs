use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Reasoning backend error: {0}")]
    Backend(String),

    #[error("Reasoning backend timed out after {0} ms")]
    Timeout(u64),

    #[error("Reasoning backend call cancelled")]
    Cancelled,

    #[error("Malformed backend reply: {0}")]
    MalformedReply(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, VoiceError>;
