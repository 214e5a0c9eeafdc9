use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimedialError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Persona error: {0}")]
    Persona(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Speech error: {0}")]
    Speech(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TimedialError>;
