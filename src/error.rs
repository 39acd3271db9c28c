use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipForgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WAV processing error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Transcription timed out after {0} seconds")]
    TranscriptionTimeout(u64),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Rate limited by upstream service: {0}")]
    RateLimited(String),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Classification error: {0}")]
    Classify(String),

    #[error("Invalid status move: {0}")]
    InvalidMove(String),

    #[error("Clip extraction error: {0}")]
    Clip(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

impl ClipForgeError {
    /// Whether a retry with backoff is worthwhile. Network/timeout-class
    /// failures and rate limits qualify; business errors (bad request,
    /// parse failures, invariant violations) do not.
    pub fn is_transient(&self) -> bool {
        match self {
            ClipForgeError::RateLimited(_) => true,
            ClipForgeError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ClipForgeError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClipForgeError>;
