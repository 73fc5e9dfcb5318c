use thiserror::Error;

/// All errors produced by parley-core.
#[derive(Debug, Error)]
pub enum ParleyError {
    #[error("candidate or expected text is empty, nothing to score")]
    EmptyInput,

    #[error("session is already completed")]
    TerminalState,

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid script: {0}")]
    InvalidScript(String),

    #[error("dialogue generation error: {0}")]
    Generation(String),

    #[error("transcription error: {0}")]
    Transcription(String),

    #[error("audio decode error: {0}")]
    AudioDecode(String),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ParleyError>;
