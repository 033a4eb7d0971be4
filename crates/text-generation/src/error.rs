use market_core::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GenerationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GenerationError::MissingApiKey => ErrorCode::MissingApiKey,
            _ => ErrorCode::Generation,
        }
    }

    /// `[E00n] meaning: detail`
    pub fn coded_message(&self) -> String {
        self.code().message(self)
    }
}

pub type GenerationResult<T> = Result<T, GenerationError>;
