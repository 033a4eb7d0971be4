use async_trait::async_trait;
use serde_json::Value;

use crate::error::{GenerationError, GenerationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Text,
    /// The model must answer with a single JSON object.
    Json,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub mode: ResponseMode,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn json(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            mode: ResponseMode::Json,
            max_tokens,
        }
    }

    pub fn text(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            mode: ResponseMode::Text,
            max_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    Text(String),
    Json(Value),
}

impl Generated {
    pub fn into_json(self) -> GenerationResult<Value> {
        match self {
            Generated::Json(value) => Ok(value),
            Generated::Text(_) => Err(GenerationError::InvalidResponse(
                "expected a JSON response".to_string(),
            )),
        }
    }

    /// String field of a JSON object response.
    pub fn field(&self, key: &str) -> Option<&str> {
        match self {
            Generated::Json(value) => value.get(key).and_then(Value::as_str),
            Generated::Text(_) => None,
        }
    }
}

/// Backend-agnostic interface for text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> GenerationResult<Generated>;

    fn backend_name(&self) -> &'static str;
}

/// Stands in when no API key is configured; every call fails with
/// [`GenerationError::MissingApiKey`].
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _request: GenerationRequest) -> GenerationResult<Generated> {
        Err(GenerationError::MissingApiKey)
    }

    fn backend_name(&self) -> &'static str {
        "disabled"
    }
}
