//! Text-generation collaborator used by the narrative phase.

pub mod error;
pub mod openai;
pub mod provider;

pub use error::{GenerationError, GenerationResult};
pub use openai::OpenAiClient;
pub use provider::{DisabledGenerator, GenerationRequest, Generated, ResponseMode, TextGenerator};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the generation endpoint
#[derive(Clone)]
pub struct GenerationConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-5-mini".to_string(),
            temperature: Some(0.7),
            timeout: Duration::from_secs(60),
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GenerationConfig {
    /// Reads `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `OPENAI_MODEL`.
    pub fn from_env() -> GenerationResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(GenerationError::MissingApiKey)?;
        let defaults = Self::default();

        Ok(Self {
            api_key,
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            model: std::env::var("OPENAI_MODEL").unwrap_or(defaults.model),
            ..defaults
        })
    }
}

/// Generator for this environment. Without an API key every request fails
/// with E001, and that is logged once here.
pub fn generator_from_env() -> Arc<dyn TextGenerator> {
    let client = GenerationConfig::from_env().and_then(OpenAiClient::new);
    match client {
        Ok(client) => {
            tracing::info!("Text generation enabled (model {})", client.model());
            Arc::new(client)
        }
        Err(e) => {
            tracing::warn!("{}; narrative fields will use placeholders", e.coded_message());
            Arc::new(DisabledGenerator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_key() {
        let config = GenerationConfig {
            api_key: "sk-secret".into(),
            ..GenerationConfig::default()
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("gpt-5-mini"));
    }
}
