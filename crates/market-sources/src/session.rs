use std::time::Duration;

use market_core::SourceError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user_agent: String,
    pub accept_language: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub rate_limit_wait: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: BROWSER_USER_AGENT.to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            rate_limit_wait: Duration::from_secs(15),
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let timeout_secs: u64 = std::env::var("SOURCE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.timeout.as_secs());

        Self {
            timeout: Duration::from_secs(timeout_secs),
            ..defaults
        }
    }
}

/// HTTP session shared by every upstream client in a run. Presents itself as
/// a desktop browser and keeps cookies between requests.
#[derive(Clone)]
pub struct SourceSession {
    client: Client,
    config: SessionConfig,
}

impl SourceSession {
    pub fn new(config: SessionConfig) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/json;q=0.9,*/*;q=0.8"),
        );
        let language = HeaderValue::from_str(&config.accept_language)
            .map_err(|e| SourceError::Format(format!("invalid Accept-Language: {}", e)))?;
        headers.insert(ACCEPT_LANGUAGE, language);

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .cookie_store(true)
            .timeout(config.timeout)
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Send a request with automatic 429 retry. Non-success statuses are
    /// returned as `SourceError::Status`.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, SourceError> {
        let request = builder
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;
        let url = request.url().to_string();

        for attempt in 0..self.config.max_attempts {
            let req_clone = request
                .try_clone()
                .ok_or_else(|| SourceError::Network("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| SourceError::Network(e.to_string()))?;

            let status = response.status();
            if status.as_u16() == 429 {
                if attempt + 1 == self.config.max_attempts {
                    break;
                }
                tracing::warn!(
                    "429 from {}, waiting {}s before retry {}/{}",
                    url,
                    self.config.rate_limit_wait.as_secs(),
                    attempt + 1,
                    self.config.max_attempts
                );
                tokio::time::sleep(self.config.rate_limit_wait).await;
                continue;
            }

            if !status.is_success() {
                return Err(SourceError::Status {
                    status: status.as_u16(),
                    url,
                });
            }
            return Ok(response);
        }

        Err(SourceError::RateLimited(format!(
            "{} after {} attempts",
            url, self.config.max_attempts
        )))
    }

    pub async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        self.send(self.get(url))
            .await?
            .text()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let bytes = self
            .send(self.get(url))
            .await?
            .bytes()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        self.send_json(self.get(url)).await
    }

    pub async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, SourceError> {
        self.send(builder)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::Format(e.to_string()))
    }
}
