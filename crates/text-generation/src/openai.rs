use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{GenerationError, GenerationResult};
use crate::provider::{GenerationRequest, Generated, ResponseMode, TextGenerator};
use crate::GenerationConfig;

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_format: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    config: GenerationConfig,
}

impl OpenAiClient {
    pub fn new(config: GenerationConfig) -> GenerationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

fn request_body<'a>(model: &'a str, temperature: Option<f32>, request: &'a GenerationRequest) -> ChatRequest<'a> {
    let format = match request.mode {
        ResponseMode::Json => "json_object",
        ResponseMode::Text => "text",
    };
    ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content: &request.prompt,
        }],
        max_completion_tokens: request.max_tokens,
        temperature,
        response_format: json!({ "type": format }),
    }
}

/// First choice's content, trimmed; parsed strictly in JSON mode.
pub fn parse_completion(response: ChatResponse, mode: ResponseMode) -> GenerationResult<Generated> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| GenerationError::InvalidResponse("no message content".to_string()))?;
    let content = content.trim();

    match mode {
        ResponseMode::Text => Ok(Generated::Text(content.to_string())),
        ResponseMode::Json => Ok(Generated::Json(serde_json::from_str(content)?)),
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, request: GenerationRequest) -> GenerationResult<Generated> {
        tracing::info!(
            "Calling text generation (json_mode={}, max_tokens={})",
            request.mode == ResponseMode::Json,
            request.max_tokens
        );

        let body = request_body(&self.config.model, self.config.temperature, &request);
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GenerationError::ServiceUnavailable(format!(
                "Status: {} {}",
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }

        let completion = response.json::<ChatResponse>().await?;
        parse_completion(completion, request.mode)
    }

    fn backend_name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(content: Option<&str>) -> ChatResponse {
        ChatResponse {
            choices: vec![ChatChoice {
                message: ChatChoiceMessage {
                    content: content.map(str::to_string),
                },
            }],
        }
    }

    #[test]
    fn test_request_body_shape() {
        let request = GenerationRequest::json("解説して", 250);
        let body = serde_json::to_value(request_body("gpt-5-mini", Some(0.7), &request)).unwrap();

        assert_eq!(body["model"], "gpt-5-mini");
        assert_eq!(body["max_completion_tokens"], 250);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "解説して");
    }

    #[test]
    fn test_text_mode_omits_temperature_when_unset() {
        let request = GenerationRequest::text("hello", 10);
        let body = serde_json::to_value(request_body("m", None, &request)).unwrap();
        assert_eq!(body["response_format"]["type"], "text");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_parse_json_completion() {
        let parsed = parse_completion(completion(Some(" {\"response\": \"ok\"} ")), ResponseMode::Json).unwrap();
        assert_eq!(parsed.field("response"), Some("ok"));
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let err = parse_completion(completion(Some("not json")), ResponseMode::Json).unwrap_err();
        assert!(matches!(err, GenerationError::Serialization(_)));

        let err = parse_completion(ChatResponse { choices: vec![] }, ResponseMode::Text).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse(_)));
    }
}
