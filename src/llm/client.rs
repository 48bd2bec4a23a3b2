//! Messages-API client and the gateway seam used by the orchestration.
//!
//! The pipeline only ever sees [`ModelGateway`]: one call in, extracted text
//! out, or an error. No retries happen here; callers decide.

use crate::error::{Result, SkillEvalError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Base64 image source block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

/// One block of mixed user content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// A PNG image given as base64.
    pub fn png(base64: impl Into<String>) -> Self {
        Self::Image {
            source: ImageSource {
                source_type: "base64".to_string(),
                media_type: "image/png".to_string(),
                data: base64.into(),
            },
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }
}

/// User message content: plain text or an ordered list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<ContentBlock>> for MessageContent {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        Self::Blocks(blocks)
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Everything needed for one gateway call.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub api_key: String,
    pub model: String,
    pub system: Option<String>,
    pub content: MessageContent,
    pub max_tokens: u32,
    /// Return the fenced JSON block from the reply instead of the whole text.
    pub json_mode: bool,
}

impl GatewayRequest {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        content: impl Into<MessageContent>,
        max_tokens: u32,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            system: None,
            content: content.into(),
            max_tokens,
            json_mode: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        let system = system.into();
        if !system.is_empty() {
            self.system = Some(system);
        }
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Single-call abstraction over the language-model API.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Send one request and return the extracted reply text.
    async fn call(&self, request: GatewayRequest) -> Result<String>;
}

/// Request body for the Messages API.
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message>,
}

/// Response from the Messages API.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

/// API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    #[allow(dead_code)]
    error_type: Option<String>,
}

/// HTTP client for the Messages API.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_base: String,
}

impl LlmClient {
    /// Create a new client against the given API base URL.
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into(),
        }
    }

    /// Get the API endpoint URL.
    fn endpoint(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/v1/messages", base)
    }

    async fn send(&self, request: &GatewayRequest) -> Result<String> {
        if request.api_key.is_empty() {
            return Err(SkillEvalError::MissingApiKey);
        }

        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            messages: vec![Message {
                role: Role::User,
                content: request.content.clone(),
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &request.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
                return Err(SkillEvalError::LlmApi(format!(
                    "API error ({}): {}",
                    status, api_error.error.message
                )));
            }
            return Err(SkillEvalError::LlmApi(format!(
                "API request failed with status {}",
                status
            )));
        }

        let reply: MessagesResponse = serde_json::from_str(&body)?;
        if reply.stop_reason.as_deref() == Some("max_tokens") {
            tracing::debug!(model = %request.model, "reply truncated at max_tokens");
        }

        Ok(reply
            .content
            .into_iter()
            .find(|block| block.block_type == "text")
            .and_then(|block| block.text)
            .unwrap_or_default())
    }

    /// Test connectivity to the API.
    pub async fn test_connection(&self, api_key: &str, model: &str) -> Result<()> {
        let request = GatewayRequest::new(api_key, model, "Say 'hello' and nothing else.", 16);
        let reply = self.call(request).await?;

        if reply.to_lowercase().contains("hello") {
            Ok(())
        } else {
            Err(SkillEvalError::LlmApi(format!(
                "Unexpected response: {}",
                reply
            )))
        }
    }
}

#[async_trait]
impl ModelGateway for LlmClient {
    async fn call(&self, request: GatewayRequest) -> Result<String> {
        let text = self.send(&request).await?;
        if request.json_mode {
            Ok(extract_json(&text))
        } else {
            Ok(text)
        }
    }
}

/// Extract a JSON document from a model reply.
///
/// Prefers a fenced block, then the outermost brace span, then the raw text.
pub fn extract_json(response: &str) -> String {
    let response = response.trim();

    if let Some(open) = response.find("```") {
        let after = &response[open + 3..];
        let body_start = after.find('\n').map(|n| n + 1).unwrap_or(0);
        let tag = after[..body_start].trim();
        if tag.is_empty() || tag.eq_ignore_ascii_case("json") {
            if let Some(close) = after[body_start..].find("```") {
                return after[body_start..body_start + close].trim().to_string();
            }
        }
    }

    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end > start {
                return response[start..=end].to_string();
            }
        }
    }

    response.to_string()
}
