use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::HfConfig;
use crate::prompt::SYSTEM_MESSAGE;

/// 推理失败的分类，orchestrator 根据它降级
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("authentication with the model provider failed: {0}")]
    Auth(String),
    #[error("the model provider rate limit was reached")]
    RateLimit,
    #[error("the model provider did not answer within {0} ms")]
    Timeout(u64),
    #[error("the model provider returned an error: {0}")]
    Upstream(String),
}

impl InferenceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::RateLimit => "rate_limit",
            Self::Timeout(_) => "timeout",
            Self::Upstream(_) => "upstream",
        }
    }
}

/// 统一的推理引擎抽象，orchestrator 只依赖这个 trait
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// 一次性生成完整结果
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, InferenceError>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Hugging Face Inference（OpenAI 兼容 chat completion）客户端
pub struct HfInferenceClient {
    client: Client,
    config: HfConfig,
}

impl HfInferenceClient {
    pub fn new(config: HfConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_else(|err| {
                warn!("failed to build tuned HTTP client ({err}), using defaults");
                Client::new()
            });

        Self { client, config }
    }

    async fn send(
        &self,
        body: &ChatRequest<'_>,
        api_key: &str,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
    }

    fn transport_error(&self, err: reqwest::Error) -> InferenceError {
        if err.is_timeout() {
            InferenceError::Timeout(self.config.timeout_ms)
        } else {
            InferenceError::Upstream(format!("request failed: {err}"))
        }
    }
}

#[async_trait]
impl InferenceEngine for HfInferenceClient {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, InferenceError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(InferenceError::Auth("HF_API_KEY is not set".to_string()));
        };

        let body = ChatRequest {
            model: &self.config.model_id,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_MESSAGE,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature,
            max_tokens,
            stream: false,
        };

        // 只对“连不上”重试一次，超时和 HTTP 错误不重试
        let response = match self.send(&body, api_key).await {
            Err(err) if err.is_connect() => {
                warn!(error = %err, "could not reach the model provider, retrying once");
                self.send(&body, api_key)
                    .await
                    .map_err(|e| self.transport_error(e))?
            }
            other => other.map_err(|e| self.transport_error(e))?,
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;
        debug!(choices = parsed.choices.len(), "completion received");

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| InferenceError::Upstream("completion contained no text".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.config.model_id
    }
}

fn status_error(status: StatusCode, body: &str) -> InferenceError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            InferenceError::Auth(format!("provider rejected the credential ({status})"))
        }
        StatusCode::TOO_MANY_REQUESTS => InferenceError::RateLimit,
        _ => InferenceError::Upstream(format!("{status}: {}", snippet(body, 200))),
    }
}

// 错误信息里只留响应体的前一小段
fn snippet(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
