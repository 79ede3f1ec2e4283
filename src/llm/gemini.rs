//! Gemini REST 客户端
//!
//! `POST {base}/v1beta/models/{model}:generateContent` 与 `:streamGenerateContent?alt=sse`。
//! 工具以 functionDeclarations 公布；响应直接反序列化为 candidates → content → parts 形态。

use async_trait::async_trait;
use futures_util::{future, stream, StreamExt};
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::llm::openai::TokenUsage;
use crate::llm::{
    GenerationRequest, LlmClient, LlmError, ModelResponse, ResponseStream, Role,
};

pub const DEFAULT_GEMINI_BASE: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    pub usage: TokenUsage,
}

impl GeminiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .unwrap_or_default();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url
                .unwrap_or(DEFAULT_GEMINI_BASE)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            api_key,
            usage: TokenUsage::new(),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, self.model, method)
    }

    /// 请求体：system 消息合并进 systemInstruction，其余按 user / model 角色排成 contents
    fn request_body(request: &GenerationRequest) -> Value {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let contents: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = if m.role == Role::Assistant { "model" } else { "user" };
                json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect();

        let mut body = json!({ "contents": contents });
        if !system.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": system.join("\n\n")}]});
        }
        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request.tools.iter().map(|t| t.to_schema()).collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
        }
        body
    }

    async fn post(&self, url: &str, request: &GenerationRequest) -> Result<reqwest::Response, LlmError> {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(LlmError::RateLimited { retry_after_ms });
        }
        let message = response.text().await.unwrap_or_default();
        Err(LlmError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn record_usage(usage: &TokenUsage, response: &ModelResponse) {
        if let Some(meta) = response.usage_metadata {
            usage.add(meta.prompt_token_count, meta.candidates_token_count);
        }
    }
}

/// 从缓冲区中取出所有完整的 SSE 行，解析 `data:` 负载
fn drain_sse_events(buf: &mut Vec<u8>) -> Vec<Result<ModelResponse, LlmError>> {
    let mut events = Vec::new();
    while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buf.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&line);
        let Some(data) = line.trim().strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }
        events.push(serde_json::from_str::<ModelResponse>(data).map_err(|e| LlmError::Decode(e.to_string())));
    }
    events
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<ModelResponse, LlmError> {
        let response = self.post(&self.endpoint("generateContent"), request).await?;
        let body: ModelResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        Self::record_usage(&self.usage, &body);
        Ok(body)
    }

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<ResponseStream, LlmError> {
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        let response = self.post(&url, request).await?;
        let usage = self.usage.clone();

        let events = response
            .bytes_stream()
            .scan(Vec::<u8>::new(), move |buf, chunk| {
                let items = match chunk {
                    Ok(bytes) => {
                        buf.extend_from_slice(&bytes);
                        let items = drain_sse_events(buf);
                        // 用量在收尾分片（带 finishReason）中给出累计值
                        for item in items.iter().flatten() {
                            let finished = item
                                .candidates
                                .as_ref()
                                .and_then(|c| c.first())
                                .is_some_and(|c| c.finish_reason.is_some());
                            if finished {
                                Self::record_usage(&usage, item);
                            }
                        }
                        items
                    }
                    Err(e) => vec![Err(LlmError::Stream(e.to_string()))],
                };
                future::ready(Some(stream::iter(items)))
            })
            .flatten();

        Ok(Box::pin(events))
    }
}
