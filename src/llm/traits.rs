//! LLM 客户端抽象
//!
//! 所有后端（Gemini / OpenAI 兼容 / Scripted / Mock）实现 LlmClient：generate（非流式）、generate_stream（流式分片）。
//! 具体上游协议只存在于各实现内部，编排层只看到 ModelResponse。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{stream, Stream};
use thiserror::Error;

use crate::llm::{Message, ModelResponse};
use crate::tools::ToolDescriptor;

/// 上游生成服务的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

/// 一次生成请求：消息序列 + 向模型公布的工具
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDescriptor>,
}

impl GenerationRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
        }
    }

    /// 单条用户提示
    pub fn prompt(text: impl Into<String>) -> Self {
        Self::new(vec![Message::user(text)])
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    /// 最后一条用户消息（脚本化客户端与日志用）
    pub fn last_user_message(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::llm::Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<ModelResponse, LlmError>> + Send>>;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 后端使用的模型名（用于结果中的 model_used）
    fn model_name(&self) -> &str;

    /// 非流式生成
    async fn generate(&self, request: &GenerationRequest) -> Result<ModelResponse, LlmError>;

    /// 流式生成；默认把非流式结果包成单个分片
    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<ResponseStream, LlmError> {
        let response = self.generate(request).await?;
        Ok(Box::pin(stream::iter(vec![Ok(response)])))
    }

    /// 累计 token 使用：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
