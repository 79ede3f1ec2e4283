//! Mock / Scripted LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! - MockLlmClient：回显最后一条 User 消息作为最终答案，便于本地跑通流程
//! - ScriptedLlmClient：由闭包决定每次响应，可注入延迟、流式失败或流式卡顿

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{GenerationRequest, LlmClient, LlmError, ModelResponse, ResponseStream};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<ModelResponse, LlmError> {
        let last_user = request.last_user_message();
        let last_user = if last_user.is_empty() { "(no input)" } else { last_user };
        Ok(ModelResponse::text(format!(
            "Final Answer: Echo from Mock: {}",
            last_user
        )))
    }
}

type Script = dyn Fn(&GenerationRequest) -> Result<ModelResponse, LlmError> + Send + Sync;

/// 流式通道的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamBehavior {
    /// 与 generate 相同的结果，包成单个分片
    Normal,
    /// 建立流即失败
    Fail,
    /// 流在返回前卡住指定时长（用于触发请求截止时间）
    Stall(Duration),
}

/// 脚本化客户端：闭包产出响应，记录调用次数
pub struct ScriptedLlmClient {
    model: String,
    script: Arc<Script>,
    latency: Option<Duration>,
    stream_behavior: StreamBehavior,
    calls: AtomicUsize,
    stream_calls: AtomicUsize,
}

impl ScriptedLlmClient {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&GenerationRequest) -> Result<ModelResponse, LlmError> + Send + Sync + 'static,
    {
        Self {
            model: "scripted".to_string(),
            script: Arc::new(script),
            latency: None,
            stream_behavior: StreamBehavior::Normal,
            calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
        }
    }

    /// 每次都返回同一段文本
    pub fn always_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(ModelResponse::text(text.clone())))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_stream_behavior(mut self, behavior: StreamBehavior) -> Self {
        self.stream_behavior = behavior;
        self
    }

    /// 非流式调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 流式调用次数
    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    async fn respond(&self, request: &GenerationRequest) -> Result<ModelResponse, LlmError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        (self.script)(request)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<ModelResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.respond(request).await
    }

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<ResponseStream, LlmError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        match self.stream_behavior {
            StreamBehavior::Normal => {}
            StreamBehavior::Fail => {
                return Err(LlmError::Stream("scripted stream failure".to_string()))
            }
            StreamBehavior::Stall(duration) => tokio::time::sleep(duration).await,
        }
        let response = self.respond(request).await;
        Ok(Box::pin(stream::iter(vec![response])))
    }
}
