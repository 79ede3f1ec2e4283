//! 子任务执行器
//!
//! 子任务绑定了已注册工具则直接分发；否则（未绑定或工具名未知）用模型以自由文本回答子任务描述。
//! 工具失败、参数错误、生成失败都记为子任务 failed，错误文本即结果；执行器本身不因此出错。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::core::{AgentError, Subtask};
use crate::llm::{GenerationRequest, LlmClient, Message};
use crate::react::extractor::extract;
use crate::tools::{ToolCallIntent, ToolExecutor, ToolOutcome};

pub struct SubtaskExecutor {
    tools: Arc<ToolExecutor>,
    llm: Arc<dyn LlmClient>,
    request_timeout: Duration,
}

impl SubtaskExecutor {
    pub fn new(tools: Arc<ToolExecutor>, llm: Arc<dyn LlmClient>, request_timeout: Duration) -> Self {
        Self {
            tools,
            llm,
            request_timeout,
        }
    }

    /// 执行一个 pending 子任务，返回其结果文本（成功或失败都有）。
    /// 只有子任务不处于 pending 时返回错误。
    pub async fn execute(&self, subtask: &mut Subtask) -> Result<String, AgentError> {
        subtask.start()?;
        tracing::info!(id = %subtask.id, tool = ?subtask.tool_name, "subtask started");

        let outcome = match subtask.tool_name.as_deref() {
            Some(tool) if self.tools.has_tool(tool) => self.run_tool(tool, subtask).await,
            Some(tool) => {
                tracing::debug!(id = %subtask.id, tool, "unknown tool binding, answering with model");
                self.generate(&subtask.description).await
            }
            None => self.generate(&subtask.description).await,
        };

        match outcome {
            Ok(text) => subtask.complete(text)?,
            Err(error) => {
                tracing::warn!(id = %subtask.id, %error, "subtask failed");
                subtask.fail(error)?
            }
        }
        Ok(subtask.result.clone().unwrap_or_default())
    }

    async fn run_tool(&self, tool: &str, subtask: &Subtask) -> Result<String, String> {
        let intent = ToolCallIntent::new(tool, subtask.parameters.clone());
        match self.tools.execute(&intent).await {
            Ok(ToolOutcome::Success(text)) => Ok(text),
            Ok(ToolOutcome::Failed(text)) => Err(text),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn generate(&self, description: &str) -> Result<String, String> {
        let request = GenerationRequest::new(vec![Message::user(format!(
            "请回答以下问题：{}",
            description
        ))]);
        let response = match timeout(self.request_timeout, self.llm.generate(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(AgentError::Llm(e).to_string()),
            Err(_) => return Err(AgentError::Timeout(self.request_timeout).to_string()),
        };
        let extraction = extract(&response).map_err(|e| e.to_string())?;
        extraction
            .text
            .map(|t| t.trim().to_string())
            .ok_or_else(|| AgentError::Extraction("model replied without text".to_string()).to_string())
    }
}
