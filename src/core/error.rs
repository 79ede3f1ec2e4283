//! 错误类型
//!
//! 工具层与规划层的错误在调用点被吸收为文本（Observation / 子任务结果），
//! 传输层与解析层错误在用尽回退后以类型化错误交给直接调用方。

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;

/// 编排引擎运行中可能出现的错误
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    /// 必需参数缺失（工具分发前校验）
    #[error("Missing required parameter '{parameter}' for tool '{tool}'")]
    MissingParameter { tool: String, parameter: String },

    /// 参数无法转换为声明类型
    #[error("Parameter '{parameter}' of tool '{tool}' is not a valid {expected}")]
    InvalidParameter {
        tool: String,
        parameter: String,
        expected: String,
    },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// 模型响应中没有任何可解释的内容
    #[error("No interpretable content in model response: {0}")]
    Extraction(String),

    /// 单次生成超过截止时间（流式与非流式均已尝试）
    #[error("Generation deadline of {0:?} exceeded")]
    Timeout(Duration),

    /// 规划输出格式错误（Planner 内部降级，不会抛给 Orchestrator 的调用方）
    #[error("Malformed plan: {0}")]
    Planning(String),

    /// 工具体内部失败（始终转为 Observation 文本）
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// 状态只能前进
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Trace {0} is already closed")]
    TraceClosed(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Config error: {0}")]
    Config(String),

    /// 批量任务异常退出（panic 或被取消）
    #[error("Batch task aborted: {0}")]
    Join(String),
}

impl AgentError {
    /// 工具/参数类错误：在 ReAct 循环中转为 Observation 继续推理
    pub fn is_tool_level(&self) -> bool {
        matches!(
            self,
            AgentError::MissingParameter { .. }
                | AgentError::InvalidParameter { .. }
                | AgentError::UnknownTool(_)
                | AgentError::ToolExecution(_)
        )
    }
}
