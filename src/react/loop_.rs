//! ReAct 主循环
//!
//! AwaitingModel → Parsing → {ToolDispatch → AwaitingToolResult → AwaitingModel} | Terminal
//!
//! - 每轮默认流式请求，截止时间针对整次请求而非单个 token；超时、出错或解析为空时回退一次非流式请求，仍失败则本次运行以类型化错误结束
//! - 有工具调用则逐个分发，(tool, args, observation) 追加到下一轮的对话中
//! - 无工具调用即终止：带终止标记时取标记后的文本，否则取整段文本
//! - 达到最大轮数强制终止，返回已有的最佳文本

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::json;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::{GenerationRequest, LlmClient, Message};
use crate::observability::{StepType, Trace};
use crate::react::extractor::{
    extract_chunks_with_markers, extract_with_markers, find_final_marker, Extraction,
};
use crate::tools::{tool_call_schema_json, ToolCallIntent, ToolExecutor};

/// 循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    AwaitingModel,
    Parsing,
    ToolDispatch,
    AwaitingToolResult,
    Terminal,
}

impl LoopState {
    fn can_advance_to(self, next: LoopState) -> bool {
        use LoopState::*;
        matches!(
            (self, next),
            (AwaitingModel, Parsing)
                | (Parsing, ToolDispatch)
                | (Parsing, Terminal)
                | (ToolDispatch, AwaitingToolResult)
                | (AwaitingToolResult, ToolDispatch)
                | (AwaitingToolResult, AwaitingModel)
                | (AwaitingToolResult, Terminal)
        )
    }
}

#[derive(Debug, Clone)]
pub struct ReactConfig {
    pub max_iterations: usize,
    /// 单次生成的墙钟截止时间
    pub request_timeout: Duration,
    pub stream: bool,
    /// 终止标记，大小写不敏感
    pub final_answer_markers: Vec<String>,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            request_timeout: Duration::from_secs(60),
            stream: true,
            final_answer_markers: vec![
                "final answer".into(),
                "答案是".into(),
                "最终答案".into(),
            ],
        }
    }
}

/// 一次运行的结果
#[derive(Debug, Clone, Serialize)]
pub struct ReactOutcome {
    pub answer: String,
    /// 实际请求模型的轮数
    pub iterations: usize,
    pub tool_calls: usize,
    /// 因达到最大轮数而终止
    pub hit_iteration_cap: bool,
    /// 经历的状态序列
    pub states: Vec<LoopState>,
}

/// 状态机推进器：只允许合法转换
struct StateMachine {
    current: LoopState,
    history: Vec<LoopState>,
}

impl StateMachine {
    fn new() -> Self {
        Self {
            current: LoopState::AwaitingModel,
            history: vec![LoopState::AwaitingModel],
        }
    }

    fn advance(&mut self, next: LoopState) -> Result<(), AgentError> {
        if !self.current.can_advance_to(next) {
            return Err(AgentError::InvalidTransition {
                from: format!("{:?}", self.current),
                to: format!("{:?}", next),
            });
        }
        tracing::debug!(from = ?self.current, to = ?next, "react state");
        self.current = next;
        self.history.push(next);
        Ok(())
    }
}

pub struct ReactLoop {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    config: ReactConfig,
}

impl ReactLoop {
    /// max_iterations 至少为 1
    pub fn new(llm: Arc<dyn LlmClient>, executor: Arc<ToolExecutor>, mut config: ReactConfig) -> Self {
        config.max_iterations = config.max_iterations.max(1);
        Self {
            llm,
            executor,
            config,
        }
    }

    pub fn config(&self) -> &ReactConfig {
        &self.config
    }

    /// 系统指令：工具目录 + 调用协议
    pub fn system_prompt(&self) -> String {
        format!(
            "You are a helpful assistant that solves tasks step by step.\n\n\
             Available tools:\n{}\n\n\
             To use a tool, reply with a single line:\n\
             Action: tool_name(arg1, arg2)\n\
             or a JSON object: {{\"tool\": \"tool_name\", \"args\": {{...}}}}\n\
             JSON tool calls follow this schema:\n{}\n\
             You will receive the result as an Observation.\n\
             When you know the answer, reply with:\n\
             Final Answer: <answer>",
            self.executor.catalog(),
            tool_call_schema_json()
        )
    }

    /// 运行一次推理；trace 记录每一步
    pub async fn run(&self, query: &str, trace: &mut Trace) -> Result<ReactOutcome, AgentError> {
        let start = Instant::now();
        trace.record(StepType::Perception, json!({ "query": query }))?;

        let mut machine = StateMachine::new();
        let mut messages = vec![
            Message::system(self.system_prompt()),
            Message::user(query.to_string()),
        ];
        let tools = self.executor.descriptors();

        let mut best_text: Option<String> = None;
        let mut last_observation: Option<String> = None;
        let mut tool_calls = 0usize;

        for iteration in 1..=self.config.max_iterations {
            tracing::info!(iteration, max = self.config.max_iterations, "react turn");
            let request = GenerationRequest::new(messages.clone()).with_tools(tools.clone());
            let extraction = self.request_turn(&request).await?;
            machine.advance(LoopState::Parsing)?;

            if extraction.tool_calls.is_empty() {
                let text = extraction.text.unwrap_or_default();
                let answer = self.final_answer(&text);
                machine.advance(LoopState::Terminal)?;
                trace.record(
                    StepType::Response,
                    json!({ "answer": answer, "latency_ms": start.elapsed().as_millis() as u64 }),
                )?;
                return Ok(ReactOutcome {
                    answer,
                    iterations: iteration,
                    tool_calls,
                    hit_iteration_cap: false,
                    states: machine.history,
                });
            }

            if let Some(text) = extraction.text.as_deref() {
                trace.record(StepType::Thinking, json!(text))?;
                best_text = Some(self.final_answer(text));
            }

            for intent in &extraction.tool_calls {
                machine.advance(LoopState::ToolDispatch)?;
                trace.record(
                    StepType::ToolCall,
                    json!({ "tool": intent.tool_name, "args": intent.arguments_view() }),
                )?;
                let (observation, ok) = self.dispatch(intent).await?;
                machine.advance(LoopState::AwaitingToolResult)?;
                trace.record(
                    StepType::Observation,
                    json!({ "tool": intent.tool_name, "ok": ok, "observation": observation }),
                )?;
                tool_calls += 1;

                messages.push(Message::assistant(format!(
                    "Action: {}({})",
                    intent.tool_name,
                    intent.arguments_view()
                )));
                messages.push(Message::user(format!("Observation: {}", observation)));
                last_observation = Some(observation);
            }

            if iteration < self.config.max_iterations {
                machine.advance(LoopState::AwaitingModel)?;
            }
        }

        machine.advance(LoopState::Terminal)?;
        let answer = best_text
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| match last_observation {
                Some(obs) => format!(
                    "已达到最大推理轮数（{}），最近一次观察结果：{}",
                    self.config.max_iterations, obs
                ),
                None => format!("已达到最大推理轮数（{}），未能得到答案", self.config.max_iterations),
            });
        tracing::warn!(
            max = self.config.max_iterations,
            tool_calls,
            "react iteration cap reached"
        );
        trace.record(
            StepType::Response,
            json!({
                "answer": answer,
                "iteration_cap": true,
                "latency_ms": start.elapsed().as_millis() as u64,
            }),
        )?;
        Ok(ReactOutcome {
            answer,
            iterations: self.config.max_iterations,
            tool_calls,
            hit_iteration_cap: true,
            states: machine.history,
        })
    }

    /// 单轮请求：流式（截止时间内）→ 失败则非流式一次
    async fn request_turn(&self, request: &GenerationRequest) -> Result<Extraction, AgentError> {
        let deadline = self.config.request_timeout;
        if self.config.stream {
            match timeout(deadline, self.stream_once(request)).await {
                Ok(Ok(extraction)) => return Ok(extraction),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "streaming turn failed, retrying without streaming")
                }
                Err(_) => tracing::warn!(
                    ?deadline,
                    "streaming turn exceeded deadline, retrying without streaming"
                ),
            }
        }
        match timeout(deadline, self.llm.generate(request)).await {
            Ok(Ok(response)) => extract_with_markers(&response, &self.config.final_answer_markers),
            Ok(Err(e)) => Err(AgentError::Llm(e)),
            Err(_) => Err(AgentError::Timeout(deadline)),
        }
    }

    async fn stream_once(&self, request: &GenerationRequest) -> Result<Extraction, AgentError> {
        let mut stream = self.llm.generate_stream(request).await?;
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk?);
        }
        extract_chunks_with_markers(&chunks, &self.config.final_answer_markers)
    }

    /// 分发一个调用；校验失败、工具失败都转成 Observation 文本，其余错误结束本次运行
    async fn dispatch(&self, intent: &ToolCallIntent) -> Result<(String, bool), AgentError> {
        match self.executor.execute(intent).await {
            Ok(outcome) => {
                let ok = outcome.is_success();
                Ok((outcome.into_text(), ok))
            }
            Err(e) if e.is_tool_level() => Ok((format!("Error: {}", e), false)),
            Err(e) => Err(e),
        }
    }

    /// 带终止标记时取标记之后的文本
    fn final_answer(&self, text: &str) -> String {
        strip_final_marker(text, &self.config.final_answer_markers)
    }
}

/// 找到最先出现的终止标记，返回其后的内容（去掉冒号与空白）；没有标记或标记后为空则返回整段文本
pub fn strip_final_marker(text: &str, markers: &[String]) -> String {
    if let Some((pos, len)) = find_final_marker(text, markers) {
        let after = text[pos + len..]
            .trim_start_matches(|c: char| c == ':' || c == '：' || c.is_whitespace())
            .trim();
        if !after.is_empty() {
            return after.to_string();
        }
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ModelResponse, Part, ScriptedLlmClient, StreamBehavior};
    use crate::tools::builtin_registry;
    use serde_json::Map;

    fn executor() -> Arc<ToolExecutor> {
        Arc::new(ToolExecutor::new(builtin_registry(), 5))
    }

    fn config() -> ReactConfig {
        ReactConfig {
            request_timeout: Duration::from_millis(500),
            ..ReactConfig::default()
        }
    }

    #[test]
    fn test_strip_final_marker() {
        let markers = ReactConfig::default().final_answer_markers;
        assert_eq!(strip_final_marker("Thought: done\nFinal Answer: 120", &markers), "120");
        assert_eq!(strip_final_marker("答案是：晴天", &markers), "晴天");
        assert_eq!(strip_final_marker("just text", &markers), "just text");
        assert_eq!(strip_final_marker("final answer:", &markers), "final answer:");
    }

    #[tokio::test]
    async fn test_tool_then_answer() {
        let llm = Arc::new(ScriptedLlmClient::new(|req| {
            if req.last_user_message().starts_with("Observation:") {
                Ok(ModelResponse::text(format!(
                    "Final Answer: {}",
                    req.last_user_message().trim_start_matches("Observation: ")
                )))
            } else {
                let mut args = Map::new();
                args.insert("expression".into(), "25 * 4 + 100 / 5".into());
                Ok(ModelResponse::from_parts(vec![Part::call("calculate", args)]))
            }
        }));
        let react = ReactLoop::new(llm, executor(), config());
        let mut trace = Trace::new();
        let out = react.run("25×4+100÷5 等于多少", &mut trace).await.unwrap();

        assert!(out.answer.contains("120"));
        assert_eq!(out.iterations, 2);
        assert_eq!(out.tool_calls, 1);
        assert!(!out.hit_iteration_cap);
        assert_eq!(
            out.states,
            vec![
                LoopState::AwaitingModel,
                LoopState::Parsing,
                LoopState::ToolDispatch,
                LoopState::AwaitingToolResult,
                LoopState::AwaitingModel,
                LoopState::Parsing,
                LoopState::Terminal,
            ]
        );
        let summary = trace.summary();
        assert_eq!(summary.tool_calls.len(), 1);
        assert_eq!(summary.step_types.first(), Some(&StepType::Perception));
        assert_eq!(summary.step_types.last(), Some(&StepType::Response));
    }

    #[tokio::test]
    async fn test_iteration_cap_returns_text() {
        let llm = Arc::new(ScriptedLlmClient::always_text(
            "Thought: keep checking\nAction: weather(\"北京\")",
        ));
        let react = ReactLoop::new(llm.clone(), executor(), config());
        let mut trace = Trace::new();
        let out = react.run("天气", &mut trace).await.unwrap();

        assert!(out.hit_iteration_cap);
        assert_eq!(out.iterations, 5);
        assert_eq!(out.tool_calls, 5);
        assert!(!out.answer.is_empty());
        assert_eq!(llm.stream_calls(), 5);
        assert_eq!(out.states.last(), Some(&LoopState::Terminal));
    }

    #[tokio::test]
    async fn test_cap_without_text_uses_last_observation() {
        let llm = Arc::new(ScriptedLlmClient::new(|_| {
            let mut args = Map::new();
            args.insert("location".into(), "上海".into());
            Ok(ModelResponse::from_parts(vec![Part::call("weather", args)]))
        }));
        let cfg = ReactConfig {
            max_iterations: 2,
            ..config()
        };
        let react = ReactLoop::new(llm, executor(), cfg);
        let out = react.run("天气", &mut Trace::new()).await.unwrap();
        assert!(out.hit_iteration_cap);
        assert!(out.answer.contains("上海"));
    }

    #[tokio::test]
    async fn test_stream_failure_falls_back_once() {
        let llm = Arc::new(
            ScriptedLlmClient::always_text("Final Answer: ok")
                .with_stream_behavior(StreamBehavior::Fail),
        );
        let react = ReactLoop::new(llm.clone(), executor(), config());
        let out = react.run("hi", &mut Trace::new()).await.unwrap();
        assert_eq!(out.answer, "ok");
        assert_eq!(llm.stream_calls(), 1);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_stream_deadline_falls_back() {
        let llm = Arc::new(
            ScriptedLlmClient::always_text("done")
                .with_stream_behavior(StreamBehavior::Stall(Duration::from_secs(5))),
        );
        let cfg = ReactConfig {
            request_timeout: Duration::from_millis(50),
            ..ReactConfig::default()
        };
        let react = ReactLoop::new(llm.clone(), executor(), cfg);
        let out = react.run("hi", &mut Trace::new()).await.unwrap();
        assert_eq!(out.answer, "done");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_repeated_empty_response_is_typed_error() {
        let llm = Arc::new(ScriptedLlmClient::new(|_| Ok(ModelResponse::default())));
        let react = ReactLoop::new(llm.clone(), executor(), config());
        let err = react.run("hi", &mut Trace::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::Extraction(_)));
        assert_eq!(llm.stream_calls(), 1);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_surfaces() {
        let llm = Arc::new(ScriptedLlmClient::new(|_| {
            Err(LlmError::Api {
                status: 500,
                message: "boom".into(),
            })
        }));
        let react = ReactLoop::new(llm, executor(), config());
        let err = react.run("hi", &mut Trace::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(LlmError::Api { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_validation_error_becomes_observation() {
        let llm = Arc::new(ScriptedLlmClient::new(|req| {
            if req.last_user_message().starts_with("Observation:") {
                Ok(ModelResponse::text(req.last_user_message().to_string()))
            } else {
                Ok(ModelResponse::from_parts(vec![Part::call("weather", Map::new())]))
            }
        }));
        let react = ReactLoop::new(llm, executor(), config());
        let out = react.run("天气", &mut Trace::new()).await.unwrap();
        assert!(out.answer.contains("location"));
    }

    #[tokio::test]
    async fn test_final_answer_quoting_a_call_terminates() {
        let llm = Arc::new(ScriptedLlmClient::always_text(
            r#"Final Answer: 调用格式示例：{"tool": "search", "args": {"query": "rust"}}"#,
        ));
        let react = ReactLoop::new(llm.clone(), executor(), config());
        let out = react.run("工具调用怎么写", &mut Trace::new()).await.unwrap();

        assert_eq!(out.iterations, 1);
        assert_eq!(out.tool_calls, 0);
        assert!(!out.hit_iteration_cap);
        assert!(out.answer.starts_with("调用格式示例"));
        assert_eq!(llm.stream_calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_iterations_is_clamped_to_one() {
        let llm = Arc::new(ScriptedLlmClient::always_text("Final Answer: 42"));
        let cfg = ReactConfig {
            max_iterations: 0,
            ..config()
        };
        let react = ReactLoop::new(llm, executor(), cfg);
        assert_eq!(react.config().max_iterations, 1);
        let out = react.run("q", &mut Trace::new()).await.unwrap();
        assert_eq!(out.answer, "42");
        assert_eq!(out.iterations, 1);
    }

    #[tokio::test]
    async fn test_response_step_records_latency() {
        let llm = Arc::new(
            ScriptedLlmClient::always_text("Final Answer: ok").with_latency(Duration::from_millis(20)),
        );
        let react = ReactLoop::new(llm, executor(), config());
        let mut trace = Trace::new();
        react.run("q", &mut trace).await.unwrap();

        let response = trace.steps.last().unwrap();
        assert_eq!(response.step_type, StepType::Response);
        assert!(response.data["latency_ms"].as_u64().unwrap() >= 20);
    }
}
