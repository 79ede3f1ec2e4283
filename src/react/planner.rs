//! Planner：把请求分解为有序子任务
//!
//! 调用高能力档模型，要求返回 `{"subtasks": [{"description", "tool", "parameters"}]}`；
//! parse_plan 从文本中取出 JSON（```json 围栏或首个 `{` 到末个 `}`）。
//! 解析失败（含空列表）降级为单子任务计划，原样包装查询；传输错误照常返回。

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::{AgentError, Subtask, TaskPlan};
use crate::llm::{GenerationRequest, LlmClient, Message};
use crate::react::extractor::extract;

#[derive(Debug, Deserialize)]
struct RawPlan {
    subtasks: Vec<RawSubtask>,
}

#[derive(Debug, Deserialize)]
struct RawSubtask {
    description: String,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    parameters: Option<Map<String, Value>>,
}

/// 从模型输出中解析计划；格式错误返回 Planning
pub fn parse_plan(query: &str, output: &str) -> Result<TaskPlan, AgentError> {
    let trimmed = output.trim();
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.trim_end_matches("```").trim()
    } else {
        match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if start < end => &trimmed[start..=end],
            _ => return Err(AgentError::Planning(format!("no JSON object in: {}", trimmed))),
        }
    };

    let raw: RawPlan = serde_json::from_str(json_str)
        .map_err(|e| AgentError::Planning(format!("{}: {}", e, json_str)))?;

    let subtasks = raw
        .subtasks
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            let subtask = Subtask::new(format!("subtask_{}", i), s.description.trim());
            match s.tool.map(|t| t.trim().to_string()) {
                Some(tool) if !tool.is_empty() && !tool.eq_ignore_ascii_case("none") => {
                    subtask.with_tool(tool, s.parameters.unwrap_or_default())
                }
                _ => subtask,
            }
        })
        .collect::<Vec<_>>();

    if subtasks.iter().any(|s| s.description.is_empty()) {
        return Err(AgentError::Planning("subtask without description".to_string()));
    }
    TaskPlan::new(query, subtasks)
}

pub struct TaskPlanner {
    llm: Arc<dyn LlmClient>,
    tool_catalog: String,
    request_timeout: Duration,
}

impl TaskPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, tool_catalog: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            llm,
            tool_catalog: tool_catalog.into(),
            request_timeout,
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a task planner. Break the user's request into an ordered list of subtasks.\n\n\
             Available tools:\n{}\n\n\
             Reply with JSON only:\n\
             {{\"subtasks\": [{{\"description\": \"...\", \"tool\": \"tool_name or null\", \"parameters\": {{...}}}}]}}\n\
             Use a tool only when one fits; otherwise set \"tool\" to null.",
            self.tool_catalog
        )
    }

    /// 生成计划；只有传输层失败才返回错误
    pub async fn plan(&self, query: &str) -> Result<TaskPlan, AgentError> {
        let request = GenerationRequest::new(vec![
            Message::system(self.system_prompt()),
            Message::user(query.to_string()),
        ]);
        let response = match timeout(self.request_timeout, self.llm.generate(&request)).await {
            Ok(r) => r?,
            Err(_) => return Err(AgentError::Timeout(self.request_timeout)),
        };

        let parsed = extract(&response)
            .and_then(|e| {
                e.text
                    .ok_or_else(|| AgentError::Planning("planner replied without text".to_string()))
            })
            .and_then(|text| parse_plan(query, &text));

        match parsed {
            Ok(plan) => {
                tracing::info!(task_id = %plan.task_id, subtasks = plan.subtasks.len(), "plan created");
                Ok(plan)
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed plan, falling back to single subtask");
                Ok(TaskPlan::single(query))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SubtaskStatus;
    use crate::llm::{LlmError, ModelResponse, ScriptedLlmClient};

    #[test]
    fn test_parse_fenced_plan() {
        let output = "```json\n{\"subtasks\": [\
            {\"description\": \"计算 10 的平方\", \"tool\": \"calculate\", \"parameters\": {\"expression\": \"10^2\"}},\
            {\"description\": \"查询北京天气\", \"tool\": \"weather\", \"parameters\": {\"location\": \"北京\"}}\
            ]}\n```";
        let plan = parse_plan("q", output).unwrap();
        assert_eq!(plan.subtasks.len(), 2);
        assert_eq!(plan.subtasks[0].id, "subtask_0");
        assert_eq!(plan.subtasks[1].id, "subtask_1");
        assert_eq!(plan.subtasks[0].tool_name.as_deref(), Some("calculate"));
        assert_eq!(plan.subtasks[1].parameters["location"], "北京");
        assert!(plan
            .subtasks
            .iter()
            .all(|s| s.status == SubtaskStatus::Pending));
    }

    #[test]
    fn test_parse_null_tool() {
        let plan = parse_plan(
            "q",
            r#"{"subtasks": [{"description": "写一首诗", "tool": null}, {"description": "x", "tool": "none"}]}"#,
        )
        .unwrap();
        assert!(plan.subtasks.iter().all(|s| s.tool_name.is_none()));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_plan("q", "sorry, I can't").is_err());
        assert!(parse_plan("q", r#"{"subtasks": []}"#).is_err());
        assert!(parse_plan("q", r#"{"steps": [1, 2]}"#).is_err());
    }

    #[tokio::test]
    async fn test_malformed_output_degrades_to_single_subtask() {
        let llm = Arc::new(ScriptedLlmClient::always_text("{not json at all"));
        let planner = TaskPlanner::new(llm, "", Duration::from_secs(1));
        let query = "帮我 规划一下 周末";
        let plan = planner.plan(query).await.unwrap();
        assert_eq!(plan.subtasks.len(), 1);
        assert_eq!(plan.subtasks[0].description, query);
        assert!(plan.subtasks[0].tool_name.is_none());
    }

    #[tokio::test]
    async fn test_empty_response_degrades() {
        let llm = Arc::new(ScriptedLlmClient::new(|_| Ok(ModelResponse::default())));
        let planner = TaskPlanner::new(llm, "", Duration::from_secs(1));
        let plan = planner.plan("q").await.unwrap();
        assert_eq!(plan.subtasks.len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_is_returned() {
        let llm = Arc::new(ScriptedLlmClient::new(|_| Err(LlmError::Http("down".into()))));
        let planner = TaskPlanner::new(llm, "", Duration::from_secs(1));
        assert!(matches!(
            planner.plan("q").await,
            Err(AgentError::Llm(LlmError::Http(_)))
        ));
    }
}
