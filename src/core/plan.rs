//! 任务计划与子任务
//!
//! 计划是线性序列（顺序即执行顺序，无跨子任务依赖）。
//! 子任务与计划的状态都只能前进：
//! - Subtask: pending → in_progress → completed | failed
//! - TaskPlan: planning → executing → completed | failed

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl SubtaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubtaskStatus::Pending => "pending",
            SubtaskStatus::InProgress => "in_progress",
            SubtaskStatus::Completed => "completed",
            SubtaskStatus::Failed => "failed",
        }
    }

    fn can_advance_to(self, next: SubtaskStatus) -> bool {
        use SubtaskStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress) | (InProgress, Completed) | (InProgress, Failed)
        )
    }
}

impl fmt::Display for SubtaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Planning,
    Executing,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Planning => "planning",
            PlanStatus::Executing => "executing",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
        }
    }

    fn can_advance_to(self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        matches!(
            (self, next),
            (Planning, Executing) | (Executing, Completed) | (Executing, Failed)
        )
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub description: String,
    /// 绑定的工具；None 表示直接用模型回答
    pub tool_name: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub status: SubtaskStatus,
    /// 仅在 completed / failed 时有值
    pub result: Option<String>,
}

impl Subtask {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            tool_name: None,
            parameters: Map::new(),
            status: SubtaskStatus::Pending,
            result: None,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>, parameters: Map<String, Value>) -> Self {
        self.tool_name = Some(tool.into());
        self.parameters = parameters;
        self
    }

    fn advance(&mut self, next: SubtaskStatus) -> Result<(), AgentError> {
        if !self.status.can_advance_to(next) {
            return Err(AgentError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), AgentError> {
        self.advance(SubtaskStatus::InProgress)
    }

    pub fn complete(&mut self, result: impl Into<String>) -> Result<(), AgentError> {
        self.advance(SubtaskStatus::Completed)?;
        self.result = Some(result.into());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), AgentError> {
        self.advance(SubtaskStatus::Failed)?;
        self.result = Some(error.into());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub task_id: String,
    pub original_query: String,
    pub subtasks: Vec<Subtask>,
    pub status: PlanStatus,
}

impl TaskPlan {
    /// 子任务 id 必须唯一，且至少一个子任务
    pub fn new(original_query: impl Into<String>, subtasks: Vec<Subtask>) -> Result<Self, AgentError> {
        if subtasks.is_empty() {
            return Err(AgentError::Planning("plan has no subtasks".to_string()));
        }
        let mut seen = HashSet::new();
        for s in &subtasks {
            if !seen.insert(s.id.as_str()) {
                return Err(AgentError::Planning(format!("duplicate subtask id '{}'", s.id)));
            }
        }
        Ok(Self {
            task_id: format!("task_{}", uuid::Uuid::new_v4().simple()),
            original_query: original_query.into(),
            subtasks,
            status: PlanStatus::Planning,
        })
    }

    /// 单子任务计划：原样包装查询，不绑定工具
    pub fn single(original_query: impl Into<String>) -> Self {
        let query = original_query.into();
        Self {
            task_id: format!("task_{}", uuid::Uuid::new_v4().simple()),
            subtasks: vec![Subtask::new("subtask_0", query.clone())],
            original_query: query,
            status: PlanStatus::Planning,
        }
    }

    pub fn advance(&mut self, next: PlanStatus) -> Result<(), AgentError> {
        if !self.status.can_advance_to(next) {
            return Err(AgentError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn completed_count(&self) -> usize {
        self.subtasks
            .iter()
            .filter(|s| s.status == SubtaskStatus::Completed)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.subtasks
            .iter()
            .filter(|s| s.status == SubtaskStatus::Failed)
            .count()
    }
}
