//! 多智能体编排：Planner → 按声明顺序执行每个子任务 → 汇总最终答案
//!
//! 计划是线性序列，不是依赖图。单个子任务失败不影响其余子任务；
//! 失败项以「失败 + 错误文本」出现在汇总答案中。

use std::time::Instant;

use serde::Serialize;
use serde_json::json;

use crate::core::{AgentError, PlanStatus, Subtask, SubtaskStatus, TaskPlan};
use crate::observability::{StepType, Trace};
use crate::react::{SubtaskExecutor, TaskPlanner};

/// 多智能体路径的结果（`POST /chat/multi-agent`）
#[derive(Debug, Clone, Serialize)]
pub struct MultiAgentOutcome {
    pub task_id: String,
    pub original_query: String,
    pub subtasks_count: usize,
    /// 每个子任务的完整轨迹（描述、工具、状态、结果）
    pub subtasks: Vec<Subtask>,
    pub final_answer: String,
    pub total_time_seconds: f64,
    pub status: PlanStatus,
}

/// 汇总：单子任务原样返回结果；多个子任务拼成编号摘要
pub fn aggregate_answer(subtasks: &[Subtask]) -> String {
    if let [only] = subtasks {
        return only.result.clone().unwrap_or_default();
    }
    let mut summary = format!("任务完成，共执行 {} 个子任务：\n", subtasks.len());
    for (i, s) in subtasks.iter().enumerate() {
        let label = if s.status == SubtaskStatus::Failed {
            "结果（失败）"
        } else {
            "结果"
        };
        summary.push_str(&format!(
            "\n{}. {}\n   {}: {}\n",
            i + 1,
            s.description,
            label,
            s.result.as_deref().unwrap_or("")
        ));
    }
    summary
}

pub struct Orchestrator {
    planner: TaskPlanner,
    executor: SubtaskExecutor,
}

impl Orchestrator {
    pub fn new(planner: TaskPlanner, executor: SubtaskExecutor) -> Self {
        Self { planner, executor }
    }

    /// 规划并执行；只有规划阶段的传输错误会返回 Err
    pub async fn run(&self, query: &str, trace: &mut Trace) -> Result<MultiAgentOutcome, AgentError> {
        let start = Instant::now();
        trace.record(StepType::Perception, json!({ "query": query }))?;

        let mut plan = self.planner.plan(query).await?;
        trace.record(
            StepType::Thinking,
            json!({
                "task_id": plan.task_id,
                "subtasks": plan.subtasks.iter().map(|s| json!({
                    "id": s.id,
                    "description": s.description,
                    "tool": s.tool_name,
                })).collect::<Vec<_>>(),
            }),
        )?;

        self.execute_plan(&mut plan, trace).await?;

        let final_answer = aggregate_answer(&plan.subtasks);
        trace.record(StepType::Response, json!({ "answer": final_answer }))?;

        tracing::info!(
            task_id = %plan.task_id,
            status = %plan.status,
            completed = plan.completed_count(),
            failed = plan.failed_count(),
            "plan finished"
        );

        Ok(MultiAgentOutcome {
            task_id: plan.task_id,
            original_query: plan.original_query,
            subtasks_count: plan.subtasks.len(),
            subtasks: plan.subtasks,
            final_answer,
            total_time_seconds: start.elapsed().as_secs_f64(),
            status: plan.status,
        })
    }

    /// 顺序执行所有子任务，结束后计划状态：至少一个完成为 completed，否则 failed
    pub async fn execute_plan(&self, plan: &mut TaskPlan, trace: &mut Trace) -> Result<(), AgentError> {
        plan.advance(PlanStatus::Executing)?;
        for subtask in plan.subtasks.iter_mut() {
            trace.record(
                StepType::Action,
                json!({
                    "subtask": subtask.id,
                    "description": subtask.description,
                    "tool": subtask.tool_name,
                    "parameters": subtask.parameters,
                }),
            )?;
            let result = self.executor.execute(subtask).await?;
            trace.record(
                StepType::Observation,
                json!({
                    "subtask": subtask.id,
                    "status": subtask.status,
                    "result": result,
                }),
            )?;
        }
        let next = if plan.completed_count() > 0 {
            PlanStatus::Completed
        } else {
            PlanStatus::Failed
        };
        plan.advance(next)
    }
}
