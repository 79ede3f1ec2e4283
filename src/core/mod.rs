//! 核心编排层：错误、计划与子任务、多智能体编排、引擎门面、批量调度、构建器

pub mod builder;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod task_scheduler;

pub use builder::{create_llm_from_config, EngineBuilder};
pub use engine::{BatchOutcome, ChatOutcome, Engine, EngineSettings, EngineStats, TokenStats};
pub use error::AgentError;
pub use orchestrator::{aggregate_answer, MultiAgentOutcome, Orchestrator};
pub use plan::{PlanStatus, Subtask, SubtaskStatus, TaskPlan};
pub use task_scheduler::TaskScheduler;
