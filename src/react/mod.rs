//! 认知层：响应解析、ReAct 主循环、任务规划、子任务执行

pub mod executor;
pub mod extractor;
pub mod loop_;
pub mod planner;

pub use executor::SubtaskExecutor;
pub use extractor::{extract, extract_chunks, extract_structured, parse_text_calls, Extraction};
pub use loop_::{strip_final_marker, LoopState, ReactConfig, ReactLoop, ReactOutcome};
pub use planner::{parse_plan, TaskPlanner};
