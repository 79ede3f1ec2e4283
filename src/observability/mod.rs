//! 可观测性：tracing 订阅器初始化、执行轨迹与质量评估

pub mod evaluation;
pub mod trace;

pub use evaluation::{
    golden_dataset, load_dataset, AgentEvaluator, AnswerType, EvaluationMetrics,
    EvaluationReport, EvaluationResult, TestCase,
};
pub use trace::{StepType, Trace, TraceStep, TraceStore, TraceSummary};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装 fmt 层 + EnvFilter（默认 info，RUST_LOG 可覆盖）；重复调用无副作用
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
