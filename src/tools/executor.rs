//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时；execute 校验失败时返回 AgentError（UnknownTool / MissingParameter 等），
//! 工具体失败或超时则返回 ToolOutcome::Failed。每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{ToolCallIntent, ToolDescriptor, ToolOutcome, ToolRegistry};

/// 工具执行器：对每次调用施加超时并输出审计日志
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self::from_shared(Arc::new(registry), Duration::from_secs(timeout_secs))
    }

    pub fn from_shared(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub async fn execute(&self, intent: &ToolCallIntent) -> Result<ToolOutcome, AgentError> {
        let start = Instant::now();
        let args_preview = args_preview(&intent.arguments_view());
        let result = timeout(self.timeout, self.registry.invoke_intent(intent)).await;

        let outcome_label = match &result {
            Ok(Ok(ToolOutcome::Success(_))) => "ok",
            Ok(Ok(ToolOutcome::Failed(_))) => "error",
            Ok(Err(_)) => "rejected",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": intent.tool_name,
            "ok": outcome_label == "ok",
            "outcome": outcome_label,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(r) => r,
            Err(_) => Ok(ToolOutcome::Failed(format!(
                "Tool timeout: {} did not finish within {:?}",
                intent.tool_name, self.timeout
            ))),
        }
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.registry.descriptors()
    }

    pub fn catalog(&self) -> String {
        self.registry.catalog()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ParamSpec, Tool};
    use async_trait::async_trait;
    use serde_json::{Map, Value};

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Sleeps"
        }

        fn parameters(&self) -> Vec<ParamSpec> {
            vec![ParamSpec::number("ms", "sleep millis")]
        }

        async fn execute(&self, args: Map<String, Value>) -> Result<String, String> {
            let ms = args["ms"].as_f64().unwrap_or(0.0) as u64;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok("woke".into())
        }
    }

    fn executor(timeout: Duration) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        ToolExecutor::from_shared(Arc::new(registry), timeout)
    }

    fn intent(ms: u64) -> ToolCallIntent {
        let mut args = Map::new();
        args.insert("ms".into(), Value::from(ms));
        ToolCallIntent::new("slow", args)
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed_outcome() {
        let out = executor(Duration::from_millis(20))
            .execute(&intent(500))
            .await
            .unwrap();
        assert!(!out.is_success());
        assert!(out.text().contains("timeout"));
    }

    #[tokio::test]
    async fn test_success_within_deadline() {
        let out = executor(Duration::from_secs(1))
            .execute(&intent(1))
            .await
            .unwrap();
        assert_eq!(out, ToolOutcome::Success("woke".into()));
    }

    #[tokio::test]
    async fn test_validation_errors_are_returned() {
        let err = executor(Duration::from_secs(1))
            .execute(&ToolCallIntent::new("slow", Map::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::MissingParameter { .. }));
    }
}
