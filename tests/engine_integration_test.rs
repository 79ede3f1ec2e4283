//! 引擎集成测试：单智能体、缓存、多智能体、批量

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    use conductor::config::AppConfig;
    use conductor::core::{PlanStatus, SubtaskStatus};
    use conductor::observability::{AgentEvaluator, AnswerType, TestCase};
    use conductor::llm::{GenerationRequest, LlmClient, ModelResponse, Part, ScriptedLlmClient};
    use conductor::tools::{
        builtin_registry, CalculateTool, ParamSpec, SearchTool, Tool, ToolRegistry,
    };
    use conductor::{Engine, EngineBuilder};

    fn is_planner(req: &GenerationRequest) -> bool {
        req.messages
            .first()
            .is_some_and(|m| m.content.contains("task planner"))
    }

    fn engine_with(llm: ScriptedLlmClient, registry: ToolRegistry) -> Arc<Engine> {
        let llm: Arc<dyn LlmClient> = Arc::new(llm);
        Arc::new(
            EngineBuilder::new(AppConfig::default())
                .with_llm(llm)
                .with_registry(registry)
                .build(),
        )
    }

    struct BrokenWeatherTool;

    #[async_trait]
    impl Tool for BrokenWeatherTool {
        fn name(&self) -> &str {
            "weather"
        }

        fn description(&self) -> &str {
            "查询天气"
        }

        fn parameters(&self) -> Vec<ParamSpec> {
            vec![ParamSpec::string("location", "城市")]
        }

        async fn execute(&self, _args: Map<String, Value>) -> Result<String, String> {
            Err("weather service unavailable".to_string())
        }
    }

    struct ExplodingTool;

    #[async_trait]
    impl Tool for ExplodingTool {
        fn name(&self) -> &str {
            "explode"
        }

        fn description(&self) -> &str {
            "Always panics"
        }

        async fn execute(&self, _args: Map<String, Value>) -> Result<String, String> {
            panic!("tool body blew up")
        }
    }

    #[tokio::test]
    async fn test_react_terminates_within_cap_when_model_always_calls_tools() {
        let llm = ScriptedLlmClient::new(|_| {
            let mut args = Map::new();
            args.insert("query".into(), json!("rust"));
            Ok(ModelResponse::from_candidate(vec![
                Part::text("Let me search again."),
                Part::call("search", args),
            ]))
        });
        let engine = engine_with(llm, builtin_registry());

        let outcome = engine.process("tell me about rust", false).await.unwrap();
        assert!(!outcome.answer.is_empty());

        let summary = engine.traces().summary(None).unwrap();
        assert_eq!(summary.tool_calls.len(), 5);
    }

    #[tokio::test]
    async fn test_identical_queries_hit_cache() {
        let engine = engine_with(
            ScriptedLlmClient::always_text("Final Answer: Rust 是一门系统编程语言"),
            builtin_registry(),
        );
        let first = engine.process("什么是 Rust", true).await.unwrap();
        let second = engine.process("什么是 Rust", true).await.unwrap();

        assert_eq!(first.answer, second.answer);
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.tier, second.tier);

        let stats = engine.cache_stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.cache_size, 1);
    }

    #[tokio::test]
    async fn test_complex_query_routes_to_capable_tier() {
        let fast: Arc<dyn LlmClient> =
            Arc::new(ScriptedLlmClient::always_text("fast answer").with_model("flash"));
        let capable: Arc<dyn LlmClient> =
            Arc::new(ScriptedLlmClient::always_text("deep answer").with_model("pro"));
        let engine = EngineBuilder::new(AppConfig::default())
            .with_router(conductor::llm::ModelRouter::new(fast, capable))
            .build();

        let simple = engine.process("你好", true).await.unwrap();
        let complex = engine.process("请详细分析这段代码", true).await.unwrap();
        assert_eq!(simple.model_used, "flash");
        assert_eq!(simple.answer, "fast answer");
        assert_eq!(complex.model_used, "pro");
        assert_eq!(complex.answer, "deep answer");
    }

    #[tokio::test]
    async fn test_arithmetic_scenario_through_multi_agent_path() {
        let llm = ScriptedLlmClient::new(|req| {
            if is_planner(req) {
                Ok(ModelResponse::text(
                    "```json\n{\"subtasks\": [{\"description\": \"计算 25 × 4 + 100 ÷ 5\", \
                     \"tool\": \"calculate\", \"parameters\": {\"expression\": \"25 × 4 + 100 ÷ 5\"}}]}\n```",
                ))
            } else {
                Ok(ModelResponse::text("unexpected"))
            }
        });
        let engine = engine_with(llm, builtin_registry());

        let outcome = engine
            .process_multi_agent("请计算 25 × 4 + 100 ÷ 5")
            .await
            .unwrap();
        assert_eq!(outcome.subtasks_count, 1);
        assert_eq!(outcome.subtasks[0].tool_name.as_deref(), Some("calculate"));
        assert_eq!(outcome.subtasks[0].status, SubtaskStatus::Completed);
        assert!(outcome.final_answer.contains("120"));
        assert_eq!(outcome.status, PlanStatus::Completed);
    }

    #[tokio::test]
    async fn test_failing_weather_does_not_block_calculation() {
        let llm = ScriptedLlmClient::new(|req| {
            if is_planner(req) {
                Ok(ModelResponse::text(
                    r#"{"subtasks": [
                        {"description": "计算 10 的平方", "tool": "calculate", "parameters": {"expression": "10 * 10"}},
                        {"description": "查询北京今天的天气", "tool": "weather", "parameters": {"location": "北京"}}
                    ]}"#,
                ))
            } else {
                Ok(ModelResponse::text("unexpected"))
            }
        });
        let mut registry = ToolRegistry::new();
        registry.register(CalculateTool);
        registry.register(BrokenWeatherTool);
        let engine = engine_with(llm, registry);

        let outcome = engine
            .process_multi_agent("计算 10 的平方，然后查询北京今天的天气")
            .await
            .unwrap();
        assert_eq!(outcome.subtasks_count, 2);
        assert_eq!(outcome.subtasks[0].id, "subtask_0");
        assert_eq!(outcome.subtasks[0].status, SubtaskStatus::Completed);
        assert!(outcome.subtasks[0].result.as_deref().unwrap().contains("100"));
        assert_eq!(outcome.subtasks[1].status, SubtaskStatus::Failed);
        assert!(outcome.subtasks[1]
            .result
            .as_deref()
            .unwrap()
            .contains("weather service unavailable"));
        assert!(outcome.final_answer.contains("任务完成，共执行 2 个子任务"));
        assert_eq!(outcome.status, PlanStatus::Completed);
    }

    #[tokio::test]
    async fn test_partial_failure_with_panicking_tool() {
        let llm = ScriptedLlmClient::new(|req| {
            if is_planner(req) {
                Ok(ModelResponse::text(
                    r#"{"subtasks": [
                        {"description": "a", "tool": "calculate", "parameters": {"expression": "1+1"}},
                        {"description": "b", "tool": "explode", "parameters": {}},
                        {"description": "c", "tool": "search", "parameters": {"query": "agent"}}
                    ]}"#,
                ))
            } else {
                Ok(ModelResponse::text("unexpected"))
            }
        });
        let mut registry = ToolRegistry::new();
        registry.register(CalculateTool);
        registry.register(ExplodingTool);
        registry.register(SearchTool);
        let engine = engine_with(llm, registry);

        let outcome = engine.process_multi_agent("three things").await.unwrap();
        assert_eq!(outcome.subtasks.len(), 3);
        let failed: Vec<_> = outcome
            .subtasks
            .iter()
            .filter(|s| s.status == SubtaskStatus::Failed)
            .collect();
        let completed = outcome
            .subtasks
            .iter()
            .filter(|s| s.status == SubtaskStatus::Completed)
            .count();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].description, "b");
        assert_eq!(completed, 2);
    }

    #[tokio::test]
    async fn test_malformed_plan_falls_back_to_single_subtask() {
        let llm = ScriptedLlmClient::new(|req| {
            if is_planner(req) {
                Ok(ModelResponse::text("I think you should just relax."))
            } else {
                Ok(ModelResponse::text("放松一下吧"))
            }
        });
        let engine = engine_with(llm, builtin_registry());
        let query = "周末 做什么 好？";

        let outcome = engine.process_multi_agent(query).await.unwrap();
        assert_eq!(outcome.subtasks_count, 1);
        assert_eq!(outcome.subtasks[0].description, query);
        assert!(outcome.subtasks[0].tool_name.is_none());
        assert_eq!(outcome.final_answer, "放松一下吧");
    }

    #[tokio::test]
    async fn test_batch_runs_concurrently() {
        let llm = ScriptedLlmClient::new(|req| {
            Ok(ModelResponse::text(format!("answer: {}", req.last_user_message())))
        })
        .with_latency(Duration::from_millis(150));
        let engine = engine_with(llm, builtin_registry());

        let queries: Vec<String> = (1..=4).map(|i| format!("question {}", i)).collect();
        let batch = engine.process_batch(queries, false).await;

        assert_eq!(batch.results.len(), 4);
        for (i, result) in batch.results.iter().enumerate() {
            assert_eq!(result.query, format!("question {}", i + 1));
            assert!(result.latency_ms >= 150);
            assert!(result.error.is_none());
        }
        let sum: u64 = batch.results.iter().map(|r| r.latency_ms).sum();
        assert!(batch.total_time_ms < sum);
        assert!(batch.average_latency_ms >= 150.0);
    }

    #[tokio::test]
    async fn test_trace_export_document() {
        let engine = engine_with(ScriptedLlmClient::always_text("ok"), builtin_registry());
        engine.process("a", false).await.unwrap();
        engine.process("b", false).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces.json");
        engine.export_traces(&path).unwrap();

        let doc: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let traces = doc.as_array().unwrap();
        assert_eq!(traces.len(), 2);
        for trace in traces {
            assert!(trace["trace_id"].is_string());
            assert!(trace["timestamp"].is_string());
            assert!(trace["end_timestamp"].is_string());
            assert_eq!(trace["steps"][0]["step_type"], "perception");
        }
    }

    #[tokio::test]
    async fn test_evaluator_scores_cases_from_traces() {
        let llm = ScriptedLlmClient::new(|req| {
            let last = req.last_user_message();
            if let Some(observation) = last.strip_prefix("Observation: ") {
                Ok(ModelResponse::text(format!("Final Answer: {}", observation)))
            } else {
                let mut args = Map::new();
                args.insert("expression".into(), json!("25 × 4 + 100 ÷ 5"));
                Ok(ModelResponse::from_parts(vec![Part::call("calculate", args)]))
            }
        });
        let engine = engine_with(llm, builtin_registry());

        let cases = vec![
            TestCase::new("请帮我计算 25 × 4 + 100 ÷ 5")
                .expect_tool("calculate")
                .expect_contains(&["120"])
                .expect_type(AnswerType::Number),
            TestCase::new("北京今天的天气怎么样？").expect_tool("weather"),
            TestCase::new("随便聊聊").expect_contains(&["不存在的词"]),
        ];
        let mut evaluator = AgentEvaluator::new(&engine);
        let metrics = evaluator.evaluate(&cases).await;

        assert_eq!(metrics.total_tests, 3);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.failed_count, 2);
        assert!((metrics.success_rate - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.tool_call_count, 3);
        assert!(metrics.min_latency_ms <= metrics.average_latency_ms);
        assert!(metrics.average_latency_ms <= metrics.max_latency_ms);

        let results = evaluator.results();
        assert!(results[0].success);
        assert_eq!(results[0].tool_called.as_deref(), Some("calculate"));
        assert!(results[0].actual_answer.as_deref().unwrap().contains("120"));
        assert_eq!(results[0].metrics.as_ref().unwrap().tool_call_count, 1);
        assert!(!results[1].success);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evaluation.json");
        evaluator.export_to(&path).unwrap();
        let doc: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["metrics"]["total_tests"], 3);
        assert_eq!(doc["results"].as_array().unwrap().len(), 3);
        assert_eq!(doc["results"][0]["test_case"]["expected_tool"], "calculate");
    }
}
