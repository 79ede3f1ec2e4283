//! 质量评估：用一组测试用例（黄金数据集）驱动引擎，统计成功率、延迟与工具调用有效性
//!
//! 每个用例走单智能体路径且不使用缓存，工具调用信息取自该次运行的轨迹。
//! 结果可导出为 `{"metrics": {...}, "results": [...]}` JSON 文档。

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::core::{AgentError, Engine};

/// 期望的答案形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerType {
    /// 至少含一个数字
    Number,
    /// 非空文本
    Text,
}

/// 测试用例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub query: String,
    /// 期望至少调用一次的工具
    #[serde(default)]
    pub expected_tool: Option<String>,
    /// 答案必须包含的全部关键词
    #[serde(default)]
    pub expected_answer_contains: Vec<String>,
    #[serde(default)]
    pub expected_answer_type: Option<AnswerType>,
}

impl TestCase {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            expected_tool: None,
            expected_answer_contains: Vec::new(),
            expected_answer_type: None,
        }
    }

    pub fn expect_tool(mut self, tool: impl Into<String>) -> Self {
        self.expected_tool = Some(tool.into());
        self
    }

    pub fn expect_contains(mut self, keywords: &[&str]) -> Self {
        self.expected_answer_contains = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn expect_type(mut self, answer_type: AnswerType) -> Self {
        self.expected_answer_type = Some(answer_type);
        self
    }

    /// 按答案与实际调用过的工具判定是否通过
    pub fn check(&self, answer: &str, tools_called: &[String]) -> bool {
        if let Some(tool) = &self.expected_tool {
            if !tools_called.iter().any(|t| t == tool) {
                return false;
            }
        }
        if !self
            .expected_answer_contains
            .iter()
            .all(|k| answer.contains(k.as_str()))
        {
            return false;
        }
        match self.expected_answer_type {
            Some(AnswerType::Number) => answer.chars().any(|c| c.is_ascii_digit()),
            Some(AnswerType::Text) => !answer.trim().is_empty(),
            None => true,
        }
    }
}

/// 单个用例的附加指标
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseMetrics {
    /// 字符数
    pub answer_length: usize,
    pub latency_ms: f64,
    pub tool_call_count: usize,
}

/// 单个用例的评估结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub test_case: TestCase,
    pub success: bool,
    pub latency_ms: f64,
    /// 第一个被调用的工具
    pub tool_called: Option<String>,
    pub actual_answer: Option<String>,
    pub error: Option<String>,
    pub metrics: Option<CaseMetrics>,
}

/// 汇总指标；比率为百分比
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct EvaluationMetrics {
    pub total_tests: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    /// 调用过工具的用例数
    pub tool_call_count: usize,
    /// 调用过工具的用例中通过的比例
    pub tool_call_effectiveness: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub metrics: EvaluationMetrics,
    pub results: Vec<EvaluationResult>,
}

pub struct AgentEvaluator<'a> {
    engine: &'a Engine,
    results: Vec<EvaluationResult>,
}

impl<'a> AgentEvaluator<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self {
            engine,
            results: Vec::new(),
        }
    }

    /// 顺序运行全部用例，返回累计后的汇总指标
    pub async fn evaluate(&mut self, cases: &[TestCase]) -> EvaluationMetrics {
        for (i, case) in cases.iter().enumerate() {
            let result = self.run_case(case).await;
            tracing::info!(
                case = i + 1,
                total = cases.len(),
                query = %case.query,
                success = result.success,
                latency_ms = result.latency_ms,
                "evaluation case finished"
            );
            self.results.push(result);
        }
        let metrics = self.metrics();
        tracing::info!(
            total = metrics.total_tests,
            success_rate = metrics.success_rate,
            average_latency_ms = metrics.average_latency_ms,
            "evaluation finished"
        );
        metrics
    }

    async fn run_case(&self, case: &TestCase) -> EvaluationResult {
        let start = Instant::now();
        let outcome = self.engine.process(&case.query, false).await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(outcome) => {
                let tools_called = outcome
                    .trace_id
                    .as_deref()
                    .map(|id| self.tools_called(id))
                    .unwrap_or_default();
                let success = case.check(&outcome.answer, &tools_called);
                EvaluationResult {
                    test_case: case.clone(),
                    success,
                    latency_ms,
                    tool_called: tools_called.first().cloned(),
                    metrics: Some(CaseMetrics {
                        answer_length: outcome.answer.chars().count(),
                        latency_ms,
                        tool_call_count: tools_called.len(),
                    }),
                    actual_answer: Some(outcome.answer),
                    error: None,
                }
            }
            Err(e) => EvaluationResult {
                test_case: case.clone(),
                success: false,
                latency_ms,
                tool_called: None,
                actual_answer: None,
                error: Some(e.to_string()),
                metrics: None,
            },
        }
    }

    fn tools_called(&self, trace_id: &str) -> Vec<String> {
        self.engine
            .traces()
            .summary(Some(trace_id))
            .map(|s| {
                s.tool_calls
                    .iter()
                    .filter_map(|c| c.get("tool").and_then(|t| t.as_str()))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn results(&self) -> &[EvaluationResult] {
        &self.results
    }

    pub fn metrics(&self) -> EvaluationMetrics {
        if self.results.is_empty() {
            return EvaluationMetrics::default();
        }
        let total = self.results.len();
        let success_count = self.results.iter().filter(|r| r.success).count();
        let latencies: Vec<f64> = self.results.iter().map(|r| r.latency_ms).collect();

        let with_tools: Vec<&EvaluationResult> =
            self.results.iter().filter(|r| r.tool_called.is_some()).collect();
        let effective = with_tools.iter().filter(|r| r.success).count();

        EvaluationMetrics {
            total_tests: total,
            success_count,
            failed_count: total - success_count,
            success_rate: percent(success_count, total),
            average_latency_ms: latencies.iter().sum::<f64>() / total as f64,
            min_latency_ms: latencies.iter().copied().fold(f64::INFINITY, f64::min),
            max_latency_ms: latencies.iter().copied().fold(0.0, f64::max),
            tool_call_count: with_tools.len(),
            tool_call_effectiveness: percent(effective, with_tools.len()),
        }
    }

    pub fn report(&self) -> EvaluationReport {
        EvaluationReport {
            metrics: self.metrics(),
            results: self.results.clone(),
        }
    }

    pub fn export_to(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&self.report()).map_err(std::io::Error::other)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), cases = self.results.len(), "evaluation exported");
        Ok(())
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// 内置黄金数据集，覆盖计算、日程、天气
pub fn golden_dataset() -> Vec<TestCase> {
    vec![
        TestCase::new("请帮我计算 25 × 4 + 100 ÷ 5")
            .expect_tool("calculate")
            .expect_contains(&["120"])
            .expect_type(AnswerType::Number),
        TestCase::new("我今天有什么日程安排？")
            .expect_tool("calendar")
            .expect_contains(&["日程"]),
        TestCase::new("北京今天的天气怎么样？")
            .expect_tool("weather")
            .expect_contains(&["北京", "天气"]),
        TestCase::new("请计算 100 + 200")
            .expect_tool("calculate")
            .expect_contains(&["300"])
            .expect_type(AnswerType::Number),
    ]
}

/// 从 JSON 文件读取用例数组
pub fn load_dataset(path: &Path) -> Result<Vec<TestCase>, AgentError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AgentError::Config(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&raw).map_err(|e| AgentError::Config(format!("{}: {e}", path.display())))
}
