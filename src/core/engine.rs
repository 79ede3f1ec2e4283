//! 引擎门面：单智能体（带缓存与分级）、批量、多智能体三条入口
//!
//! - process：分级选模型 → 缓存查找 → 未命中跑 ReAct 并写回
//! - process_batch：有界并发 fan-out，结果按输入顺序返回，各自带 latency_ms
//! - process_multi_agent：Planner（高能力档）+ SubtaskExecutor（快速档）

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::{AgentError, MultiAgentOutcome, Orchestrator, TaskScheduler};
use crate::llm::{CacheStats, ModelRouter, ModelTier, ResponseCache};
use crate::observability::{Trace, TraceStore};
use crate::react::{ReactConfig, ReactLoop, SubtaskExecutor, TaskPlanner};
use crate::tools::ToolExecutor;

/// 单次对话结果（`POST /chat`）
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub query: String,
    pub answer: String,
    pub model_used: String,
    pub tier: ModelTier,
    pub latency_ms: u64,
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
    /// 本次实际运行 ReAct 时的轨迹 id；缓存命中时为空
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// 批量中单条失败时的错误文本
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 批量结果（`POST /chat/batch`）
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub results: Vec<ChatOutcome>,
    pub total_time_ms: u64,
    pub average_latency_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenStats {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// 运行统计（`GET /stats`）
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub fast_model_calls: usize,
    pub capable_model_calls: usize,
    pub cache_enabled: bool,
    pub cache: CacheStats,
    pub tokens: TokenStats,
    pub traces: usize,
    pub max_batch_concurrency: usize,
}

/// 引擎运行参数
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub react: ReactConfig,
    pub cache_enabled: bool,
    pub cache_capacity: u64,
    pub cache_ttl: Duration,
    pub max_batch_concurrency: usize,
    pub max_traces: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            react: ReactConfig::default(),
            cache_enabled: true,
            cache_capacity: 200,
            cache_ttl: Duration::from_secs(3600),
            max_batch_concurrency: 8,
            max_traces: 500,
        }
    }
}

pub struct Engine {
    router: ModelRouter,
    tools: Arc<ToolExecutor>,
    cache: ResponseCache,
    cache_enabled: bool,
    react: ReactConfig,
    orchestrator: Orchestrator,
    scheduler: TaskScheduler,
    traces: TraceStore,
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
}

impl Engine {
    pub fn new(router: ModelRouter, tools: Arc<ToolExecutor>, settings: EngineSettings) -> Self {
        let timeout = settings.react.request_timeout;
        let planner = TaskPlanner::new(router.client(ModelTier::Capable), tools.catalog(), timeout);
        let executor = SubtaskExecutor::new(tools.clone(), router.client(ModelTier::Fast), timeout);
        Self {
            orchestrator: Orchestrator::new(planner, executor),
            cache: ResponseCache::new(settings.cache_capacity, settings.cache_ttl),
            cache_enabled: settings.cache_enabled,
            react: settings.react,
            scheduler: TaskScheduler::new(settings.max_batch_concurrency),
            traces: TraceStore::new(settings.max_traces),
            router,
            tools,
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
        }
    }

    pub fn tools(&self) -> &ToolExecutor {
        &self.tools
    }

    pub fn traces(&self) -> &TraceStore {
        &self.traces
    }

    /// 单智能体路径
    pub async fn process(&self, query: &str, use_cache: bool) -> Result<ChatOutcome, AgentError> {
        let start = Instant::now();
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let (tier, client) = self.router.select(query);
        let model_used = client.model_name().to_string();
        let react = ReactLoop::new(client, self.tools.clone(), self.react.clone());

        let trace_id = OnceLock::new();
        let generate = || async {
            self.router.record_call(tier);
            let mut trace = Trace::new();
            let _ = trace_id.set(trace.trace_id.clone());
            let result = react.run(query, &mut trace).await;
            self.traces.push(trace);
            result.map(|outcome| outcome.answer)
        };

        let result = if use_cache && self.cache_enabled {
            self.cache.get_or_generate(tier, query, generate).await
        } else {
            generate().await.map(|answer| (answer, false))
        };

        let (answer, cached) = result.inspect_err(|e| {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, tier = tier.as_str(), "query failed");
        })?;

        let latency_ms = start.elapsed().as_millis() as u64;
        tracing::info!(tier = tier.as_str(), model = %model_used, cached, latency_ms, "query processed");
        Ok(ChatOutcome {
            query: query.to_string(),
            answer,
            model_used,
            tier,
            latency_ms,
            cached,
            timestamp: Utc::now(),
            trace_id: trace_id.get().cloned(),
            error: None,
        })
    }

    /// 批量路径：各查询并发执行，单条失败不影响其余
    pub async fn process_batch(self: &Arc<Self>, queries: Vec<String>, use_cache: bool) -> BatchOutcome {
        let start = Instant::now();
        let results = self
            .scheduler
            .fan_out(queries.clone(), |query| {
                let engine = Arc::clone(self);
                async move {
                    let started = Instant::now();
                    engine
                        .process(&query, use_cache)
                        .await
                        .unwrap_or_else(|e| engine.failed_outcome(&query, &e, started))
                }
            })
            .await;

        let results: Vec<ChatOutcome> = results
            .into_iter()
            .zip(queries)
            .map(|(result, query)| {
                result.unwrap_or_else(|e| self.failed_outcome(&query, &e, start))
            })
            .collect();

        let average_latency_ms = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.latency_ms as f64).sum::<f64>() / results.len() as f64
        };
        BatchOutcome {
            results,
            total_time_ms: start.elapsed().as_millis() as u64,
            average_latency_ms,
        }
    }

    fn failed_outcome(&self, query: &str, error: &AgentError, started: Instant) -> ChatOutcome {
        let tier = crate::llm::TaskClassifier::classify(query);
        ChatOutcome {
            query: query.to_string(),
            answer: String::new(),
            model_used: self.router.model_name(tier),
            tier,
            latency_ms: started.elapsed().as_millis() as u64,
            cached: false,
            timestamp: Utc::now(),
            trace_id: None,
            error: Some(error.to_string()),
        }
    }

    /// 多智能体路径
    pub async fn process_multi_agent(&self, query: &str) -> Result<MultiAgentOutcome, AgentError> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let mut trace = Trace::new();
        let result = self.orchestrator.run(query, &mut trace).await;
        self.traces.push(trace);
        if result.is_err() {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    pub async fn stats(&self) -> EngineStats {
        let (fast, capable) = self.router.call_counts();
        let (prompt, completion, total) = self.router.token_usage();
        EngineStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            fast_model_calls: fast,
            capable_model_calls: capable,
            cache_enabled: self.cache_enabled,
            cache: self.cache.stats().await,
            tokens: TokenStats {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: total,
            },
            traces: self.traces.len(),
            max_batch_concurrency: self.scheduler.max_concurrency(),
        }
    }

    pub fn export_traces(&self, path: &Path) -> std::io::Result<()> {
        self.traces.export_to(path)
    }
}
