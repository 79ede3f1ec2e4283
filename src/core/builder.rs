//! 引擎构建器：从配置组装 LLM 路由、工具、缓存与调度
//!
//! 所有接入方式（CLI / Web / 测试）共用同一套组装逻辑。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{Engine, EngineSettings};
use crate::llm::{GeminiClient, LlmClient, MockLlmClient, ModelRouter, OpenAiClient};
use crate::react::ReactConfig;
use crate::tools::{builtin_registry, ToolExecutor, ToolRegistry};

/// 根据配置与环境变量选择 LLM 后端（Gemini / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig, model: &str) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let base = cfg.llm.base_url.as_deref();
    let gemini_key = std::env::var("GEMINI_API_KEY").ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();

    match provider.as_str() {
        "gemini" if gemini_key.is_some() => {
            tracing::info!("Using Gemini LLM ({})", model);
            Arc::new(GeminiClient::new(base, model, gemini_key.as_deref()))
        }
        "openai" if openai_key.is_some() => {
            tracing::info!("Using OpenAI-compatible LLM ({})", model);
            Arc::new(OpenAiClient::new(base, model, openai_key.as_deref()))
        }
        "mock" => Arc::new(MockLlmClient),
        other => {
            tracing::warn!(provider = other, "No API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

/// 引擎构建器
pub struct EngineBuilder {
    config: AppConfig,
    router: Option<ModelRouter>,
    registry: Option<ToolRegistry>,
}

impl EngineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            router: None,
            registry: None,
        }
    }

    /// 两个档位共用指定客户端（测试与嵌入场景）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.router = Some(ModelRouter::single(llm));
        self
    }

    pub fn with_router(mut self, router: ModelRouter) -> Self {
        self.router = Some(router);
        self
    }

    /// 替换内置工具集
    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn settings(&self) -> EngineSettings {
        let cfg = &self.config;
        EngineSettings {
            react: ReactConfig {
                max_iterations: cfg.agent.max_iterations.max(1),
                request_timeout: cfg.request_timeout(),
                stream: cfg.llm.stream,
                final_answer_markers: cfg.agent.final_answer_markers.clone(),
            },
            cache_enabled: cfg.cache.enabled,
            cache_capacity: cfg.cache.max_capacity,
            cache_ttl: cfg.cache_ttl(),
            max_batch_concurrency: cfg.batch.max_concurrency,
            max_traces: cfg.trace.max_traces,
        }
    }

    fn build_router(&self) -> ModelRouter {
        let fast = create_llm_from_config(&self.config, &self.config.llm.fast_model);
        let capable = create_llm_from_config(&self.config, &self.config.llm.capable_model);
        ModelRouter::new(fast, capable)
    }

    pub fn build(self) -> Engine {
        let settings = self.settings();
        let router = match self.router {
            Some(router) => router,
            None => self.build_router(),
        };
        let registry = self.registry.unwrap_or_else(builtin_registry);
        let tools = Arc::new(ToolExecutor::from_shared(
            Arc::new(registry),
            self.config.tool_timeout(),
        ));
        tracing::info!(tools = ?tools.tool_names(), "engine built");
        Engine::new(router, tools, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    #[test]
    fn test_settings_follow_config() {
        let mut cfg = AppConfig::default();
        cfg.agent.max_iterations = 3;
        cfg.batch.max_concurrency = 0;
        cfg.llm.stream = false;
        let settings = EngineBuilder::new(cfg).settings();
        assert_eq!(settings.react.max_iterations, 3);
        assert!(!settings.react.stream);
        assert_eq!(settings.max_batch_concurrency, 0);
    }

    #[test]
    fn test_mock_provider() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        assert_eq!(create_llm_from_config(&cfg, "x").model_name(), "mock");
    }

    #[tokio::test]
    async fn test_build_with_llm() {
        let engine = EngineBuilder::new(AppConfig::default())
            .with_llm(Arc::new(ScriptedLlmClient::always_text("Final Answer: ok")))
            .build();
        assert!(engine.tools().has_tool("calculate"));
        let out = engine.process("hello", true).await.unwrap();
        assert_eq!(out.answer, "ok");
        assert_eq!(out.model_used, "scripted");
    }
}
