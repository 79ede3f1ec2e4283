//! 模型分级路由
//!
//! 根据查询复杂度选择模型档位：
//! - 简单问答：快速轻量模型（Fast）
//! - 分析 / 解释 / 比较 / 评估 / 总结：高能力模型（Capable）
//!
//! 判定是确定性的关键词启发式，同一查询总是得到同一档位（缓存指纹依赖这一点）。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::LlmClient;

/// 模型档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// 便宜、快速
    Fast,
    /// 能力强、较慢
    Capable,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Fast => "fast",
            ModelTier::Capable => "capable",
        }
    }
}

/// 复杂度标记词
const COMPLEX_KEYWORDS: &[&str] = &[
    "分析", "解释", "详细", "比较", "评估", "总结",
    "analyze", "explain", "compare", "evaluate", "summarize",
];

/// 查询复杂度分类器
pub struct TaskClassifier;

impl TaskClassifier {
    pub fn is_complex(query: &str) -> bool {
        let content_lower = query.to_lowercase();
        COMPLEX_KEYWORDS.iter().any(|k| content_lower.contains(k))
    }

    pub fn classify(query: &str) -> ModelTier {
        if Self::is_complex(query) {
            ModelTier::Capable
        } else {
            ModelTier::Fast
        }
    }
}

/// 档位 → 客户端映射
pub struct ModelRouter {
    fast: Arc<dyn LlmClient>,
    capable: Arc<dyn LlmClient>,
    /// 调用统计：(fast, capable)
    fast_calls: AtomicUsize,
    capable_calls: AtomicUsize,
}

impl ModelRouter {
    pub fn new(fast: Arc<dyn LlmClient>, capable: Arc<dyn LlmClient>) -> Self {
        Self {
            fast,
            capable,
            fast_calls: AtomicUsize::new(0),
            capable_calls: AtomicUsize::new(0),
        }
    }

    /// 两个档位共用同一客户端
    pub fn single(client: Arc<dyn LlmClient>) -> Self {
        Self::new(client.clone(), client)
    }

    /// 按档位取客户端（不计数）
    pub fn client(&self, tier: ModelTier) -> Arc<dyn LlmClient> {
        match tier {
            ModelTier::Fast => self.fast.clone(),
            ModelTier::Capable => self.capable.clone(),
        }
    }

    /// 按查询分级并取客户端（不计数，缓存命中时不会真正调用模型）
    pub fn select(&self, query: &str) -> (ModelTier, Arc<dyn LlmClient>) {
        let tier = TaskClassifier::classify(query);
        (tier, self.client(tier))
    }

    /// 真正发起生成时计一次调用
    pub fn record_call(&self, tier: ModelTier) {
        match tier {
            ModelTier::Fast => self.fast_calls.fetch_add(1, Ordering::Relaxed),
            ModelTier::Capable => self.capable_calls.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn model_name(&self, tier: ModelTier) -> String {
        self.client(tier).model_name().to_string()
    }

    pub fn call_counts(&self) -> (usize, usize) {
        (
            self.fast_calls.load(Ordering::Relaxed),
            self.capable_calls.load(Ordering::Relaxed),
        )
    }

    /// 聚合所有档位的 token 使用；两档共用同一客户端时只计一次
    pub fn token_usage(&self) -> (u64, u64, u64) {
        if Arc::ptr_eq(&self.fast, &self.capable) {
            return self.fast.token_usage();
        }
        let (a, b) = (self.fast.token_usage(), self.capable.token_usage());
        (a.0 + b.0, a.1 + b.1, a.2 + b.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    #[test]
    fn test_classifier_complex() {
        assert_eq!(TaskClassifier::classify("分析一下这个算法的时间复杂度"), ModelTier::Capable);
        assert_eq!(TaskClassifier::classify("Please EXPLAIN recursion"), ModelTier::Capable);
        assert_eq!(TaskClassifier::classify("比较 Rust 和 Go"), ModelTier::Capable);
    }

    #[test]
    fn test_classifier_simple() {
        assert_eq!(TaskClassifier::classify("你好"), ModelTier::Fast);
        assert_eq!(TaskClassifier::classify("北京天气怎么样"), ModelTier::Fast);
    }

    #[test]
    fn test_router_selection_and_counts() {
        let fast: Arc<dyn LlmClient> =
            Arc::new(ScriptedLlmClient::always_text("f").with_model("flash"));
        let capable: Arc<dyn LlmClient> =
            Arc::new(ScriptedLlmClient::always_text("c").with_model("pro"));
        let router = ModelRouter::new(fast, capable);

        let (tier, client) = router.select("总结这篇文章");
        assert_eq!(tier, ModelTier::Capable);
        assert_eq!(client.model_name(), "pro");

        let (tier, client) = router.select("hi");
        assert_eq!(tier, ModelTier::Fast);
        assert_eq!(client.model_name(), "flash");

        assert_eq!(router.call_counts(), (0, 0));
        router.record_call(ModelTier::Capable);
        router.record_call(ModelTier::Capable);
        router.record_call(ModelTier::Fast);
        assert_eq!(router.call_counts(), (1, 2));
        assert_eq!(router.model_name(ModelTier::Fast), "flash");
    }
}
