//! 响应缓存
//!
//! 以 `(档位, 规范化查询)` 的 SHA-256 指纹为键缓存最终答案。
//! 容量超限按 LRU 淘汰，过期条目在查找时惰性丢弃。
//! 并发的相同未命中由 moka 合并为一次生成，其余调用方等待同一结果并记为命中。

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use moka::policy::EvictionPolicy;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::core::AgentError;
use crate::llm::ModelTier;

/// 缓存统计（`GET /cache/stats`）
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// 百分比，保留两位小数
    pub hit_rate: f64,
    pub cache_size: u64,
}

/// 规范化：去首尾空白、合并连续空白、转小写
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// 指纹：sha256("{tier}:{normalized}") 的十六进制
pub fn fingerprint(tier: ModelTier, query: &str) -> String {
    let material = format!("{}:{}", tier.as_str(), normalize_query(query));
    format!("{:x}", Sha256::digest(material.as_bytes()))
}

pub struct ResponseCache {
    entries: Cache<String, String>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// 只读查找（不生成）
    pub async fn get(&self, tier: ModelTier, query: &str) -> Option<String> {
        self.entries.get(&fingerprint(tier, query)).await
    }

    /// 命中则直接返回 `(answer, true)`；未命中执行 `generate` 并写回，返回 `(answer, false)`。
    /// 生成失败不写入缓存，错误原样返回给所有等待者。
    pub async fn get_or_generate<F, Fut>(
        &self,
        tier: ModelTier,
        query: &str,
        generate: F,
    ) -> Result<(String, bool), AgentError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, AgentError>>,
    {
        let key = fingerprint(tier, query);
        let generated = AtomicBool::new(false);
        let result = self
            .entries
            .try_get_with(key, async {
                generated.store(true, Ordering::SeqCst);
                generate().await
            })
            .await;

        let cached = !generated.load(Ordering::SeqCst);
        if cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        match result {
            Ok(answer) => Ok((answer, cached)),
            Err(e) => Err((*e).clone()),
        }
    }

    pub async fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
    }

    pub async fn stats(&self) -> CacheStats {
        self.entries.run_pending_tasks().await;
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64 * 10000.0).round() / 100.0
        };
        CacheStats {
            hits,
            misses,
            hit_rate,
            cache_size: self.entries.entry_count(),
        }
    }
}
