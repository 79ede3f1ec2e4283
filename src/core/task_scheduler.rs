//! 批量调度：有界 fan-out / fan-in
//!
//! 每个输入各自成为一个 tokio 任务，Semaphore 限制同时在途的数量（0 表示不限）。
//! 全部完成后按输入顺序返回结果；单个任务 panic 只影响自己的槽位。

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::AgentError;

/// 任务调度器
pub struct TaskScheduler {
    semaphore: Option<Arc<Semaphore>>,
    max_concurrency: usize,
}

impl TaskScheduler {
    /// max_concurrency 为 0 时不限并发
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            semaphore: (max_concurrency > 0).then(|| Arc::new(Semaphore::new(max_concurrency))),
            max_concurrency,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// 对每个输入启动一个任务，等待全部完成，结果与输入一一对应
    pub async fn fan_out<I, F, Fut, T>(&self, inputs: Vec<I>, task: F) -> Vec<Result<T, AgentError>>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let total = inputs.len();
        let mut set = JoinSet::new();
        for (index, input) in inputs.into_iter().enumerate() {
            let fut = task(input);
            let semaphore = self.semaphore.clone();
            set.spawn(async move {
                let _permit = match semaphore {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };
                (index, fut.await)
            });
        }

        let mut slots: Vec<Option<Result<T, AgentError>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, value)) => slots[index] = Some(Ok(value)),
                Err(e) => tracing::error!(error = %e, "batch task aborted"),
            }
        }
        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(AgentError::Join("task panicked or was cancelled".to_string()))))
            .collect()
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let scheduler = TaskScheduler::new(4);
        let out = scheduler
            .fan_out(vec![30u64, 10, 20], |ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                ms
            })
            .await;
        let values: Vec<u64> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let scheduler = TaskScheduler::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        scheduler
            .fan_out((0..6).collect(), |_: i32| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_unbounded_runs_all_at_once() {
        let scheduler = TaskScheduler::new(0);
        let start = Instant::now();
        let out = scheduler
            .fan_out((0..8).collect(), |_: i32| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
            })
            .await;
        assert_eq!(out.len(), 8);
        assert!(start.elapsed() < Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_panicking_task_only_fails_its_slot() {
        let scheduler = TaskScheduler::new(2);
        let out = scheduler
            .fan_out(vec![1, 2, 3], |n: i32| async move {
                if n == 2 {
                    panic!("boom");
                }
                n
            })
            .await;
        assert_eq!(*out[0].as_ref().unwrap(), 1);
        assert!(matches!(out[1], Err(AgentError::Join(_))));
        assert_eq!(*out[2].as_ref().unwrap(), 3);
    }
}
