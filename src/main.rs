//! Conductor 命令行入口
//!
//! - `conductor <query>`：单智能体（缓存 + 档位选择）
//! - `conductor --multi <query>`：规划 + 执行
//! - `conductor --batch <q1> <q2> ...`：并发批量
//! - `conductor --evaluate [--dataset cases.json]`：按测试用例评估
//!
//! 结果以 JSON 打印到标准输出；配置了 trace.export_path 时导出轨迹。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use conductor::config::load_config;
use conductor::observability::{self, golden_dataset, load_dataset, AgentEvaluator};
use conductor::EngineBuilder;

#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(version, about = "工具增强型智能体编排引擎")]
#[command(long_about = r#"
工具增强型智能体编排引擎：ReAct 推理循环、任务规划与执行、响应缓存与模型分级。

配置加载顺序：
1. config/default.toml
2. --config <path>
3. 环境变量 CONDUCTOR__*（如 CONDUCTOR__LLM__PROVIDER=mock）

示例：
  conductor "请计算 25 × 4 + 100 ÷ 5"
  conductor --multi "计算 10 的平方，然后查询北京今天的天气"
  conductor --batch "你好" "北京天气怎么样" "分析一下 Rust 的所有权"
  conductor --evaluate --dataset cases.json
"#)]
struct Cli {
    /// 查询文本；--batch 时每个参数是一条独立查询，否则合并为一条
    #[arg(required_unless_present = "evaluate", value_name = "QUERY")]
    query: Vec<String>,

    /// 多智能体模式：先规划子任务再逐个执行
    #[arg(long, conflicts_with = "batch")]
    multi: bool,

    /// 批量模式：并发处理每条查询
    #[arg(long)]
    batch: bool,

    /// 评估模式：运行测试用例并输出指标，默认使用内置黄金数据集
    #[arg(long, conflicts_with_all = ["multi", "batch"])]
    evaluate: bool,

    /// 评估用例 JSON 文件（TestCase 数组）
    #[arg(long, value_name = "PATH", requires = "evaluate")]
    dataset: Option<PathBuf>,

    /// 不读写响应缓存
    #[arg(long)]
    no_cache: bool,

    /// 配置文件路径
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Debug, PartialEq)]
enum Mode {
    Single(String),
    Multi(String),
    Batch(Vec<String>),
    Evaluate(Option<PathBuf>),
}

impl Cli {
    fn mode(&self) -> Mode {
        if self.evaluate {
            Mode::Evaluate(self.dataset.clone())
        } else if self.batch {
            Mode::Batch(self.query.clone())
        } else if self.multi {
            Mode::Multi(self.query.join(" "))
        } else {
            Mode::Single(self.query.join(" "))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init();

    let cfg = match &cli.config {
        Some(path) => load_config(Some(path.clone()))
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => load_config(None).unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            Default::default()
        }),
    };
    let export_path = cfg.trace.export_path.clone();
    let engine = Arc::new(EngineBuilder::new(cfg).build());
    let use_cache = !cli.no_cache;

    let output = match cli.mode() {
        Mode::Single(query) => {
            let outcome = engine
                .process(&query, use_cache)
                .await
                .context("query failed")?;
            serde_json::to_string_pretty(&outcome)?
        }
        Mode::Multi(query) => {
            let outcome = engine
                .process_multi_agent(&query)
                .await
                .context("multi-agent run failed")?;
            serde_json::to_string_pretty(&outcome)?
        }
        Mode::Batch(queries) => {
            let outcome = engine.process_batch(queries, use_cache).await;
            serde_json::to_string_pretty(&outcome)?
        }
        Mode::Evaluate(dataset) => {
            let cases = match dataset {
                Some(path) => load_dataset(&path)?,
                None => golden_dataset(),
            };
            let mut evaluator = AgentEvaluator::new(&engine);
            evaluator.evaluate(&cases).await;
            serde_json::to_string_pretty(&evaluator.report())?
        }
    };
    println!("{}", output);

    if let Some(path) = export_path {
        engine
            .export_traces(&path)
            .with_context(|| format!("failed to export traces to {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_single_query_words_are_joined() {
        let cli = Cli::try_parse_from(["conductor", "北京", "天气"]).unwrap();
        assert_eq!(cli.mode(), Mode::Single("北京 天气".into()));
        assert!(cli.config.is_none());
        assert!(!cli.no_cache);
    }

    #[test]
    fn test_multi_and_batch_modes() {
        let cli = Cli::try_parse_from(["conductor", "--multi", "先算", "再查"]).unwrap();
        assert_eq!(cli.mode(), Mode::Multi("先算 再查".into()));

        let cli = Cli::try_parse_from(["conductor", "--batch", "a", "b c"]).unwrap();
        assert_eq!(cli.mode(), Mode::Batch(vec!["a".into(), "b c".into()]));

        assert!(Cli::try_parse_from(["conductor", "--multi", "--batch", "q"]).is_err());
    }

    #[test]
    fn test_config_path_and_no_cache() {
        let cli = Cli::try_parse_from(["conductor", "--config", "my.toml", "--no-cache", "q"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("my.toml")));
        assert!(cli.no_cache);
    }

    #[test]
    fn test_evaluate_needs_no_query() {
        let cli = Cli::try_parse_from(["conductor", "--evaluate"]).unwrap();
        assert_eq!(cli.mode(), Mode::Evaluate(None));

        let cli = Cli::try_parse_from(["conductor", "--evaluate", "--dataset", "cases.json"])
            .unwrap();
        assert_eq!(cli.mode(), Mode::Evaluate(Some(PathBuf::from("cases.json"))));

        assert!(Cli::try_parse_from(["conductor", "--dataset", "cases.json", "q"]).is_err());
    }

    #[test]
    fn test_help_is_not_a_query() {
        let err = Cli::try_parse_from(["conductor", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);

        let err = Cli::try_parse_from(["conductor"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }
}
