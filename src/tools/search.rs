//! 搜索工具：先查内置知识库，未命中时返回模拟搜索结果

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::tools::{arg_str, ParamSpec, Tool};

const KNOWLEDGE_BASE: &[(&str, &str)] = &[
    (
        "react",
        "ReAct 是 Reasoning and Acting 的缩写，是一种智能体架构模式，结合了推理和行动能力。",
    ),
    (
        "agent",
        "AI 智能体是一个能够感知环境、进行推理并采取行动的自主系统。",
    ),
    (
        "gemini",
        "Gemini 是 Google 开发的大语言模型，支持多模态理解和函数调用。",
    ),
];

pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "在知识库中搜索信息"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::string("query", "搜索关键词")]
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<String, String> {
        let query = arg_str(&args, "query").unwrap_or_default();
        let lower = query.to_lowercase();
        if let Some((_, entry)) = KNOWLEDGE_BASE.iter().find(|(k, _)| lower.contains(k)) {
            return Ok(format!("知识库查询结果: {entry}"));
        }
        Ok(format!("搜索 '{query}' 的结果: 知识库中未找到相关信息"))
    }
}
