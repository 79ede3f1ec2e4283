//! 模型响应的形态
//!
//! 同一句「模型说了 X」在不同后端、流式与否、不同 SDK 版本下有三种互斥的表示：
//! 顶层 text、顶层 parts 列表、candidates → content → parts 嵌套。
//! ModelResponse 按线上 JSON（camelCase）原样承载这些字段，shapes() 以固定优先级把存在的形态列成带标签的枚举，
//! 由 react::extractor 依次匹配。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 结构化函数调用：`{name, args}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// 单个 part：文本或函数调用；其它未知 part（如思考签名）保留为 Other
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    Text {
        text: String,
    },
    Other(Value),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn call(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Part::FunctionCall {
            function_call: FunctionCall {
                name: name.into(),
                args,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
    #[serde(default)]
    pub total_token_count: u64,
}

/// 一次（或一个流式分片的）模型响应
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<Part>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

/// 形态标签，按匹配优先级排列
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseShape<'a> {
    Parts(&'a [Part]),
    Candidates(&'a [Candidate]),
    FlatText(&'a str),
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self {
            parts: Some(parts),
            ..Self::default()
        }
    }

    /// 包成单个 candidate（Gemini 风格）
    pub fn from_candidate(parts: Vec<Part>) -> Self {
        Self {
            candidates: Some(vec![Candidate {
                content: Some(Content {
                    parts,
                    role: Some("model".to_string()),
                }),
                finish_reason: None,
            }]),
            ..Self::default()
        }
    }

    /// 存在的形态，优先级：parts > candidates > text。
    /// 结构化函数调用只可能出现在前两者，排在纯文本之前，保证工具调用不会被伴随文本吞掉。
    pub fn shapes(&self) -> Vec<ResponseShape<'_>> {
        let mut shapes = Vec::with_capacity(3);
        if let Some(parts) = &self.parts {
            shapes.push(ResponseShape::Parts(parts));
        }
        if let Some(candidates) = &self.candidates {
            shapes.push(ResponseShape::Candidates(candidates));
        }
        if let Some(text) = &self.text {
            shapes.push(ResponseShape::FlatText(text));
        }
        shapes
    }
}
