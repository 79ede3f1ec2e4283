//! 响应解析：把异构的模型响应规范化为 `{text, tool_calls}`
//!
//! 1. 结构化形态按固定优先级匹配（parts → candidates → text），取第一个非空结果
//! 2. 流式分片逐片匹配后合并
//! 3. 若只拿到文本，再按文本协议识别工具调用：JSON `{"tool": .., "args": {..}}` 或 `Action: name(args)` 行；
//!    终止标记之后的文本属于答案，不再识别调用

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::core::AgentError;
use crate::llm::{Candidate, ModelResponse, Part, ResponseShape};
use crate::tools::ToolCallIntent;

/// 规范化后的模型输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallIntent>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.tool_calls.is_empty()
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match &mut self.text {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_string()),
        }
    }

    fn merge(&mut self, other: Extraction) {
        if let Some(text) = other.text {
            self.push_text(&text);
        }
        self.tool_calls.extend(other.tool_calls);
    }

    /// 去掉只含空白的文本
    fn settle(mut self) -> Self {
        if self.text.as_deref().is_some_and(|t| t.trim().is_empty()) {
            self.text = None;
        }
        self
    }
}

fn from_parts(parts: &[Part]) -> Extraction {
    let mut out = Extraction::default();
    for part in parts {
        match part {
            Part::Text { text } => out.push_text(text),
            Part::FunctionCall { function_call } => out.tool_calls.push(ToolCallIntent::new(
                function_call.name.clone(),
                function_call.args.clone(),
            )),
            Part::Other(_) => {}
        }
    }
    out.settle()
}

fn from_candidates(candidates: &[Candidate]) -> Extraction {
    candidates
        .iter()
        .filter_map(|c| c.content.as_ref())
        .map(|content| from_parts(&content.parts))
        .find(|e| !e.is_empty())
        .unwrap_or_default()
}

/// 只做结构化形态匹配；全部为空返回 None
pub fn extract_structured(response: &ModelResponse) -> Option<Extraction> {
    response
        .shapes()
        .into_iter()
        .map(|shape| match shape {
            ResponseShape::Parts(parts) => from_parts(parts),
            ResponseShape::Candidates(candidates) => from_candidates(candidates),
            ResponseShape::FlatText(text) => Extraction {
                text: Some(text.to_string()),
                tool_calls: Vec::new(),
            }
            .settle(),
        })
        .find(|e| !e.is_empty())
}

/// 解析单个响应
pub fn extract(response: &ModelResponse) -> Result<Extraction, AgentError> {
    extract_chunks(std::slice::from_ref(response))
}

/// 解析流式分片序列：逐片匹配后按顺序合并文本与调用
pub fn extract_chunks(chunks: &[ModelResponse]) -> Result<Extraction, AgentError> {
    extract_chunks_with_markers(chunks, &[])
}

pub fn extract_with_markers(
    response: &ModelResponse,
    final_markers: &[String],
) -> Result<Extraction, AgentError> {
    extract_chunks_with_markers(std::slice::from_ref(response), final_markers)
}

/// 同 extract_chunks；文本协议只在第一个终止标记之前识别调用
pub fn extract_chunks_with_markers(
    chunks: &[ModelResponse],
    final_markers: &[String],
) -> Result<Extraction, AgentError> {
    let mut merged = Extraction::default();
    for chunk in chunks {
        if let Some(part) = extract_structured(chunk) {
            merged.merge(part);
        }
    }
    let merged = merged.settle();
    if merged.is_empty() {
        return Err(AgentError::Extraction(format!(
            "{} chunk(s) carried neither text nor function calls",
            chunks.len()
        )));
    }
    Ok(finalize(merged, final_markers))
}

/// 没有结构化调用时，尝试从终止标记之前的文本中识别调用
fn finalize(mut extraction: Extraction, final_markers: &[String]) -> Extraction {
    if !extraction.tool_calls.is_empty() {
        return extraction;
    }
    if let Some(text) = extraction.text.as_deref() {
        let before_marker = match find_final_marker(text, final_markers) {
            Some((pos, _)) => &text[..pos],
            None => text,
        };
        extraction.tool_calls = parse_text_calls(before_marker);
    }
    extraction
}

/// 最先出现的终止标记（大小写不敏感），返回 (字节位置, 字节长度)
pub fn find_final_marker(text: &str, markers: &[String]) -> Option<(usize, usize)> {
    let lower = text.to_lowercase();
    // 小写化改变字节长度时只做大小写敏感匹配
    let haystack = if lower.len() == text.len() { lower.as_str() } else { text };
    markers
        .iter()
        .filter(|m| !m.is_empty())
        .filter_map(|m| haystack.find(&m.to_lowercase()).map(|pos| (pos, m.len())))
        .min_by_key(|(pos, _)| *pos)
}

/// 文本协议：优先 JSON 调用，其次 Action 行
pub fn parse_text_calls(text: &str) -> Vec<ToolCallIntent> {
    if let Some(call) = parse_json_call(text) {
        return vec![call];
    }
    parse_action_lines(text)
}

/// `{"tool": "name", "args": {...}}`，也接受 `name` + `args`/`arguments`。
///
/// 只认两种位置：```json 围栏内，或从某行行首开始一直到文本末尾的对象。
/// 句中引用的 JSON 不算调用。
pub fn parse_json_call(text: &str) -> Option<ToolCallIntent> {
    let trimmed = text.trim();
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else {
        if !trimmed.ends_with('}') {
            return None;
        }
        &trimmed[line_leading_brace(trimmed)?..]
    };

    let value: Value = serde_json::from_str(json_str).ok()?;
    let obj = value.as_object()?;
    let name = match obj.get("tool").and_then(Value::as_str) {
        Some(tool) => tool,
        None => {
            if !obj.contains_key("args") && !obj.contains_key("arguments") {
                return None;
            }
            obj.get("name").and_then(Value::as_str)?
        }
    };
    if name.trim().is_empty() {
        return None;
    }
    let args = ["args", "arguments", "parameters"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_object))
        .cloned()
        .unwrap_or_default();
    Some(ToolCallIntent::new(name.trim(), args))
}

/// 第一个位于行首（前面只有空白）的 `{`
fn line_leading_brace(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let body = line.trim_start();
        if body.starts_with('{') {
            return Some(offset + line.len() - body.len());
        }
        offset += line.len();
    }
    None
}

static ACTION_RE: OnceLock<Regex> = OnceLock::new();

/// `Action: name(arg1, key="v", ...)`，每行一个调用
pub fn parse_action_lines(text: &str) -> Vec<ToolCallIntent> {
    let re = ACTION_RE.get_or_init(|| {
        Regex::new(r"(?mi)^\s*(?:\d+\.\s*)?Action\s*[:：]\s*([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)\s*$")
            .unwrap()
    });
    re.captures_iter(text)
        .map(|cap| {
            let name = cap[1].to_string();
            let mut named = Map::new();
            let mut positional = Vec::new();
            for piece in split_args(&cap[2]) {
                match split_named(&piece) {
                    Some((key, raw)) => {
                        named.insert(key.to_string(), parse_scalar(raw));
                    }
                    None => positional.push(parse_scalar(&piece)),
                }
            }
            ToolCallIntent {
                tool_name: name,
                arguments: named,
                positional,
            }
        })
        .collect()
}

/// 按顶层逗号切分参数，引号与括号内的逗号不切
fn split_args(raw: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    for ch in raw.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'' | '“' | '‘') => {
                quote = Some(match ch {
                    '“' => '”',
                    '‘' => '’',
                    other => other,
                });
                current.push(ch);
            }
            (None, '(' | '[' | '{') => {
                depth += 1;
                current.push(ch);
            }
            (None, ')' | ']' | '}') => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            (None, ',' | '，') if depth == 0 => {
                pieces.push(std::mem::take(&mut current));
            }
            (None, c) => current.push(c),
        }
    }
    pieces.push(current);
    pieces
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// `key=value` 形式（key 为标识符，且 `=` 不在引号内）
fn split_named(piece: &str) -> Option<(&str, &str)> {
    let eq = piece.find('=')?;
    let key = piece[..eq].trim();
    let valid = !key.is_empty()
        && key.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !key.starts_with(|c: char| c.is_ascii_digit());
    if !valid || piece[eq + 1..].starts_with('=') {
        return None;
    }
    Some((key, piece[eq + 1..].trim()))
}

fn parse_scalar(raw: &str) -> Value {
    let raw = raw.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”'), ('‘', '’')] {
        if raw.len() >= open.len_utf8() + close.len_utf8()
            && raw.starts_with(open)
            && raw.ends_with(close)
        {
            let inner = &raw[open.len_utf8()..raw.len() - close.len_utf8()];
            return Value::String(inner.to_string());
        }
    }
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(raw.to_string())
}
