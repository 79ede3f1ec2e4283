//! 工具调用 JSON Schema 生成（schemars）
//!
//! 对不支持原生函数调用的后端，把「合法 tool call」的 JSON 结构注入 system prompt。

use schemars::{schema_for, JsonSchema};
use std::collections::HashMap;

/// 文本协议下的工具调用格式：`{"tool": "...", "args": {...}}`（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，如 calculate、weather、search
    pub tool: String,
    /// 工具参数，键为参数名
    pub args: HashMap<String, serde_json::Value>,
}

/// 返回工具调用的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}
