//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters / execute），由 ToolRegistry 按名注册与查找。
//! invoke 在分发前按 ToolDescriptor 校验参数：缺少必需参数 -> MissingParameter，
//! 类型无法转换 -> InvalidParameter，未知工具 -> UnknownTool；
//! 工具体返回 Err 或 panic 一律转为 ToolOutcome::Failed 文本，不向上传播。

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;

/// 参数的原始类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
        }
    }
}

/// 单个参数的声明
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    pub enum_values: Option<Vec<String>>,
}

impl ParamSpec {
    fn new(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: true,
            enum_values: None,
        }
    }

    pub fn string(name: &str, description: &str) -> Self {
        Self::new(name, ParamType::String, description)
    }

    pub fn number(name: &str, description: &str) -> Self {
        Self::new(name, ParamType::Number, description)
    }

    pub fn boolean(name: &str, description: &str) -> Self {
        Self::new(name, ParamType::Boolean, description)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }
}

/// 工具描述：既用于向模型公布能力，也用于校验调用参数
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// 有序参数列表（位置参数按此顺序绑定）
    pub parameters: Vec<ParamSpec>,
}

impl ToolDescriptor {
    /// 生成对外的工具 schema：
    /// `{name, description, parameters: {type: "object", properties, required}}`
    pub fn to_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.parameters {
            let mut prop = serde_json::json!({
                "type": p.param_type.as_str(),
                "description": p.description,
            });
            if let Some(values) = &p.enum_values {
                prop["enum"] = serde_json::json!(values);
            }
            properties.insert(p.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        })
    }

    /// 单行签名，如 `calculate(expression: string)`，用于 prompt 中的工具清单
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| {
                let opt = if p.required { "" } else { "?" };
                format!("{}{}: {}", p.name, opt, p.param_type.as_str())
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }

    /// 校验并转换参数：位置参数先按声明顺序补全命名参数，再逐个检查必需性与类型。
    /// 未声明的额外参数原样保留。
    pub fn validate(
        &self,
        arguments: &Map<String, Value>,
        positional: &[Value],
    ) -> Result<Map<String, Value>, AgentError> {
        let mut merged = arguments.clone();
        for (spec, value) in self.parameters.iter().zip(positional.iter()) {
            merged.entry(spec.name.clone()).or_insert_with(|| value.clone());
        }

        for spec in &self.parameters {
            let value = match merged.get(&spec.name) {
                Some(Value::Null) | None => {
                    merged.remove(&spec.name);
                    if spec.required {
                        return Err(AgentError::MissingParameter {
                            tool: self.name.clone(),
                            parameter: spec.name.clone(),
                        });
                    }
                    continue;
                }
                Some(v) => v,
            };
            let coerced = coerce(value, spec.param_type).ok_or_else(|| self.invalid(spec))?;
            if let (Some(allowed), Value::String(s)) = (&spec.enum_values, &coerced) {
                if !allowed.iter().any(|a| a == s) {
                    return Err(AgentError::InvalidParameter {
                        tool: self.name.clone(),
                        parameter: spec.name.clone(),
                        expected: format!("one of [{}]", allowed.join(", ")),
                    });
                }
            }
            merged.insert(spec.name.clone(), coerced);
        }
        Ok(merged)
    }

    fn invalid(&self, spec: &ParamSpec) -> AgentError {
        AgentError::InvalidParameter {
            tool: self.name.clone(),
            parameter: spec.name.clone(),
            expected: spec.param_type.as_str().to_string(),
        }
    }
}

fn coerce(value: &Value, target: ParamType) -> Option<Value> {
    match (target, value) {
        (ParamType::String, Value::String(_)) => Some(value.clone()),
        (ParamType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (ParamType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
        (ParamType::Number, Value::Number(_)) => Some(value.clone()),
        (ParamType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        (ParamType::Boolean, Value::Bool(_)) => Some(value.clone()),
        (ParamType::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

/// 模型给出的工具调用意图：工具名 + 参数（分发前未校验）。
/// 线上形态为 `{name, args}`；自由文本 `Action: tool(a, b)` 中的位置参数放在 positional，分发时按声明顺序绑定。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallIntent {
    #[serde(rename = "name")]
    pub tool_name: String,
    #[serde(rename = "args", default)]
    pub arguments: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positional: Vec<Value>,
}

impl ToolCallIntent {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            positional: Vec::new(),
        }
    }

    /// 便于日志与 trace 的参数视图（位置参数以 `$0`、`$1` 展示）
    pub fn arguments_view(&self) -> Value {
        let mut view = self.arguments.clone();
        for (i, v) in self.positional.iter().enumerate() {
            view.insert(format!("${i}"), v.clone());
        }
        Value::Object(view)
    }
}

/// 一次工具调用的观察结果：成功或失败都只是文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Success(String),
    Failed(String),
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }

    pub fn text(&self) -> &str {
        match self {
            ToolOutcome::Success(t) | ToolOutcome::Failed(t) => t,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            ToolOutcome::Success(t) | ToolOutcome::Failed(t) => t,
        }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、有序参数声明、异步执行（参数已校验）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数声明，默认无参数
    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<String, String>;
}

/// 取字符串参数（已校验的参数中，字符串类型一定是 Value::String）
pub fn arg_str<'a>(args: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    args.get(name).and_then(|v| v.as_str())
}

/// 工具注册表：按名称有序存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名工具后注册者覆盖先注册者
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor()).collect()
    }

    /// prompt 中的 Available tools 段落
    pub fn catalog(&self) -> String {
        self.descriptors()
            .iter()
            .map(|d| format!("- {}: {}", d.signature(), d.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 按名称与命名参数调用
    pub async fn invoke(
        &self,
        name: &str,
        args: &Map<String, Value>,
    ) -> Result<ToolOutcome, AgentError> {
        self.dispatch(name, args, &[]).await
    }

    /// 调用模型给出的意图（含位置参数）
    pub async fn invoke_intent(&self, intent: &ToolCallIntent) -> Result<ToolOutcome, AgentError> {
        self.dispatch(&intent.tool_name, &intent.arguments, &intent.positional)
            .await
    }

    async fn dispatch(
        &self,
        name: &str,
        args: &Map<String, Value>,
        positional: &[Value],
    ) -> Result<ToolOutcome, AgentError> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;
        let validated = tool.descriptor().validate(args, positional)?;

        match AssertUnwindSafe(tool.execute(validated)).catch_unwind().await {
            Ok(Ok(text)) => Ok(ToolOutcome::Success(text)),
            Ok(Err(e)) => Ok(ToolOutcome::Failed(
                AgentError::ToolExecution(format!("{name}: {e}")).to_string(),
            )),
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::warn!(tool = name, %reason, "tool panicked");
                Ok(ToolOutcome::Failed(
                    AgentError::ToolExecution(format!("{name} panicked: {reason}")).to_string(),
                ))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
