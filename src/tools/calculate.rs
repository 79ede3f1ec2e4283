//! 计算工具：交给 calculator crate 的显式文法解析器求值

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::tools::{arg_str, ParamSpec, Tool};

pub struct CalculateTool;

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "计算数学表达式，支持 + - * / % ^ 与括号（也接受 × ÷），例如 '25 * 4 + 100 / 5'"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::string("expression", "要计算的数学表达式")]
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<String, String> {
        let expression = arg_str(&args, "expression").unwrap_or_default();
        let value = calculator::evaluate(expression).map_err(|e| format!("计算错误: {e}"))?;
        Ok(format!(
            "计算结果: {} = {}",
            expression.trim(),
            calculator::format_number(value)
        ))
    }
}
