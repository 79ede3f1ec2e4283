//! 天气工具（模拟数据）

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::tools::{arg_str, ParamSpec, Tool};

pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "weather"
    }

    fn description(&self) -> &str {
        "查询指定城市今天的天气"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::string("location", "城市名，如 北京")]
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<String, String> {
        let location = arg_str(&args, "location").unwrap_or_default().trim();
        if location.is_empty() {
            return Err("location 不能为空".to_string());
        }
        Ok(format!("{location} 的天气: 晴天，温度 22°C"))
    }
}
