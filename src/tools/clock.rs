//! 时间工具：北京/上海按 UTC+8，其余地点返回 UTC

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use serde_json::{Map, Value};

use crate::tools::{arg_str, ParamSpec, Tool};

const UTC_PLUS_8: &[&str] = &["北京", "上海", "beijing", "shanghai"];

pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "获取指定地点的当前时间"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::string("location", "地点，默认 北京").optional()]
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<String, String> {
        let location = arg_str(&args, "location").unwrap_or("北京");
        let lower = location.to_lowercase();
        if UTC_PLUS_8.iter().any(|c| lower.contains(c)) {
            let offset = FixedOffset::east_opt(8 * 3600).ok_or("invalid offset")?;
            let now = Utc::now().with_timezone(&offset);
            Ok(format!(
                "{location}的当前时间是: {} (UTC+8)",
                now.format("%Y-%m-%d %H:%M:%S")
            ))
        } else {
            Ok(format!(
                "{location}的当前时间是: {} (UTC)",
                Utc::now().format("%Y-%m-%d %H:%M:%S")
            ))
        }
    }
}
