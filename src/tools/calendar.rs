//! 日历工具（模拟数据）：check 查询日程，add 添加日程

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::tools::{arg_str, ParamSpec, Tool};

const EVENTS: &[(&str, &str)] = &[
    ("今天", "10:00 团队会议, 14:00 代码审查, 16:30 项目演示准备"),
    ("明天", "09:00 项目演示, 15:00 客户会议"),
];

pub struct CalendarTool;

#[async_trait]
impl Tool for CalendarTool {
    fn name(&self) -> &str {
        "calendar"
    }

    fn description(&self) -> &str {
        "查询或添加指定日期的日程"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::string("date", "日期，如 今天、明天 或 2024-01-17"),
            ParamSpec::string("action", "check 查询（默认）或 add 添加")
                .optional()
                .with_enum(&["check", "add"]),
        ]
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<String, String> {
        let date = arg_str(&args, "date").unwrap_or("今天").trim();
        match arg_str(&args, "action").unwrap_or("check") {
            "add" => Ok(format!("已添加日程: {date}")),
            _ => {
                let events = EVENTS
                    .iter()
                    .find(|(k, _)| date.contains(k))
                    .map(|(_, e)| *e)
                    .unwrap_or("无重要事项");
                Ok(format!("{date} 的日程: {events}"))
            }
        }
    }
}
