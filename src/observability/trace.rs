//! 执行轨迹
//!
//! 一次推理 / 执行对应一条 Trace：只追加、恰好关闭一次。
//! TraceStore 保存已关闭的轨迹（有界，丢弃最旧），可导出为 JSON 文档。

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Perception,
    Thinking,
    ToolCall,
    Observation,
    Action,
    Response,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub step_type: StepType,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: String,
    pub timestamp: DateTime<Utc>,
    pub steps: Vec<TraceStep>,
    pub end_timestamp: Option<DateTime<Utc>>,
}

/// 轨迹摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceSummary {
    pub trace_id: String,
    /// 秒；未关闭时为 None
    pub duration: Option<f64>,
    pub total_steps: usize,
    pub step_types: Vec<StepType>,
    pub tool_calls: Vec<Value>,
    pub thinking_steps: Vec<Value>,
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}

impl Trace {
    pub fn new() -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            steps: Vec::new(),
            end_timestamp: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.end_timestamp.is_some()
    }

    /// 追加一步；已关闭的轨迹拒绝写入
    pub fn record(&mut self, step_type: StepType, data: Value) -> Result<(), AgentError> {
        if self.is_closed() {
            return Err(AgentError::TraceClosed(self.trace_id.clone()));
        }
        self.steps.push(TraceStep {
            step_type,
            timestamp: Utc::now(),
            data,
        });
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), AgentError> {
        if self.is_closed() {
            return Err(AgentError::TraceClosed(self.trace_id.clone()));
        }
        self.end_timestamp = Some(Utc::now());
        Ok(())
    }

    pub fn summary(&self) -> TraceSummary {
        let of_type = |t: StepType| -> Vec<Value> {
            self.steps
                .iter()
                .filter(|s| s.step_type == t)
                .map(|s| s.data.clone())
                .collect()
        };
        TraceSummary {
            trace_id: self.trace_id.clone(),
            duration: self
                .end_timestamp
                .map(|end| (end - self.timestamp).num_milliseconds() as f64 / 1000.0),
            total_steps: self.steps.len(),
            step_types: self.steps.iter().map(|s| s.step_type).collect(),
            tool_calls: of_type(StepType::ToolCall),
            thinking_steps: of_type(StepType::Thinking),
        }
    }
}

/// 已关闭轨迹的有界存储
pub struct TraceStore {
    traces: Mutex<VecDeque<Trace>>,
    max_traces: usize,
}

impl TraceStore {
    pub fn new(max_traces: usize) -> Self {
        Self {
            traces: Mutex::new(VecDeque::new()),
            max_traces: max_traces.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Trace>> {
        self.traces.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 存入轨迹；未关闭的先关闭
    pub fn push(&self, mut trace: Trace) {
        if !trace.is_closed() {
            let _ = trace.close();
        }
        let mut traces = self.lock();
        traces.push_back(trace);
        while traces.len() > self.max_traces {
            traces.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, trace_id: &str) -> Option<Trace> {
        self.lock().iter().find(|t| t.trace_id == trace_id).cloned()
    }

    /// 指定 id 的摘要；未指定时取最近一条
    pub fn summary(&self, trace_id: Option<&str>) -> Option<TraceSummary> {
        let traces = self.lock();
        match trace_id {
            Some(id) => traces.iter().find(|t| t.trace_id == id).map(Trace::summary),
            None => traces.back().map(Trace::summary),
        }
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        let traces: Vec<Trace> = self.lock().iter().cloned().collect();
        serde_json::to_string_pretty(&traces)
    }

    pub fn export_to(&self, path: &Path) -> std::io::Result<()> {
        let json = self.export_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), traces = self.len(), "traces exported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_closed_trace_rejects_steps() {
        let mut trace = Trace::new();
        trace.record(StepType::Perception, json!({"query": "hi"})).unwrap();
        trace.close().unwrap();
        assert!(matches!(
            trace.record(StepType::Response, json!("late")),
            Err(AgentError::TraceClosed(_))
        ));
        assert!(trace.close().is_err());
        assert_eq!(trace.steps.len(), 1);
    }

    #[test]
    fn test_summary() {
        let mut trace = Trace::new();
        trace.record(StepType::Thinking, json!("plan")).unwrap();
        trace
            .record(StepType::ToolCall, json!({"tool": "calculate"}))
            .unwrap();
        trace.record(StepType::Observation, json!("2")).unwrap();
        assert!(trace.summary().duration.is_none());
        trace.close().unwrap();

        let s = trace.summary();
        assert_eq!(s.total_steps, 3);
        assert_eq!(
            s.step_types,
            vec![StepType::Thinking, StepType::ToolCall, StepType::Observation]
        );
        assert_eq!(s.tool_calls, vec![json!({"tool": "calculate"})]);
        assert!(s.duration.unwrap() >= 0.0);
    }

    #[test]
    fn test_store_is_bounded_and_exports() {
        let store = TraceStore::new(2);
        for i in 0..3 {
            let mut t = Trace::new();
            t.record(StepType::Perception, json!(i)).unwrap();
            store.push(t);
        }
        assert_eq!(store.len(), 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces.json");
        store.export_to(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        let arr = value.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["steps"][0]["step_type"], "perception");
        assert_eq!(arr[0]["steps"][0]["data"], 1);
        assert!(arr[0]["end_timestamp"].is_string());
    }
}
