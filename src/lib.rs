//! Conductor - 工具增强型智能体编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、计划与子任务、多智能体编排、引擎门面、批量调度
//! - **llm**: 响应模型、LLM 客户端抽象与实现（Gemini / OpenAI 兼容 / Mock）、档位路由、响应缓存
//! - **observability**: 日志初始化与执行轨迹
//! - **react**: 响应解析、ReAct 主循环、Planner、子任务执行器
//! - **tools**: 工具注册表、执行器与内置工具（calculate、weather、search、calendar、get_current_time）

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod react;
pub mod tools;

pub use core::{AgentError, Engine, EngineBuilder};
