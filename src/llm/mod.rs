//! LLM 层：消息与响应模型、客户端抽象与实现（Gemini / OpenAI 兼容 / Scripted / Mock）、档位路由、响应缓存

pub mod cache;
pub mod gemini;
pub mod message;
pub mod mock;
pub mod openai;
pub mod response;
pub mod router;
pub mod traits;

pub use cache::{fingerprint, normalize_query, CacheStats, ResponseCache};
pub use gemini::GeminiClient;
pub use message::{Message, Role};
pub use mock::{MockLlmClient, ScriptedLlmClient, StreamBehavior};
pub use openai::{OpenAiClient, TokenUsage};
pub use response::{Candidate, Content, FunctionCall, ModelResponse, Part, ResponseShape, UsageMetadata};
pub use router::{ModelRouter, ModelTier, TaskClassifier};
pub use traits::{GenerationRequest, LlmClient, LlmError, ResponseStream};
