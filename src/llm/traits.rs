//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient。Planner 只需要单次请求-响应，不使用流式。

use async_trait::async_trait;

use crate::llm::Message;

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回首条回复的文本
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 模型名（日志用）
    fn model_name(&self) -> &str {
        "unknown"
    }
}
