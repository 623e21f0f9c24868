//! Mock LLM 客户端（无需 API）
//!
//! MockLlmClient：固定返回一个 echo 命令代码块，便于离线跑通确认-执行流程（provider = "mock"）。
//! ScriptedLlmClient：按顺序返回预设回复并记录收到的 Prompt，用于测试。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message};

/// Mock 客户端：不读取任务内容，避免把任务文本拼进脚本
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        Ok("```bash\necho \"taskpilot mock planner: no LLM configured\"\n```".to_string())
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// 脚本化客户端：每次 complete 弹出一条预设回复；回复耗尽时返回错误
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 追加一条错误回复（模拟网络/服务错误）
    pub fn push_error(&self, err: impl Into<String>) {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(Err(err.into()));
        }
    }

    pub fn push_response(&self, text: impl Into<String>) {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(Ok(text.into()));
        }
    }

    /// 已收到的全部请求（按调用顺序）
    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        if let Ok(mut p) = self.prompts.lock() {
            p.push(messages.to_vec());
        }
        self.responses
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front()
            .unwrap_or_else(|| Err("scripted responses exhausted".to_string()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
