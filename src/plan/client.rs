//! Planner 客户端：任务 + 历史上下文 -> LLM 原始回复
//!
//! 单次请求-响应（不流式）。Prompt 要求模型只输出一个按当前方言标注的代码块，每行一条命令。
//! 调用出错、超时或返回空文本统一映射为 AgentError::PlannerUnavailable。

use std::sync::Arc;
use std::time::Duration;

use crate::core::AgentError;
use crate::llm::{LlmClient, Message};
use crate::platform::OsFamily;

const SYSTEM_PROMPT: &str =
    "You are an AI assistant that helps execute tasks on a user's local computer.";

pub struct PlannerClient {
    llm: Arc<dyn LlmClient>,
    family: OsFamily,
    timeout: Duration,
}

impl PlannerClient {
    pub fn new(llm: Arc<dyn LlmClient>, family: OsFamily, timeout_secs: u64) -> Self {
        Self {
            llm,
            family,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 构建请求消息；history_context 为空表示首次尝试
    pub fn build_messages(&self, task: &str, history_context: &str) -> Vec<Message> {
        let dialect = self.family.dialect();
        let mut parts = vec![
            format!("The user's operating system is: {}.", self.family.display_name()),
            format!("The user wants to achieve the following task: '{task}'"),
        ];
        if history_context.is_empty() {
            parts.push("\nGenerate a sequence of shell commands to accomplish this task.".into());
        } else {
            parts.push(history_context.to_string());
            parts.push(
                "\nPlease provide a *new*, *revised* sequence of shell commands based on the feedback to achieve the original task."
                    .into(),
            );
        }
        parts.push(
            "IMPORTANT: Output *only* the commands, each on a new line, enclosed in a single code block. Do not add explanation or commentary before or after the block."
                .into(),
        );
        parts.push(format!(
            "The code block should look like this:\n```{dialect}\ncommand 1\ncommand 2\n...\n```"
        ));

        vec![Message::system(SYSTEM_PROMPT), Message::user(parts.join("\n"))]
    }

    pub async fn request_plan(
        &self,
        task: &str,
        history_context: &str,
    ) -> Result<String, AgentError> {
        let messages = self.build_messages(task, history_context);
        tracing::debug!(model = %self.llm.model_name(), prompt = %messages[1].content, "planner request");

        let text = tokio::time::timeout(self.timeout, self.llm.complete(&messages))
            .await
            .map_err(|_| {
                AgentError::PlannerUnavailable(format!(
                    "request timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(AgentError::PlannerUnavailable)?;

        tracing::debug!(response = %text, "planner raw response");
        if text.trim().is_empty() {
            return Err(AgentError::PlannerUnavailable(
                "AI returned an empty response.".to_string(),
            ));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Role, ScriptedLlmClient};
    use async_trait::async_trait;

    fn client(llm: Arc<dyn LlmClient>) -> PlannerClient {
        PlannerClient::new(llm, OsFamily::Posix, 5)
    }

    #[tokio::test]
    async fn test_first_attempt_prompt() {
        let llm = Arc::new(ScriptedLlmClient::new(["```bash\nls\n```"]));
        let raw = client(llm.clone()).request_plan("list files", "").await.unwrap();
        assert_eq!(raw, "```bash\nls\n```");

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0][0].role, Role::System);
        let user = &prompts[0][1].content;
        assert!(user.contains("Linux/macOS"));
        assert!(user.contains("'list files'"));
        assert!(user.contains("```bash\ncommand 1"));
        assert!(user.contains("Generate a sequence"));
        assert!(!user.contains("revised"));
    }

    #[tokio::test]
    async fn test_retry_prompt_carries_history() {
        let llm = Arc::new(ScriptedLlmClient::new(["```bash\nls -a\n```"]));
        let history = "--- Previous Attempt History ---\nUser Feedback: x\n--- End of History ---";
        client(llm.clone()).request_plan("list files", history).await.unwrap();

        let user = &llm.prompts()[0][1].content;
        assert!(user.contains(history));
        assert!(user.contains("*revised*"));
    }

    #[tokio::test]
    async fn test_windows_dialect_in_prompt() {
        let llm = Arc::new(ScriptedLlmClient::new(["```cmd\ndir\n```"]));
        let planner = PlannerClient::new(llm.clone(), OsFamily::Windows, 5);
        planner.request_plan("list files", "").await.unwrap();
        assert!(llm.prompts()[0][1].content.contains("```cmd\n"));
    }

    #[tokio::test]
    async fn test_empty_response_is_unavailable() {
        let llm = Arc::new(ScriptedLlmClient::new(["  \n "]));
        let err = client(llm).request_plan("t", "").await.unwrap_err();
        assert!(matches!(err, AgentError::PlannerUnavailable(_)));
    }

    #[tokio::test]
    async fn test_llm_error_is_unavailable() {
        let llm = Arc::new(ScriptedLlmClient::default());
        llm.push_error("connection refused");
        let err = client(llm).request_plan("t", "").await.unwrap_err();
        assert_eq!(
            err,
            AgentError::PlannerUnavailable("connection refused".to_string())
        );
    }

    struct SlowLlm;

    #[async_trait]
    impl LlmClient for SlowLlm {
        async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok("```bash\nls\n```".to_string())
        }
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let planner = client(Arc::new(SlowLlm)).with_timeout(Duration::from_millis(10));
        let err = planner.request_plan("t", "").await.unwrap_err();
        assert!(matches!(err, AgentError::PlannerUnavailable(msg) if msg.contains("timed out")));
    }
}
