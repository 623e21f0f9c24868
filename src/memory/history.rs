//! 尝试历史：单个任务内的用户反馈与模型尝试
//!
//! 只追加、按时间顺序；唯一的修改是在计划执行后为最近一条 ModelAttempt 回填一次执行日志。
//! render 把历史渲染为 Planner 上下文文本，执行日志按字符数截断以限制 Prompt 增长。

use serde::Serialize;

/// 反馈条目渲染时的前缀
const FEEDBACK_PREFIX: &str = "The previous attempt failed or was insufficient. Reason: ";
/// 截断标记
const TRUNCATION_MARKER: &str = "...";

/// 历史条目
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    UserFeedback {
        text: String,
    },
    ModelAttempt {
        plan_code: String,
        execution_log: Option<String>,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryBuffer {
    entries: Vec<HistoryEntry>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_feedback(&mut self, text: impl Into<String>) {
        self.entries.push(HistoryEntry::UserFeedback { text: text.into() });
    }

    pub fn push_attempt(&mut self, plan_code: impl Into<String>) {
        self.entries.push(HistoryEntry::ModelAttempt {
            plan_code: plan_code.into(),
            execution_log: None,
        });
    }

    /// 为最近一条尚未填写日志的 ModelAttempt 回填执行日志；最后一条不是这类条目时返回 false
    pub fn attach_log_to_last_attempt(&mut self, log: impl Into<String>) -> bool {
        match self.entries.last_mut() {
            Some(HistoryEntry::ModelAttempt { execution_log, .. }) if execution_log.is_none() => {
                *execution_log = Some(log.into());
                true
            }
            _ => false,
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 渲染为 Planner 上下文；无历史时返回空串（不输出包裹标记）
    pub fn render(&self, max_log_chars: usize) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        let mut out = String::from("--- Previous Attempt History ---\n");
        for entry in &self.entries {
            match entry {
                HistoryEntry::UserFeedback { text } => {
                    out.push_str(&format!("User Feedback: {FEEDBACK_PREFIX}{text}\n"));
                }
                HistoryEntry::ModelAttempt {
                    plan_code,
                    execution_log,
                } => {
                    out.push_str(&format!(
                        "Previously Proposed Plan:\n```\n{plan_code}\n```\n"
                    ));
                    if let Some(log) = execution_log.as_deref().filter(|l| !l.is_empty()) {
                        out.push_str(&format!(
                            "Execution Log:\n{}\n",
                            log_preview(log, max_log_chars)
                        ));
                    }
                }
            }
        }
        out.push_str("--- End of History ---");
        out
    }
}

/// 超过 max_chars 个字符时保留前缀并追加截断标记，总长度不超过 max_chars（按字符，不在 UTF-8 中间截断）
fn log_preview(log: &str, max_chars: usize) -> String {
    if log.chars().count() <= max_chars {
        return log.to_string();
    }
    let keep = max_chars.saturating_sub(TRUNCATION_MARKER.len());
    let head: String = log.chars().take(keep).collect();
    format!("{head}{TRUNCATION_MARKER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_renders_nothing() {
        assert_eq!(HistoryBuffer::new().render(500), "");
    }

    #[test]
    fn test_render_in_append_order() {
        let mut history = HistoryBuffer::new();
        history.push_attempt("ls -la");
        assert!(history.attach_log_to_last_attempt("[STDOUT] a.txt"));
        history.push_feedback("wrong directory");
        history.push_attempt("cd src\nls");

        let text = history.render(500);
        let plan = text.find("ls -la").unwrap();
        let log = text.find("[STDOUT] a.txt").unwrap();
        let feedback = text.find("Reason: wrong directory").unwrap();
        let second = text.find("cd src\nls").unwrap();
        assert!(plan < log && log < feedback && feedback < second);
        assert!(text.starts_with("--- Previous Attempt History ---"));
        assert!(text.ends_with("--- End of History ---"));
        // 第二次尝试尚未执行，不应出现第二段日志
        assert_eq!(text.matches("Execution Log:").count(), 1);
    }

    #[test]
    fn test_render_is_idempotent() {
        let mut history = HistoryBuffer::new();
        history.push_attempt("echo hi");
        history.attach_log_to_last_attempt("[STDOUT] hi");
        history.push_feedback("more");
        assert_eq!(history.render(500), history.render(500));
    }

    #[test]
    fn test_log_truncated_to_limit() {
        let mut history = HistoryBuffer::new();
        history.push_attempt("yes");
        history.attach_log_to_last_attempt("y".repeat(2000));
        let text = history.render(500);
        let expected = format!("Execution Log:\n{}...\n", "y".repeat(497));
        assert!(text.contains(&expected));
        assert!(!text.contains(&"y".repeat(498)));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let preview = log_preview(&"日志".repeat(400), 10);
        assert_eq!(preview.chars().count(), 10);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_log_attached_only_once() {
        let mut history = HistoryBuffer::new();
        history.push_attempt("ls");
        assert!(history.attach_log_to_last_attempt("first"));
        assert!(!history.attach_log_to_last_attempt("second"));
        assert_eq!(
            history.entries()[0],
            HistoryEntry::ModelAttempt {
                plan_code: "ls".into(),
                execution_log: Some("first".into()),
            }
        );
    }

    #[test]
    fn test_log_not_attached_to_feedback() {
        let mut history = HistoryBuffer::new();
        history.push_attempt("ls");
        history.push_feedback("nope");
        assert!(!history.attach_log_to_last_attempt("log"));
        assert_eq!(history.len(), 2);
    }
}
