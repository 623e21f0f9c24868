//! 出站 UI 事件：编排器与执行引擎发往前端的全部消息（可序列化为 JSON）

use serde::Serialize;

/// 状态类日志消息的级别
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Status,
    Success,
    Warning,
}

/// 确认门类型：执行计划前 / 执行成功后
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmKind {
    Execute,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// 回显用户提交的任务
    TaskMessage { text: String },
    BotMessage { text: String },
    ErrorMessage { text: String },
    LogMessage { level: LogLevel, text: String },
    EnableInput { placeholder: String },
    DisableInput,
    /// 展示计划：命令列表、原始代码与方言标签
    DisplayPlan {
        commands: Vec<String>,
        code: String,
        dialect: String,
    },
    ShowConfirmation { kind: ConfirmKind, prompt: String },
    HideConfirmation,
    ShowFailureReasonPrompt { prompt: String },
    HideFailureReasonPrompt,
    ExecutionStart { command_count: usize },
    /// 一行输出；is_error 表示来自 stderr
    ExecutionOutput { text: String, is_error: bool },
    /// 某次执行的终止事件，总在该次执行的全部输出事件之后
    ExecutionEnd {
        success: bool,
        exit_code: i32,
        log: String,
    },
    ResetChat,
}

impl UiEvent {
    pub fn bot(text: impl Into<String>) -> Self {
        Self::BotMessage { text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::ErrorMessage { text: text.into() }
    }

    pub fn log(level: LogLevel, text: impl Into<String>) -> Self {
        Self::LogMessage {
            level,
            text: text.into(),
        }
    }
}
