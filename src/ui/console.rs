//! 终端前端：按行读 stdin，把 UI 事件打印为纯文本
//!
//! 输入含义取决于最近一次提示：任务输入、确认门（y/n）或失败原因；`/restart` 随时可用。
//! stdin 在独立线程上阻塞读取，进程退出时不等待它。

use std::io::{self, BufRead, Write};

use tokio::sync::mpsc;

use crate::core::{AgentHandle, Command};
use crate::ui::{ConfirmKind, LogLevel, UiEvent};

pub const RESTART_COMMAND: &str = "/restart";

/// 当前输入框的用途，由收到的事件推导
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Disabled,
    Task,
    Confirm(ConfirmKind),
    FailureReason,
}

impl InputMode {
    pub fn after(self, event: &UiEvent) -> Self {
        match event {
            UiEvent::EnableInput { .. } => Self::Task,
            UiEvent::ShowConfirmation { kind, .. } => Self::Confirm(*kind),
            UiEvent::ShowFailureReasonPrompt { .. } => Self::FailureReason,
            UiEvent::DisableInput
            | UiEvent::HideConfirmation
            | UiEvent::HideFailureReasonPrompt
            | UiEvent::ResetChat => Self::Disabled,
            _ => self,
        }
    }
}

/// 把一行输入映射为命令；确认门下无法识别的回答返回 None
pub fn parse_line(mode: InputMode, line: &str) -> Option<Command> {
    let trimmed = line.trim();
    if trimmed.eq_ignore_ascii_case(RESTART_COMMAND) {
        return Some(Command::Restart);
    }
    match mode {
        InputMode::Confirm(kind) => match trimmed.to_lowercase().as_str() {
            "y" | "yes" => Some(Command::Confirm { kind, yes: true }),
            "n" | "no" => Some(Command::Confirm { kind, yes: false }),
            _ => None,
        },
        InputMode::FailureReason => Some(Command::FailureReason(trimmed.to_string())),
        // 忙碌时也照常提交，由编排器回复忙碌提示
        InputMode::Task | InputMode::Disabled => Some(Command::SubmitTask(trimmed.to_string())),
    }
}

fn level_tag(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "info",
        LogLevel::Status => "status",
        LogLevel::Success => "success",
        LogLevel::Warning => "warning",
    }
}

/// 事件的文本呈现；纯控制类事件返回 None
pub fn format_event(event: &UiEvent) -> Option<String> {
    let text = match event {
        UiEvent::TaskMessage { text } => format!("> {text}"),
        UiEvent::BotMessage { text } => text.clone(),
        UiEvent::ErrorMessage { text } => format!("[error] {text}"),
        UiEvent::LogMessage { level, text } => format!("[{}] {text}", level_tag(*level)),
        UiEvent::EnableInput { placeholder } => format!("{placeholder}:"),
        UiEvent::DisplayPlan { code, dialect, .. } => {
            format!("Proposed plan:\n```{dialect}\n{code}\n```")
        }
        UiEvent::ShowConfirmation { prompt, .. } => format!("{prompt} [y/n]"),
        UiEvent::ShowFailureReasonPrompt { prompt } => {
            format!("{prompt} (empty line to give up)")
        }
        UiEvent::ExecutionStart { command_count } => {
            format!("--- Executing {command_count} command(s) ---")
        }
        UiEvent::ExecutionOutput { text, is_error } => {
            if *is_error {
                format!("  ! {text}")
            } else {
                format!("  | {text}")
            }
        }
        UiEvent::ExecutionEnd {
            success, exit_code, ..
        } => {
            if *success {
                "--- Execution finished ---".to_string()
            } else {
                format!("--- Execution failed (exit code {exit_code}) ---")
            }
        }
        UiEvent::ResetChat => "=================".to_string(),
        UiEvent::DisableInput | UiEvent::HideConfirmation | UiEvent::HideFailureReasonPrompt => {
            return None
        }
    };
    Some(text)
}

/// 把阻塞读取的行转发进 tokio 通道；接收端关闭或读错误时停止
fn forward_lines<R: BufRead>(reader: R, tx: mpsc::UnboundedSender<String>) {
    for line in reader.lines() {
        match line {
            Ok(line) => {
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("stdin read failed: {}", e);
                break;
            }
        }
    }
}

/// tokio::io::stdin 的读取挂在运行时的阻塞线程池上，未决读取会拖住运行时关闭，故用独立线程
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || forward_lines(io::stdin().lock(), tx));
    rx
}

/// 运行控制台直到会话结束（Terminated、初始化失败或 stdin 关闭）
pub async fn run_console(handle: AgentHandle) -> io::Result<()> {
    let AgentHandle {
        commands,
        mut events,
        shutdown,
        ..
    } = handle;
    let mut lines = spawn_stdin_reader();
    let mut mode = InputMode::Disabled;
    let mut stdin_open = true;
    let mut out = io::stdout();

    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Some(event) => {
                    mode = mode.after(&event);
                    if let Some(text) = format_event(&event) {
                        writeln!(out, "{text}")?;
                        out.flush()?;
                    }
                }
                None => break,
            },
            line = lines.recv(), if stdin_open => match line {
                Some(line) => match parse_line(mode, &line) {
                    Some(cmd) => {
                        if commands.send(cmd).is_err() {
                            break;
                        }
                    }
                    None => writeln!(out, "Please answer y or n.")?,
                },
                None => {
                    tracing::info!("stdin closed, shutting down");
                    stdin_open = false;
                    shutdown.cancel();
                }
            },
            _ = shutdown.cancelled() => {
                while let Ok(event) = events.try_recv() {
                    if let Some(text) = format_event(&event) {
                        writeln!(out, "{text}")?;
                    }
                }
                break;
            }
        }
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_follows_prompts() {
        let mode = InputMode::Disabled.after(&UiEvent::EnableInput {
            placeholder: "Enter task".into(),
        });
        assert_eq!(mode, InputMode::Task);

        let mode = mode.after(&UiEvent::ShowConfirmation {
            kind: ConfirmKind::Execute,
            prompt: "Run?".into(),
        });
        assert_eq!(mode, InputMode::Confirm(ConfirmKind::Execute));

        // 普通消息不改变模式
        assert_eq!(mode.after(&UiEvent::bot("hi")), mode);
        assert_eq!(mode.after(&UiEvent::HideConfirmation), InputMode::Disabled);
    }

    #[test]
    fn test_parse_line_by_mode() {
        let confirm = InputMode::Confirm(ConfirmKind::Success);
        assert_eq!(
            parse_line(confirm, " Y "),
            Some(Command::Confirm {
                kind: ConfirmKind::Success,
                yes: true
            })
        );
        assert_eq!(
            parse_line(confirm, "no"),
            Some(Command::Confirm {
                kind: ConfirmKind::Success,
                yes: false
            })
        );
        assert_eq!(parse_line(confirm, "maybe"), None);

        assert_eq!(
            parse_line(InputMode::FailureReason, "wrong dir\n"),
            Some(Command::FailureReason("wrong dir".into()))
        );
        assert_eq!(
            parse_line(InputMode::Task, "list files"),
            Some(Command::SubmitTask("list files".into()))
        );
        assert_eq!(parse_line(confirm, "/restart"), Some(Command::Restart));
    }

    #[test]
    fn test_forward_lines_until_eof() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        forward_lines(io::Cursor::new("list files\r\ny\n\n"), tx);
        assert_eq!(rx.try_recv().unwrap(), "list files");
        assert_eq!(rx.try_recv().unwrap(), "y");
        assert_eq!(rx.try_recv().unwrap(), "");
        // 发送端随函数返回释放，接收端看到通道关闭
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_format_event() {
        assert_eq!(
            format_event(&UiEvent::ExecutionOutput {
                text: "a.txt".into(),
                is_error: false
            }),
            Some("  | a.txt".to_string())
        );
        assert_eq!(
            format_event(&UiEvent::log(LogLevel::Warning, "careful")),
            Some("[warning] careful".to_string())
        );
        assert_eq!(
            format_event(&UiEvent::ExecutionEnd {
                success: false,
                exit_code: 2,
                log: String::new()
            }),
            Some("--- Execution failed (exit code 2) ---".to_string())
        );
        let plan = format_event(&UiEvent::DisplayPlan {
            commands: vec!["ls".into()],
            code: "ls".into(),
            dialect: "bash".into(),
        })
        .unwrap();
        assert!(plan.contains("```bash\nls\n```"));
        assert_eq!(format_event(&UiEvent::DisableInput), None);
    }
}
