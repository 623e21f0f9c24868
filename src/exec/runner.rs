//! 执行引擎：命令序列 -> 临时脚本 -> 子进程
//!
//! 1. 用平台换行符拼接命令，写入临时脚本（POSIX 设可执行位）
//! 2. 以 argv 形式调用平台解释器（/bin/bash <script> 或 cmd.exe /c <script>），不经 shell 字符串拼接
//! 3. stdout / stderr 各由一个读取任务逐行转发，非空行作为 ExecutionOutput 事件发往 UI（仅保证单流内有序）
//! 4. 两个读取任务结束后才等待退出码并返回，保证输出事件先于结束事件
//! 5. 无论结果如何都删除临时脚本；删除失败只告警，不影响结果

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::core::AgentError;
use crate::exec::TempScript;
use crate::platform::OsFamily;
use crate::ui::{EventSink, LogLevel, UiEvent};

/// 启动失败时的退出码哨兵
pub const SETUP_FAILURE_EXIT_CODE: i32 = -1;

/// 单次执行结果，创建后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout_log: String,
    pub stderr_log: String,
    /// 按到达顺序合并、带 [STDOUT]/[STDERR] 前缀的完整日志
    pub combined_log: String,
    /// 写脚本 / 设权限 / 启动进程失败时的错误描述
    pub setup_error: Option<String>,
}

impl ExecutionResult {
    pub fn setup_failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            exit_code: SETUP_FAILURE_EXIT_CODE,
            stdout_log: String::new(),
            stderr_log: String::new(),
            combined_log: format!("[ERROR] Execution failed: {message}"),
            setup_error: Some(message),
        }
    }

    /// 失败时对应的错误；成功返回 None
    pub fn error(&self) -> Option<AgentError> {
        if let Some(msg) = &self.setup_error {
            return Some(AgentError::ExecutionSetup(msg.clone()));
        }
        if self.success {
            return None;
        }
        let stderr = self.stderr_log.trim();
        let reason = if stderr.is_empty() {
            format!("Script failed with exit code {}.", self.exit_code)
        } else {
            stderr.to_string()
        };
        Some(AgentError::ExecutionFailure {
            exit_code: self.exit_code,
            reason,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    Stdout,
    Stderr,
}

pub struct ScriptRunner {
    family: OsFamily,
    temp_dir: PathBuf,
}

impl ScriptRunner {
    pub fn new(family: OsFamily) -> Self {
        Self {
            family,
            temp_dir: std::env::temp_dir(),
        }
    }

    /// 指定临时脚本目录（默认系统临时目录）
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub async fn run(&self, commands: &[String], cwd: &Path, sink: &dyn EventSink) -> ExecutionResult {
        let start = Instant::now();
        let content = commands.join(self.family.line_separator());

        let result = match TempScript::create(&self.temp_dir, self.family, &content).await {
            Ok(script) => {
                let result = self.spawn_and_capture(script.path(), cwd, sink).await;
                let path = script.path().to_path_buf();
                if let Err(e) = script.remove().await {
                    tracing::warn!(path = %path.display(), error = %e, "could not delete temporary script");
                    sink.emit(UiEvent::log(
                        LogLevel::Warning,
                        format!("Warning: Failed to delete temp file {}", path.display()),
                    ));
                }
                result
            }
            Err(e) => ExecutionResult::setup_failed(format!("Failed to write script: {e}")),
        };

        let audit = serde_json::json!({
            "event": "script_audit",
            "commands": commands.len(),
            "cwd": cwd.display().to_string(),
            "success": result.success,
            "exit_code": result.exit_code,
            "setup_error": result.setup_error,
            "killed": result.setup_error.is_none() && result.exit_code == SETUP_FAILURE_EXIT_CODE,
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit, "execution");

        result
    }

    async fn spawn_and_capture(
        &self,
        script: &Path,
        cwd: &Path,
        sink: &dyn EventSink,
    ) -> ExecutionResult {
        let (program, leading_args) = self.family.interpreter();
        let mut cmd = Command::new(program);
        cmd.args(leading_args)
            .arg(script)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        {
            // CREATE_NO_WINDOW
            cmd.creation_flags(0x0800_0000);
        }

        tracing::info!(program, script = %script.display(), cwd = %cwd.display(), "spawning script");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return ExecutionResult::setup_failed(format!("Spawning process failed: {e}")),
        };

        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<(Origin, String)>();
        let readers = [
            child
                .stdout
                .take()
                .map(|out| tokio::spawn(forward_lines(out, Origin::Stdout, line_tx.clone()))),
            child
                .stderr
                .take()
                .map(|err| tokio::spawn(forward_lines(err, Origin::Stderr, line_tx.clone()))),
        ];
        drop(line_tx);

        let mut stdout_log = String::new();
        let mut stderr_log = String::new();
        let mut combined_log = String::new();
        // 两个读取任务都结束（发送端全部释放）后循环退出
        while let Some((origin, line)) = line_rx.recv().await {
            let (own, tag) = match origin {
                Origin::Stdout => (&mut stdout_log, "[STDOUT]"),
                Origin::Stderr => (&mut stderr_log, "[STDERR]"),
            };
            own.push_str(&line);
            own.push('\n');
            combined_log.push_str(&format!("{tag} {line}\n"));
            if !line.trim().is_empty() {
                sink.emit(UiEvent::ExecutionOutput {
                    text: line,
                    is_error: origin == Origin::Stderr,
                });
            }
        }
        for reader in readers.into_iter().flatten() {
            let _ = reader.await;
        }

        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => {
                let mut failed = ExecutionResult::setup_failed(format!("Waiting for process failed: {e}"));
                failed.combined_log = format!("{}\n{}", combined_log.trim_end(), failed.combined_log)
                    .trim()
                    .to_string();
                return failed;
            }
        };
        let exit_code = status.code().unwrap_or(SETUP_FAILURE_EXIT_CODE);
        let success = exit_code == 0;
        tracing::info!(exit_code, "script execution finished");

        if let Some(signal) = terminating_signal(&status) {
            tracing::warn!(signal, "script terminated by signal");
            combined_log.push_str(&format!("[ERROR] Script terminated by signal {signal}.\n"));
        } else if !success && stderr_log.trim().is_empty() {
            combined_log.push_str(&format!(
                "[ERROR] Script exited with code {exit_code} (no diagnostic output).\n"
            ));
        }

        ExecutionResult {
            success,
            exit_code,
            stdout_log,
            stderr_log,
            combined_log: combined_log.trim().to_string(),
            setup_error: None,
        }
    }
}

/// 进程被信号终止时没有退出码，返回信号编号
#[cfg(unix)]
fn terminating_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn terminating_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// 逐行读取一个输出流；非 UTF-8 内容按 lossy 转换，读错误时停止该流
async fn forward_lines<R>(pipe: R, origin: Origin, tx: mpsc::UnboundedSender<(Origin, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if tx.send((origin, line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(?origin, error = %e, "output stream read failed");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::ui::RecordingSink;

    fn cmds(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    fn outputs(sink: &RecordingSink) -> Vec<(String, bool)> {
        sink.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::ExecutionOutput { text, is_error } => Some((text, is_error)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_success_streams_stdout_in_order() {
        let workspace = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let runner = ScriptRunner::new(OsFamily::Posix).with_temp_dir(temp.path());
        let sink = RecordingSink::new();

        let result = runner
            .run(&cmds(&["echo hello", "echo", "echo world"]), workspace.path(), &sink)
            .await;

        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout_log, "hello\n\nworld\n");
        assert!(result.error().is_none());
        // 空行不产生事件
        assert_eq!(
            outputs(&sink),
            vec![("hello".to_string(), false), ("world".to_string(), false)]
        );
        // 临时脚本已删除
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_runs_in_workspace_directory() {
        let workspace = tempfile::tempdir().unwrap();
        std::fs::write(workspace.path().join("marker.txt"), "x").unwrap();
        let runner = ScriptRunner::new(OsFamily::Posix);
        let sink = RecordingSink::new();

        let result = runner.run(&cmds(&["ls"]), workspace.path(), &sink).await;
        assert!(result.success);
        assert!(result.stdout_log.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_stderr() {
        let workspace = tempfile::tempdir().unwrap();
        let runner = ScriptRunner::new(OsFamily::Posix);
        let sink = RecordingSink::new();

        let result = runner.run(&cmds(&["exit 2"]), workspace.path(), &sink).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, 2);
        assert!(result.combined_log.contains("no diagnostic output"));
        assert_eq!(
            result.error(),
            Some(AgentError::ExecutionFailure {
                exit_code: 2,
                reason: "Script failed with exit code 2.".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_stderr_tagged_and_used_as_reason() {
        let workspace = tempfile::tempdir().unwrap();
        let runner = ScriptRunner::new(OsFamily::Posix);
        let sink = RecordingSink::new();

        let result = runner
            .run(&cmds(&["echo out", "echo broken >&2", "exit 3"]), workspace.path(), &sink)
            .await;
        assert_eq!(result.exit_code, 3);
        assert!(result.combined_log.contains("[STDOUT] out"));
        assert!(result.combined_log.contains("[STDERR] broken"));
        assert!(!result.combined_log.contains("no diagnostic output"));
        assert!(outputs(&sink).contains(&("broken".to_string(), true)));
        assert!(
            matches!(result.error(), Some(AgentError::ExecutionFailure { reason, .. }) if reason == "broken")
        );
    }

    #[tokio::test]
    async fn test_signal_kill_is_not_a_setup_error() {
        let workspace = tempfile::tempdir().unwrap();
        let runner = ScriptRunner::new(OsFamily::Posix);
        let sink = RecordingSink::new();

        let result = runner
            .run(&cmds(&["echo before", "kill -9 $$"]), workspace.path(), &sink)
            .await;
        assert!(!result.success);
        assert_eq!(result.exit_code, SETUP_FAILURE_EXIT_CODE);
        assert!(result.setup_error.is_none());
        assert!(result.combined_log.contains("[STDOUT] before"));
        assert!(result.combined_log.contains("terminated by signal 9"));
        assert!(!result.combined_log.contains("no diagnostic output"));
        assert!(matches!(result.error(), Some(AgentError::ExecutionFailure { .. })));
    }

    #[tokio::test]
    async fn test_missing_workspace_is_setup_error() {
        let workspace = tempfile::tempdir().unwrap();
        let missing = workspace.path().join("gone");
        let temp = tempfile::tempdir().unwrap();
        let runner = ScriptRunner::new(OsFamily::Posix).with_temp_dir(temp.path());
        let sink = RecordingSink::new();

        let result = runner.run(&cmds(&["ls"]), &missing, &sink).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, SETUP_FAILURE_EXIT_CODE);
        assert!(matches!(result.error(), Some(AgentError::ExecutionSetup(_))));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unwritable_temp_dir_is_setup_error() {
        let workspace = tempfile::tempdir().unwrap();
        let runner = ScriptRunner::new(OsFamily::Posix)
            .with_temp_dir(workspace.path().join("no-such-dir"));
        let sink = RecordingSink::new();

        let result = runner.run(&cmds(&["ls"]), workspace.path(), &sink).await;
        assert_eq!(result.exit_code, SETUP_FAILURE_EXIT_CODE);
        assert!(result.setup_error.unwrap().starts_with("Failed to write script"));
    }

    #[tokio::test]
    async fn test_task_text_is_not_interpolated_into_argv() {
        let workspace = tempfile::tempdir().unwrap();
        let runner = ScriptRunner::new(OsFamily::Posix);
        let sink = RecordingSink::new();

        let result = runner
            .run(&cmds(&["echo 'a; echo injected'"]), workspace.path(), &sink)
            .await;
        assert_eq!(outputs(&sink), vec![("a; echo injected".to_string(), false)]);
        assert!(result.success);
    }
}
