//! 任务状态机
//!
//! `TaskState::apply(input)` 消费当前记录，返回新记录、需要发往 UI 的事件，以及至多一个待执行的副作用
//! （请求 Planner 或执行脚本）。副作用的结果再作为 Input 回灌。所有规划、解析、执行失败都汇入
//! `handle_failure`：计数 +1，达到上限则放弃任务，否则询问用户失败原因。

use crate::core::{AgentError, AgentState, Command, TaskState};
use crate::exec::ExecutionResult;
use crate::plan::parse_plan;
use crate::ui::{ConfirmKind, LogLevel, UiEvent};

pub const TASK_PLACEHOLDER: &str = "Enter task (or type \"exit\")";
const BUSY_NOTICE: &str = "Agent is busy processing a previous request. Please wait.";
const PLAN_FAILURE_REASON: &str = "Failed to get or parse a plan from the AI.";
const GOAL_NOT_MET_REASON: &str = "Goal not met: user indicated the task was unsuccessful.";

/// 状态机输入：入站命令与副作用结果
#[derive(Debug, Clone)]
pub enum Input {
    /// 前端就绪，开始接受任务
    Start,
    Command(Command),
    /// Planner 返回的原始文本
    PlanGenerated(String),
    PlannerFailed(AgentError),
    ExecutionCompleted(ExecutionResult),
}

/// 需要异步执行的副作用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    RequestPlan {
        task: String,
        history_context: String,
    },
    Execute {
        commands: Vec<String>,
    },
}

#[derive(Debug)]
pub struct Transition {
    pub state: TaskState,
    pub events: Vec<UiEvent>,
    pub effect: Option<Effect>,
}

impl TaskState {
    pub fn apply(self, input: Input) -> Transition {
        let mut step = Step {
            next: self,
            events: Vec::new(),
            effect: None,
        };
        step.dispatch(input);
        Transition {
            state: step.next,
            events: step.events,
            effect: step.effect,
        }
    }
}

/// 单次转移的工作区
struct Step {
    next: TaskState,
    events: Vec<UiEvent>,
    effect: Option<Effect>,
}

impl Step {
    fn dispatch(&mut self, input: Input) {
        let current = self.next.state;
        if current == AgentState::Terminated {
            tracing::debug!(?input, "input after termination ignored");
            return;
        }

        match input {
            Input::Start if current == AgentState::Idle => self.start(),
            Input::Command(Command::SubmitTask(text)) => self.submit_task(&text),
            Input::Command(Command::Confirm {
                kind: ConfirmKind::Execute,
                yes,
            }) if current == AgentState::AwaitingPlanConfirmation => self.confirm_execution(yes),
            Input::Command(Command::Confirm {
                kind: ConfirmKind::Success,
                yes,
            }) if current == AgentState::AwaitingSuccessConfirmation => self.confirm_success(yes),
            Input::Command(Command::FailureReason(text))
                if current == AgentState::AwaitingFailureReason =>
            {
                self.failure_reason_provided(&text)
            }
            Input::Command(Command::Restart) => self.restart(),
            Input::Command(cmd) if current.is_suspended() => {
                tracing::debug!(?cmd, ?current, "command rejected while busy");
                self.emit(UiEvent::error(BUSY_NOTICE));
            }
            Input::PlanGenerated(raw) if current == AgentState::Planning => self.plan_generated(&raw),
            Input::PlannerFailed(err) if current == AgentState::Planning => self.planning_failed(&err),
            Input::ExecutionCompleted(result) if current == AgentState::Executing => {
                self.execution_completed(result)
            }
            other => {
                tracing::debug!(input = ?other, ?current, "input does not match current state, ignored");
            }
        }
    }

    fn emit(&mut self, event: UiEvent) {
        self.events.push(event);
    }

    fn set_state(&mut self, state: AgentState) {
        tracing::debug!(from = ?self.next.state, to = ?state, "state transition");
        self.next.state = state;
    }

    fn start(&mut self) {
        let os = self.next.config.family.display_name();
        self.emit(UiEvent::bot(format!(
            "AI Agent ready. Detected OS: {os}. Waiting for task..."
        )));
        self.request_task_input();
    }

    /// 回到等待任务：清空任务、计划、历史与计数
    fn request_task_input(&mut self) {
        self.next.task = None;
        self.next.plan = None;
        self.next.history.clear();
        self.next.retries = 0;
        self.next.busy = false;
        self.set_state(AgentState::AwaitingTask);
        self.emit(UiEvent::EnableInput {
            placeholder: TASK_PLACEHOLDER.to_string(),
        });
    }

    fn submit_task(&mut self, text: &str) {
        if self.next.busy {
            self.emit(UiEvent::error(BUSY_NOTICE));
            return;
        }
        if self.next.state != AgentState::AwaitingTask {
            tracing::debug!(state = ?self.next.state, "task submitted before agent was ready");
            return;
        }
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if text.eq_ignore_ascii_case("exit") || text.eq_ignore_ascii_case("quit") {
            self.emit(UiEvent::bot("Goodbye!"));
            self.emit(UiEvent::DisableInput);
            self.next.busy = true;
            self.set_state(AgentState::Terminated);
            return;
        }

        self.emit(UiEvent::TaskMessage {
            text: text.to_string(),
        });
        self.emit(UiEvent::DisableInput);
        self.next.task = Some(text.to_string());
        self.next.history.clear();
        self.next.retries = 0;
        self.next.busy = true;
        self.begin_planning();
    }

    fn begin_planning(&mut self) {
        let Some(task) = self.next.task.clone() else {
            tracing::warn!("planning requested without a task");
            self.request_task_input();
            return;
        };
        self.next.plan = None;
        self.set_state(AgentState::Planning);
        self.emit(UiEvent::log(LogLevel::Status, "Thinking..."));
        self.effect = Some(Effect::RequestPlan {
            task,
            history_context: self.next.history.render(self.next.config.log_preview_chars),
        });
    }

    fn plan_generated(&mut self, raw: &str) {
        let family = self.next.config.family;
        let parsed = parse_plan(raw, family);
        if parsed.used_fallback() {
            tracing::warn!("no code block in planner response, using fallback parsing");
            self.emit(UiEvent::log(
                LogLevel::Warning,
                "Warning: Parsed commands directly from response text (no code block found). Review plan carefully.",
            ));
        }
        if parsed.is_empty() {
            self.planning_failed(&AgentError::ParseEmpty(raw.to_string()));
            return;
        }

        let code = parsed.commands.join("\n");
        self.next.history.push_attempt(code.clone());
        self.emit(UiEvent::DisplayPlan {
            commands: parsed.commands.clone(),
            code,
            dialect: family.dialect().to_string(),
        });
        self.emit(UiEvent::ShowConfirmation {
            kind: ConfirmKind::Execute,
            prompt: "Review the plan above. Do you want to execute these commands?".to_string(),
        });
        self.next.plan = Some(parsed.commands);
        self.set_state(AgentState::AwaitingPlanConfirmation);
    }

    fn planning_failed(&mut self, err: &AgentError) {
        tracing::warn!(error = %err, "planning failed");
        self.emit(UiEvent::error(format!(
            "Failed to get or parse plan from AI: {err}"
        )));
        self.handle_failure(PLAN_FAILURE_REASON);
    }

    fn confirm_execution(&mut self, yes: bool) {
        self.emit(UiEvent::HideConfirmation);
        let plan = self.next.plan.clone().filter(|p| !p.is_empty());
        match plan {
            Some(commands) if yes => {
                self.emit(UiEvent::log(LogLevel::Info, "Plan approved. Executing commands..."));
                self.emit(UiEvent::DisableInput);
                self.emit(UiEvent::ExecutionStart {
                    command_count: commands.len(),
                });
                self.set_state(AgentState::Executing);
                self.effect = Some(Effect::Execute { commands });
            }
            _ => {
                tracing::info!("execution cancelled by user");
                self.emit(UiEvent::log(LogLevel::Info, "Execution cancelled by user."));
                self.request_task_input();
            }
        }
    }

    fn execution_completed(&mut self, result: ExecutionResult) {
        self.next.plan = None;
        if !self
            .next
            .history
            .attach_log_to_last_attempt(result.combined_log.clone())
        {
            tracing::warn!("no pending attempt in history to store execution log");
        }

        let error = result.error();
        if let Some(AgentError::ExecutionSetup(msg)) = &error {
            self.emit(UiEvent::error(format!("Execution setup failed: {msg}")));
        }
        self.emit(UiEvent::ExecutionEnd {
            success: result.success,
            exit_code: result.exit_code,
            log: result.combined_log,
        });

        match error {
            None => {
                self.emit(UiEvent::ShowConfirmation {
                    kind: ConfirmKind::Success,
                    prompt: "Commands executed successfully (exit code 0). Did this achieve your overall goal?"
                        .to_string(),
                });
                self.set_state(AgentState::AwaitingSuccessConfirmation);
            }
            Some(AgentError::ExecutionSetup(msg)) => self.handle_failure(&msg),
            Some(AgentError::ExecutionFailure { reason, .. }) => self.handle_failure(&reason),
            Some(other) => self.handle_failure(&other.to_string()),
        }
    }

    fn confirm_success(&mut self, yes: bool) {
        self.emit(UiEvent::HideConfirmation);
        if yes {
            tracing::info!(task = ?self.next.task, "task completed");
            self.emit(UiEvent::log(
                LogLevel::Success,
                "Task marked as successful by user!",
            ));
            self.request_task_input();
        } else {
            self.handle_failure(GOAL_NOT_MET_REASON);
        }
    }

    fn handle_failure(&mut self, reason: &str) {
        self.next.plan = None;
        self.next.retries += 1;
        let attempt = self.next.retries;
        let max = self.next.config.max_retries;
        self.emit(UiEvent::error(format!(
            "Task failed (Attempt {attempt}/{max}). Failure details: {reason}"
        )));

        if attempt >= max {
            tracing::info!(attempt, max, "retry ceiling reached, task abandoned");
            self.emit(UiEvent::error(format!(
                "Maximum retries ({max}) reached. Task abandoned."
            )));
            self.request_task_input();
        } else {
            self.set_state(AgentState::AwaitingFailureReason);
            self.emit(UiEvent::ShowFailureReasonPrompt {
                prompt: format!(
                    "Attempt {attempt} failed. Please describe why or what needs to change (leave blank to stop retrying):"
                ),
            });
        }
    }

    fn failure_reason_provided(&mut self, text: &str) {
        self.emit(UiEvent::HideFailureReasonPrompt);
        let reason = text.trim();
        if reason.is_empty() {
            self.emit(UiEvent::log(
                LogLevel::Info,
                "Retry cancelled by user (no feedback provided).",
            ));
            self.request_task_input();
            return;
        }

        self.next.history.push_feedback(reason);
        self.emit(UiEvent::log(
            LogLevel::Info,
            format!(
                "Retrying based on feedback (Attempt {}/{})...",
                self.next.retries + 1,
                self.next.config.max_retries
            ),
        ));
        self.begin_planning();
    }

    fn restart(&mut self) {
        if self.next.state.is_suspended() {
            self.emit(UiEvent::error(format!(
                "{BUSY_NOTICE} Restart is not possible while a plan is being generated or executed."
            )));
            return;
        }
        tracing::info!("agent restart requested");
        self.emit(UiEvent::ResetChat);
        self.emit(UiEvent::bot("Restarting agent..."));
        self.next = TaskState::new(self.next.config);
        self.start();
    }
}
