//! 状态定义：AgentState 与任务状态记录
//!
//! TaskState 是一次性记录：每次转移消费旧记录、产出新记录（见 machine.rs），
//! 不与任何 I/O 耦合，可单独测试。

use serde::Serialize;

use crate::memory::HistoryBuffer;
use crate::platform::OsFamily;

/// 编排器阶段；任意时刻恰为其一
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AgentState {
    Idle,
    AwaitingTask,
    Planning,
    AwaitingPlanConfirmation,
    Executing,
    AwaitingSuccessConfirmation,
    AwaitingFailureReason,
    Terminated,
}

impl AgentState {
    /// 流程挂起于外部调用（Planner 请求或子进程）的阶段
    pub fn is_suspended(self) -> bool {
        matches!(self, Self::Planning | Self::Executing)
    }
}

/// 状态机的不变参数
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MachineConfig {
    pub family: OsFamily,
    /// 重试上限（失败计数达到即放弃任务）
    pub max_retries: u32,
    /// 历史中执行日志的截断长度（字符）
    pub log_preview_chars: usize,
}

impl MachineConfig {
    pub fn new(family: OsFamily, max_retries: u32, log_preview_chars: usize) -> Self {
        Self {
            family,
            max_retries: max_retries.max(1),
            log_preview_chars,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TaskState {
    pub(crate) state: AgentState,
    pub(crate) busy: bool,
    pub(crate) task: Option<String>,
    /// 仅在 AwaitingPlanConfirmation / Executing 阶段存在
    pub(crate) plan: Option<Vec<String>>,
    pub(crate) history: HistoryBuffer,
    pub(crate) retries: u32,
    pub(crate) config: MachineConfig,
}

impl TaskState {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            state: AgentState::Idle,
            busy: false,
            task: None,
            plan: None,
            history: HistoryBuffer::new(),
            retries: 0,
            config,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    pub fn plan(&self) -> Option<&[String]> {
        self.plan.as_deref()
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn config(&self) -> MachineConfig {
        self.config
    }
}
