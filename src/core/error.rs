//! 错误类型
//!
//! InitError 为会话级致命错误（缺少凭据、不支持的操作系统），出现后编排器不会进入 AwaitingTask；
//! AgentError 为单次尝试内的失败，全部汇入编排器的失败处理（计数 + 询问反馈或放弃）。

use thiserror::Error;

/// 初始化错误：只上报一次，之后不再接受任务
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("Missing API key: set {0} (or llm.api_key in config)")]
    MissingCredential(String),

    #[error("Unsupported operating system detected: {0}")]
    UnsupportedOs(String),

    #[error("Config error: {0}")]
    Config(String),
}

/// 单次尝试中的失败（规划、解析、执行）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// Planner 调用出错、超时或返回空文本
    #[error("Planner unavailable: {0}")]
    PlannerUnavailable(String),

    /// 解析结果为零条命令
    #[error("Failed to parse a valid command plan from the AI response. Response received:\n{0}")]
    ParseEmpty(String),

    /// 写脚本、设置权限或启动进程失败（退出码哨兵 -1）
    #[error("Execution setup failed: {0}")]
    ExecutionSetup(String),

    #[error("Script failed with exit code {exit_code}: {reason}")]
    ExecutionFailure { exit_code: i32, reason: String },
}
