//! 记忆层：单个任务内的尝试历史（反馈与模型尝试），用于构建 Planner 上下文

pub mod history;

pub use history::{HistoryBuffer, HistoryEntry};
