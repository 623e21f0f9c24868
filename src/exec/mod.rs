//! 执行层：临时脚本与子进程执行引擎

pub mod runner;
pub mod script;

pub use runner::{ExecutionResult, ScriptRunner, SETUP_FAILURE_EXIT_CODE};
pub use script::TempScript;
