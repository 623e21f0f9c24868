//! 核心编排层：错误、状态、纯状态机、主控循环

pub mod error;
pub mod machine;
pub mod orchestrator;
pub mod state;

pub use error::{AgentError, InitError};
pub use machine::{Effect, Input, Transition, TASK_PLACEHOLDER};
pub use orchestrator::{create_agent, create_llm_from_config, AgentHandle, Command, Orchestrator};
pub use state::{AgentState, MachineConfig, TaskState};
