//! TaskPilot - 自然语言任务到 Shell 脚本的交互式助手
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、状态、纯状态机、编排器
//! - **exec**: 临时脚本与子进程执行
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 重试历史
//! - **observability**: tracing 初始化
//! - **plan**: Planner 请求与计划解析
//! - **platform**: 操作系统族与脚本方言
//! - **ui**: UI 事件、事件出口、终端前端

pub mod config;
pub mod core;
pub mod exec;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod plan;
pub mod platform;
pub mod ui;
