//! 规划层：Planner 客户端（请求 LLM）与响应解析（提取命令序列）

pub mod client;
pub mod parser;

pub use client::PlannerClient;
pub use parser::{extract_commands, find_fenced_block, parse_plan, ParsedPlan};
