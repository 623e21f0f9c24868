//! TaskPilot 入口：初始化日志、创建 Agent 编排器与终端前端，并运行主循环。
//!
//! 用法：`taskpilot [config.toml]`

use anyhow::Context;
use taskpilot::{core::create_agent, observability, ui::run_console};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let mut handle = create_agent(config_path).await;
    let init_error = handle.init_error.take();

    run_console(handle).await.context("Console run failed")?;

    if let Some(e) = init_error {
        return Err(e).context("Failed to create agent");
    }
    Ok(())
}
