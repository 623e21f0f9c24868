//! Agent 编排器：驱动状态机
//!
//! 负责：加载配置、探测平台、创建 LLM / Planner / 执行引擎，建立 cmd / event 两条通道，
//! 在后台任务中消费用户命令。状态转移是同步的；只有 Planner 请求与子进程等待两个挂起点，
//! 它们在独立任务中运行，结果经内部通道回灌状态机，期间到达的命令由状态机直接拒绝而不排队。

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{load_config, AppConfig};
use crate::core::{AgentState, Effect, InitError, Input, MachineConfig, TaskState};
use crate::exec::ScriptRunner;
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::plan::PlannerClient;
use crate::platform::OsFamily;
use crate::ui::{ChannelSink, ConfirmKind, EventSink, UiEvent};

/// 从 UI 发往编排器的用户命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 提交任务文本（"exit" / "quit" 结束会话）
    SubmitTask(String),
    /// 确认门的回答
    Confirm { kind: ConfirmKind, yes: bool },
    /// 失败原因；空文本表示放弃重试
    FailureReason(String),
    /// 重置会话
    Restart,
}

/// 根据配置选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）；缺少凭据为初始化错误
pub fn create_llm_from_config(
    cfg: &AppConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn LlmClient>, InitError> {
    let provider = cfg.llm.provider.to_lowercase();
    let base_url = cfg.llm.base_url.as_deref();
    let model = cfg.llm.model.as_deref();

    match provider.as_str() {
        "mock" => {
            tracing::warn!("Using Mock LLM, plans are placeholders");
            Ok(Arc::new(MockLlmClient))
        }
        "deepseek" => {
            let key = cfg
                .api_key(&env, &["DEEPSEEK_API_KEY", "OPENAI_API_KEY"])
                .ok_or_else(|| InitError::MissingCredential("DEEPSEEK_API_KEY".to_string()))?;
            let client = create_deepseek_client(base_url, model, &key);
            tracing::info!("Using DeepSeek LLM ({})", client.model_name());
            Ok(Arc::new(client))
        }
        "openai" => {
            let key = cfg
                .api_key(&env, &["OPENAI_API_KEY"])
                .ok_or_else(|| InitError::MissingCredential("OPENAI_API_KEY".to_string()))?;
            let model = model.unwrap_or("gpt-4o-mini");
            tracing::info!("Using OpenAI LLM ({})", model);
            Ok(Arc::new(OpenAiClient::new(base_url, model, &key)))
        }
        other => Err(InitError::Config(format!("unknown llm provider '{other}'"))),
    }
}

pub struct Orchestrator {
    state: TaskState,
    planner: Arc<PlannerClient>,
    runner: Arc<ScriptRunner>,
    workspace: PathBuf,
    sink: Arc<dyn EventSink>,
    task_id: Option<Uuid>,
}

impl Orchestrator {
    pub fn new(
        config: MachineConfig,
        planner: PlannerClient,
        runner: ScriptRunner,
        workspace: PathBuf,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            state: TaskState::new(config),
            planner: Arc::new(planner),
            runner: Arc::new(runner),
            workspace,
            sink,
            task_id: None,
        }
    }

    /// 按配置与进程环境变量构建；失败时向 sink 上报一次错误消息
    pub fn from_config(cfg: &AppConfig, sink: Arc<dyn EventSink>) -> Result<Self, InitError> {
        Self::from_config_with_env(cfg, |key| std::env::var(key).ok(), sink)
    }

    pub fn from_config_with_env(
        cfg: &AppConfig,
        env: impl Fn(&str) -> Option<String>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, InitError> {
        let built = Self::build(cfg, env, sink.clone());
        if let Err(e) = &built {
            tracing::error!(error = %e, "agent initialization failed");
            sink.emit(UiEvent::error(format!("Initialization failed: {e}")));
        }
        built
    }

    fn build(
        cfg: &AppConfig,
        env: impl Fn(&str) -> Option<String>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, InitError> {
        let family = OsFamily::detect()?;
        let llm = create_llm_from_config(cfg, env)?;
        let workspace = cfg.workspace();
        tracing::info!(
            app = cfg.app.name.as_deref().unwrap_or("TaskPilot"),
            os = family.display_name(),
            workspace = %workspace.display(),
            "agent initialized"
        );

        let machine = MachineConfig::new(family, cfg.agent.max_retries, cfg.agent.log_preview_chars);
        Ok(Self::new(
            machine,
            PlannerClient::new(llm, family, cfg.llm.timeouts.request),
            ScriptRunner::new(family),
            workspace,
            sink,
        ))
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    /// 应用一次输入：发布事件，返回需要执行的副作用
    pub fn handle(&mut self, input: Input) -> Option<Effect> {
        let previous = self.state.state();
        let config = self.state.config();
        let current = std::mem::replace(&mut self.state, TaskState::new(config));
        let transition = current.apply(input);
        self.state = transition.state;

        let now = self.state.state();
        if previous == AgentState::AwaitingTask && now == AgentState::Planning {
            let id = Uuid::new_v4();
            tracing::info!(task_id = %id, task = ?self.state.task(), "task accepted");
            self.task_id = Some(id);
        }
        if previous != now {
            tracing::info!(task_id = ?self.task_id, from = ?previous, to = ?now, "state changed");
        }
        if matches!(now, AgentState::AwaitingTask | AgentState::Terminated) {
            self.task_id = None;
        }

        for event in transition.events {
            self.sink.emit(event);
        }
        transition.effect
    }

    /// 执行副作用，返回回灌状态机的输入
    pub async fn perform(&self, effect: Effect) -> Input {
        perform(
            effect,
            &self.planner,
            &self.runner,
            &self.workspace,
            self.sink.as_ref(),
        )
        .await
    }

    /// 应用一条命令并就地跑完由它引发的副作用链，直到状态机需要新的用户输入
    pub async fn dispatch(&mut self, input: Input) {
        let mut effect = self.handle(input);
        while let Some(next) = effect {
            let result = self.perform(next).await;
            effect = self.handle(result);
        }
    }

    /// 主循环：消费命令，副作用在独立任务中执行；进入 Terminated 或命令通道关闭时退出
    pub async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        shutdown: CancellationToken,
    ) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Input>();
        if let Some(effect) = self.handle(Input::Start) {
            self.spawn_effect(effect, done_tx.clone());
        }

        loop {
            if self.state.state() == AgentState::Terminated {
                break;
            }
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => {
                        if let Some(effect) = self.handle(Input::Command(cmd)) {
                            self.spawn_effect(effect, done_tx.clone());
                        }
                    }
                    None => break,
                },
                Some(input) = done_rx.recv() => {
                    if let Some(effect) = self.handle(input) {
                        self.spawn_effect(effect, done_tx.clone());
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }

        tracing::info!("orchestrator stopped");
        shutdown.cancel();
    }

    fn spawn_effect(&self, effect: Effect, done_tx: mpsc::UnboundedSender<Input>) {
        let planner = self.planner.clone();
        let runner = self.runner.clone();
        let workspace = self.workspace.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let input = perform(effect, &planner, &runner, &workspace, sink.as_ref()).await;
            if done_tx.send(input).is_err() {
                tracing::debug!("orchestrator gone, effect result dropped");
            }
        });
    }
}

async fn perform(
    effect: Effect,
    planner: &PlannerClient,
    runner: &ScriptRunner,
    workspace: &std::path::Path,
    sink: &dyn EventSink,
) -> Input {
    match effect {
        Effect::RequestPlan {
            task,
            history_context,
        } => match planner.request_plan(&task, &history_context).await {
            Ok(raw) => Input::PlanGenerated(raw),
            Err(e) => Input::PlannerFailed(e),
        },
        Effect::Execute { commands } => {
            Input::ExecutionCompleted(runner.run(&commands, workspace, sink).await)
        }
    }
}

/// Agent 句柄：命令发送端、事件接收端、会话结束信号
pub struct AgentHandle {
    pub commands: mpsc::UnboundedSender<Command>,
    pub events: mpsc::UnboundedReceiver<UiEvent>,
    /// 进入 Terminated 或初始化失败时触发
    pub shutdown: CancellationToken,
    pub init_error: Option<InitError>,
}

/// 创建 Agent 运行时。初始化失败时错误消息已写入事件通道、shutdown 已触发，命令不再被接受。
pub async fn create_agent(config_path: Option<PathBuf>) -> AgentHandle {
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (sink, events) = ChannelSink::channel();
    let shutdown = CancellationToken::new();

    let init_error = match Orchestrator::from_config(&cfg, Arc::new(sink)) {
        Ok(orchestrator) => {
            tokio::spawn(orchestrator.run(cmd_rx, shutdown.clone()));
            None
        }
        Err(e) => {
            shutdown.cancel();
            Some(e)
        }
    };

    AgentHandle {
        commands: cmd_tx,
        events,
        shutdown,
        init_error,
    }
}
