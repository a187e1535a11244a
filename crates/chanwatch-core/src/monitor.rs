//! The channel monitor loop
//!
//! Every `interval` the monitor asks the agent to check the channel, drains
//! the streamed answer and logs it. A failed turn is followed by exactly one
//! error-notice turn. Cancellation is observed between turns and while
//! sleeping; a turn that has started always runs to completion.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::{Agent, LlmAgent};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::mcp_manager::McpServerManager;
use crate::prompt::{self, DEFAULT_INSTRUCTION, TurnRequest};
use crate::provider::{LlmProvider, create_provider};
use crate::session::Session;
use crate::tools::{ToolRegistry, mcp::create_mcp_tools};

/// Everything a turn needs, passed explicitly to the monitor
pub struct MonitorContext {
    pub agent: Arc<dyn Agent>,
    pub session: Session,
    pub channel_id: String,
    pub interval: Duration,
    /// Characters of each fragment shown in the log
    pub preview_chars: usize,
    /// Characters of the error text sent in an error notice
    pub error_excerpt_chars: usize,
}

impl MonitorContext {
    pub fn new(
        agent: Arc<dyn Agent>,
        session: Session,
        channel_id: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            agent,
            session,
            channel_id: channel_id.into(),
            interval,
            preview_chars: 150,
            error_excerpt_chars: 100,
        }
    }

    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    pub fn with_error_excerpt_chars(mut self, error_excerpt_chars: usize) -> Self {
        self.error_excerpt_chars = error_excerpt_chars;
        self
    }
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The agent produced at least one text fragment
    Responded,
    /// The stream ended without any text
    NoResponse,
    /// The turn failed and an error notice was attempted
    Failed { error: String },
}

/// What happened in one turn
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// `HH:MM:SS` the turn started at
    pub time: String,
    pub fragments: Vec<String>,
    /// Fragments concatenated in order
    pub text: String,
    /// Length of `text` in characters
    pub length: usize,
    pub outcome: TurnOutcome,
}

impl TurnReport {
    fn new(time: String, fragments: Vec<String>, outcome: TurnOutcome) -> Self {
        let text = fragments.concat();
        let length = text.chars().count();
        Self {
            time,
            fragments,
            text,
            length,
            outcome,
        }
    }
}

/// Totals reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub turns: usize,
    /// Turns that failed and went through error recovery
    pub recovered: usize,
}

pub struct Monitor {
    ctx: MonitorContext,
    cancel: CancellationToken,
    servers: Option<Arc<McpServerManager>>,
}

impl Monitor {
    pub fn new(ctx: MonitorContext) -> Self {
        Self {
            ctx,
            cancel: CancellationToken::new(),
            servers: None,
        }
    }

    /// Start the tool servers and build the agent and session from `config`
    ///
    /// Any missing credential or tool server failure aborts startup; tool
    /// servers started before the failure are stopped again.
    pub async fn initialize(config: &Config) -> Result<Self> {
        config.validate()?;
        let channel_id = config.monitor.channel_id()?;

        let provider_type = config.agent.provider_type()?;
        let model = config.agent.model_name()?;
        let api_key = config.agent.get_api_key();
        let provider: Arc<dyn LlmProvider> = Arc::new(create_provider(
            provider_type,
            api_key.as_deref(),
            Some(model.as_str()),
        ));

        let servers = Arc::new(McpServerManager::with_configs(config.mcp_servers.clone()));
        servers.start_all().await?;

        let mut tools = ToolRegistry::new();
        for tool in create_mcp_tools(servers.clone()) {
            tools.register(tool);
        }

        let template = config
            .agent
            .instruction
            .as_deref()
            .unwrap_or(DEFAULT_INSTRUCTION);
        let agent = LlmAgent::new(
            &config.agent.name,
            prompt::render_instruction(template, &channel_id),
            provider,
            tools,
        )
        .with_max_iterations(config.agent.max_iterations);

        info!(
            provider = %provider_type,
            model = %model,
            tools = agent.tool_count(),
            channel = %channel_id,
            "agent ready"
        );

        let ctx = MonitorContext::new(
            Arc::new(agent),
            Session::from_config(&config.monitor),
            channel_id,
            config.monitor.interval(),
        )
        .with_preview_chars(config.monitor.preview_chars)
        .with_error_excerpt_chars(config.monitor.error_excerpt_chars);

        Ok(Self {
            servers: Some(servers),
            ..Self::new(ctx)
        })
    }

    /// Use an externally owned token, e.g. one cancelled by a signal handler
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn context(&self) -> &MonitorContext {
        &self.ctx
    }

    /// Run a single turn, with error recovery
    pub async fn run_turn(&mut self) -> TurnReport {
        let time = prompt::current_time();
        info!(time = %time, channel = %self.ctx.channel_id, "checking channel for new messages");

        let request = TurnRequest::check(time.clone(), &self.ctx.channel_id);
        let mut fragments = Vec::new();

        match self.drain(request, &mut fragments).await {
            Ok(()) if fragments.is_empty() => {
                warn!("no response received from agent");
                TurnReport::new(time, fragments, TurnOutcome::NoResponse)
            }
            Ok(()) => {
                let report = TurnReport::new(time, fragments, TurnOutcome::Responded);
                info!(length = report.length, "total agent response length");
                report
            }
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, "channel check failed");
                self.send_error_notice(&message).await;
                TurnReport::new(time, fragments, TurnOutcome::Failed { error: message })
            }
        }
    }

    /// Run one turn and return, treating a panic as fatal
    pub async fn run_once(&mut self) -> Result<TurnReport> {
        match AssertUnwindSafe(self.run_turn()).catch_unwind().await {
            Ok(report) => Ok(report),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "monitor turn panicked");
                Err(Error::Agent(format!("Monitor turn panicked: {}", message)))
            }
        }
    }

    /// Turn, sleep, repeat until cancelled
    pub async fn run(&mut self) -> Result<MonitorSummary> {
        info!(
            interval_secs = self.ctx.interval.as_secs(),
            channel = %self.ctx.channel_id,
            "starting channel monitoring"
        );

        let mut summary = MonitorSummary::default();
        while !self.cancel.is_cancelled() {
            let report = self.run_once().await?;
            summary.turns += 1;
            if matches!(report.outcome, TurnOutcome::Failed { .. }) {
                summary.recovered += 1;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.ctx.interval) => {}
            }
        }

        info!(turns = summary.turns, recovered = summary.recovered, "monitoring stopped");
        Ok(summary)
    }

    /// Stop the tool servers started by [`Monitor::initialize`]
    pub async fn shutdown(self) {
        if let Some(servers) = self.servers {
            servers.stop_all().await;
        }
    }

    async fn drain(&self, request: TurnRequest, fragments: &mut Vec<String>) -> Result<()> {
        let mut stream = self.ctx.agent.submit(&self.ctx.session, request).await?;
        while let Some(event) = stream.next().await {
            let event = event?;
            for text in event.texts() {
                info!(author = %event.author, "agent action: {}", self.preview(text));
                fragments.push(text.to_string());
            }
        }
        Ok(())
    }

    /// Best effort; a failure here is logged and dropped
    async fn send_error_notice(&self, error: &str) {
        let request = TurnRequest::error_notice(
            prompt::current_time(),
            &self.ctx.channel_id,
            error,
            self.ctx.error_excerpt_chars,
        );

        let result = async {
            let mut stream = self.ctx.agent.submit(&self.ctx.session, request).await?;
            while let Some(event) = stream.next().await {
                event?;
            }
            Ok::<_, Error>(())
        }
        .await;

        match result {
            Ok(()) => debug!("error notice sent"),
            Err(e) => warn!(error = %e, "failed to send error notice to channel"),
        }
    }

    fn preview<'t>(&self, text: &'t str) -> std::borrow::Cow<'t, str> {
        let head = prompt::truncate_chars(text, self.ctx.preview_chars);
        if head.len() < text.len() {
            format!("{}...", head).into()
        } else {
            head.into()
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
