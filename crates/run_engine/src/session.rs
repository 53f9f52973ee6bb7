//! Lifecycle of one agent execution as seen by a single view.
//!
//! `ExecutionSession` is a plain state machine: it never touches a backend
//! directly. Launching, channel subscription, time, and render scheduling all
//! go through [`SessionHost`], and channel deliveries are applied through the
//! `on_*` methods, which ignore anything not addressed to the live run.

use stream_protocol::{
    AgentId, AgentModel, Channel, ChannelEvent, ChannelPayload, LaunchRequest, MessageKind,
    RunId, StreamMessage, Usage,
};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::error::LaunchError;
use crate::message_log::{AppendOutcome, MessageLog};
use crate::metrics::elapsed_seconds;
use crate::subscriptions::RunSubscriptions;

pub const EXECUTION_FAILED: &str = "Agent execution failed";
pub const EXECUTION_CANCELLED: &str = "Agent execution was cancelled";
pub const STOPPED_BY_USER: &str = "Execution stopped by user";
pub const CANCELLED_BY_BACKEND: &str = "Execution was cancelled";

/// The agent definition a session executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    pub id: AgentId,
    pub name: String,
}

impl AgentProfile {
    #[must_use]
    pub fn new(id: AgentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// User input for Start. The model is validated against [`AgentModel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub project_path: String,
    pub task: String,
    pub model: String,
}

impl StartRequest {
    #[must_use]
    pub fn new(
        project_path: impl Into<String>,
        task: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            project_path: project_path.into(),
            task: task.into(),
            model: model.into(),
        }
    }
}

/// Everything the session needs from its environment.
pub trait SessionHost {
    fn launch(&mut self, request: &LaunchRequest) -> Result<RunId, String>;
    /// Subscribes to all four channels of `run_id`.
    fn subscribe_run(&mut self, run_id: RunId) -> Result<RunSubscriptions, LaunchError>;
    fn now(&self) -> OffsetDateTime;
    fn request_render(&mut self);
}

/// One execution attempt and the log it owns.
#[derive(Debug)]
pub struct ExecutionRun {
    run_id: Option<RunId>,
    request: Option<LaunchRequest>,
    started_at: Option<OffsetDateTime>,
    elapsed_seconds: u64,
    log: MessageLog,
}

impl ExecutionRun {
    fn new(request: Option<LaunchRequest>) -> Self {
        Self {
            run_id: None,
            request,
            started_at: None,
            elapsed_seconds: 0,
            log: MessageLog::new(),
        }
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.run_id
    }

    pub fn request(&self) -> Option<&LaunchRequest> {
        self.request.as_ref()
    }

    /// Set only while the run is `Running`.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        self.started_at
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    fn sample(&mut self, now: OffsetDateTime) -> bool {
        let Some(started_at) = self.started_at else {
            return false;
        };

        let elapsed = elapsed_seconds(started_at, now);
        let changed = elapsed != self.elapsed_seconds;
        self.elapsed_seconds = elapsed;
        changed
    }
}

#[derive(Debug)]
pub struct ExecutionSession {
    agent: AgentProfile,
    state: RunState,
    run: ExecutionRun,
    subscriptions: Option<RunSubscriptions>,
    error: Option<String>,
}

impl ExecutionSession {
    pub fn new(agent: AgentProfile) -> Self {
        Self {
            agent,
            state: RunState::Idle,
            run: ExecutionRun::new(None),
            subscriptions: None,
            error: None,
        }
    }

    /// Loads a stored run's newline-delimited output as a finished session.
    ///
    /// Blank lines are skipped; malformed lines are logged and kept in
    /// `raw_lines` only.
    pub fn from_output(agent: AgentProfile, output: &str) -> Self {
        let mut session = Self::new(agent);
        for line in output.lines().filter(|line| !line.trim().is_empty()) {
            session.run.log.append(line);
        }
        session.run.log.freeze();
        session.state = RunState::Completed;
        session
    }

    pub fn agent(&self) -> &AgentProfile {
        &self.agent
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    /// Whether this session still observes its run's channels.
    pub fn is_attached(&self) -> bool {
        self.subscriptions.is_some()
    }

    pub fn run(&self) -> &ExecutionRun {
        &self.run
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.run.run_id
    }

    pub fn log(&self) -> &MessageLog {
        &self.run.log
    }

    pub fn tokens_used(&self) -> u64 {
        self.run.log.tokens_used()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.run.elapsed_seconds
    }

    /// User-visible error text for the current run, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn subscription_keys(&self) -> Vec<&str> {
        self.subscriptions
            .as_ref()
            .map(RunSubscriptions::keys)
            .unwrap_or_default()
    }

    /// Starts a fresh run, discarding the previous one.
    ///
    /// Precondition failures leave the session untouched. Launch and
    /// subscription failures move it to `Failed` without a running interval.
    pub fn start<H: SessionHost>(
        &mut self,
        request: StartRequest,
        host: &mut H,
    ) -> Result<RunId, LaunchError> {
        if self.is_running() && self.is_attached() {
            return Err(LaunchError::AlreadyRunning);
        }
        if request.project_path.trim().is_empty() {
            return Err(LaunchError::EmptyProjectPath);
        }
        if request.task.trim().is_empty() {
            return Err(LaunchError::EmptyTask);
        }
        let model: AgentModel = request
            .model
            .parse()
            .map_err(LaunchError::UnsupportedModel)?;

        self.teardown();
        let launch_request = LaunchRequest {
            agent_id: self.agent.id,
            project_path: request.project_path,
            task: request.task,
            model,
        };
        self.run = ExecutionRun::new(Some(launch_request.clone()));
        self.error = None;

        let run_id = match host.launch(&launch_request) {
            Ok(run_id) => run_id,
            Err(reason) => {
                let error = LaunchError::Backend(reason);
                return Err(self.fail_start(error, host));
            }
        };
        self.run.run_id = Some(run_id);

        let subscriptions = match host.subscribe_run(run_id) {
            Ok(subscriptions) => subscriptions,
            Err(error) => return Err(self.fail_start(error, host)),
        };

        self.subscriptions = Some(subscriptions);
        self.run.started_at = Some(host.now());
        self.state = RunState::Running;
        info!(run_id, model = %model, agent = %self.agent.name, "execution started");
        host.request_render();
        Ok(run_id)
    }

    fn fail_start<H: SessionHost>(&mut self, error: LaunchError, host: &mut H) -> LaunchError {
        warn!(run_id = ?self.run.run_id, error = %error, "execution failed to start");
        self.run.log.freeze();
        self.state = RunState::Failed;
        self.error = Some(error.to_string());
        host.request_render();
        error
    }

    /// Applies one channel delivery. Returns whether the session changed.
    pub fn apply(&mut self, event: ChannelEvent, now: OffsetDateTime) -> bool {
        let run_id = event.run_id;
        match event.payload {
            ChannelPayload::Output(line) => self.on_output(run_id, line).is_some(),
            ChannelPayload::Error(error) => self.on_error(run_id, error, now),
            ChannelPayload::Complete(success) => self.on_complete(run_id, success, now),
            ChannelPayload::Cancelled(_) => self.on_cancelled(run_id, now),
        }
    }

    /// Appends an `output` line. Accepted for as long as the run is observed,
    /// including after a terminal signal.
    pub fn on_output(&mut self, run_id: RunId, line: impl Into<String>) -> Option<AppendOutcome> {
        if !self.accepts(run_id, Channel::Output) {
            return None;
        }

        assert!(!self.run.log.is_frozen(), "observed run has a frozen log");
        Some(self.run.log.append(line))
    }

    pub fn on_error(&mut self, run_id: RunId, error: impl Into<String>, now: OffsetDateTime) -> bool {
        if !self.accepts(run_id, Channel::Error) {
            return false;
        }

        let error = error.into();
        warn!(run_id, error = %error, "backend reported an error");
        self.error = Some(error);
        if self.is_running() {
            self.finish(RunState::Failed, now);
        }
        true
    }

    pub fn on_complete(&mut self, run_id: RunId, success: bool, now: OffsetDateTime) -> bool {
        if !self.accepts(run_id, Channel::Complete) || !self.is_running() {
            return false;
        }

        if success {
            self.finish(RunState::Completed, now);
        } else {
            self.error = Some(EXECUTION_FAILED.to_string());
            self.finish(RunState::Failed, now);
        }
        true
    }

    pub fn on_cancelled(&mut self, run_id: RunId, now: OffsetDateTime) -> bool {
        if !self.accepts(run_id, Channel::Cancelled) || !self.is_running() {
            return false;
        }

        self.finish(RunState::Cancelled, now);
        self.error = Some(EXECUTION_CANCELLED.to_string());
        self.push_stop_marker(CANCELLED_BY_BACKEND);
        true
    }

    /// Stops observing the live run and records a synthetic stop marker.
    ///
    /// A no-op unless the session is running and attached. The backend
    /// process is not signalled.
    pub fn stop(&mut self, now: OffsetDateTime) -> bool {
        if !self.is_running() || !self.is_attached() {
            return false;
        }

        self.finish(RunState::Cancelled, now);
        self.push_stop_marker(STOPPED_BY_USER);
        self.teardown();
        true
    }

    /// Detaches from the run's channels without stopping it.
    ///
    /// While running, `confirm` is asked first; declining leaves everything
    /// as it was and returns `false`.
    pub fn detach(&mut self, confirm: impl FnOnce() -> bool) -> bool {
        if self.is_running() && self.is_attached() && !confirm() {
            return false;
        }

        self.teardown();
        true
    }

    /// Samples elapsed time while the run is observed. Returns whether it changed.
    pub fn tick(&mut self, now: OffsetDateTime) -> bool {
        self.is_running() && self.is_attached() && self.run.sample(now)
    }

    fn accepts(&self, run_id: RunId, channel: Channel) -> bool {
        let live = self
            .subscriptions
            .as_ref()
            .is_some_and(|subscriptions| subscriptions.run_id() == run_id);
        if !live {
            debug!(run_id, %channel, current = ?self.run.run_id, "ignoring event for an unobserved run");
        }
        live
    }

    fn finish(&mut self, state: RunState, now: OffsetDateTime) {
        debug_assert!(state.is_terminal());
        self.run.sample(now);
        self.run.started_at = None;
        self.state = state;
        info!(
            run_id = ?self.run.run_id,
            state = ?state,
            elapsed_seconds = self.run.elapsed_seconds,
            tokens = self.run.log.tokens_used(),
            "execution finished"
        );
    }

    fn push_stop_marker(&mut self, text: &str) {
        let mut marker = StreamMessage::new(MessageKind::Result)
            .with_extra("is_error", true)
            .with_extra("result", text)
            .with_extra("duration_ms", self.run.elapsed_seconds.saturating_mul(1000));
        marker.subtype = Some("error".to_string());
        marker.usage = Some(Usage::new(self.run.log.tokens_used(), 0));
        self.run.log.push_synthetic(marker);
    }

    fn teardown(&mut self) {
        if let Some(subscriptions) = self.subscriptions.take() {
            subscriptions.release();
        }
        self.run.log.freeze();
    }
}
