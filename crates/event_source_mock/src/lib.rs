//! Deterministic in-memory implementation of the `stream_protocol` collaborator
//! contracts.
//!
//! [`MockEventBus`] is a channel bus keyed by `"<channel>:<run_id>"` that
//! delivers synchronously on the emitting thread. [`MockLauncher`] hands out
//! incrementing run ids. Neither contains transport logic; both are intended
//! for local development, replay, and contract-level integration testing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use stream_protocol::{
    Channel, ChannelEvent, ChannelPayload, EventHandler, EventSource, ExecutionLauncher,
    LaunchRequest, RunId, Subscription,
};

#[derive(Default)]
struct BusState {
    handlers: HashMap<String, Vec<(u64, EventHandler)>>,
    next_handler_id: u64,
    failing_channels: HashSet<Channel>,
    subscribe_calls: usize,
}

/// Shared in-memory channel bus. Clones observe the same subscriptions.
#[derive(Clone, Default)]
pub struct MockEventBus {
    state: Arc<Mutex<BusState>>,
}

impl MockEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later subscription to `channel` fail.
    pub fn fail_subscriptions_on(&self, channel: Channel) {
        lock_unpoisoned(&self.state).failing_channels.insert(channel);
    }

    pub fn clear_subscription_failures(&self) {
        lock_unpoisoned(&self.state).failing_channels.clear();
    }

    /// Delivers `payload` to every handler subscribed to its channel for
    /// `run_id`. Returns the number of handlers reached.
    pub fn emit(&self, run_id: RunId, payload: ChannelPayload) -> usize {
        let key = payload.channel().key(run_id);
        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let handlers: Vec<EventHandler> = lock_unpoisoned(&self.state)
            .handlers
            .get(&key)
            .map(|handlers| handlers.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler(ChannelEvent::new(run_id, payload.clone()));
        }

        handlers.len()
    }

    pub fn emit_output(&self, run_id: RunId, line: impl Into<String>) -> usize {
        self.emit(run_id, ChannelPayload::Output(line.into()))
    }

    pub fn emit_error(&self, run_id: RunId, error: impl Into<String>) -> usize {
        self.emit(run_id, ChannelPayload::Error(error.into()))
    }

    pub fn emit_complete(&self, run_id: RunId, success: bool) -> usize {
        self.emit(run_id, ChannelPayload::Complete(success))
    }

    pub fn emit_cancelled(&self, run_id: RunId) -> usize {
        self.emit(run_id, ChannelPayload::Cancelled(true))
    }

    /// Emits every line of `script` on `output`, then its terminal signal.
    pub fn play(&self, run_id: RunId, script: &Script) {
        for line in &script.lines {
            self.emit_output(run_id, line.clone());
        }
        self.emit_terminal(run_id, script.outcome);
    }

    /// Plays `script` from a background thread with `delay` between deliveries.
    pub fn spawn_play(&self, run_id: RunId, script: Script, delay: Duration) -> std::io::Result<JoinHandle<()>> {
        let bus = self.clone();
        thread::Builder::new()
            .name(format!("mock-event-source-{run_id}"))
            .spawn(move || {
                for line in script.lines {
                    bus.emit_output(run_id, line);
                    thread::sleep(delay);
                }
                bus.emit_terminal(run_id, script.outcome);
            })
    }

    fn emit_terminal(&self, run_id: RunId, outcome: ScriptOutcome) {
        match outcome {
            ScriptOutcome::Complete(success) => {
                self.emit_complete(run_id, success);
            }
            ScriptOutcome::Cancelled => {
                self.emit_cancelled(run_id);
            }
            ScriptOutcome::Error(error) => {
                self.emit_error(run_id, error);
                self.emit_complete(run_id, false);
            }
            ScriptOutcome::Silent => {}
        }
    }

    /// Number of live handlers on `channel` for `run_id`.
    #[must_use]
    pub fn subscriber_count(&self, channel: Channel, run_id: RunId) -> usize {
        lock_unpoisoned(&self.state)
            .handlers
            .get(&channel.key(run_id))
            .map_or(0, Vec::len)
    }

    /// Number of live handlers across all channels and runs.
    #[must_use]
    pub fn total_subscribers(&self) -> usize {
        lock_unpoisoned(&self.state)
            .handlers
            .values()
            .map(Vec::len)
            .sum()
    }

    #[must_use]
    pub fn subscribe_calls(&self) -> usize {
        lock_unpoisoned(&self.state).subscribe_calls
    }
}

impl EventSource for MockEventBus {
    fn subscribe(
        &self,
        channel: Channel,
        run_id: RunId,
        handler: EventHandler,
    ) -> Result<Subscription, String> {
        let key = channel.key(run_id);
        let handler_id = {
            let mut state = lock_unpoisoned(&self.state);
            state.subscribe_calls += 1;
            if state.failing_channels.contains(&channel) {
                return Err(format!("failed to listen on {key}"));
            }

            let handler_id = state.next_handler_id;
            state.next_handler_id += 1;
            state
                .handlers
                .entry(key.clone())
                .or_default()
                .push((handler_id, handler));
            handler_id
        };

        let state = Arc::clone(&self.state);
        let release_key = key.clone();
        Ok(Subscription::new(key, move || {
            let mut state = lock_unpoisoned(&state);
            if let Some(handlers) = state.handlers.get_mut(&release_key) {
                handlers.retain(|(id, _)| *id != handler_id);
                if handlers.is_empty() {
                    state.handlers.remove(&release_key);
                }
            }
        }))
    }
}

/// Launcher handing out incrementing run ids and recording requests.
#[derive(Debug)]
pub struct MockLauncher {
    next_run_id: AtomicU64,
    pending_failure: Mutex<Option<String>>,
    requests: Mutex<Vec<LaunchRequest>>,
}

impl Default for MockLauncher {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl MockLauncher {
    /// Creates a launcher whose first run id is `first_run_id`.
    #[must_use]
    pub fn starting_at(first_run_id: RunId) -> Self {
        Self {
            next_run_id: AtomicU64::new(first_run_id),
            pending_failure: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Makes the next `start_execution` call fail with `error`.
    pub fn fail_next(&self, error: impl Into<String>) {
        *lock_unpoisoned(&self.pending_failure) = Some(error.into());
    }

    #[must_use]
    pub fn requests(&self) -> Vec<LaunchRequest> {
        lock_unpoisoned(&self.requests).clone()
    }
}

impl ExecutionLauncher for MockLauncher {
    fn start_execution(&self, request: &LaunchRequest) -> Result<RunId, String> {
        lock_unpoisoned(&self.requests).push(request.clone());
        if let Some(error) = lock_unpoisoned(&self.pending_failure).take() {
            return Err(error);
        }

        Ok(self.next_run_id.fetch_add(1, Ordering::SeqCst))
    }
}

/// How a scripted run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOutcome {
    Complete(bool),
    Cancelled,
    /// Emits the error text, then `complete(false)`.
    Error(&'static str),
    /// Emits no terminal signal.
    Silent,
}

/// Scripted output for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub lines: Vec<String>,
    pub outcome: ScriptOutcome,
}

impl Script {
    #[must_use]
    pub fn new(lines: Vec<String>, outcome: ScriptOutcome) -> Self {
        Self { lines, outcome }
    }

    /// Splits stored run output into lines, skipping blank ones.
    #[must_use]
    pub fn from_output(output: &str, outcome: ScriptOutcome) -> Self {
        Self::new(
            output
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect(),
            outcome,
        )
    }
}

impl Default for Script {
    fn default() -> Self {
        Self::new(
            vec![
                r#"{"type":"system","subtype":"init","session_id":"mock-session","model":"claude-sonnet-4","cwd":"/tmp/proj","tools":["Bash","Read","Edit"]}"#.to_string(),
                r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Looking into the failing test."}],"usage":{"input_tokens":120,"output_tokens":18}}}"#.to_string(),
                r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"toolu_1","name":"Bash","input":{"command":"cargo test"}}],"usage":{"input_tokens":140,"output_tokens":22}}}"#.to_string(),
                r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"toolu_1","content":"test result: FAILED. 1 passed; 1 failed"}]}}"#.to_string(),
                r#"{"type":"assistant","message":{"content":[{"type":"text","text":"The parser drops the last line; fixing the loop bound."}],"usage":{"input_tokens":210,"output_tokens":40}}}"#.to_string(),
                r#"{"type":"result","subtype":"success","result":"Fixed the off-by-one in the parser.","cost_usd":0.0123,"duration_ms":4210,"num_turns":3,"usage":{"input_tokens":470,"output_tokens":80}}"#.to_string(),
            ],
            ScriptOutcome::Complete(true),
        )
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
