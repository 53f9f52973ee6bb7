//! Wire types for agent execution streams and the collaborator contracts the
//! run engine consumes.
//!
//! This crate defines the shape of one streamed output line ([`StreamMessage`]),
//! the four run-scoped notification channels, and the two backend-facing
//! traits: [`EventSource`] (channel subscription) and [`ExecutionLauncher`]
//! (starting a run). It excludes any transport, persistence, or UI concern.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

mod message;

pub use message::{
    tool_result_text, ContentBlock, MessageBody, MessageContent, MessageKind, StreamMessage,
    Usage,
};

/// Identifier for one execution attempt.
pub type RunId = u64;

/// Identifier of the agent definition being executed.
pub type AgentId = i64;

/// Named notification channel. The effective key is `"<name>:<run_id>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Output,
    Error,
    Complete,
    Cancelled,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Output,
        Channel::Error,
        Channel::Complete,
        Channel::Cancelled,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Output => "output",
            Self::Error => "error",
            Self::Complete => "complete",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns the run-scoped channel key.
    #[must_use]
    pub fn key(self, run_id: RunId) -> String {
        format!("{}:{run_id}", self.as_str())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload delivered on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelPayload {
    /// One raw output line, not yet validated.
    Output(String),
    /// Backend-reported error text.
    Error(String),
    /// `true` for clean completion, `false` for a reported failure.
    Complete(bool),
    /// Cancellation signal; the value carries no meaning.
    Cancelled(bool),
}

impl ChannelPayload {
    #[must_use]
    pub fn channel(&self) -> Channel {
        match self {
            Self::Output(_) => Channel::Output,
            Self::Error(_) => Channel::Error,
            Self::Complete(_) => Channel::Complete,
            Self::Cancelled(_) => Channel::Cancelled,
        }
    }
}

/// Run-scoped channel delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub run_id: RunId,
    pub payload: ChannelPayload,
}

impl ChannelEvent {
    #[must_use]
    pub fn new(run_id: RunId, payload: ChannelPayload) -> Self {
        Self { run_id, payload }
    }

    #[must_use]
    pub fn channel(&self) -> Channel {
        self.payload.channel()
    }
}

/// Callback invoked for every delivery on a subscribed channel.
pub type EventHandler = Arc<dyn Fn(ChannelEvent) + Send + Sync + 'static>;

/// Handle for one live channel subscription.
///
/// Dropping the handle unsubscribes. [`Subscription::unsubscribe`] does the same
/// explicitly.
pub struct Subscription {
    key: String,
    release: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Subscription {
    #[must_use]
    pub fn new(key: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            key: key.into(),
            release: Some(Box::new(release)),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Backend notification source, keyed by channel and run id.
pub trait EventSource: Send + Sync + 'static {
    /// Subscribes `handler` to `channel` for `run_id`.
    ///
    /// Handlers may be invoked from any thread and must not block.
    fn subscribe(
        &self,
        channel: Channel,
        run_id: RunId,
        handler: EventHandler,
    ) -> Result<Subscription, String>;
}

/// Model identifiers accepted by the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentModel {
    #[default]
    Sonnet,
    Opus,
}

impl AgentModel {
    pub const ALL: [AgentModel; 2] = [AgentModel::Sonnet, AgentModel::Opus];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sonnet => "sonnet",
            Self::Opus => "opus",
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Sonnet => "Claude 4 Sonnet",
            Self::Opus => "Claude 4 Opus",
        }
    }
}

impl fmt::Display for AgentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentModel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "sonnet" => Ok(Self::Sonnet),
            "opus" => Ok(Self::Opus),
            unknown => Err(format!(
                "Unsupported model '{unknown}'. Available models: sonnet, opus"
            )),
        }
    }
}

/// Input required to start one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub agent_id: AgentId,
    pub project_path: String,
    pub task: String,
    pub model: AgentModel,
}

/// Backend entry point that starts an execution and returns its run id.
pub trait ExecutionLauncher: Send + Sync + 'static {
    fn start_execution(&self, request: &LaunchRequest) -> Result<RunId, String>;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn channel_keys_are_scoped_by_run_id() {
        assert_eq!(Channel::Output.key(7), "output:7");
        assert_eq!(Channel::Cancelled.key(12), "cancelled:12");
        assert_eq!(
            ChannelPayload::Complete(true).channel(),
            Channel::Complete
        );
    }

    #[test]
    fn subscription_releases_exactly_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let subscription = Subscription::new("output:1", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(subscription.key(), "output:1");
        subscription.unsubscribe();
        assert_eq!(released.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&released);
        drop(Subscription::new("error:1", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn model_parsing_accepts_closed_set_only() {
        assert_eq!("opus".parse::<AgentModel>(), Ok(AgentModel::Opus));
        assert_eq!(" sonnet ".parse::<AgentModel>(), Ok(AgentModel::Sonnet));

        let error = "gpt".parse::<AgentModel>().expect_err("unknown model");
        assert!(error.contains("Unsupported model 'gpt'"));
    }
}
