//! Streaming execution session engine.
//!
//! Tracks one agent execution from Start to a terminal state, ingests its
//! line-delimited JSON output from four run-scoped channels, derives token and
//! elapsed-time metrics, filters the log down to displayable messages, and
//! feeds two independently scrolled virtualized transcript views.
//!
//! ## Collaborators
//!
//! The backend is consumed only through `stream_protocol::ExecutionLauncher`
//! (start a run, get its run id) and `stream_protocol::EventSource` (subscribe
//! to `output`, `error`, `complete` and `cancelled` for that run id).
//!
//! ## Configuration
//!
//! [`config::EngineConfig::from_env`] reads:
//!
//! - `RUN_ENGINE_CONFIG_PATH`: optional JSON file with any of
//!   `estimated_row_height`, `overscan`, `tick_interval_ms`,
//!   `bottom_tolerance`, `transcript_width`. Unknown fields are rejected.
//! - `RUN_ENGINE_OVERSCAN`, `RUN_ENGINE_ROW_ESTIMATE`, `RUN_ENGINE_TICK_MS`,
//!   `RUN_ENGINE_WIDTH`: individual overrides applied after the file.
//!
//! Sizes and intervals must be > 0. Blank values are ignored.
//!
//! ## Logging
//!
//! The engine emits `tracing` events and never installs a subscriber itself;
//! binaries call [`logging::init_logging`].

use std::sync::{Mutex, MutexGuard};

pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod message_log;
pub mod metrics;
pub mod render;
pub mod runtime;
pub mod session;
pub mod subscriptions;
pub mod transcript;
pub mod visibility;

pub use config::EngineConfig;
pub use error::{ConfigError, ExportError, IngestError, LaunchError};
pub use message_log::{AppendOutcome, MessageLog};
pub use runtime::{RuntimeController, Ticker};
pub use session::{AgentProfile, ExecutionRun, ExecutionSession, RunState, SessionHost, StartRequest};
pub use transcript::{RunScreen, TranscriptFrame, TranscriptView};

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
