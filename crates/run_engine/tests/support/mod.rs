#![allow(dead_code)]

use std::sync::Arc;

use event_source_mock::{MockEventBus, MockLauncher};
use run_engine::metrics::ManualClock;
use run_engine::{AgentProfile, ExecutionSession, RuntimeController, StartRequest};
use time::OffsetDateTime;

pub const ASSISTANT_LINE: &str =
    r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Looking into it"}]}}"#;
pub const RESULT_LINE: &str = r#"{"type":"result","usage":{"input_tokens":10,"output_tokens":5}}"#;

pub struct Harness {
    pub bus: MockEventBus,
    pub launcher: Arc<MockLauncher>,
    pub clock: Arc<ManualClock>,
    pub controller: Arc<RuntimeController>,
}

impl Harness {
    pub fn new(first_run_id: u64) -> Self {
        let bus = MockEventBus::new();
        let launcher = Arc::new(MockLauncher::starting_at(first_run_id));
        let clock = Arc::new(ManualClock::new(OffsetDateTime::UNIX_EPOCH));
        let controller = RuntimeController::new(
            ExecutionSession::new(AgentProfile::new(1, "bug fixer")),
            Arc::new(bus.clone()),
            Arc::clone(&launcher) as Arc<dyn stream_protocol::ExecutionLauncher>,
            Arc::clone(&clock) as Arc<dyn run_engine::metrics::Clock>,
        );

        Self {
            bus,
            launcher,
            clock,
            controller,
        }
    }

    pub fn advance_seconds(&self, seconds: i64) {
        self.clock.advance(time::Duration::seconds(seconds));
    }
}

pub fn start_request() -> StartRequest {
    StartRequest::new("/tmp/proj", "fix bug", "sonnet")
}
