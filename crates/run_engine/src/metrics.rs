use std::sync::Mutex;

use stream_protocol::StreamMessage;
use time::{Duration, OffsetDateTime};

use crate::lock_unpoisoned;

/// Total `input_tokens + output_tokens` over `messages`.
///
/// Each message contributes once, from its top-level `usage` when present and
/// from `message.usage` otherwise. Engine-produced markers are not counted.
#[must_use]
pub fn tokens_used(messages: &[StreamMessage]) -> u64 {
    messages
        .iter()
        .filter(|message| !message.synthetic)
        .filter_map(StreamMessage::effective_usage)
        .fold(0u64, |total, usage| total.saturating_add(usage.total()))
}

/// Whole seconds between `started_at` and `now`, never negative.
#[must_use]
pub fn elapsed_seconds(started_at: OffsetDateTime, now: OffsetDateTime) -> u64 {
    let seconds = (now - started_at).whole_seconds();
    u64::try_from(seconds).unwrap_or(0)
}

/// Wall-clock source for run timestamps.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock_unpoisoned(&self.now);
        *now += by;
    }

    pub fn set(&self, to: OffsetDateTime) {
        *lock_unpoisoned(&self.now) = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(OffsetDateTime::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *lock_unpoisoned(&self.now)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(line: &str) -> StreamMessage {
        serde_json::from_str(line).expect("valid message")
    }

    #[test]
    fn usage_location_does_not_change_the_total() {
        let top_level = parse(r#"{"type":"result","usage":{"input_tokens":10,"output_tokens":5}}"#);
        let nested = parse(r#"{"type":"assistant","message":{"usage":{"input_tokens":10,"output_tokens":5}}}"#);
        let both = parse(
            r#"{"type":"assistant","usage":{"input_tokens":10,"output_tokens":5},"message":{"usage":{"input_tokens":10,"output_tokens":5}}}"#,
        );

        assert_eq!(tokens_used(&[top_level]), 15);
        assert_eq!(tokens_used(&[nested]), 15);
        assert_eq!(tokens_used(&[both]), 15);
    }

    #[test]
    fn messages_without_usage_contribute_nothing() {
        let messages = vec![
            parse(r#"{"type":"system","subtype":"init"}"#),
            parse(r#"{"type":"assistant","message":{"usage":{"input_tokens":2}}}"#),
        ];
        assert_eq!(tokens_used(&messages), 2);
        assert_eq!(tokens_used(&[]), 0);
    }

    #[test]
    fn elapsed_time_truncates_and_never_goes_negative() {
        let start = OffsetDateTime::UNIX_EPOCH;
        assert_eq!(elapsed_seconds(start, start + Duration::milliseconds(2_999)), 2);
        assert_eq!(elapsed_seconds(start, start - Duration::seconds(5)), 0);
    }

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance(Duration::seconds(3));
        assert_eq!(elapsed_seconds(start, clock.now()), 3);
    }
}
