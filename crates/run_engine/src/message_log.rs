//! Append-only record of one run's output.
//!
//! Every received line lands in `raw_lines`; only lines that parse as a
//! [`StreamMessage`] land in `messages`. Engine-produced markers land in
//! `messages` only, so `raw_lines` stays exactly what was received. The log also keeps the token total and
//! a `tool_use.id -> name` index current on every append so derived views never
//! rescan history.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use stream_protocol::{ContentBlock, MessageKind, StreamMessage};
use tracing::warn;

use crate::error::IngestError;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Result of ingesting one raw line.
#[derive(Debug)]
pub enum AppendOutcome {
    /// The line parsed; `index` is its position in [`MessageLog::messages`].
    Parsed { index: usize },
    /// The line was kept in `raw_lines` only.
    Malformed(IngestError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ToolUse {
    message_index: usize,
    name: String,
}

#[derive(Debug)]
pub struct MessageLog {
    generation: u64,
    messages: Vec<StreamMessage>,
    raw_lines: Vec<String>,
    // Position in `raw_lines` of each message; `None` for synthetic ones.
    raw_index: Vec<Option<usize>>,
    tool_uses: HashMap<String, Vec<ToolUse>>,
    tokens_used: u64,
    parse_errors: usize,
    frozen: bool,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageLog {
    pub fn new() -> Self {
        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            messages: Vec::new(),
            raw_lines: Vec::new(),
            raw_index: Vec::new(),
            tool_uses: HashMap::new(),
            tokens_used: 0,
            parse_errors: 0,
            frozen: false,
        }
    }

    /// Identity of this log instance. A fresh log never reuses a generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn messages(&self) -> &[StreamMessage] {
        &self.messages
    }

    pub fn message(&self, index: usize) -> Option<&StreamMessage> {
        self.messages.get(index)
    }

    pub fn raw_lines(&self) -> &[String] {
        &self.raw_lines
    }

    /// The raw line `messages()[index]` was parsed from. `None` for
    /// engine-produced messages.
    pub fn raw_line_for(&self, index: usize) -> Option<&str> {
        self.raw_index
            .get(index)
            .copied()
            .flatten()
            .and_then(|raw| self.raw_lines.get(raw))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Running token total, identical to [`crate::metrics::tokens_used`] over `messages()`.
    pub fn tokens_used(&self) -> u64 {
        self.tokens_used
    }

    pub fn parse_errors(&self) -> usize {
        self.parse_errors
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Parses and records one raw `output` line.
    pub fn append(&mut self, raw: impl Into<String>) -> AppendOutcome {
        debug_assert!(!self.frozen, "append on a frozen message log");

        let raw = raw.into();
        let line_index = self.raw_lines.len();
        let parsed = serde_json::from_str::<StreamMessage>(&raw);
        self.raw_lines.push(raw);

        match parsed {
            Ok(message) => AppendOutcome::Parsed {
                index: self.push_parsed(message, Some(line_index)),
            },
            Err(source) => {
                self.parse_errors += 1;
                warn!(line_index, error = %source, "skipping malformed output line");
                AppendOutcome::Malformed(IngestError::Parse { line_index, source })
            }
        }
    }

    /// Records a message the engine produced itself. It is never added to
    /// `raw_lines`.
    pub fn push_synthetic(&mut self, mut message: StreamMessage) -> usize {
        debug_assert!(!self.frozen, "append on a frozen message log");

        message.synthetic = true;
        self.push_parsed(message, None)
    }

    /// Name of the closest `tool_use` with `id` that precedes message `before`
    /// and was emitted by an assistant message.
    pub fn tool_use_before(&self, before: usize, id: &str) -> Option<&str> {
        self.tool_uses
            .get(id)?
            .iter()
            .rev()
            .find(|tool_use| tool_use.message_index < before)
            .map(|tool_use| tool_use.name.as_str())
    }

    fn push_parsed(&mut self, message: StreamMessage, line_index: Option<usize>) -> usize {
        let index = self.messages.len();

        if !message.synthetic {
            if let Some(usage) = message.effective_usage() {
                self.tokens_used = self.tokens_used.saturating_add(usage.total());
            }
        }

        if message.kind == MessageKind::Assistant {
            for block in message.content().map(|content| content.blocks()).unwrap_or_default() {
                if let ContentBlock::ToolUse { id, name, .. } = block {
                    self.tool_uses.entry(id.clone()).or_default().push(ToolUse {
                        message_index: index,
                        name: name.clone(),
                    });
                }
            }
        }

        self.messages.push(message);
        self.raw_index.push(line_index);
        index
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use stream_protocol::Usage;

    use super::*;

    #[test]
    fn malformed_lines_stay_in_raw_lines_only() {
        let mut log = MessageLog::new();
        assert_matches!(log.append(r#"{"type":"system","subtype":"init"}"#), AppendOutcome::Parsed { index: 0 });
        assert_matches!(
            log.append("not json"),
            AppendOutcome::Malformed(IngestError::Parse { line_index: 1, .. })
        );
        assert_matches!(log.append(r#"{"type":"assistant"}"#), AppendOutcome::Parsed { index: 1 });

        assert_eq!(log.len(), 2);
        assert_eq!(log.raw_lines().len(), 3);
        assert_eq!(log.parse_errors(), 1);
        assert_eq!(log.raw_line_for(1), Some(r#"{"type":"assistant"}"#));
    }

    #[test]
    fn running_token_total_skips_synthetic_messages() {
        let mut log = MessageLog::new();
        log.append(r#"{"type":"assistant","message":{"usage":{"input_tokens":4,"output_tokens":6}}}"#);

        let mut marker = StreamMessage::new(MessageKind::Result);
        marker.usage = Some(Usage::new(10, 0));
        let index = log.push_synthetic(marker);

        assert_eq!(log.tokens_used(), 10);
        assert!(log.messages()[index].synthetic);
    }

    #[test]
    fn synthetic_messages_never_reach_raw_lines() {
        let first = r#"{"type":"assistant","message":{"content":"hi"}}"#;
        let last = r#"{"type":"result"}"#;
        let mut log = MessageLog::new();
        log.append(first);
        let marker = log.push_synthetic(StreamMessage::new(MessageKind::Result));
        log.append(last);

        assert_eq!(log.len(), 3);
        assert_eq!(log.raw_lines(), &[first.to_string(), last.to_string()][..]);
        assert_eq!(log.raw_line_for(0), Some(first));
        assert_eq!(log.raw_line_for(marker), None);
        assert_eq!(log.raw_line_for(2), Some(last));
    }

    #[test]
    fn tool_use_lookup_only_sees_earlier_assistant_messages() {
        let mut log = MessageLog::new();
        log.append(r#"{"type":"user","message":{"content":[{"type":"tool_use","id":"t0","name":"bash"}]}}"#);
        log.append(r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Read"}]}}"#);
        log.append(r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"WebFetch"}]}}"#);

        assert_eq!(log.tool_use_before(3, "t0"), None);
        assert_eq!(log.tool_use_before(1, "t1"), None);
        assert_eq!(log.tool_use_before(2, "t1"), Some("Read"));
        assert_eq!(log.tool_use_before(3, "t1"), Some("WebFetch"));
    }

    #[test]
    fn unusual_nested_fields_still_parse() {
        let mut log = MessageLog::new();
        assert_matches!(
            log.append(r#"{"type":"system","subtype":"error","message":"rate limited"}"#),
            AppendOutcome::Parsed { index: 0 }
        );
        assert_matches!(
            log.append(r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Bash","input":{}},{"type":"tool_result","tool_use_id":"t0","content":"x","is_error":null}],"usage":{"input_tokens":5,"output_tokens":null}}}"#),
            AppendOutcome::Parsed { index: 1 }
        );

        assert_eq!(log.parse_errors(), 0);
        assert_eq!(log.tokens_used(), 5);
        assert_eq!(log.tool_use_before(2, "t1"), Some("Bash"));
    }

    #[test]
    fn every_log_gets_a_fresh_generation() {
        assert_ne!(MessageLog::new().generation(), MessageLog::new().generation());
    }
}
