//! Decides which logged messages are worth a transcript row.
//!
//! Rules, first match wins:
//! 1. `isMeta` messages without a `leafUuid` or `summary` are dropped.
//! 2. `user` messages are dropped when flagged `isMeta` or when their content is
//!    absent or empty.
//! 3. `user` messages with block content are kept only if some block is
//!    visible. Text is always visible; a tool result is hidden when the
//!    `tool_use` it answers belongs to a tool with a dedicated widget.
//! 4. Everything else is kept.

use stream_protocol::{ContentBlock, MessageContent, MessageKind, StreamMessage};

use crate::message_log::MessageLog;

/// Tools whose results are rendered inside their `tool_use` widget.
pub const WIDGET_TOOLS: [&str; 10] = [
    "task",
    "edit",
    "multiedit",
    "todowrite",
    "ls",
    "read",
    "glob",
    "bash",
    "write",
    "grep",
];

/// MCP tools all share the generic MCP widget.
pub const MCP_TOOL_PREFIX: &str = "mcp__";

#[must_use]
pub fn is_widget_tool(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    WIDGET_TOOLS.contains(&name.as_str()) || name.starts_with(MCP_TOOL_PREFIX)
}

/// Whether `log.messages()[index]` should be rendered.
#[must_use]
pub fn is_displayable(log: &MessageLog, index: usize) -> bool {
    let Some(message) = log.message(index) else {
        return false;
    };

    if message.is_meta && !has_text(message.leaf_uuid.as_deref()) && !has_text(message.summary.as_deref()) {
        return false;
    }

    if message.kind != MessageKind::User {
        return true;
    }

    if message.is_meta {
        return false;
    }

    match message.content() {
        None => false,
        Some(content) if content.is_empty() => false,
        Some(MessageContent::Text(_)) => true,
        Some(MessageContent::Blocks(blocks)) => blocks
            .iter()
            .any(|block| block_is_visible(log, index, block)),
    }
}

/// Indices of every displayable message, in log order.
#[must_use]
pub fn displayable_indices(log: &MessageLog) -> Vec<usize> {
    (0..log.len())
        .filter(|index| is_displayable(log, *index))
        .collect()
}

fn block_is_visible(log: &MessageLog, index: usize, block: &ContentBlock) -> bool {
    match block {
        ContentBlock::Text { .. } => true,
        ContentBlock::ToolResult { tool_use_id, .. } => {
            if tool_use_id.is_empty() {
                return true;
            }
            // Unmatched results stay visible.
            !log.tool_use_before(index, tool_use_id)
                .is_some_and(is_widget_tool)
        }
        ContentBlock::ToolUse { .. } | ContentBlock::Unknown => false,
    }
}

fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|value| !value.is_empty())
}

/// Memoized [`displayable_indices`] keyed on log identity and length.
///
/// Since the log only grows and a message's visibility depends only on the
/// messages before it, new entries are classified without revisiting old ones.
#[derive(Debug, Default, Clone)]
pub struct DisplayFilter {
    generation: Option<u64>,
    seen: usize,
    indices: Vec<usize>,
}

impl DisplayFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Brings the cached view up to date with `log`. Returns whether it changed.
    pub fn sync(&mut self, log: &MessageLog) -> bool {
        if self.generation != Some(log.generation()) || self.seen > log.len() {
            self.generation = Some(log.generation());
            self.seen = 0;
            self.indices.clear();
            if log.is_empty() {
                return true;
            }
        }

        if self.seen == log.len() {
            return false;
        }

        let before = self.indices.len();
        self.indices
            .extend((self.seen..log.len()).filter(|index| is_displayable(log, *index)));
        self.seen = log.len();
        self.indices.len() != before
    }

    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Displayable messages in order.
    pub fn messages<'a>(&'a self, log: &'a MessageLog) -> impl Iterator<Item = &'a StreamMessage> + 'a {
        self.indices.iter().filter_map(|index| log.message(*index))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn log_of(lines: &[&str]) -> MessageLog {
        let mut log = MessageLog::new();
        for line in lines {
            log.append(*line);
        }
        log
    }

    #[test]
    fn widget_tool_names_match_case_insensitively() {
        assert!(is_widget_tool("Bash"));
        assert!(is_widget_tool("TodoWrite"));
        assert!(is_widget_tool("mcp__github__search"));
        assert!(is_widget_tool("MCP__github__search"));
        assert!(!is_widget_tool("WebFetch"));
    }

    #[test]
    fn bash_tool_result_is_dropped_but_unmatched_result_is_kept() {
        let log = log_of(&[
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"bash","input":{}}]}}"#,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"ok"}]}}"#,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t9","content":"ok"}]}}"#,
        ]);

        assert_eq!(displayable_indices(&log), vec![0, 2]);
        assert_eq!(displayable_indices(&log), displayable_indices(&log));
    }

    #[test]
    fn non_widget_tool_results_and_text_stay_visible() {
        let log = log_of(&[
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"WebFetch","input":{}},{"type":"tool_use","id":"t2","name":"Read","input":{}}]}}"#,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"page"}]}}"#,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t2","content":"file"},{"type":"text","text":"note"}]}}"#,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","content":"anonymous"}]}}"#,
        ]);

        assert_eq!(displayable_indices(&log), vec![0, 1, 2, 3]);
    }

    #[test]
    fn meta_and_empty_user_messages_are_dropped() {
        let log = log_of(&[
            r#"{"type":"system","isMeta":true}"#,
            r#"{"type":"system","isMeta":true,"leafUuid":"leaf"}"#,
            r#"{"type":"summary","isMeta":true,"summary":"recap"}"#,
            r#"{"type":"user","isMeta":true,"leafUuid":"leaf","message":{"content":"hi"}}"#,
            r#"{"type":"user"}"#,
            r#"{"type":"user","message":{"content":""}}"#,
            r#"{"type":"user","message":{"content":[]}}"#,
            r#"{"type":"user","message":{"content":[{"type":"thinking","thinking":"hm"}]}}"#,
            r#"{"type":"user","message":{"content":"plain"}}"#,
        ]);

        assert_eq!(displayable_indices(&log), vec![1, 2, 8]);
    }

    #[test]
    fn filter_extends_incrementally_and_resets_for_a_new_log() {
        let mut log = log_of(&[r#"{"type":"assistant"}"#]);
        let mut filter = DisplayFilter::new();

        assert!(filter.sync(&log));
        assert!(!filter.sync(&log));
        assert_eq!(filter.indices(), &[0]);

        log.append(r#"{"type":"user"}"#);
        assert!(!filter.sync(&log));
        log.append(r#"{"type":"result"}"#);
        assert!(filter.sync(&log));
        assert_eq!(filter.indices(), displayable_indices(&log).as_slice());

        let fresh = MessageLog::new();
        assert!(filter.sync(&fresh));
        assert!(filter.is_empty());
    }
}
