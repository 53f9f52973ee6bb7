//! Plain-text transcript rows.
//!
//! One displayable message renders to one row of wrapped lines; the line
//! count is the row height fed to the virtual list.

use runview::{truncate_to_width, wrap_text};
use serde_json::Value;
use stream_protocol::{tool_result_text, ContentBlock, MessageContent, MessageKind, StreamMessage};

use crate::message_log::MessageLog;
use crate::visibility::is_widget_tool;

const INDENT: &str = "  ";

/// Renders `log.messages()[index]` wrapped to `width` columns.
#[must_use]
pub fn render_message(log: &MessageLog, index: usize, width: usize) -> Vec<String> {
    let Some(message) = log.message(index) else {
        return Vec::new();
    };

    let mut row = RowBuilder::new(width);
    match &message.kind {
        MessageKind::System if message.is_init() => render_init(message, &mut row),
        MessageKind::System => {
            let label = match message.subtype.as_deref() {
                Some(subtype) => format!("System ({subtype})"),
                None => "System".to_string(),
            };
            row.heading(&label);
            if let Some(result) = message.result_text() {
                row.text(result);
            }
        }
        MessageKind::Assistant => {
            row.heading("Assistant");
            for block in blocks_of(message) {
                match block {
                    Block::Text(text) => row.text(text),
                    Block::Item(ContentBlock::ToolUse { name, input, .. }) => {
                        row.tool_call(name, input);
                    }
                    Block::Item(_) => {}
                }
            }
        }
        MessageKind::User => {
            row.heading("User");
            for block in blocks_of(message) {
                match block {
                    Block::Text(text) => row.text(text),
                    Block::Item(ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    }) => {
                        let covered = !tool_use_id.is_empty()
                            && log
                                .tool_use_before(index, tool_use_id)
                                .is_some_and(is_widget_tool);
                        if !covered {
                            row.tool_result(content, *is_error);
                        }
                    }
                    Block::Item(_) => {}
                }
            }
        }
        MessageKind::Result => render_result(message, &mut row),
        MessageKind::Other(kind) => {
            row.heading(kind);
            if let Some(summary) = message.summary.as_deref() {
                row.text(summary);
            }
        }
    }

    row.finish()
}

fn render_init(message: &StreamMessage, row: &mut RowBuilder) {
    row.heading("System initialized");
    row.field("Session", message.session_id().unwrap_or("N/A"));
    row.field("Model", message.model().unwrap_or("default"));
    if let Some(cwd) = message.cwd() {
        row.field("Working directory", cwd);
    }
    let tools = message.tools();
    if !tools.is_empty() {
        row.field("Tools", &tools.join(", "));
    }
}

fn render_result(message: &StreamMessage, row: &mut RowBuilder) {
    let failed = message.is_error() || message.error_text().is_some();
    row.heading(if failed {
        "Execution Failed"
    } else {
        "Execution Complete"
    });

    if let Some(result) = message.result_text() {
        row.text(result);
    }
    if let Some(error) = message.error_text() {
        row.text(&format!("Error: {error}"));
    }

    let mut stats = Vec::new();
    if let Some(cost) = message.cost_usd() {
        stats.push(format!("Cost: ${cost:.4}"));
    }
    if let Some(duration_ms) = message.duration_ms() {
        stats.push(format!("Duration: {:.2}s", duration_ms / 1000.0));
    }
    if let Some(turns) = message.num_turns() {
        stats.push(format!("Turns: {turns}"));
    }
    if let Some(usage) = message.effective_usage() {
        stats.push(format!("Tokens: {}", usage.total()));
    }
    if !stats.is_empty() {
        row.text(&stats.join(" | "));
    }
}

enum Block<'a> {
    Text(&'a str),
    Item(&'a ContentBlock),
}

fn blocks_of(message: &StreamMessage) -> Vec<Block<'_>> {
    match message.content() {
        None => Vec::new(),
        Some(MessageContent::Text(text)) => vec![Block::Text(text)],
        Some(MessageContent::Blocks(blocks)) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => Block::Text(text),
                other => Block::Item(other),
            })
            .collect(),
    }
}

struct RowBuilder {
    width: usize,
    lines: Vec<String>,
}

impl RowBuilder {
    fn new(width: usize) -> Self {
        Self {
            width: width.max(INDENT.len() + 1),
            lines: Vec::new(),
        }
    }

    fn heading(&mut self, label: &str) {
        self.lines.push(truncate_to_width(label, self.width, "…"));
    }

    fn text(&mut self, text: &str) {
        self.push_indented(text, INDENT);
    }

    fn field(&mut self, name: &str, value: &str) {
        self.push_indented(&format!("{name}: {value}"), INDENT);
    }

    fn tool_call(&mut self, name: &str, input: &Value) {
        let summary = match input {
            Value::Null => String::new(),
            Value::Object(map) if map.is_empty() => String::new(),
            other => other.to_string(),
        };
        let line = format!("{INDENT}→ {name}({summary})");
        self.lines.push(truncate_to_width(&line, self.width, "…"));
    }

    fn tool_result(&mut self, content: &Value, is_error: bool) {
        let marker = if is_error { "✗ " } else { "⎿ " };
        self.push_indented(&format!("{marker}{}", tool_result_text(content)), INDENT);
    }

    fn push_indented(&mut self, text: &str, indent: &str) {
        let inner = self.width - indent.len();
        self.lines.extend(
            wrap_text(text, inner)
                .into_iter()
                .map(|line| format!("{indent}{line}")),
        );
    }

    fn finish(mut self) -> Vec<String> {
        if self.lines.is_empty() {
            self.lines.push(String::new());
        }
        self.lines
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
    fn init_falls_back_for_missing_metadata() {
        let log = log_of(&[r#"{"type":"system","subtype":"init","tools":["Bash","Read"]}"#]);
        assert_eq!(
            render_message(&log, 0, 80),
            vec![
                "System initialized".to_string(),
                "  Session: N/A".to_string(),
                "  Model: default".to_string(),
                "  Tools: Bash, Read".to_string(),
            ]
        );
    }

    #[test]
    fn assistant_text_wraps_and_tool_calls_summarize_input() {
        let log = log_of(&[
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"one two three four"},{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}}]}}"#,
        ]);
        assert_eq!(
            render_message(&log, 0, 12),
            vec![
                "Assistant".to_string(),
                "  one two".to_string(),
                "  three four".to_string(),
                "  → Bash({\"…".to_string(),
            ]
        );
    }

    #[test]
    fn widget_covered_results_are_left_to_the_widget() {
        let log = log_of(&[
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Read","input":{}}]}}"#,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"file body"},{"type":"tool_result","tool_use_id":"t2","content":"other","is_error":true}]}}"#,
        ]);
        assert_eq!(
            render_message(&log, 1, 40),
            vec!["User".to_string(), "  ✗ other".to_string()]
        );
    }

    #[test]
    fn result_renders_outcome_and_stats() {
        let log = log_of(&[
            r#"{"type":"result","subtype":"success","result":"Done","cost_usd":0.01234,"duration_ms":4210,"num_turns":3,"usage":{"input_tokens":10,"output_tokens":5}}"#,
        ]);
        assert_eq!(
            render_message(&log, 0, 80),
            vec![
                "Execution Complete".to_string(),
                "  Done".to_string(),
                "  Cost: $0.0123 | Duration: 4.21s | Turns: 3 | Tokens: 15".to_string(),
            ]
        );
    }
}
