//! Transcript exports: the raw JSONL stream and a Markdown document.

use std::fmt::{self, Write as _};

use stream_protocol::{
    tool_result_text, AgentModel, ContentBlock, MessageContent, MessageKind, StreamMessage,
};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

use crate::error::ExportError;
use crate::message_log::MessageLog;
use crate::session::ExecutionSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Jsonl,
    Markdown,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Jsonl => "JSONL",
            Self::Markdown => "Markdown",
        })
    }
}

/// Every received line, byte-identical, joined with `\n`.
#[must_use]
pub fn raw_jsonl(log: &MessageLog) -> String {
    log.raw_lines().join("\n")
}

/// Title block of the Markdown export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportHeader {
    pub agent_name: String,
    pub task: String,
    pub model: AgentModel,
    pub exported_at: OffsetDateTime,
}

impl ExportHeader {
    /// Header for the session's current run, if it was launched from a request.
    #[must_use]
    pub fn for_session(session: &ExecutionSession, exported_at: OffsetDateTime) -> Option<Self> {
        let request = session.run().request()?;
        Some(Self {
            agent_name: session.agent().name.clone(),
            task: request.task.clone(),
            model: request.model,
            exported_at,
        })
    }
}

/// Renders the whole log, in order, as Markdown.
#[must_use]
pub fn markdown(log: &MessageLog, header: Option<&ExportHeader>) -> String {
    let mut out = String::new();
    if let Some(header) = header {
        write_header(&mut out, header);
    }
    for message in log.messages() {
        write_message(&mut out, message);
    }
    out
}

fn write_header(out: &mut String, header: &ExportHeader) {
    let date = header
        .exported_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| header.exported_at.unix_timestamp().to_string());
    let _ = writeln!(out, "# Agent Execution: {}\n", header.agent_name);
    let _ = writeln!(out, "**Task:** {}", header.task);
    let _ = writeln!(out, "**Model:** {}", header.model.display_name());
    let _ = writeln!(out, "**Date:** {date}\n");
    out.push_str("---\n\n");
}

fn write_message(out: &mut String, message: &StreamMessage) {
    match &message.kind {
        MessageKind::System if message.is_init() => {
            out.push_str("## System Initialization\n\n");
            let _ = writeln!(out, "- Session ID: `{}`", message.session_id().unwrap_or("N/A"));
            let _ = writeln!(out, "- Model: `{}`", message.model().unwrap_or("default"));
            if let Some(cwd) = message.cwd() {
                let _ = writeln!(out, "- Working Directory: `{cwd}`");
            }
            let tools = message.tools();
            if !tools.is_empty() {
                let _ = writeln!(out, "- Tools: {}", tools.join(", "));
            }
            out.push('\n');
        }
        MessageKind::Assistant if message.message.is_some() => {
            out.push_str("## Assistant\n\n");
            for block in content_blocks(message) {
                match block {
                    Section::Text(text) => {
                        let _ = write!(out, "{text}\n\n");
                    }
                    Section::Block(ContentBlock::ToolUse { name, input, .. }) => {
                        let input = serde_json::to_string_pretty(input)
                            .unwrap_or_else(|_| input.to_string());
                        let _ = write!(out, "### Tool: {name}\n\n```json\n{input}\n```\n\n");
                    }
                    Section::Block(_) => {}
                }
            }
            if let Some(usage) = message.message.as_ref().and_then(|body| body.usage) {
                let _ = write!(
                    out,
                    "*Tokens: {} in, {} out*\n\n",
                    usage.input_tokens, usage.output_tokens
                );
            }
        }
        MessageKind::User if message.message.is_some() => {
            out.push_str("## User\n\n");
            for block in content_blocks(message) {
                match block {
                    Section::Text(text) => {
                        let _ = write!(out, "{text}\n\n");
                    }
                    Section::Block(ContentBlock::ToolResult { content, .. }) => {
                        let body = tool_result_text(content);
                        let _ = write!(out, "### Tool Result\n\n```\n{body}\n```\n\n");
                    }
                    Section::Block(_) => {}
                }
            }
        }
        MessageKind::Result => write_result(out, message),
        _ => {}
    }
}

fn write_result(out: &mut String, message: &StreamMessage) {
    out.push_str("## Execution Result\n\n");
    if let Some(result) = message.result_text().filter(|result| !result.is_empty()) {
        let _ = write!(out, "{result}\n\n");
    }
    if let Some(error) = message.error_text() {
        let _ = write!(out, "**Error:** {error}\n\n");
    }
    if let Some(cost) = message.cost_usd() {
        let _ = writeln!(out, "- **Cost:** ${cost:.4} USD");
    }
    if let Some(duration_ms) = message.duration_ms() {
        let _ = writeln!(out, "- **Duration:** {:.2}s", duration_ms / 1000.0);
    }
    if let Some(turns) = message.num_turns() {
        let _ = writeln!(out, "- **Turns:** {turns}");
    }
    if let Some(usage) = message.effective_usage() {
        let _ = writeln!(
            out,
            "- **Total Tokens:** {} ({} in, {} out)",
            usage.total(),
            usage.input_tokens,
            usage.output_tokens
        );
    }
}

enum Section<'a> {
    Text(&'a str),
    Block(&'a ContentBlock),
}

fn content_blocks(message: &StreamMessage) -> Vec<Section<'_>> {
    match message.content() {
        None => Vec::new(),
        Some(MessageContent::Text(text)) => vec![Section::Text(text)],
        Some(MessageContent::Blocks(blocks)) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => Section::Text(text),
                other => Section::Block(other),
            })
            .collect(),
    }
}

/// Clipboard sink for exports.
pub trait Clipboard {
    fn write_text(&mut self, text: &str) -> Result<(), String>;
}

/// Copies the session's log in `format`. Failures are logged and returned,
/// never applied to the session.
pub fn copy_to_clipboard(
    clipboard: &mut dyn Clipboard,
    format: ExportFormat,
    session: &ExecutionSession,
    now: OffsetDateTime,
) -> Result<(), ExportError> {
    let text = match format {
        ExportFormat::Jsonl => raw_jsonl(session.log()),
        ExportFormat::Markdown => {
            let header = ExportHeader::for_session(session, now);
            markdown(session.log(), header.as_ref())
        }
    };

    clipboard.write_text(&text).map_err(|message| {
        warn!(%format, error = %message, "clipboard export failed");
        ExportError::Clipboard { format, message }
    })
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
    fn raw_export_is_byte_identical_including_malformed_lines() {
        let lines = [
            r#"{"type":"assistant",  "message":{}}"#,
            "garbage",
            r#"{"type":"result"}"#,
        ];
        let log = log_of(&lines);
        assert_eq!(raw_jsonl(&log), lines.join("\n"));
    }

    #[test]
    fn markdown_header_names_agent_task_model_and_date() {
        let header = ExportHeader {
            agent_name: "fixer".to_string(),
            task: "fix bug".to_string(),
            model: AgentModel::Opus,
            exported_at: OffsetDateTime::UNIX_EPOCH,
        };
        assert_eq!(
            markdown(&MessageLog::new(), Some(&header)),
            "# Agent Execution: fixer\n\n**Task:** fix bug\n**Model:** Claude 4 Opus\n**Date:** 1970-01-01T00:00:00Z\n\n---\n\n"
        );
    }

    #[test]
    fn markdown_sections_follow_log_order() {
        let log = log_of(&[
            r#"{"type":"system","subtype":"init","cwd":"/tmp/proj","tools":["Bash"]}"#,
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Looking"},{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}}],"usage":{"input_tokens":3,"output_tokens":4}}}"#,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"a.txt"}]}}"#,
            r#"{"type":"result","result":"Done","error":"partial","cost_usd":0.5,"duration_ms":1234,"num_turns":2,"usage":{"input_tokens":10,"output_tokens":5}}"#,
        ]);

        let expected = "## System Initialization\n\n\
- Session ID: `N/A`\n\
- Model: `default`\n\
- Working Directory: `/tmp/proj`\n\
- Tools: Bash\n\n\
## Assistant\n\n\
Looking\n\n\
### Tool: Bash\n\n```json\n{\n  \"command\": \"ls\"\n}\n```\n\n\
*Tokens: 3 in, 4 out*\n\n\
## User\n\n\
### Tool Result\n\n```\na.txt\n```\n\n\
## Execution Result\n\n\
Done\n\n\
**Error:** partial\n\n\
- **Cost:** $0.5000 USD\n\
- **Duration:** 1.23s\n\
- **Turns:** 2\n\
- **Total Tokens:** 15 (10 in, 5 out)\n";

        assert_eq!(markdown(&log, None), expected);
    }

    struct FailingClipboard;

    impl Clipboard for FailingClipboard {
        fn write_text(&mut self, _text: &str) -> Result<(), String> {
            Err("clipboard unavailable".to_string())
        }
    }

    #[test]
    fn clipboard_failure_is_reported_with_format() {
        let session = ExecutionSession::from_output(
            crate::session::AgentProfile::new(1, "fixer"),
            r#"{"type":"result"}"#,
        );
        let error = copy_to_clipboard(
            &mut FailingClipboard,
            ExportFormat::Markdown,
            &session,
            OffsetDateTime::UNIX_EPOCH,
        )
        .expect_err("clipboard fails");

        assert_eq!(
            error,
            ExportError::Clipboard {
                format: ExportFormat::Markdown,
                message: "clipboard unavailable".to_string(),
            }
        );
        assert_eq!(session.log().len(), 1);
    }
}
