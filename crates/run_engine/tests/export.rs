mod support;

use event_source_mock::Script;
use pretty_assertions::assert_eq;
use run_engine::export::{copy_to_clipboard, raw_jsonl, Clipboard, ExportFormat, ExportHeader};
use run_engine::RunState;
use stream_protocol::AgentModel;
use support::{start_request, Harness, ASSISTANT_LINE, RESULT_LINE};
use time::OffsetDateTime;

#[derive(Default)]
struct RecordingClipboard {
    contents: Vec<String>,
}

impl Clipboard for RecordingClipboard {
    fn write_text(&mut self, text: &str) -> Result<(), String> {
        self.contents.push(text.to_string());
        Ok(())
    }
}

#[test]
fn jsonl_export_reproduces_the_stream() {
    let harness = Harness::new(1);
    harness.controller.start(start_request()).expect("start");
    let script = Script::default();
    harness.bus.play(1, &script);
    harness.controller.flush_pending_events();

    let session = harness.controller.session();
    assert_eq!(session.state(), RunState::Completed);

    let mut clipboard = RecordingClipboard::default();
    copy_to_clipboard(
        &mut clipboard,
        ExportFormat::Jsonl,
        &session,
        OffsetDateTime::UNIX_EPOCH,
    )
    .expect("copy");
    assert_eq!(clipboard.contents, vec![script.lines.join("\n")]);
}

#[test]
fn markdown_export_carries_the_run_header() {
    let harness = Harness::new(1);
    harness.controller.start(start_request()).expect("start");
    harness.bus.play(1, &Script::default());
    harness.controller.flush_pending_events();
    let session = harness.controller.session();

    let header = ExportHeader::for_session(&session, OffsetDateTime::UNIX_EPOCH).expect("header");
    assert_eq!(header.agent_name, "bug fixer");
    assert_eq!(header.task, "fix bug");
    assert_eq!(header.model, AgentModel::Sonnet);

    let mut clipboard = RecordingClipboard::default();
    copy_to_clipboard(
        &mut clipboard,
        ExportFormat::Markdown,
        &session,
        OffsetDateTime::UNIX_EPOCH,
    )
    .expect("copy");
    let markdown = &clipboard.contents[0];
    assert!(markdown.starts_with(
        "# Agent Execution: bug fixer\n\n**Task:** fix bug\n**Model:** Claude 4 Sonnet\n**Date:** 1970-01-01T00:00:00Z\n\n---\n\n## System Initialization\n"
    ));
    assert!(markdown.contains("### Tool: Bash\n\n```json\n{\n  \"command\": \"cargo test\"\n}\n```"));
    assert!(markdown.contains("### Tool Result\n\n```\ntest result: FAILED. 1 passed; 1 failed\n```"));
    assert!(markdown.ends_with("- **Total Tokens:** 550 (470 in, 80 out)\n"));
}

#[test]
fn stop_marker_is_in_markdown_but_not_in_jsonl() {
    let harness = Harness::new(1);
    harness.controller.start(start_request()).expect("start");
    harness.bus.emit_output(1, ASSISTANT_LINE);
    assert!(harness.controller.stop());

    let session = harness.controller.session();
    assert_eq!(session.log().len(), 2);

    let mut clipboard = RecordingClipboard::default();
    for format in [ExportFormat::Jsonl, ExportFormat::Markdown] {
        copy_to_clipboard(&mut clipboard, format, &session, OffsetDateTime::UNIX_EPOCH)
            .expect("copy");
    }

    assert_eq!(clipboard.contents[0], ASSISTANT_LINE);
    assert!(clipboard.contents[1].contains("## Execution Result\n\nExecution stopped by user\n\n"));
}

#[test]
fn backend_cancel_marker_stays_out_of_jsonl() {
    let harness = Harness::new(1);
    harness.controller.start(start_request()).expect("start");
    harness.bus.emit_output(1, ASSISTANT_LINE);
    harness.bus.emit_cancelled(1);
    harness.bus.emit_output(1, RESULT_LINE);
    harness.controller.flush_pending_events();

    let session = harness.controller.session();
    assert_eq!(session.log().len(), 3);
    assert_eq!(raw_jsonl(session.log()), format!("{ASSISTANT_LINE}\n{RESULT_LINE}"));
}
