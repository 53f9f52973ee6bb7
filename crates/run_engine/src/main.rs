use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use run_engine::export::{markdown, raw_jsonl, ExportHeader};
use run_engine::logging::init_logging;
use run_engine::metrics::tokens_used;
use run_engine::render::render_message;
use run_engine::visibility::displayable_indices;
use run_engine::{AgentProfile, EngineConfig, ExecutionSession, RunScreen};
use stream_protocol::{AgentModel, MessageKind};
use time::OffsetDateTime;

#[derive(Parser)]
#[command(name = "run_engine", about = "Inspect stored agent execution output")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a run's JSONL output and print an export or summary of it
    Replay {
        /// Path to the newline-delimited JSON output
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = ReplayFormat::Markdown)]
        format: ReplayFormat,

        /// Agent name used in the Markdown header
        #[arg(long, default_value = "replay")]
        agent: String,

        /// Task text; when set, the Markdown export gets a header
        #[arg(long)]
        task: Option<String>,

        #[arg(long, default_value = "sonnet")]
        model: AgentModel,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReplayFormat {
    /// Received lines, byte-identical
    Raw,
    /// Formatted transcript document
    Markdown,
    /// Counts, tokens and final status
    Stats,
    /// Displayable rows as the transcript view wraps them
    Transcript,
}

struct ReplayArgs {
    format: ReplayFormat,
    agent: String,
    task: Option<String>,
    model: AgentModel,
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Replay {
            file,
            format,
            agent,
            task,
            model,
        } => run_replay(
            &file,
            ReplayArgs {
                format,
                agent,
                task,
                model,
            },
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_replay(file: &Path, args: ReplayArgs) -> anyhow::Result<()> {
    let config = EngineConfig::from_env().context("loading engine configuration")?;
    let output = std::fs::read_to_string(file)
        .with_context(|| format!("reading run output from {}", file.display()))?;
    let session = ExecutionSession::from_output(AgentProfile::new(0, args.agent.clone()), &output);

    let rendered = match args.format {
        ReplayFormat::Raw => raw_jsonl(session.log()),
        ReplayFormat::Markdown => {
            let header = args.task.map(|task| ExportHeader {
                agent_name: args.agent,
                task,
                model: args.model,
                exported_at: OffsetDateTime::now_utc(),
            });
            markdown(session.log(), header.as_ref())
        }
        ReplayFormat::Stats => stats(&session),
        ReplayFormat::Transcript => transcript(&session, config.transcript_width),
    };

    let mut stdout = io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;
    if !rendered.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

fn stats(session: &ExecutionSession) -> String {
    let log = session.log();
    let displayable = displayable_indices(log);
    let mut lines = vec![
        RunScreen::status_line(session),
        format!("lines: {}", log.raw_lines().len()),
        format!("messages: {}", log.len()),
        format!("malformed: {}", log.parse_errors()),
        format!("displayable: {}", displayable.len()),
        format!("tokens: {}", tokens_used(log.messages())),
    ];

    if let Some(result) = log
        .messages()
        .iter()
        .rev()
        .find(|message| message.kind == MessageKind::Result)
    {
        if let Some(cost) = result.cost_usd() {
            lines.push(format!("cost: ${cost:.4}"));
        }
        if let Some(duration_ms) = result.duration_ms() {
            lines.push(format!("duration: {:.2}s", duration_ms / 1000.0));
        }
        if let Some(turns) = result.num_turns() {
            lines.push(format!("turns: {turns}"));
        }
    }

    lines.join("\n")
}

fn transcript(session: &ExecutionSession, width: usize) -> String {
    let log = session.log();
    displayable_indices(log)
        .into_iter()
        .map(|index| render_message(log, index, width).join("\n"))
        .collect::<Vec<_>>()
        .join("\n\n")
}
