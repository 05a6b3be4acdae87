use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tracing::error;

use ingest::pipeline::Pipeline;
use ingest::runtime::boot;
use ingest::scoring::{apply_threshold, filter_state, ScoredEvent};
use ingest::story::{self, StoryInput, TemplateGenerator};

/// Normalize security log files and score each event for risk.
///
/// Writes one JSON document per line to stdout; logs go to stderr.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Evidence files to ingest
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Archive events below this confidence (overrides config)
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Print per-file reports only, not individual events
    #[arg(long)]
    summary_only: bool,

    /// Also synthesize an attack story from the active events
    #[arg(long)]
    story: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    boot::init_logging();
    let config = boot::boot(cli.config.as_deref(), cli.threshold)?;
    let threshold = config.confidence_threshold;

    let pipeline = Arc::new(Pipeline::from_config(config)?);
    let results = pipeline.process_files(cli.files).await;

    let mut out = BufWriter::new(io::stdout().lock());
    let mut all_events: Vec<ScoredEvent> = Vec::new();
    let mut failures = 0usize;

    for result in results {
        let mut processed = match result {
            Ok(processed) => processed,
            Err(e) => {
                error!("{}", e);
                failures += 1;
                continue;
            }
        };

        let outcome = apply_threshold(&mut processed.events, threshold);
        if !cli.summary_only {
            for event in &processed.events {
                writeln!(out, "{}", serde_json::to_string(event)?)?;
            }
        }
        writeln!(
            out,
            "{}",
            json!({
                "report": processed.report,
                "threshold": threshold,
                "archived": outcome.archived,
                "filter": filter_state(&processed.events),
            })
        )?;
        all_events.append(&mut processed.events);
    }

    if cli.story {
        let cfg = pipeline.config();
        let input = StoryInput::collect(&all_events, threshold, cfg.story_event_limit)
            .with_timeline_limit(cfg.timeline_limit);
        let story = story::synthesize(&input, &TemplateGenerator);
        writeln!(out, "{}", json!({ "story": story }))?;
    }

    writeln!(out, "{}", json!({ "metrics": pipeline.metrics().snapshot() }))?;
    out.flush()?;

    if failures > 0 {
        return Err(format!("{} file(s) could not be processed", failures).into());
    }
    Ok(())
}
