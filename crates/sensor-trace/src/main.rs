mod bootstrap;

use std::io::{self, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use trace_core::schema::{resolve_schema, SchemaConfig};
use trace_core::settings::{Command, ParseArgs, Settings, StatsArgs};
use trace_core::stats::StatsRequest;
use trace_data::parser::{LogParser, ParseOptions};
use trace_data::reader::expand_inputs;
use trace_runtime::batch::BatchOrchestrator;
use trace_runtime::stats_job::compute_stats_concurrent;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("sensor-trace v{} starting", env!("CARGO_PKG_VERSION"));

    match &settings.command {
        Command::Parse(args) => run_parse(args).await,
        Command::Stats(args) => run_stats(args).await,
    }
}

async fn run_parse(args: &ParseArgs) -> Result<()> {
    let schema = resolve_schema(
        args.schema.as_deref(),
        args.preset.as_deref(),
        &SchemaConfig::schemas_dir(),
    )?;
    tracing::info!(
        "Schema: {}, dimension policy: {}",
        schema.dialect(),
        args.dimension_policy().as_str()
    );

    let files = expand_inputs(&args.paths);
    if files.is_empty() {
        bail!("no log files found under the given paths");
    }

    let parser = LogParser::new(
        schema,
        ParseOptions {
            dimension_policy: args.dimension_policy(),
        },
    );
    let report = BatchOrchestrator::new(parser, args.jobs as usize)
        .run(&files)
        .await;

    write_json(io::stdout().lock(), &report, args.pretty)?;

    if report.metadata.files_parsed == 0 {
        bail!("all {} input files failed to parse", report.metadata.files_failed);
    }
    Ok(())
}

async fn run_stats(args: &StatsArgs) -> Result<()> {
    let request = load_stats_request(&args.request)?;
    tracing::info!(
        "Stats request: {} channels, avg_period={}, stdev_period={}",
        request.traces.len(),
        request.avg_period,
        request.stdev_period
    );

    let response = compute_stats_concurrent(request).await?;
    write_json(io::stdout().lock(), &response, args.pretty)
}

fn load_stats_request(path: &Path) -> Result<StatsRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading stats request {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("parsing stats request {}", path.display()))
}

fn write_json<W: Write, T: Serialize>(mut out: W, value: &T, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut out, value)?;
    } else {
        serde_json::to_writer(&mut out, value)?;
    }
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
