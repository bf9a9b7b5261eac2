use crate::storage;
use crate::table::Table;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "llmperf-table",
    version,
    about = "Summarize llmperf concurrency_* result folders into one table"
)]
pub struct Cli {
    /// Directory containing concurrency_* folders
    #[arg(long, default_value = "results_vllm")]
    pub base_dir: PathBuf,

    /// Output CSV file
    #[arg(long, default_value = "llmperf_table.csv")]
    pub out: PathBuf,

    /// Decimal rounding for float columns
    #[arg(long, default_value_t = 6)]
    pub round: u32,

    /// Print the table as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Run silently: suppress all output except errors (the CSV is still written)
    #[arg(long)]
    pub silent: bool,

    /// Also export the table as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,
}

/// Settings for one table build, derived from the command line.
#[derive(Debug, Clone)]
pub struct TableConfig {
    pub base_dir: PathBuf,
    pub csv_path: PathBuf,
    pub json_path: Option<PathBuf>,
    pub decimals: u32,
}

/// Build a `TableConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> TableConfig {
    TableConfig {
        base_dir: args.base_dir.clone(),
        csv_path: args.out.clone(),
        json_path: args.export_json.clone(),
        decimals: args.round,
    }
}

/// Rows of every usable folder under the base dir, plus the number of skipped folders.
pub fn build_table(cfg: &TableConfig) -> Result<(Table, usize)> {
    let dirs = storage::discover_concurrency_dirs(&cfg.base_dir)?;
    tracing::info!(base = %cfg.base_dir.display(), folders = dirs.len(), "discovered result folders");

    let mut rows = Vec::with_capacity(dirs.len());
    let mut skipped = 0usize;
    for dir in &dirs {
        match storage::compute_folder(dir)? {
            Some(row) => rows.push(row),
            None => skipped += 1,
        }
    }

    let mut table = Table::from_rows(rows);
    table.round_floats(cfg.decimals);
    Ok((table, skipped))
}

pub fn run(args: Cli) -> Result<()> {
    if args.silent && args.json {
        return Err(anyhow::anyhow!(
            "--silent and --json are mutually exclusive. Use --export-json to write JSON silently."
        ));
    }

    let cfg = build_config(&args);
    let (table, skipped) = build_table(&cfg)?;
    if table.is_empty() {
        tracing::warn!(skipped, "no folder had both a summary and individual responses");
    }

    handle_exports(&cfg, &table)?;

    if args.silent {
        return Ok(());
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&table)?)?;
    } else {
        let summary = crate::text_summary::build_text_summary(&table, skipped);
        for line in summary.lines {
            writeln!(out, "{line}")?;
        }
    }
    out.flush()?;

    let saved = std::fs::canonicalize(&cfg.csv_path).unwrap_or_else(|_| cfg.csv_path.clone());
    eprintln!("Saved CSV: {}", saved.display());
    Ok(())
}

/// Handle export operations (CSV always, JSON when requested).
fn handle_exports(cfg: &TableConfig, table: &Table) -> Result<()> {
    storage::export_csv(&cfg.csv_path, table).context("failed to save CSV table")?;
    if let Some(p) = cfg.json_path.as_deref() {
        storage::export_json(p, table).context("failed to save JSON table")?;
    }
    Ok(())
}
