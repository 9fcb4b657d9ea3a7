use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{error, info};

use ledgerlift::logging::{self, LogStyle, PIPELINE};
use ledgerlift::{
    OpenAiOracle, OracleConfig, PdfiumRenderer, PipelineConfig, StatementPipeline, StatementReport,
};

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about,
    long_about = "Extract transactions from bank statement PDFs and summarise them by month.",
    arg_required_else_help = true
)]
pub struct Args {
    /// Statement URLs or local PDF paths
    #[clap(required = true)]
    pub sources: Vec<String>,

    /// Optional output file path. If omitted, writes to stdout.
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Pretty print the JSON output.
    #[clap(short, long)]
    pub pretty: bool,

    /// JSON file overriding pipeline defaults
    #[clap(short, long)]
    pub config: Option<String>,

    /// Directory containing the pdfium shared library
    #[clap(long)]
    pub pdfium_dir: Option<PathBuf>,

    /// Directory for a full debug log
    #[clap(long)]
    pub log_dir: Option<PathBuf>,

    /// Show logs as an indented span tree
    #[clap(long)]
    pub tree: bool,

    /// Increase log verbosity (-v, -vv)
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Serialize)]
struct SourceResult<'a> {
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<StatementReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let style = if args.tree { LogStyle::Tree } else { LogStyle::Compact };
    let _guard = match &args.log_dir {
        Some(dir) => Some(
            logging::init_logging_with_dir(args.verbose, style, dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?,
        ),
        None => {
            logging::init_logging(args.verbose, style);
            None
        }
    };

    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    let oracle = OpenAiOracle::new(OracleConfig::from_env()?).context("failed to build oracle client")?;
    let renderer = PdfiumRenderer::new(args.pdfium_dir.as_deref(), config.render_width)
        .context("failed to load pdfium")?;
    let pipeline = StatementPipeline::new(&oracle, &renderer, config);

    // Documents are independent; each runs its own pipeline on a worker.
    let results: Vec<SourceResult> = args
        .sources
        .par_iter()
        .map(|source| match pipeline.run_source(source) {
            Ok(report) => SourceResult {
                source,
                report: Some(report),
                error: None,
            },
            Err(e) => {
                error!(target: PIPELINE, source = %source, error = %e, "failed to process statement");
                SourceResult {
                    source,
                    report: None,
                    error: Some(e.to_string()),
                }
            }
        })
        .collect();

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    let json = if args.pretty {
        serde_json::to_string_pretty(&results)?
    } else {
        serde_json::to_string(&results)?
    };

    match &args.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
            info!(target: PIPELINE, path = %path.display(), "output written");
        }
        None => println!("{json}"),
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} statements failed", results.len());
    }
    Ok(())
}
