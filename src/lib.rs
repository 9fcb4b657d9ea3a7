//! Bank statement extraction: reads transaction tables out of statement PDFs
//! and summarises them month by month.
pub mod classify;
pub mod config;
pub mod dates;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod geo;
pub mod grid;
pub mod headers;
pub mod logging;
pub mod normalize;
pub mod oracle;
pub mod parse;
pub mod pipeline;
pub mod render;
pub mod search_index;
pub mod tables;
pub mod vision;

pub use classify::ExtractionStrategy;
pub use config::{OracleConfig, PipelineConfig};
pub use error::PipelineError;
pub use oracle::{OpenAiOracle, Oracle, OracleError, OracleRequest};
pub use pipeline::{StatementPipeline, StatementReport};
pub use render::{PageRenderer, PdfiumRenderer};

/// Runs the full pipeline over a statement at `source` (URL or path).
pub fn analyze_statement(
    source: &str,
    oracle: &dyn Oracle,
    renderer: &dyn PageRenderer,
    config: PipelineConfig,
) -> Result<StatementReport, PipelineError> {
    StatementPipeline::new(oracle, renderer, config).run_source(source)
}
