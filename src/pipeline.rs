//! Runs one statement from bytes to summary: classify the layout, extract
//! rows with the matching strategy, then summarise.
use std::fmt;
use std::thread;

use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, info_span, instrument, warn};
use uuid::Uuid;

use crate::classify::{classify, ExtractionStrategy};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::extract::{extract_rows, ExtractedRow};
use crate::fetch::load_source;
use crate::grid::{infer_grid, GridInference};
use crate::headers::find_headers;
use crate::logging::PIPELINE;
use crate::normalize::{check_gambling, monthly_summary, GamblingFlag, MonthlySummaryRow, TransactionTable};
use crate::oracle::Oracle;
use crate::parse::{extract_fragments, PageLayout};
use crate::render::PageRenderer;
use crate::tables::{extract_tables, select_transaction_rows};
use crate::vision::{discover_columns, extract_pages, swap_columns};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Classifying,
    Extracting(ExtractionStrategy),
    Summarizing,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Classifying => f.write_str("classifying"),
            PipelineState::Extracting(strategy) => write!(f, "extracting ({strategy})"),
            PipelineState::Summarizing => f.write_str("summarizing"),
            PipelineState::Done => f.write_str("done"),
            PipelineState::Failed => f.write_str("failed"),
        }
    }
}

/// Final result of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementReport {
    pub monthly_summary: Vec<MonthlySummaryRow>,
    pub gambling_activities: GamblingFlag,
    /// Strategy that produced the rows, after any fallback to vision.
    #[serde(skip)]
    pub strategy: ExtractionStrategy,
    #[serde(skip)]
    pub transactions: usize,
}

/// Rows plus the strategy that actually produced them.
struct Extraction {
    rows: Vec<ExtractedRow>,
    strategy: ExtractionStrategy,
}

/// One statement pipeline. Holds no state between runs, so a single
/// instance may process many documents, one per call.
pub struct StatementPipeline<'a> {
    oracle: &'a dyn Oracle,
    renderer: &'a dyn PageRenderer,
    config: PipelineConfig,
    today: Option<NaiveDate>,
}

impl<'a> StatementPipeline<'a> {
    pub fn new(oracle: &'a dyn Oracle, renderer: &'a dyn PageRenderer, config: PipelineConfig) -> Self {
        Self {
            oracle,
            renderer,
            config,
            today: None,
        }
    }

    /// Pins the date the summary window is measured from.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    fn enter(&self, state: PipelineState) {
        info!(target: PIPELINE, %state, "pipeline state");
    }

    /// Loads a statement from a URL or local path and runs it.
    pub fn run_source(&self, source: &str) -> Result<StatementReport, PipelineError> {
        let pdf = load_source(source, self.config.fetch_timeout)?;
        self.run_bytes(&pdf)
    }

    pub fn run_bytes(&self, pdf: &[u8]) -> Result<StatementReport, PipelineError> {
        let span = info_span!(target: PIPELINE, "pipeline", run_id = %Uuid::new_v4(), size = pdf.len());
        let _entered = span.enter();

        let result = self.run_inner(pdf);
        match &result {
            Ok(report) => {
                self.enter(PipelineState::Done);
                info!(
                    target: PIPELINE,
                    strategy = %report.strategy,
                    transactions = report.transactions,
                    gambling = report.gambling_activities.found,
                    "statement processed"
                );
            }
            Err(e) => {
                self.enter(PipelineState::Failed);
                warn!(target: PIPELINE, error = %e, "statement failed");
            }
        }
        result
    }

    fn run_inner(&self, pdf: &[u8]) -> Result<StatementReport, PipelineError> {
        let layouts = extract_fragments(pdf)?;
        let front_page = self.renderer.render_front_page(pdf)?.to_data_url()?;

        self.enter(PipelineState::Classifying);
        let strategy = self.classify_with_retry(&front_page)?;

        self.enter(PipelineState::Extracting(strategy));
        self.extract_and_summarise(pdf, &layouts, &front_page, strategy)
    }

    fn pause(&self) {
        if !self.config.retry_delay.is_zero() {
            thread::sleep(self.config.retry_delay);
        }
    }

    fn classify_with_retry(&self, front_page: &str) -> Result<ExtractionStrategy, PipelineError> {
        let attempts = self.config.classify_attempts.max(1);
        let mut attempt = 1;
        loop {
            match classify(self.oracle, front_page) {
                Ok(strategy) => return Ok(strategy),
                Err(last_error) if attempt >= attempts => {
                    return Err(PipelineError::ClassificationExhausted {
                        attempts,
                        last_error,
                    });
                }
                Err(e) => {
                    warn!(target: PIPELINE, attempt, attempts, error = %e, "classification failed");
                    self.pause();
                    attempt += 1;
                }
            }
        }
    }

    /// Extraction and summary share one retry budget. Every attempt reuses
    /// the same classification.
    fn extract_and_summarise(
        &self,
        pdf: &[u8],
        layouts: &[PageLayout],
        front_page: &str,
        strategy: ExtractionStrategy,
    ) -> Result<StatementReport, PipelineError> {
        let attempts = self.config.extraction_attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = self
                .extract(pdf, layouts, front_page, strategy)
                .and_then(|extraction| self.summarise(extraction));
            match outcome {
                Ok(report) => return Ok(report),
                Err(last_error) if attempt >= attempts => {
                    warn!(target: PIPELINE, attempts, error = %last_error, "extraction attempts exhausted");
                    return Err(PipelineError::ExtractionRetryExhausted {
                        attempts,
                        last_error: Box::new(last_error),
                    });
                }
                Err(e) => {
                    warn!(target: PIPELINE, attempt, attempts, error = %e, "extraction attempt failed");
                    self.pause();
                    attempt += 1;
                }
            }
        }
    }

    fn extract(
        &self,
        pdf: &[u8],
        layouts: &[PageLayout],
        front_page: &str,
        strategy: ExtractionStrategy,
    ) -> Result<Extraction, PipelineError> {
        let rows = match strategy {
            ExtractionStrategy::Grid => self.extract_ruled_tables(layouts, front_page)?,
            ExtractionStrategy::SparseGrid => self.extract_sparse_grid(layouts, front_page)?,
            ExtractionStrategy::Vision => None,
        };

        match rows {
            Some(rows) => Ok(Extraction { rows, strategy }),
            None => {
                if strategy != ExtractionStrategy::Vision {
                    info!(target: PIPELINE, %strategy, "falling back to vision extraction");
                }
                Ok(Extraction {
                    rows: self.extract_with_vision(pdf)?,
                    strategy: ExtractionStrategy::Vision,
                })
            }
        }
    }

    /// `None` when no ruled table yielded a transaction row.
    #[instrument(target = "pipeline", skip_all, fields(pages = layouts.len()))]
    fn extract_ruled_tables(
        &self,
        layouts: &[PageLayout],
        front_page: &str,
    ) -> Result<Option<Vec<ExtractedRow>>, PipelineError> {
        let header_columns = discover_columns(self.oracle, front_page)?;
        let mapping = swap_columns(self.oracle, &header_columns)?;
        let tables = extract_tables(layouts);
        let rows = select_transaction_rows(&tables, &header_columns, &mapping);
        debug!(target: PIPELINE, tables = tables.len(), rows = rows.len(), "ruled table rows");
        Ok((!rows.is_empty()).then_some(rows))
    }

    /// `None` when no page had an inferable grid.
    #[instrument(target = "pipeline", skip_all, fields(pages = layouts.len()))]
    fn extract_sparse_grid(
        &self,
        layouts: &[PageLayout],
        front_page: &str,
    ) -> Result<Option<Vec<ExtractedRow>>, PipelineError> {
        let header_columns = discover_columns(self.oracle, front_page)?;
        let mapping = swap_columns(self.oracle, &header_columns)?;

        let mut rows = Vec::new();
        let mut pages_with_grid = 0;
        for layout in layouts {
            let headers = find_headers(&layout.fragments, &mapping, self.config.header_threshold);
            match infer_grid(&layout.fragments, &headers) {
                GridInference::Grid(grid) => {
                    pages_with_grid += 1;
                    rows.extend(extract_rows(&layout.fragments, &grid.rows));
                }
                GridInference::NoGrid(reason) => {
                    debug!(target: PIPELINE, page = layout.page_number, %reason, "page has no grid");
                }
            }
        }
        Ok((pages_with_grid > 0).then_some(rows))
    }

    #[instrument(target = "pipeline", skip_all)]
    fn extract_with_vision(&self, pdf: &[u8]) -> Result<Vec<ExtractedRow>, PipelineError> {
        let pages = self
            .renderer
            .render(pdf, None)?
            .iter()
            .map(|page| page.to_data_url())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(extract_pages(self.oracle, &pages, &self.config.vision_backoff)?)
    }

    #[instrument(target = "pipeline", skip_all, fields(rows = extraction.rows.len()))]
    fn summarise(&self, extraction: Extraction) -> Result<StatementReport, PipelineError> {
        self.enter(PipelineState::Summarizing);
        let today = self.today();
        let table = TransactionTable::from_rows(&extraction.rows, today.year());
        let monthly_summary = monthly_summary(&table, today, self.config.summary_window_months);
        let gambling_activities = check_gambling(self.oracle, &table)?;
        Ok(StatementReport {
            monthly_summary,
            gambling_activities,
            strategy: extraction.strategy,
            transactions: table.len(),
        })
    }
}
