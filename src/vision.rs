//! Oracle-driven extraction from page images, plus the column discovery and
//! mapping calls that feed the geometric paths.
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::BackoffPolicy;
use crate::error::VisionError;
use crate::extract::ExtractedRow;
use crate::headers::ColumnMapping;
use crate::logging::ORACLE_CALLS;
use crate::oracle::{complete_json, prompts, Oracle, OracleError};

#[derive(Debug, Deserialize)]
struct ColumnsAnswer {
    #[serde(default, deserialize_with = "cells")]
    columns: Vec<String>,
}

/// Reads the statement's own transaction-table header labels off the front
/// page, in on-page order.
pub fn discover_columns(oracle: &dyn Oracle, front_page_url: &str) -> Result<Vec<String>, OracleError> {
    let answer: ColumnsAnswer = complete_json(oracle, &prompts::discover_columns(front_page_url))?;
    let columns: Vec<String> = answer
        .columns
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    info!(target: ORACLE_CALLS, ?columns, "discovered statement columns");
    Ok(columns)
}

/// Maps a bank's header labels onto `[Date, Description, Credit, Debit]`.
pub fn swap_columns(oracle: &dyn Oracle, header_columns: &[String]) -> Result<ColumnMapping, OracleError> {
    if header_columns.is_empty() {
        return Ok(ColumnMapping::canonical());
    }
    let answer: ColumnsAnswer = complete_json(oracle, &prompts::swap_columns(header_columns))?;
    let mapping = ColumnMapping::from_aligned(&answer.columns);
    debug!(target: ORACLE_CALLS, ?mapping, "mapped statement columns");
    Ok(mapping)
}

/// Renders any JSON scalar as cell text. `null` becomes an empty string.
fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn cells<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let values = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(values.unwrap_or_default().into_iter().map(cell_text).collect())
}

/// Column-major table as the oracle returns it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisionTable {
    #[serde(rename = "Date", default, deserialize_with = "cells")]
    pub date: Vec<String>,
    #[serde(rename = "Description", default, deserialize_with = "cells")]
    pub description: Vec<String>,
    #[serde(rename = "Credit", default, deserialize_with = "cells")]
    pub credit: Vec<String>,
    #[serde(rename = "Debit", default, deserialize_with = "cells")]
    pub debit: Vec<String>,
}

impl VisionTable {
    pub fn row_count(&self) -> usize {
        [&self.date, &self.description, &self.credit, &self.debit]
            .iter()
            .map(|c| c.len())
            .max()
            .unwrap_or(0)
    }

    /// Row-major view. Short columns are padded with empty cells.
    pub fn into_rows(self) -> Vec<ExtractedRow> {
        let rows = self.row_count();
        let lengths = [self.date.len(), self.description.len(), self.credit.len(), self.debit.len()];
        if lengths.iter().any(|l| *l != rows) {
            warn!(target: ORACLE_CALLS, ?lengths, "vision columns differ in length, padding");
        }
        let mut columns = [self.date, self.description, self.credit, self.debit]
            .map(|c| c.into_iter().chain(std::iter::repeat(String::new())));
        (0..rows)
            .map(|_| {
                let [date, description, credit, debit] =
                    columns.each_mut().map(|c| c.next().unwrap_or_default());
                ExtractedRow::new(date, description, credit, debit)
            })
            .collect()
    }
}

/// Reads one page image: a raw table, then a clean-up pass that keeps the
/// canonical columns and drops balance rows.
pub fn extract_page(oracle: &dyn Oracle, page_url: &str) -> Result<VisionTable, OracleError> {
    let raw: Value = complete_json(oracle, &prompts::vision_table(page_url))?;
    let refined: VisionTable = complete_json(oracle, &prompts::refine_table(&raw.to_string()))?;
    debug!(target: ORACLE_CALLS, rows = refined.row_count(), "refined vision table");
    Ok(refined)
}

/// Extracts rows from every page image in order. Each page is retried with
/// exponential backoff; a page that keeps failing fails the whole call.
pub fn extract_pages(
    oracle: &dyn Oracle,
    page_urls: &[String],
    backoff: &BackoffPolicy,
) -> Result<Vec<ExtractedRow>, VisionError> {
    let attempts = backoff.attempts.max(1);
    let mut rows = Vec::new();

    for (page, url) in page_urls.iter().enumerate() {
        let mut attempt = 1;
        let table = loop {
            match extract_page(oracle, url) {
                Ok(table) => break table,
                Err(last_error) if attempt >= attempts => {
                    return Err(VisionError::RetryExhausted {
                        page: page + 1,
                        attempts,
                        last_error,
                    });
                }
                Err(e) => {
                    let delay = backoff.delay_for(attempt);
                    warn!(
                        target: ORACLE_CALLS,
                        page = page + 1,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "vision extraction failed, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        };
        let page_rows = table.into_rows();
        info!(target: ORACLE_CALLS, page = page + 1, rows = page_rows.len(), "vision page extracted");
        rows.extend(page_rows);
    }
    Ok(rows)
}
