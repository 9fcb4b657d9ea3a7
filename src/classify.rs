use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ClassificationError;
use crate::logging::PIPELINE;
use crate::oracle::{complete_json, prompts, Oracle};

/// How a statement's transactions are extracted, decided once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionStrategy {
    /// Fully ruled table: read the PDF's own table structure.
    Grid,
    /// Sparse or missing rulings: infer the grid from headers and dates.
    SparseGrid,
    /// Unstructured layout: read page images with the oracle.
    Vision,
}

impl ExtractionStrategy {
    /// The single place oracle categories turn into strategies.
    pub fn from_category(category: i64) -> Result<Self, ClassificationError> {
        match category {
            1 => Ok(ExtractionStrategy::Grid),
            2 => Ok(ExtractionStrategy::SparseGrid),
            3 => Ok(ExtractionStrategy::Vision),
            other => Err(ClassificationError::UnknownCategory(other)),
        }
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionStrategy::Grid => "grid",
            ExtractionStrategy::SparseGrid => "sparse-grid",
            ExtractionStrategy::Vision => "vision",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Deserialize)]
struct CategoryAnswer {
    #[serde(rename = "type")]
    category: i64,
}

/// One classification attempt over the front page image. Retrying is the
/// caller's business.
pub fn classify(
    oracle: &dyn Oracle,
    front_page_url: &str,
) -> Result<ExtractionStrategy, ClassificationError> {
    let answer: CategoryAnswer = complete_json(oracle, &prompts::classify_layout(front_page_url))?;
    let strategy = ExtractionStrategy::from_category(answer.category)?;
    info!(target: PIPELINE, category = answer.category, %strategy, "classified layout");
    Ok(strategy)
}
