use thiserror::Error;

use crate::oracle::OracleError;

/// The statement could not be downloaded. Not retried here.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The PDF is structurally unusable. Fatal for the run.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("malformed PDF: {0}")]
    Malformed(#[from] lopdf::Error),

    #[error("failed to read page {page}: {source}")]
    Page {
        page: u32,
        #[source]
        source: lopdf::Error,
    },

    #[error("PDF has no pages")]
    NoPages,

    #[error("page rendering failed: {0}")]
    Render(String),

    #[error("page image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("oracle returned unknown layout category {0}")]
    UnknownCategory(i64),
}

#[derive(Debug, Error)]
pub enum VisionError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("page {page} still failing after {attempts} attempts: {last_error}")]
    RetryExhausted {
        page: usize,
        attempts: u32,
        #[source]
        last_error: OracleError,
    },
}

/// Terminal failures of a pipeline run. There is no partial result.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error("layout classification failed after {attempts} attempts: {last_error}")]
    ClassificationExhausted {
        attempts: u32,
        #[source]
        last_error: ClassificationError,
    },

    #[error("extraction abandoned after {attempts} attempts: {last_error}")]
    ExtractionRetryExhausted {
        attempts: u32,
        #[source]
        last_error: Box<PipelineError>,
    },
}
