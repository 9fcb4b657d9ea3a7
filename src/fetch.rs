use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::error::FetchError;
use crate::logging::PDF_PARSING;

/// Downloads the statement at `url`. Non-success statuses are errors.
pub fn fetch(url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;

    let response = client.get(url).send().map_err(|source| FetchError::Http {
        url: url.to_string(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let bytes = response.bytes().map_err(|source| FetchError::Http {
        url: url.to_string(),
        source,
    })?;
    info!(target: PDF_PARSING, url, size = bytes.len(), "downloaded statement");
    Ok(bytes.to_vec())
}

/// Reads a statement from a URL or, for anything that is not http(s), from disk.
pub fn load_source(source: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        return fetch(source, timeout);
    }
    let path = shellexpand::tilde(source).into_owned();
    debug!(target: PDF_PARSING, path, "reading statement from disk");
    std::fs::read(&path).map_err(|source| FetchError::Io { path, source })
}
