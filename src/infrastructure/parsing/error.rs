//! Extraction error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// Required fields still empty after every strategy ran
    #[error("Insufficient data extracted from {url}: missing {}", .missing.join(", "))]
    InsufficientData {
        url: String,
        missing: Vec<&'static str>,
    },
}

impl ExtractionError {
    pub fn insufficient(url: &str, missing: Vec<&'static str>) -> Self {
        Self::InsufficientData {
            url: url.to_string(),
            missing,
        }
    }
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;
