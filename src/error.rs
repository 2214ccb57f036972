use thiserror::Error;

/// The events page could not be retrieved. Ends extraction for the run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
}

/// One event card could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to process event card: {message}")]
pub struct ExtractionError {
    pub message: String,
}

impl ExtractionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Writing one record failed; its savepoint has been rolled back.
#[derive(Debug, Error)]
#[error("failed to store event {name}: {source}")]
pub struct StoreError {
    pub name: String,
    #[source]
    pub source: rusqlite::Error,
}

/// Anything recorded in the run's error list.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
