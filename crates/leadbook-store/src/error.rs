use leadbook_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// True for errors caused by the caller's input rather than the backend.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            StoreError::Core(CoreError::MalformedInput { .. } | CoreError::MissingIdentity)
        )
    }
}
