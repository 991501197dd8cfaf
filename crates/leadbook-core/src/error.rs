use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// CSV that cannot be read, or rows/edits whose shape does not fit the target table.
    #[error("malformed input{}: {reason}", .line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    MalformedInput { line: Option<u64>, reason: String },

    #[error("missing identity")]
    MissingIdentity,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl CoreError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            line: None,
            reason: reason.into(),
        }
    }
}

impl From<csv::Error> for CoreError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line());
        Self::MalformedInput {
            line,
            reason: err.to_string(),
        }
    }
}
