use thiserror::Error;

/// Structural failures while pulling the navigation payload out of a page.
/// All of them are fatal for the document being processed.
#[derive(Debug, Error)]
pub enum NavError {
    #[error("no script element carries the navigationInfo marker")]
    PayloadNotFound,

    #[error("navigation payload is malformed: {0}")]
    PayloadMalformed(String),

    #[error("navigation payload does not match the expected schema at {path}: {reason}")]
    SchemaMismatch { path: String, reason: String },
}

impl NavError {
    pub(crate) fn schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
        NavError::SchemaMismatch {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
