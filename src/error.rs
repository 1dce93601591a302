// Error types shared by every stage of an import.
//
// Setup failures (CSV, catalog creation, product listing) surface as an
// `ImportAborted` carrying the partial result. Failures inside the
// category loop are turned into strings on the `ImportResult` instead.

use crate::importer::ImportResult;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImportError>;

#[derive(Error, Debug)]
pub enum ImportError {
    /// The CSV could not be read or is missing required columns.
    #[error("CSV error: {0}")]
    Parse(String),

    /// The account is not linked to the developer account (HTTP 403).
    #[error("access denied for account {account_id}")]
    AccessDenied { account_id: String },

    #[error("{0}")]
    Transport(String),

    /// The etag sent with a conditional update no longer matches.
    #[error("resource {resource_id} was modified concurrently (stale etag)")]
    Conflict { resource_id: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImportError {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, ImportError::AccessDenied { .. })
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for ImportError {
    fn from(err: reqwest::Error) -> Self {
        ImportError::Transport(err.to_string())
    }
}

/// A fatal failure during setup, together with whatever was counted
/// before it happened.
#[derive(Error, Debug)]
#[error("import aborted: {source}")]
pub struct ImportAborted {
    #[source]
    pub source: ImportError,
    pub partial: ImportResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_denied_is_distinct_from_transport() {
        let denied = ImportError::AccessDenied {
            account_id: "acc-1".into(),
        };
        let transport = ImportError::Transport("account lookup failed with status 500".into());
        assert!(denied.is_access_denied());
        assert!(!transport.is_access_denied());
        assert_eq!(denied.to_string(), "access denied for account acc-1");
    }

    #[test]
    fn aborted_reports_underlying_error() {
        let aborted = ImportAborted {
            source: ImportError::Parse("missing column 'Plu'".into()),
            partial: ImportResult::default(),
        };
        assert_eq!(
            aborted.to_string(),
            "import aborted: CSV error: missing column 'Plu'"
        );
    }
}
