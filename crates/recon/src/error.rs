use serde::Serialize;
use thiserror::Error;

use crate::model::{DuplicateReport, RowRejection};

/// Failure of a single store call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Connection could not be obtained or was lost.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The caller's deadline passed before or during the call.
    #[error("store call timed out")]
    TimedOut,
    /// The caller cancelled the operation.
    #[error("store call cancelled")]
    Cancelled,
    /// A read was rejected by the store.
    #[error("store query failed: {0}")]
    Query(String),
    /// A write was rejected by the store.
    #[error("store write failed: {0}")]
    Write(String),
}

impl StoreError {
    /// True for connectivity problems, as opposed to a rejected statement.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::TimedOut | Self::Cancelled)
    }
}

/// Batch-level structural problems. Nothing is processed when one is raised.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "problem", content = "columns", rename_all = "snake_case")]
pub enum MalformedInput {
    #[error("batch contains no rows")]
    EmptyBatch,
    #[error("missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("no recognised columns to update")]
    NoFieldsToUpdate,
    #[error("order number is required")]
    MissingOrderNumber,
}

#[derive(Debug, Error)]
pub enum ReconError {
    #[error("malformed input: {0}")]
    MalformedInput(#[from] MalformedInput),

    /// Every rejected row of the batch, in sheet order.
    #[error("{} row(s) failed validation", .0.len())]
    RowValidation(Vec<RowRejection>),

    #[error("{} row(s) collide with existing or same-batch records", .0.flagged_rows())]
    DuplicateConflict(Box<DuplicateReport>),

    /// A write failed mid-batch. `committed` rows remain in the store.
    #[error("persistence failed at row {failed_row} after {committed} committed row(s): {source}")]
    PersistenceFailure {
        committed: usize,
        failed_row: usize,
        #[source]
        source: StoreError,
    },

    #[error("{0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("config parse error: {0}")]
    ConfigParse(String),

    #[error("config validation error: {0}")]
    ConfigValidation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_columns_lists_names() {
        let err = ReconError::from(MalformedInput::MissingColumns(vec![
            "ORDERNUMBER".into(),
            "YEAR".into(),
        ]));
        assert_eq!(
            err.to_string(),
            "malformed input: missing required column(s): ORDERNUMBER, YEAR"
        );
    }

    #[test]
    fn persistence_failure_reports_progress() {
        let err = ReconError::PersistenceFailure {
            committed: 3,
            failed_row: 6,
            source: StoreError::Write("disk full".into()),
        };
        assert_eq!(
            err.to_string(),
            "persistence failed at row 6 after 3 committed row(s): store write failed: disk full"
        );
    }

    #[test]
    fn connectivity_classification() {
        assert!(StoreError::TimedOut.is_connectivity());
        assert!(StoreError::Cancelled.is_connectivity());
        assert!(StoreError::Unavailable("down".into()).is_connectivity());
        assert!(!StoreError::Write("constraint".into()).is_connectivity());
        assert!(!StoreError::Query("syntax".into()).is_connectivity());
    }
}
