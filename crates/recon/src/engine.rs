use serde::Serialize;
use tracing::{debug, info, warn};

use crate::commit::commit_rows;
use crate::config::ReconConfig;
use crate::error::{MalformedInput, ReconError};
use crate::model::{Batch, RawRow, ValidationReport};
use crate::precommit::find_collisions;
use crate::sanitize::{build_patch, sanitize_batch};
use crate::store::{CallContext, Store};

pub use crate::asof::check_as_of;
pub use crate::true_dup::scan_true_duplicates;

/// Outcome of a successful add-flow upload.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub source: String,
    pub rows: usize,
    pub inserted: usize,
}

/// Dry run: sanitize the batch and report without touching any store.
pub fn validate(batch: &Batch, config: &ReconConfig) -> Result<ValidationReport, ReconError> {
    match sanitize_batch(batch, config) {
        Ok(rows) => Ok(ValidationReport {
            accepted: rows.len(),
            rejections: Vec::new(),
        }),
        Err(ReconError::RowValidation(rejections)) => Ok(ValidationReport {
            accepted: batch.len() - rejections.len(),
            rejections,
        }),
        Err(e) => Err(e),
    }
}

/// Add flow: sanitize, reject on any duplicate, then commit.
///
/// Nothing is written unless every row is valid and no row collides.
pub fn ingest<S: Store + ?Sized>(
    store: &S,
    ctx: &CallContext,
    config: &ReconConfig,
    batch: &Batch,
) -> Result<IngestSummary, ReconError> {
    debug!(source = %batch.source, rows = batch.len(), "sanitizing batch");
    let rows = match sanitize_batch(batch, config) {
        Ok(rows) => rows,
        Err(e) => {
            warn!(source = %batch.source, error = %e, "batch rejected");
            return Err(e);
        }
    };

    let report = find_collisions(
        store,
        ctx,
        &rows,
        config.policy.in_batch_duplicates,
        batch.columns(),
    )
    .map_err(ReconError::StoreUnavailable)?;
    if !report.is_empty() {
        warn!(
            source = %batch.source,
            store = report.store_collisions.len(),
            in_batch = report.in_batch_collisions.len(),
            "duplicate identities, batch rejected"
        );
        return Err(ReconError::DuplicateConflict(Box::new(report)));
    }

    let inserted = commit_rows(store, ctx, &rows, config.policy.commit)?;
    info!(source = %batch.source, inserted, "batch committed");
    Ok(IngestSummary {
        source: batch.source.clone(),
        rows: batch.len(),
        inserted,
    })
}

/// Apply column edits to every record of `order_number`. Returns the count.
pub fn update_records<S: Store + ?Sized>(
    store: &S,
    ctx: &CallContext,
    config: &ReconConfig,
    order_number: &str,
    fields: &RawRow,
) -> Result<usize, ReconError> {
    let order_number = non_empty_order(order_number)?;
    let patch = build_patch(fields, config)?;
    let updated = store
        .update(ctx, order_number, &patch)
        .map_err(ReconError::StoreUnavailable)?;
    info!(order_number, updated, fields = patch.updates.len(), "records updated");
    Ok(updated)
}

/// Remove every record of `order_number`. Returns the count.
pub fn delete_records<S: Store + ?Sized>(
    store: &S,
    ctx: &CallContext,
    order_number: &str,
) -> Result<usize, ReconError> {
    let order_number = non_empty_order(order_number)?;
    let deleted = store
        .delete(ctx, order_number)
        .map_err(ReconError::StoreUnavailable)?;
    info!(order_number, deleted, "records deleted");
    Ok(deleted)
}

fn non_empty_order(order_number: &str) -> Result<&str, ReconError> {
    let trimmed = order_number.trim();
    if trimmed.is_empty() {
        return Err(MalformedInput::MissingOrderNumber.into());
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn validate_counts_accepted_and_rejected() {
        let config = ReconConfig {
            policy: crate::config::PolicyConfig {
                required_columns: Some(vec!["ORDERNUMBER".into()]),
                ..Default::default()
            },
            ..Default::default()
        };
        let batch = Batch::new(
            "t.csv",
            vec![
                RawRow::from_pairs([("ORDERNUMBER", "A1")]),
                RawRow::from_pairs([("ORDERNUMBER", "")]),
                RawRow::from_pairs([("ORDERNUMBER", "A3")]),
            ],
        );
        let report = validate(&batch, &config).unwrap();
        assert_eq!(report.accepted, 2);
        assert_eq!(report.rejections.len(), 1);
        assert_eq!(report.rejections[0].row, 3);
    }

    #[test]
    fn blank_order_number_is_refused_for_edits() {
        let store = MemoryStore::new();
        let ctx = CallContext::unbounded();
        let err = delete_records(&store, &ctx, "  ").unwrap_err();
        assert!(matches!(
            err,
            ReconError::MalformedInput(MalformedInput::MissingOrderNumber)
        ));
        assert_eq!(err.to_string(), "malformed input: order number is required");

        let fields = RawRow::from_pairs([("STATUS", "OPEN")]);
        let err = update_records(&store, &ctx, &ReconConfig::default(), "", &fields).unwrap_err();
        assert!(matches!(
            err,
            ReconError::MalformedInput(MalformedInput::MissingOrderNumber)
        ));
    }
}
