use tracing::{debug, warn};

use crate::config::CommitPolicy;
use crate::error::ReconError;
use crate::model::{ReconciliationRecord, SanitizedRow};
use crate::store::{CallContext, Store};

/// Persist every row under `policy`. Returns the number of inserted records.
pub fn commit_rows<S: Store + ?Sized>(
    store: &S,
    ctx: &CallContext,
    rows: &[SanitizedRow],
    policy: CommitPolicy,
) -> Result<usize, ReconError> {
    debug!(rows = rows.len(), %policy, "committing batch");
    match policy {
        CommitPolicy::RowByRow => commit_row_by_row(store, ctx, rows),
        CommitPolicy::SingleTransaction => commit_single_transaction(store, ctx, rows),
    }
}

/// Each insert commits on its own. A failure keeps what was written so far.
fn commit_row_by_row<S: Store + ?Sized>(
    store: &S,
    ctx: &CallContext,
    rows: &[SanitizedRow],
) -> Result<usize, ReconError> {
    let mut committed = 0;
    for row in rows {
        let result = ctx.check().and_then(|()| store.insert(ctx, &row.record));
        match result {
            Ok(_) => committed += 1,
            Err(source) if committed == 0 && source.is_connectivity() => {
                return Err(ReconError::StoreUnavailable(source));
            }
            Err(source) => {
                warn!(committed, failed_row = row.row, error = %source, "insert failed mid-batch");
                return Err(ReconError::PersistenceFailure {
                    committed,
                    failed_row: row.row,
                    source,
                });
            }
        }
    }
    Ok(committed)
}

fn commit_single_transaction<S: Store + ?Sized>(
    store: &S,
    ctx: &CallContext,
    rows: &[SanitizedRow],
) -> Result<usize, ReconError> {
    ctx.check().map_err(ReconError::StoreUnavailable)?;
    let records: Vec<ReconciliationRecord> = rows.iter().map(|r| r.record.clone()).collect();
    store.insert_all(ctx, &records).map_err(|e| {
        let failed_row = rows.get(e.index).map_or(0, |r| r.row);
        if e.source.is_connectivity() {
            ReconError::StoreUnavailable(e.source)
        } else {
            warn!(failed_row, error = %e.source, "batch transaction rolled back");
            ReconError::PersistenceFailure {
                committed: 0,
                failed_row,
                source: e.source,
            }
        }
    })
}
