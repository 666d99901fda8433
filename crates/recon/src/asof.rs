use std::collections::HashMap;

use tracing::debug;

use crate::config::ReconConfig;
use crate::error::ReconError;
use crate::model::{AsOfFlag, AsOfReport, Batch, Identity, StoredRecord};
use crate::sanitize::check_batch_shape;
use crate::store::{CallContext, Store};

/// Trimmed batch number; blank counts as absent.
fn normalize_batch(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Flag as-of rows whose identity is stored, but never under the uploaded
/// batch number. Unknown identities and rows without an identity are not flagged.
pub fn check_as_of<S: Store + ?Sized>(
    store: &S,
    ctx: &CallContext,
    config: &ReconConfig,
    batch: &Batch,
) -> Result<AsOfReport, ReconError> {
    let cols = &config.as_of;
    check_batch_shape(batch, &cols.required())?;

    let mut report = AsOfReport {
        columns: batch.columns(),
        identity_headers: [
            config.columns.order_number.clone(),
            config.columns.material_number.clone(),
        ],
        ..Default::default()
    };
    let mut cache: HashMap<Identity, Vec<StoredRecord>> = HashMap::new();

    for (index, raw) in batch.rows.iter().enumerate() {
        let (Some(order), Some(material)) =
            (raw.value(&cols.order_number), raw.value(&cols.material_number))
        else {
            report.skipped += 1;
            continue;
        };
        let identity = Identity {
            order_number: order.to_string(),
            material_number: material.to_string(),
        };
        let uploaded = normalize_batch(raw.get(&cols.batch_number));

        if !cache.contains_key(&identity) {
            let found = store
                .point_lookup(ctx, &identity)
                .map_err(ReconError::StoreUnavailable)?;
            cache.insert(identity.clone(), found);
        }
        let stored = cache.get(&identity).map(Vec::as_slice).unwrap_or_default();
        report.checked += 1;

        if stored.is_empty() {
            continue;
        }
        let mut stored_batches: Vec<Option<String>> = stored
            .iter()
            .map(|r| normalize_batch(r.record.batch_number.as_deref()))
            .collect();
        if stored_batches.contains(&uploaded) {
            continue;
        }
        stored_batches.sort();
        stored_batches.dedup();
        report.flagged.push(AsOfFlag {
            row: batch.sheet_row(index),
            fields: raw.clone(),
            identity,
            uploaded_batch: uploaded,
            stored_batches,
        });
    }

    debug!(
        checked = report.checked,
        skipped = report.skipped,
        flagged = report.flagged.len(),
        lookups = cache.len(),
        "as-of check finished"
    );
    Ok(report)
}
