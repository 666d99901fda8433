use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::ReconError;
use crate::model::{DuplicateGroup, DuplicateKind, IdentityKey, StoredRecord, TrueDuplicateReport};
use crate::store::{CallContext, Store};

/// Group stored records by identity and keep the groups that resolve to more
/// than one batch number. An absent material number partitions like a value,
/// and an absent batch number counts as one distinct batch.
///
/// Output is ordered by (order, material, batch, status) with absent values
/// first, then by record id, so repeated scans over unchanged data agree.
pub fn scan_true_duplicates<S: Store + ?Sized>(
    store: &S,
    ctx: &CallContext,
) -> Result<TrueDuplicateReport, ReconError> {
    let records = store.scan_all(ctx).map_err(ReconError::StoreUnavailable)?;
    let scanned = records.len();
    let groups = group_true_duplicates(records);
    debug!(scanned, groups = groups.len(), "true-duplicate scan finished");
    Ok(TrueDuplicateReport { scanned, groups })
}

pub fn group_true_duplicates(records: Vec<StoredRecord>) -> Vec<DuplicateGroup<StoredRecord>> {
    let mut partitions: BTreeMap<IdentityKey, Vec<StoredRecord>> = BTreeMap::new();
    for record in records {
        partitions
            .entry(record.record.identity_key())
            .or_default()
            .push(record);
    }

    partitions
        .into_iter()
        .filter(|(_, members)| {
            let batches: BTreeSet<Option<&str>> = members
                .iter()
                .map(|m| m.record.batch_number.as_deref())
                .collect();
            members.len() > 1 && batches.len() > 1
        })
        .map(|(identity, mut members)| {
            members.sort_by(|a, b| {
                (&a.record.batch_number, &a.record.status, a.id)
                    .cmp(&(&b.record.batch_number, &b.record.status, b.id))
            });
            DuplicateGroup {
                kind: DuplicateKind::TrueDuplicate,
                identity,
                members,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::model::ReconciliationRecord;

    fn rec(order: &str, material: Option<&str>, batch: Option<&str>, status: Option<&str>) -> ReconciliationRecord {
        let mut r = ReconciliationRecord::new(order, "system");
        r.material_number = material.map(String::from);
        r.batch_number = batch.map(String::from);
        r.status = status.map(String::from);
        r
    }

    fn scan(store: &MemoryStore) -> TrueDuplicateReport {
        scan_true_duplicates(store, &CallContext::unbounded()).unwrap()
    }

    #[test]
    fn same_batch_is_not_a_true_duplicate() {
        let store = MemoryStore::with_records([
            rec("A1", Some("M1"), Some("B1"), None),
            rec("A1", Some("M1"), Some("B1"), None),
        ]);
        let report = scan(&store);
        assert_eq!(report.scanned, 2);
        assert!(report.is_empty());
    }

    #[test]
    fn differing_batches_are_reported() {
        let store = MemoryStore::with_records([
            rec("A1", Some("M1"), Some("B2"), None),
            rec("A1", Some("M1"), Some("B1"), None),
            rec("A2", Some("M1"), Some("B1"), None),
        ]);
        let report = scan(&store);
        assert_eq!(report.groups.len(), 1);
        let ids: Vec<i64> = report.records().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn null_batch_counts_as_distinct() {
        let store = MemoryStore::with_records([
            rec("A1", Some("M1"), Some("B1"), None),
            rec("A1", Some("M1"), None, None),
        ]);
        let report = scan(&store);
        let ids: Vec<i64> = report.records().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn absent_material_is_its_own_partition() {
        let store = MemoryStore::with_records([
            rec("A1", None, Some("B1"), None),
            rec("A1", None, Some("B2"), None),
            rec("A1", Some("M1"), Some("B3"), None),
        ]);
        let report = scan(&store);
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].identity.material_number, None);
        assert_eq!(report.groups[0].members.len(), 2);
    }

    #[test]
    fn ordering_is_total_and_repeatable() {
        let store = MemoryStore::with_records([
            rec("B", Some("M"), Some("X"), Some("OPEN")),
            rec("A", Some("M"), Some("Y"), None),
            rec("A", Some("M"), Some("X"), Some("SHIPPED")),
            rec("A", Some("M"), Some("X"), Some("OPEN")),
            rec("B", Some("M"), Some("W"), None),
            rec("A", Some("M"), Some("X"), Some("OPEN")),
        ]);
        let first = scan(&store);
        let ids: Vec<i64> = first.records().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 6, 3, 2, 5, 1]);

        let second = scan(&store);
        let again: Vec<i64> = second.records().map(|r| r.id).collect();
        assert_eq!(ids, again);
    }
}
