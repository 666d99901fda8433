use std::collections::BTreeMap;

use tracing::debug;

use crate::error::StoreError;
use crate::model::{DuplicateGroup, DuplicateKind, DuplicateReport, FlaggedRow, Identity, SanitizedRow};
use crate::store::{CallContext, Store};

/// Find sanitized rows that collide with the store or, when `in_batch` is set,
/// with each other. Rows without a material number are exempt.
///
/// Each distinct identity is looked up once. Groups come out in identity order.
pub fn find_collisions<S: Store + ?Sized>(
    store: &S,
    ctx: &CallContext,
    rows: &[SanitizedRow],
    in_batch: bool,
    columns: Vec<String>,
) -> Result<DuplicateReport, StoreError> {
    let mut by_identity: BTreeMap<Identity, Vec<&SanitizedRow>> = BTreeMap::new();
    for row in rows {
        if let Some(identity) = row.record.identity() {
            by_identity.entry(identity).or_default().push(row);
        }
    }

    let identities: Vec<Identity> = by_identity.keys().cloned().collect();
    debug!(
        rows = rows.len(),
        identities = identities.len(),
        "looking up upload identities"
    );
    let existing = store.lookup_many(ctx, &identities)?;

    let mut report = DuplicateReport {
        columns,
        ..Default::default()
    };
    for (identity, members) in by_identity {
        let flagged = || members.iter().map(|r| FlaggedRow::from(*r)).collect::<Vec<_>>();
        if existing.get(&identity).is_some_and(|found| !found.is_empty()) {
            report.store_collisions.push(DuplicateGroup {
                kind: DuplicateKind::ExactIdentity,
                identity: identity.clone().into(),
                members: flagged(),
            });
        }
        if in_batch && members.len() > 1 {
            report.in_batch_collisions.push(DuplicateGroup {
                kind: DuplicateKind::InBatch,
                identity: identity.into(),
                members: flagged(),
            });
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::model::{RawRow, ReconciliationRecord};

    fn row(sheet_row: usize, order: &str, material: Option<&str>) -> SanitizedRow {
        let mut record = ReconciliationRecord::new(order, "system");
        record.material_number = material.map(String::from);
        let mut raw = RawRow::from_pairs([("ORDERNUMBER", order)]);
        raw.push("MATERIAL_NUMBER", material.unwrap_or(""));
        SanitizedRow { row: sheet_row, raw, record }
    }

    fn stored(order: &str, material: &str) -> ReconciliationRecord {
        let mut rec = ReconciliationRecord::new(order, "system");
        rec.material_number = Some(material.into());
        rec
    }

    #[test]
    fn flags_store_collisions_regardless_of_attributes() {
        let store = MemoryStore::with_records([stored("A1", "M1")]);
        let rows = vec![row(2, "A1", Some("M1")), row(3, "A2", Some("M1"))];
        let report = find_collisions(&store, &CallContext::unbounded(), &rows, true, vec![]).unwrap();
        assert_eq!(report.store_collisions.len(), 1);
        assert_eq!(report.store_collisions[0].members[0].row, 2);
        assert!(report.in_batch_collisions.is_empty());
    }

    #[test]
    fn rows_without_material_are_exempt() {
        let store = MemoryStore::with_records([stored("A1", "M1")]);
        let rows = vec![row(2, "A1", None), row(3, "A1", None)];
        let report = find_collisions(&store, &CallContext::unbounded(), &rows, true, vec![]).unwrap();
        assert!(report.is_empty());
        assert_eq!(store.lookup_count(), 0);
    }

    #[test]
    fn repeated_identity_is_looked_up_once() {
        let store = MemoryStore::with_records([stored("A1", "M1")]);
        let rows = vec![row(2, "A1", Some("M1")), row(3, "A1", Some("M1"))];
        let report = find_collisions(&store, &CallContext::unbounded(), &rows, false, vec![]).unwrap();
        assert_eq!(store.lookup_count(), 1);
        assert_eq!(report.store_collisions[0].members.len(), 2);
        assert!(report.in_batch_collisions.is_empty());
    }

    #[test]
    fn in_batch_groups_are_reported_separately() {
        let store = MemoryStore::new();
        let rows = vec![
            row(2, "A1", Some("M1")),
            row(3, "A2", Some("M2")),
            row(4, "A1", Some("M1")),
        ];
        let report = find_collisions(&store, &CallContext::unbounded(), &rows, true, vec![]).unwrap();
        assert!(report.store_collisions.is_empty());
        assert_eq!(report.in_batch_collisions.len(), 1);
        let members: Vec<usize> = report.in_batch_collisions[0].members.iter().map(|m| m.row).collect();
        assert_eq!(members, vec![2, 4]);

        let off = find_collisions(&store, &CallContext::unbounded(), &rows, false, vec![]).unwrap();
        assert!(off.is_empty());
    }
}
