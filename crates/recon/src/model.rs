use std::fmt;

use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::config::AddColumns;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One uploaded sheet row: column name → raw cell text, in sheet column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    fields: Vec<(String, String)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Append a cell. A repeated column name keeps the first occurrence for lookups.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.fields.push((column.into(), value.into()));
    }

    /// Raw cell text, untouched.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed cell text; empty and absent both yield `None`.
    pub fn value(&self, column: &str) -> Option<&str> {
        self.get(column).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.fields.iter().any(|(c, _)| c == column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(c, v)| (c.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (column, value) in &self.fields {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// All rows of one uploaded file, in sheet order.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Name of the uploaded file (for logs and report naming).
    pub source: String,
    pub rows: Vec<RawRow>,
    /// 1-based sheet row of each entry in `rows`, when the reader skipped rows.
    pub row_numbers: Vec<usize>,
}

impl Batch {
    pub fn new(source: impl Into<String>, rows: Vec<RawRow>) -> Self {
        Self {
            source: source.into(),
            rows,
            row_numbers: Vec::new(),
        }
    }

    /// Attach the sheet row each entry came from.
    pub fn with_row_numbers(mut self, row_numbers: Vec<usize>) -> Self {
        self.row_numbers = row_numbers;
        self
    }

    /// Spreadsheet row number of the entry at `index`. Without recorded
    /// numbers, rows are assumed contiguous under a header on row 1.
    pub fn sheet_row(&self, index: usize) -> usize {
        self.row_numbers.get(index).copied().unwrap_or(index + 2)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names of the first row; the batch's effective header.
    pub fn columns(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|r| r.columns().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// The canonical order-reconciliation entity.
///
/// `order_number` is never empty. Every other attribute is `None` when the
/// upload left it blank; `None` is persisted as NULL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationRecord {
    pub order_number: String,
    pub material_number: Option<String>,
    pub sales_document: Option<i64>,
    pub order_date: Option<NaiveDate>,
    pub batch_number: Option<String>,
    pub year: Option<i32>,
    pub club_name: Option<String>,
    pub order_type: Option<String>,
    pub status: Option<String>,
    pub cdd: Option<String>,
    pub ship_out_date: Option<NaiveDate>,
    pub tracking_number: Option<String>,
    pub created_by: String,
}

impl ReconciliationRecord {
    pub fn new(order_number: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            order_number: order_number.into(),
            material_number: None,
            sales_document: None,
            order_date: None,
            batch_number: None,
            year: None,
            club_name: None,
            order_type: None,
            status: None,
            cdd: None,
            ship_out_date: None,
            tracking_number: None,
            created_by: created_by.into(),
        }
    }

    /// Full identity, or `None` when the material number is absent.
    pub fn identity(&self) -> Option<Identity> {
        self.material_number.as_ref().map(|m| Identity {
            order_number: self.order_number.clone(),
            material_number: m.clone(),
        })
    }

    /// Partition key; an absent material number is its own value.
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            order_number: self.order_number.clone(),
            material_number: self.material_number.clone(),
        }
    }

    /// Cell texts in `AddColumns::headers()` order; absent values render empty.
    pub fn to_cells(&self) -> Vec<String> {
        fn text(v: &Option<String>) -> String {
            v.clone().unwrap_or_default()
        }
        fn date(v: &Option<NaiveDate>) -> String {
            v.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
        }
        vec![
            self.order_number.clone(),
            text(&self.material_number),
            self.sales_document.map(|n| n.to_string()).unwrap_or_default(),
            date(&self.order_date),
            text(&self.batch_number),
            self.year.map(|n| n.to_string()).unwrap_or_default(),
            text(&self.club_name),
            text(&self.order_type),
            text(&self.status),
            text(&self.cdd),
            date(&self.ship_out_date),
            text(&self.tracking_number),
            self.created_by.clone(),
        ]
    }
}

/// `(order_number, material_number)` with both parts present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Identity {
    pub order_number: String,
    pub material_number: String,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.order_number, self.material_number)
    }
}

/// Identity as found in the store, where the material number may be NULL.
/// Orders NULL before any value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IdentityKey {
    pub order_number: String,
    pub material_number: Option<String>,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.material_number {
            Some(ref m) => write!(f, "{}/{}", self.order_number, m),
            None => write!(f, "{}/-", self.order_number),
        }
    }
}

impl From<Identity> for IdentityKey {
    fn from(id: Identity) -> Self {
        Self {
            order_number: id.order_number,
            material_number: Some(id.material_number),
        }
    }
}

/// A record as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: ReconciliationRecord,
}

/// An upload row that passed sanitization, with its origin kept for reports.
#[derive(Debug, Clone)]
pub struct SanitizedRow {
    pub row: usize,
    pub raw: RawRow,
    pub record: ReconciliationRecord,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum FieldProblem {
    MissingOrderNumber { column: String },
    NotNumeric { column: String, value: String },
    NotInteger { column: String, value: String },
    /// Only raised by record edits; uploads treat bad dates as absent.
    NotDate { column: String, value: String },
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingOrderNumber { column } => write!(f, "{column} is required"),
            Self::NotNumeric { column, value } => {
                write!(f, "{column}: '{value}' is not a number")
            }
            Self::NotInteger { column, value } => {
                write!(f, "{column}: '{value}' is not a whole number in range")
            }
            Self::NotDate { column, value } => write!(f, "{column}: '{value}' is not a date"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRejection {
    pub row: usize,
    pub reasons: Vec<FieldProblem>,
}

impl fmt::Display for RowRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: ", self.row)?;
        for (i, reason) in self.reasons.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{reason}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid(ReconciliationRecord),
    Rejected(RowRejection),
}

/// Dry-run result over a whole batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub accepted: usize,
    pub rejections: Vec<RowRejection>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.rejections.is_empty()
    }

    /// One line per problem: `ROW`, `REASON`.
    pub fn to_table(&self) -> ExportTable {
        let rows = self
            .rejections
            .iter()
            .flat_map(|r| {
                r.reasons
                    .iter()
                    .map(move |reason| vec![r.row.to_string(), reason.to_string()])
            })
            .collect();
        ExportTable {
            headers: vec!["ROW".into(), "REASON".into()],
            rows,
        }
    }
}

// ---------------------------------------------------------------------------
// Duplicates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
    /// Upload row whose identity already exists in the store.
    ExactIdentity,
    /// Upload rows sharing an identity inside the same batch.
    InBatch,
    /// Known identity whose stored batch numbers disagree with the upload.
    AsOf,
    /// Stored identity resolving to more than one batch number.
    TrueDuplicate,
}

impl fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactIdentity => write!(f, "exact_identity"),
            Self::InBatch => write!(f, "in_batch"),
            Self::AsOf => write!(f, "as_of"),
            Self::TrueDuplicate => write!(f, "true_duplicate"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup<M> {
    pub kind: DuplicateKind,
    pub identity: IdentityKey,
    pub members: Vec<M>,
}

/// An upload row flagged by a duplicate rule, with its original cells.
#[derive(Debug, Clone, Serialize)]
pub struct FlaggedRow {
    pub row: usize,
    pub fields: RawRow,
}

impl From<&SanitizedRow> for FlaggedRow {
    fn from(row: &SanitizedRow) -> Self {
        Self {
            row: row.row,
            fields: row.raw.clone(),
        }
    }
}

/// Pre-commit duplicate findings for one batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DuplicateReport {
    /// Upload header, in sheet order.
    pub columns: Vec<String>,
    pub store_collisions: Vec<DuplicateGroup<FlaggedRow>>,
    pub in_batch_collisions: Vec<DuplicateGroup<FlaggedRow>>,
}

impl DuplicateReport {
    pub fn is_empty(&self) -> bool {
        self.store_collisions.is_empty() && self.in_batch_collisions.is_empty()
    }

    /// Number of flagged (row, kind) entries.
    pub fn flagged_rows(&self) -> usize {
        self.store_collisions
            .iter()
            .chain(&self.in_batch_collisions)
            .map(|g| g.members.len())
            .sum()
    }

    /// Original upload columns plus `DUPLICATE_KIND`, ordered by sheet row.
    pub fn to_table(&self) -> ExportTable {
        let mut flagged: Vec<(usize, DuplicateKind, &RawRow)> = self
            .store_collisions
            .iter()
            .chain(&self.in_batch_collisions)
            .flat_map(|g| g.members.iter().map(move |m| (m.row, g.kind, &m.fields)))
            .collect();
        flagged.sort_by_key(|(row, kind, _)| (*row, *kind));

        let mut headers = self.columns.clone();
        headers.push("DUPLICATE_KIND".into());
        let rows = flagged
            .into_iter()
            .map(|(_, kind, fields)| {
                let mut cells = cells_in_order(fields, &self.columns);
                cells.push(kind.to_string());
                cells
            })
            .collect();
        ExportTable { headers, rows }
    }
}

/// A row of an as-of upload that disagrees with the store.
#[derive(Debug, Clone, Serialize)]
pub struct AsOfFlag {
    pub row: usize,
    pub fields: RawRow,
    pub identity: Identity,
    pub uploaded_batch: Option<String>,
    pub stored_batches: Vec<Option<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AsOfReport {
    /// Upload header, in sheet order.
    pub columns: Vec<String>,
    /// Header names for the resolved order and material numbers.
    pub identity_headers: [String; 2],
    pub checked: usize,
    pub skipped: usize,
    pub flagged: Vec<AsOfFlag>,
}

impl AsOfReport {
    pub fn is_empty(&self) -> bool {
        self.flagged.is_empty()
    }

    pub fn to_table(&self) -> ExportTable {
        let mut headers = self.columns.clone();
        headers.extend(self.identity_headers.iter().cloned());
        let rows = self
            .flagged
            .iter()
            .map(|flag| {
                let mut cells = cells_in_order(&flag.fields, &self.columns);
                cells.push(flag.identity.order_number.clone());
                cells.push(flag.identity.material_number.clone());
                cells
            })
            .collect();
        ExportTable { headers, rows }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrueDuplicateReport {
    pub scanned: usize,
    pub groups: Vec<DuplicateGroup<StoredRecord>>,
}

impl TrueDuplicateReport {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Every reported record in report order.
    pub fn records(&self) -> impl Iterator<Item = &StoredRecord> {
        self.groups.iter().flat_map(|g| g.members.iter())
    }

    pub fn to_table(&self, columns: &AddColumns) -> ExportTable {
        ExportTable {
            headers: columns.headers().into_iter().map(str::to_string).collect(),
            rows: self.records().map(|r| r.record.to_cells()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Exact row set and column order of an exportable report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn cells_in_order(fields: &RawRow, columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|c| fields.get(c).unwrap_or("").to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_row_value_trims_and_collapses_empty() {
        let row = RawRow::from_pairs([("A", "  x "), ("B", "   "), ("C", "")]);
        assert_eq!(row.value("A"), Some("x"));
        assert_eq!(row.get("A"), Some("  x "));
        assert_eq!(row.value("B"), None);
        assert_eq!(row.value("C"), None);
        assert_eq!(row.value("D"), None);
        assert!(row.has_column("C"));
        assert!(!row.has_column("D"));
    }

    #[test]
    fn raw_row_serializes_as_ordered_map() {
        let row = RawRow::from_pairs([("Z", "1"), ("A", "2")]);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"Z":"1","A":"2"}"#);
    }

    #[test]
    fn identity_requires_material() {
        let mut rec = ReconciliationRecord::new("A1", "system");
        assert!(rec.identity().is_none());
        assert_eq!(rec.identity_key().material_number, None);
        rec.material_number = Some("M1".into());
        assert_eq!(rec.identity().unwrap().to_string(), "A1/M1");
    }

    #[test]
    fn identity_key_orders_null_material_first() {
        let none = IdentityKey { order_number: "A".into(), material_number: None };
        let some = IdentityKey { order_number: "A".into(), material_number: Some("0".into()) };
        assert!(none < some);
    }

    #[test]
    fn rejection_display_joins_reasons() {
        let rejection = RowRejection {
            row: 4,
            reasons: vec![
                FieldProblem::MissingOrderNumber { column: "ORDERNUMBER".into() },
                FieldProblem::NotNumeric { column: "YEAR".into(), value: "20x4".into() },
            ],
        };
        assert_eq!(
            rejection.to_string(),
            "row 4: ORDERNUMBER is required; YEAR: '20x4' is not a number"
        );
    }

    #[test]
    fn duplicate_table_orders_by_row_and_appends_kind() {
        let columns = vec!["ORDERNUMBER".to_string(), "MATERIAL_NUMBER".to_string()];
        let flagged = |row: usize| FlaggedRow {
            row,
            fields: RawRow::from_pairs([("MATERIAL_NUMBER", "M1"), ("ORDERNUMBER", "A1")]),
        };
        let identity = IdentityKey { order_number: "A1".into(), material_number: Some("M1".into()) };
        let report = DuplicateReport {
            columns,
            store_collisions: vec![DuplicateGroup {
                kind: DuplicateKind::ExactIdentity,
                identity: identity.clone(),
                members: vec![flagged(5)],
            }],
            in_batch_collisions: vec![DuplicateGroup {
                kind: DuplicateKind::InBatch,
                identity,
                members: vec![flagged(2), flagged(5)],
            }],
        };

        assert_eq!(report.flagged_rows(), 3);
        let table = report.to_table();
        assert_eq!(table.headers, vec!["ORDERNUMBER", "MATERIAL_NUMBER", "DUPLICATE_KIND"]);
        assert_eq!(table.rows[0], vec!["A1", "M1", "in_batch"]);
        assert_eq!(table.rows[1], vec!["A1", "M1", "exact_identity"]);
        assert_eq!(table.rows[2], vec!["A1", "M1", "in_batch"]);
    }

    #[test]
    fn record_cells_render_absent_as_empty() {
        let mut rec = ReconciliationRecord::new("A1", "system");
        rec.year = Some(2024);
        rec.order_date = NaiveDate::from_ymd_opt(2024, 3, 9);
        let cells = rec.to_cells();
        assert_eq!(cells.len(), AddColumns::default().headers().len());
        assert_eq!(cells[0], "A1");
        assert_eq!(cells[1], "");
        assert_eq!(cells[2], "");
        assert_eq!(cells[3], "2024-03-09");
        assert_eq!(cells[5], "2024");
        assert_eq!(cells[12], "system");
    }
}
