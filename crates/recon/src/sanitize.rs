//! Row sanitization: raw upload cells to typed records.
//!
//! Pure functions. Nothing here touches the store.

use std::sync::OnceLock;

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::config::ReconConfig;
use crate::error::{MalformedInput, ReconError};
use crate::model::{
    Batch, FieldProblem, RawRow, ReconciliationRecord, RowRejection, SanitizedRow,
    ValidationOutcome,
};
use crate::store::{FieldUpdate, RecordPatch};

// ---------------------------------------------------------------------------
// Batch shape
// ---------------------------------------------------------------------------

/// Reject an empty batch, or one whose first row lacks any of `required`.
pub fn check_batch_shape(batch: &Batch, required: &[String]) -> Result<(), MalformedInput> {
    let first = batch.rows.first().ok_or(MalformedInput::EmptyBatch)?;
    let missing: Vec<String> = required
        .iter()
        .filter(|c| !first.has_column(c))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(MalformedInput::MissingColumns(missing))
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Validate one row. `row` is its spreadsheet row number.
pub fn sanitize_row(row: usize, raw: &RawRow, config: &ReconConfig) -> ValidationOutcome {
    let cols = &config.columns;
    let mut reasons = Vec::new();

    let order_number = raw.value(&cols.order_number);
    if order_number.is_none() {
        reasons.push(FieldProblem::MissingOrderNumber {
            column: cols.order_number.clone(),
        });
    }

    let sales_document = numeric_field::<i64>(raw, &cols.sales_document, &mut reasons);
    let year = numeric_field::<i32>(raw, &cols.year, &mut reasons);

    let Some(order_number) = order_number.filter(|_| reasons.is_empty()) else {
        return ValidationOutcome::Rejected(RowRejection { row, reasons });
    };

    let text = |column: &str| raw.value(column).map(str::to_string);
    let created_by = raw
        .value(&cols.created_by)
        .unwrap_or(config.policy.default_created_by.as_str());

    ValidationOutcome::Valid(ReconciliationRecord {
        order_number: order_number.to_string(),
        material_number: text(&cols.material_number),
        sales_document,
        order_date: raw.value(&cols.order_date).and_then(parse_date),
        batch_number: text(&cols.batch_number),
        year,
        club_name: text(&cols.club_name),
        order_type: text(&cols.order_type),
        status: text(&cols.status),
        cdd: text(&cols.cdd),
        ship_out_date: raw.value(&cols.ship_out_date).and_then(parse_date),
        tracking_number: text(&cols.tracking_number),
        created_by: created_by.to_string(),
    })
}

/// Validate every row of the batch, collecting all rejections before failing.
pub fn sanitize_batch(batch: &Batch, config: &ReconConfig) -> Result<Vec<SanitizedRow>, ReconError> {
    check_batch_shape(batch, &config.required_columns())?;

    let mut accepted = Vec::with_capacity(batch.len());
    let mut rejections = Vec::new();
    for (index, raw) in batch.rows.iter().enumerate() {
        let row = batch.sheet_row(index);
        match sanitize_row(row, raw, config) {
            ValidationOutcome::Valid(record) => accepted.push(SanitizedRow {
                row,
                raw: raw.clone(),
                record,
            }),
            ValidationOutcome::Rejected(rejection) => rejections.push(rejection),
        }
    }

    if rejections.is_empty() {
        Ok(accepted)
    } else {
        Err(ReconError::RowValidation(rejections))
    }
}

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

/// Turn an edit request into a patch. The order number column and unknown
/// columns are ignored; an empty value clears the field.
pub fn build_patch(fields: &RawRow, config: &ReconConfig) -> Result<RecordPatch, ReconError> {
    let cols = &config.columns;
    let mut reasons = Vec::new();
    let mut updates = Vec::new();

    for (column, raw) in fields.iter() {
        let value = Some(raw.trim()).filter(|v| !v.is_empty());
        let text = || value.map(str::to_string);
        let update = if column == cols.material_number {
            FieldUpdate::MaterialNumber(text())
        } else if column == cols.sales_document {
            FieldUpdate::SalesDocument(numeric_value(column, value, &mut reasons))
        } else if column == cols.order_date {
            FieldUpdate::OrderDate(date_value(column, value, &mut reasons))
        } else if column == cols.batch_number {
            FieldUpdate::BatchNumber(text())
        } else if column == cols.year {
            FieldUpdate::Year(numeric_value(column, value, &mut reasons))
        } else if column == cols.club_name {
            FieldUpdate::ClubName(text())
        } else if column == cols.order_type {
            FieldUpdate::OrderType(text())
        } else if column == cols.status {
            FieldUpdate::Status(text())
        } else if column == cols.cdd {
            FieldUpdate::Cdd(text())
        } else if column == cols.ship_out_date {
            FieldUpdate::ShipOutDate(date_value(column, value, &mut reasons))
        } else if column == cols.tracking_number {
            FieldUpdate::TrackingNumber(text())
        } else {
            continue;
        };
        updates.push(update);
    }

    if !reasons.is_empty() {
        return Err(ReconError::RowValidation(vec![RowRejection { row: 0, reasons }]));
    }
    if updates.is_empty() {
        return Err(MalformedInput::NoFieldsToUpdate.into());
    }
    Ok(RecordPatch { updates })
}

fn numeric_value<T: TryFrom<i64>>(
    column: &str,
    value: Option<&str>,
    reasons: &mut Vec<FieldProblem>,
) -> Option<T> {
    let value = value?;
    match parse_numeric(value) {
        Ok(n) => Some(n),
        Err(problem) => {
            reasons.push(problem.at(column, value));
            None
        }
    }
}

fn date_value(
    column: &str,
    value: Option<&str>,
    reasons: &mut Vec<FieldProblem>,
) -> Option<NaiveDate> {
    let value = value?;
    let date = parse_date(value);
    if date.is_none() {
        reasons.push(FieldProblem::NotDate {
            column: column.to_string(),
            value: value.to_string(),
        });
    }
    date
}

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

fn numeric_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^-?[0-9]*\.?[0-9]+$").expect("numeric pattern is valid"))
}

/// Why a present value did not yield an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericError {
    /// Does not look like a number at all.
    NotNumeric,
    /// Looks numeric but has a fractional part or is out of range.
    NotInteger,
}

impl NumericError {
    fn at(self, column: &str, value: &str) -> FieldProblem {
        let (column, value) = (column.to_string(), value.to_string());
        match self {
            Self::NotNumeric => FieldProblem::NotNumeric { column, value },
            Self::NotInteger => FieldProblem::NotInteger { column, value },
        }
    }
}

/// Parse a trimmed numeric cell into an integer type without going through floats.
///
/// `"2024"`, `"2024.0"` and `"-.0"` are accepted; `"2024.5"` is `NotInteger`.
pub fn parse_numeric<T: TryFrom<i64>>(value: &str) -> Result<T, NumericError> {
    let value = value.trim();
    if !numeric_pattern().is_match(value) {
        return Err(NumericError::NotNumeric);
    }

    let whole = match value.split_once('.') {
        None => value,
        Some((int, frac)) => {
            if !frac.bytes().all(|b| b == b'0') {
                return Err(NumericError::NotInteger);
            }
            int
        }
    };
    let parsed = match whole {
        "" | "-" => 0,
        digits => digits.parse::<i64>().map_err(|_| NumericError::NotInteger)?,
    };
    T::try_from(parsed).map_err(|_| NumericError::NotInteger)
}

fn numeric_field<T: TryFrom<i64>>(
    raw: &RawRow,
    column: &str,
    reasons: &mut Vec<FieldProblem>,
) -> Option<T> {
    numeric_value(column, raw.value(column), reasons)
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Largest serial Excel can display (9999-12-31).
const EXCEL_MAX_SERIAL: f64 = 2_958_466.0;

/// Best-effort date parsing. `None` means the cell is treated as no value.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Some(date);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }

    excel_serial(value)
}

/// Excel's 1900 date system, counting from 1899-12-30.
fn excel_serial(value: &str) -> Option<NaiveDate> {
    let serial: f64 = value.parse().ok()?;
    if !(1.0..EXCEL_MAX_SERIAL).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.floor() as u64))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
