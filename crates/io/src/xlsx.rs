// Excel upload import (xlsx, xlsm, xls, xlsb, ods) and report export (xlsx only)
//
// Import reads the first worksheet as text: the engine decides what a cell means.
// Export writes every cell as a string so report values match the upload exactly.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};

use ordrecon_recon::model::{Batch, ExportTable};

use crate::csv::file_name;
use crate::error::IoError;
use crate::grid::batch_from_grid;

/// Import the first worksheet of a workbook.
pub fn import(path: &Path) -> Result<Batch, IoError> {
    let source = file_name(path);
    let mut workbook = open_workbook_auto(path).map_err(|e| IoError::parse(&source, e))?;

    let Some(sheet_name) = workbook.sheet_names().first().cloned() else {
        return Err(IoError::parse(&source, "workbook contains no sheets"));
    };
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| IoError::parse(&source, format!("sheet '{sheet_name}': {e}")))?;

    let grid = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
    Ok(batch_from_grid(&source, grid))
}

/// Render a cell the way a user would type it.
///
/// Whole numbers lose their `.0` and date cells become ISO dates, with the
/// time appended when it is not midnight. Durations stay serials. Errors and
/// blanks become empty.
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) => format_number(*n),
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Data::DateTime(dt) if dt.is_duration() => format_number(dt.as_f64()),
        Data::DateTime(dt) => {
            excel_datetime(dt.as_f64()).map_or_else(|| format_number(dt.as_f64()), format_datetime)
        }
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

/// Excel 1900 date system; serials below 1 are bare times and have no date.
fn excel_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(TimeDelta::try_milliseconds(millis)?)
}

fn format_datetime(dt: NaiveDateTime) -> String {
    if dt.time() == chrono::NaiveTime::MIN {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Write a report table to a single-sheet workbook with a bold, frozen header row.
pub fn export(table: &ExportTable, path: &Path) -> Result<(), IoError> {
    let mut workbook = XlsxWorkbook::new();
    let worksheet = workbook.add_worksheet();
    let header_format = Format::new().set_bold();

    for (col, header) in table.headers.iter().enumerate() {
        let col = column_index(col)?;
        worksheet
            .write_string_with_format(0, col, header, &header_format)
            .map_err(|e| IoError::Write(format!("header '{header}': {e}")))?;
    }
    for (row_idx, row) in table.rows.iter().enumerate() {
        let row_num = u32::try_from(row_idx + 1)
            .map_err(|_| IoError::Write("report has too many rows for xlsx".into()))?;
        for (col, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            worksheet
                .write_string(row_num, column_index(col)?, value)
                .map_err(|e| IoError::Write(format!("row {}: {e}", row_idx + 2)))?;
        }
    }
    worksheet
        .set_freeze_panes(1, 0)
        .map_err(|e| IoError::Write(e.to_string()))?;

    workbook
        .save(path)
        .map_err(|e| IoError::Write(format!("failed to save xlsx file: {e}")))?;
    Ok(())
}

fn column_index(col: usize) -> Result<u16, IoError> {
    u16::try_from(col).map_err(|_| IoError::Write("report has too many columns for xlsx".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn numbers_render_like_typed_text() {
        assert_eq!(cell_text(&Data::Float(4500012.0)), "4500012");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::Int(-7)), "-7");
        assert_eq!(cell_text(&Data::Bool(true)), "TRUE");
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::String(" A1 ".into())), " A1 ");
        assert_eq!(
            cell_text(&Data::DateTimeIso("2024-03-09T00:00:00".into())),
            "2024-03-09T00:00:00"
        );
    }

    #[test]
    fn exported_report_reads_back_as_batch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("duplicates.xlsx");
        let table = ExportTable {
            headers: vec!["ORDERNUMBER".into(), "MATERIAL_NUMBER".into(), "DUPLICATE_KIND".into()],
            rows: vec![
                vec!["A1".into(), "M1".into(), "exact_identity".into()],
                vec!["A2".into(), "".into(), "in_batch".into()],
            ],
        };
        export(&table, &path).unwrap();

        let batch = import(&path).unwrap();
        assert_eq!(batch.source, "duplicates.xlsx");
        assert_eq!(batch.columns(), table.headers);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.rows[0].get("DUPLICATE_KIND"), Some("exact_identity"));
        assert_eq!(batch.rows[1].get("MATERIAL_NUMBER"), Some(""));
    }

    #[test]
    fn numeric_cells_arrive_as_integers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orders.xlsx");
        let mut workbook = XlsxWorkbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "ORDERNUMBER").unwrap();
        sheet.write_string(0, 1, "YEAR").unwrap();
        sheet.write_string(0, 2, "ORDER_DATE").unwrap();
        sheet.write_number(1, 0, 1001.0).unwrap();
        sheet.write_number(1, 1, 2024.0).unwrap();
        sheet.write_number(1, 2, 45360.0).unwrap();
        workbook.save(&path).unwrap();

        let batch = import(&path).unwrap();
        assert_eq!(batch.rows[0].get("ORDERNUMBER"), Some("1001"));
        assert_eq!(batch.rows[0].get("YEAR"), Some("2024"));
        assert_eq!(batch.rows[0].get("ORDER_DATE"), Some("45360"));
    }

    #[test]
    fn date_cells_arrive_as_iso_text_in_any_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orders.xlsx");
        let mut workbook = XlsxWorkbook::new();
        let sheet = workbook.add_worksheet();
        let date = Format::new().set_num_format("yyyy-mm-dd");
        let stamp = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
        sheet.write_string(0, 0, "ORDERNUMBER").unwrap();
        sheet.write_string(0, 1, "ORDER_DATE").unwrap();
        sheet.write_string(0, 2, "CDD").unwrap();
        sheet.write_string(0, 3, "SHIP_OUT_DATE").unwrap();
        sheet.write_string(1, 0, "A1").unwrap();
        sheet.write_number_with_format(1, 1, 45360.0, &date).unwrap();
        sheet.write_number_with_format(1, 2, 45361.0, &date).unwrap();
        sheet.write_number_with_format(1, 3, 45362.75, &stamp).unwrap();
        workbook.save(&path).unwrap();

        let batch = import(&path).unwrap();
        assert_eq!(batch.rows[0].get("ORDER_DATE"), Some("2024-03-09"));
        assert_eq!(batch.rows[0].get("CDD"), Some("2024-03-10"));
        assert_eq!(batch.rows[0].get("SHIP_OUT_DATE"), Some("2024-03-11 18:00:00"));

        let record = match ordrecon_recon::sanitize::sanitize_row(
            2,
            &batch.rows[0],
            &ordrecon_recon::ReconConfig::default(),
        ) {
            ordrecon_recon::model::ValidationOutcome::Valid(record) => record,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert_eq!(record.order_date.map(|d| d.to_string()).as_deref(), Some("2024-03-09"));
        assert_eq!(record.cdd.as_deref(), Some("2024-03-10"));
        assert_eq!(record.ship_out_date.map(|d| d.to_string()).as_deref(), Some("2024-03-11"));
    }

    #[test]
    fn serials_outside_the_calendar_are_left_numeric() {
        assert_eq!(excel_datetime(0.5), None);
        assert_eq!(excel_datetime(3_000_000.0), None);
        assert_eq!(excel_datetime(1.0).map(format_datetime).as_deref(), Some("1899-12-31"));
    }

    #[test]
    fn corrupt_workbook_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();
        assert!(matches!(import(&path), Err(IoError::Parse { .. })));
    }
}
