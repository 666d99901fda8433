// CSV/TSV upload import and report export

use std::path::Path;

use ordrecon_recon::model::{Batch, ExportTable};

use crate::error::IoError;
use crate::grid::batch_from_grid;

/// Import a delimited file. `.tsv` is always tab-separated; anything else is sniffed.
pub fn import(path: &Path) -> Result<Batch, IoError> {
    let content = read_file_as_utf8(path)?;
    let is_tsv = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("tsv"));
    let delimiter = if is_tsv { b'\t' } else { sniff_delimiter(&content) };
    import_from_string(&file_name(path), &content, delimiter)
}

const DELIMITERS: [u8; 4] = [b'\t', b';', b',', b'|'];

/// Guess the delimiter from the first non-blank lines.
///
/// A candidate must split the header line into at least two fields; it scores
/// the number of sample lines with the header's width, times that width.
/// Ties go to the earlier candidate, and comma wins when nothing splits.
pub fn sniff_delimiter(content: &str) -> u8 {
    let sample: Vec<&str> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(10)
        .collect();
    let Some((header, rest)) = sample.split_first() else {
        return b',';
    };

    let mut choice = (b',', 0usize);
    for delimiter in DELIMITERS {
        let width = field_count(header, delimiter);
        if width < 2 {
            continue;
        }
        let agreeing = 1 + rest
            .iter()
            .filter(|line| field_count(line, delimiter) == width)
            .count();
        if agreeing * width > choice.1 {
            choice = (delimiter, agreeing * width);
        }
    }
    choice.0
}

fn field_count(line: &str, delimiter: u8) -> usize {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => record.len(),
        _ => 1,
    }
}

/// File contents as UTF-8, minus any BOM. Bytes that are not valid UTF-8 are
/// read as Windows-1252, which is what Excel writes on Windows.
pub fn read_file_as_utf8(path: &Path) -> Result<String, IoError> {
    let bytes = std::fs::read(path).map_err(|source| IoError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(invalid) => encoding_rs::WINDOWS_1252
            .decode(invalid.as_bytes())
            .0
            .into_owned(),
    };
    if let Some(rest) = text.strip_prefix('\u{feff}') {
        return Ok(rest.to_string());
    }
    Ok(text)
}

pub fn import_from_string(source: &str, content: &str, delimiter: u8) -> Result<Batch, IoError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut grid = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| IoError::parse(source, e))?;
        grid.push(record.iter().map(str::to_string).collect());
    }
    Ok(batch_from_grid(source, grid))
}

pub fn export(table: &ExportTable, path: &Path) -> Result<(), IoError> {
    let mut writer = csv::WriterBuilder::new()
        .from_path(path)
        .map_err(|e| IoError::Write(e.to_string()))?;

    writer
        .write_record(&table.headers)
        .map_err(|e| IoError::Write(e.to_string()))?;
    for row in &table.rows {
        writer
            .write_record(row)
            .map_err(|e| IoError::Write(e.to_string()))?;
    }

    writer.flush().map_err(|e| IoError::Write(e.to_string()))?;
    Ok(())
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn sniff_prefers_consistent_delimiter() {
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3\n4;5;6\n"), b';');
        assert_eq!(sniff_delimiter("a\tb\n1\t2\n"), b'\t');
        assert_eq!(sniff_delimiter("a,b\n\n1,2\n"), b',');
        assert_eq!(sniff_delimiter("single\n"), b',');
    }

    #[test]
    fn import_keeps_quoted_delimiters() {
        let batch = import_from_string(
            "orders.csv",
            "ORDERNUMBER,CLUB_NAME\nA1,\"Smith, Jones\"\n",
            b',',
        )
        .unwrap();
        assert_eq!(batch.source, "orders.csv");
        assert_eq!(batch.rows[0].get("CLUB_NAME"), Some("Smith, Jones"));
    }

    #[test]
    fn rejections_name_the_sheet_row_past_blank_lines() {
        let batch = import_from_string("t.csv", "ORDERNUMBER,NOTE\nA1,a\n,\n,x\n", b',').unwrap();
        assert_eq!(batch.len(), 2);
        let mut config = ordrecon_recon::ReconConfig::default();
        config.policy.required_columns = Some(vec!["ORDERNUMBER".into()]);
        let report = ordrecon_recon::validate(&batch, &config).unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejections.len(), 1);
        assert_eq!(report.rejections[0].row, 4);
    }

    #[test]
    fn windows_1252_and_bom_are_decoded() {
        let dir = tempdir().unwrap();
        let latin = dir.path().join("latin.csv");
        fs::write(&latin, b"ORDERNUMBER,CLUB_NAME\nA1,Caf\xe9\n").unwrap();
        let batch = import(&latin).unwrap();
        assert_eq!(batch.rows[0].get("CLUB_NAME"), Some("Café"));

        let bom = dir.path().join("bom.csv");
        fs::write(&bom, "\u{feff}ORDERNUMBER;YEAR\nA1;2024\n").unwrap();
        let batch = import(&bom).unwrap();
        assert_eq!(batch.columns(), vec!["ORDERNUMBER", "YEAR"]);
    }

    #[test]
    fn tsv_extension_forces_tab() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orders.tsv");
        fs::write(&path, "ORDERNUMBER\tNOTE\nA1\ta,b;c\n").unwrap();
        let batch = import(&path).unwrap();
        assert_eq!(batch.rows[0].get("NOTE"), Some("a,b;c"));
    }

    #[test]
    fn export_writes_header_and_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let table = ExportTable {
            headers: vec!["ROW".into(), "REASON".into()],
            rows: vec![vec!["3".into(), "YEAR: 'x' is not a number".into()]],
        };
        export(&table, &path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "ROW,REASON\n3,YEAR: 'x' is not a number\n");
    }

    #[test]
    fn missing_file_is_open_error() {
        let err = import(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, IoError::Open { .. }));
    }
}
