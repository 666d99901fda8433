// Text grid -> Batch: header detection and row shaping shared by every reader

use ordrecon_recon::model::{Batch, RawRow};

/// Build a batch from rows of cell text.
///
/// The first row with any non-blank cell is the header (names trimmed).
/// Blank data rows are dropped. Every resulting row carries every header
/// column, in header order; short rows are padded with empty cells and
/// cells beyond the header are ignored. Each kept row remembers its
/// 1-based position in the grid.
pub fn batch_from_grid<I>(source: &str, rows: I) -> Batch
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut rows = rows.into_iter().enumerate();
    let headers: Vec<String> = match rows.by_ref().find(|(_, r)| !is_blank(r)) {
        Some((_, header)) => header.iter().map(|h| h.trim().to_string()).collect(),
        None => return Batch::new(source, Vec::new()),
    };

    let mut data = Vec::new();
    let mut row_numbers = Vec::new();
    for (position, cells) in rows.filter(|(_, r)| !is_blank(r)) {
        let mut row = RawRow::new();
        for (i, header) in headers.iter().enumerate() {
            row.push(header.clone(), cells.get(i).cloned().unwrap_or_default());
        }
        data.push(row);
        row_numbers.push(position + 1);
    }

    Batch::new(source, data).with_row_numbers(row_numbers)
}

fn is_blank(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}
