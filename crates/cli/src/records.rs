//! `ordrecon records`: edit or remove every stored record of one order number.

use clap::Subcommand;
use serde::Serialize;

use ordrecon_recon::{delete_records, update_records, RawRow};

use crate::exit_codes::EXIT_NOT_FOUND;
use crate::runtime::Runtime;
use crate::CliError;

#[derive(Subcommand)]
pub enum RecordsCommands {
    /// Set column values on every record of an order
    #[command(after_help = "\
Column names are the upload headers from the engine rules (defaults shown).
An empty value clears the field.

Examples:
  ordrecon records update A1001 --set STATUS=SHIPPED --set SHIP_OUT_DATE=2024-04-02
  ordrecon records update A1001 --set TRACKING_NUMBER=")]
    Update {
        /// Order number to edit
        order: String,

        /// Column assignment; repeatable
        #[arg(long = "set", value_name = "COLUMN=VALUE", required = true)]
        set: Vec<String>,
    },

    /// Delete every record of an order
    Delete {
        /// Order number to delete
        order: String,
    },
}

#[derive(Serialize)]
struct EditOutcome<'a> {
    order_number: &'a str,
    action: &'static str,
    records: usize,
}

pub fn cmd_records(rt: &Runtime, cmd: RecordsCommands) -> Result<(), CliError> {
    let config = rt.recon_config()?;
    let (order, action, count) = match cmd {
        RecordsCommands::Update { order, set } => {
            let fields = parse_assignments(&set)?;
            let store = rt.open_store()?;
            let count = update_records(&store, &rt.context(), &config, &order, &fields)
                .map_err(CliError::recon)?;
            (order, "updated", count)
        }
        RecordsCommands::Delete { order } => {
            let store = rt.open_store()?;
            let count =
                delete_records(&store, &rt.context(), &order).map_err(CliError::recon)?;
            (order, "deleted", count)
        }
    };

    let order = order.trim();
    if count == 0 {
        return Err(CliError::new(EXIT_NOT_FOUND, format!("no records for order {order}")));
    }
    rt.emit(
        &EditOutcome { order_number: order, action, records: count },
        || eprintln!("{order}: {count} record(s) {action}"),
    )
}

/// Turn `COLUMN=VALUE` arguments into a row, keeping argument order.
fn parse_assignments(args: &[String]) -> Result<RawRow, CliError> {
    let mut row = RawRow::new();
    for arg in args {
        let Some((column, value)) = arg.split_once('=') else {
            return Err(CliError::args(format!("--set expects COLUMN=VALUE, got {arg:?}")));
        };
        let column = column.trim();
        if column.is_empty() {
            return Err(CliError::args(format!("empty column name in --set {arg:?}")));
        }
        if row.has_column(column) {
            return Err(CliError::args(format!("column {column} is set more than once")));
        }
        row.push(column, value);
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_keep_order_and_empty_values() {
        let row = parse_assignments(&["STATUS=SHIPPED".into(), " CDD =".into()]).unwrap();
        let cells: Vec<_> = row.iter().collect();
        assert_eq!(cells, vec![("STATUS", "SHIPPED"), ("CDD", "")]);
    }

    #[test]
    fn values_may_contain_equals() {
        let row = parse_assignments(&["TRACKING_NUMBER=1Z=99".into()]).unwrap();
        assert_eq!(row.get("TRACKING_NUMBER"), Some("1Z=99"));
    }

    #[test]
    fn malformed_assignments_are_usage_errors() {
        for bad in ["STATUS", "=x"] {
            let err = parse_assignments(&[bad.to_string()]).unwrap_err();
            assert_eq!(err.code, crate::exit_codes::EXIT_USAGE);
        }
        let err = parse_assignments(&["YEAR=1".into(), "YEAR=2".into()]).unwrap_err();
        assert!(err.message.contains("more than once"));
    }
}
