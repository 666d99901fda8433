//! `ordrecon true-dups`: scan the whole store for identities with conflicting batches.

use std::path::Path;

use serde::Serialize;

use ordrecon_recon::model::IdentityKey;
use ordrecon_recon::scan_true_duplicates;

use crate::exit_codes::EXIT_TRUE_DUPLICATES;
use crate::runtime::Runtime;
use crate::CliError;

#[derive(Serialize)]
struct ScanOutcome<'a> {
    scanned: usize,
    groups: usize,
    records: usize,
    identities: Vec<&'a IdentityKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a Path>,
}

pub fn cmd_true_dups(rt: &Runtime) -> Result<(), CliError> {
    let config = rt.recon_config()?;
    let store = rt.open_store()?;
    let report = scan_true_duplicates(&store, &rt.context()).map_err(CliError::recon)?;

    let path = if report.is_empty() {
        None
    } else {
        Some(rt.export("true-duplicates", &report.to_table(&config.columns))?)
    };
    let records = report.records().count();

    rt.emit(
        &ScanOutcome {
            scanned: report.scanned,
            groups: report.groups.len(),
            records,
            identities: report.groups.iter().map(|g| &g.identity).collect(),
            report: path.as_deref(),
        },
        || {
            for group in &report.groups {
                let batches: Vec<&str> = group
                    .members
                    .iter()
                    .map(|m| m.record.batch_number.as_deref().unwrap_or("(none)"))
                    .collect();
                eprintln!("  {}: batches {}", group.identity, batches.join(", "));
            }
            eprintln!(
                "{} record(s) scanned, {} identity(ies) with conflicting batches",
                report.scanned,
                report.groups.len()
            );
        },
    )?;

    match path {
        Some(path) => Err(CliError::new(
            EXIT_TRUE_DUPLICATES,
            format!("{} record(s) share an identity across batches", records),
        )
        .with_hint(format!("report: {}", path.display()))),
        None => Ok(()),
    }
}
