//! `ordrecon add` and `ordrecon as-of`: commands that read an upload file.

use std::path::{Path, PathBuf};

use serde::Serialize;

use ordrecon_io::StagedUpload;
use ordrecon_recon::model::{Batch, RowRejection, ValidationReport};
use ordrecon_recon::{check_as_of, ingest, validate, ReconError};

use crate::exit_codes::{EXIT_AS_OF_FLAGGED, EXIT_DUPLICATE_CONFLICT, EXIT_ROW_INVALID};
use crate::runtime::Runtime;
use crate::CliError;

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AddOutcome<'a> {
    Committed {
        source: &'a str,
        rows: usize,
        inserted: usize,
    },
    Valid {
        source: &'a str,
        rows: usize,
    },
    Rejected {
        source: &'a str,
        rejections: &'a [RowRejection],
        report: &'a Path,
    },
    DuplicateConflict {
        source: &'a str,
        flagged: usize,
        report: &'a Path,
    },
}

/// Stage and parse an upload. The staging file is removed when the handle drops.
fn read_upload(file: &Path) -> Result<(StagedUpload, Batch), CliError> {
    let staged = StagedUpload::from_path(file).map_err(CliError::io)?;
    let batch = staged.parse().map_err(CliError::io)?;
    Ok((staged, batch))
}

pub fn cmd_add(rt: &Runtime, file: PathBuf, dry_run: bool) -> Result<(), CliError> {
    let config = rt.recon_config()?;
    let (_staged, batch) = read_upload(&file)?;

    if dry_run {
        let report = validate(&batch, &config).map_err(CliError::recon)?;
        if !report.is_clean() {
            return rejected(rt, &batch, report);
        }
        return rt.emit(
            &AddOutcome::Valid { source: &batch.source, rows: batch.len() },
            || eprintln!("{}: {} row(s) valid (dry run, nothing written)", batch.source, batch.len()),
        );
    }

    let store = rt.open_store()?;
    match ingest(&store, &rt.context(), &config, &batch) {
        Ok(summary) => rt.emit(
            &AddOutcome::Committed {
                source: &summary.source,
                rows: summary.rows,
                inserted: summary.inserted,
            },
            || eprintln!("{}: {} row(s) committed", summary.source, summary.inserted),
        ),
        Err(ReconError::RowValidation(rejections)) => {
            let report = ValidationReport {
                accepted: batch.len() - rejections.len(),
                rejections,
            };
            rejected(rt, &batch, report)
        }
        Err(ReconError::DuplicateConflict(report)) => {
            let path = rt.export("duplicates", &report.to_table())?;
            let flagged = report.flagged_rows();
            rt.emit(
                &AddOutcome::DuplicateConflict { source: &batch.source, flagged, report: &path },
                || {
                    for group in report.store_collisions.iter().chain(&report.in_batch_collisions) {
                        let rows: Vec<String> = group.members.iter().map(|m| m.row.to_string()).collect();
                        eprintln!("  {} {}: row(s) {}", group.kind, group.identity, rows.join(", "));
                    }
                },
            )?;
            Err(CliError::new(
                EXIT_DUPLICATE_CONFLICT,
                format!("{}: {flagged} duplicate row(s), nothing was written", batch.source),
            )
            .with_hint(format!("report: {}", path.display())))
        }
        Err(e) => Err(CliError::recon(e)),
    }
}

fn rejected(rt: &Runtime, batch: &Batch, report: ValidationReport) -> Result<(), CliError> {
    let path = rt.export("rejections", &report.to_table())?;
    rt.emit(
        &AddOutcome::Rejected {
            source: &batch.source,
            rejections: &report.rejections,
            report: &path,
        },
        || {
            for rejection in &report.rejections {
                eprintln!("  {rejection}");
            }
        },
    )?;
    Err(CliError::new(
        EXIT_ROW_INVALID,
        format!(
            "{}: {} of {} row(s) failed validation, nothing was written",
            batch.source,
            report.rejections.len(),
            batch.len()
        ),
    )
    .with_hint(format!("report: {}", path.display())))
}

#[derive(Serialize)]
struct AsOfOutcome<'a> {
    source: &'a str,
    checked: usize,
    skipped: usize,
    flagged: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a Path>,
}

pub fn cmd_as_of(rt: &Runtime, file: PathBuf) -> Result<(), CliError> {
    let config = rt.recon_config()?;
    let (_staged, batch) = read_upload(&file)?;
    let store = rt.open_store()?;

    let report = check_as_of(&store, &rt.context(), &config, &batch).map_err(CliError::recon)?;
    let path = if report.is_empty() {
        None
    } else {
        Some(rt.export("as-of", &report.to_table())?)
    };

    rt.emit(
        &AsOfOutcome {
            source: &batch.source,
            checked: report.checked,
            skipped: report.skipped,
            flagged: report.flagged.len(),
            report: path.as_deref(),
        },
        || {
            for flag in &report.flagged {
                let stored: Vec<&str> = flag
                    .stored_batches
                    .iter()
                    .map(|b| b.as_deref().unwrap_or("(none)"))
                    .collect();
                eprintln!(
                    "  row {}: {} uploaded batch {} but store has {}",
                    flag.row,
                    flag.identity,
                    flag.uploaded_batch.as_deref().unwrap_or("(none)"),
                    stored.join(", ")
                );
            }
            eprintln!(
                "{}: {} row(s) checked, {} skipped, {} flagged",
                batch.source,
                report.checked,
                report.skipped,
                report.flagged.len()
            );
        },
    )?;

    match path {
        Some(path) => Err(CliError::new(
            EXIT_AS_OF_FLAGGED,
            format!("{}: {} row(s) disagree with stored batch numbers", batch.source, report.flagged.len()),
        )
        .with_hint(format!("report: {}", path.display()))),
        None => Ok(()),
    }
}
