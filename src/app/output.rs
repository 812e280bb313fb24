//! Output paths, the JSON results file and the completion summary.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use enricher_core::{ProgressSnapshot, RowOutcome, StatusBucket};
use serde::Serialize;

use crate::app::input_processor::InputSource;

/// Resolved output file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutputPaths {
    pub csv: PathBuf,
    pub json: PathBuf,
}

/// Explicit paths win; otherwise outputs sit next to the input file
/// (`<stem>.enriched.csv`, `<stem>.results.json`), or in the working
/// directory for stdin input.
pub(crate) fn resolve_output_paths(
    source: &InputSource,
    output_csv: Option<&Path>,
    output_json: Option<&Path>,
) -> OutputPaths {
    let (dir, stem) = match source {
        InputSource::File(path) => (
            path.parent().map(Path::to_path_buf).unwrap_or_default(),
            path.file_stem()
                .map_or_else(|| "contacts".to_string(), |stem| stem.to_string_lossy().into_owned()),
        ),
        InputSource::Stdin => (PathBuf::new(), "contacts".to_string()),
    };

    OutputPaths {
        csv: output_csv.map_or_else(|| dir.join(format!("{stem}.enriched.csv")), Path::to_path_buf),
        json: output_json
            .map_or_else(|| dir.join(format!("{stem}.results.json")), Path::to_path_buf),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultsFile<'a> {
    progress: &'a ProgressSnapshot,
    results: &'a [RowOutcome],
}

/// Writes the per-row outcomes and final counts as pretty JSON.
pub(crate) fn save_results(
    path: &Path,
    progress: &ProgressSnapshot,
    results: &[RowOutcome],
) -> Result<()> {
    let body = serde_json::to_string_pretty(&ResultsFile { progress, results })
        .context("Failed to serialize results")?;
    fs::write(path, body)
        .with_context(|| format!("Failed to write results file '{}'", path.display()))
}

pub(crate) fn print_completion_summary(progress: &ProgressSnapshot, paths: &OutputPaths) {
    println!(
        "Processed {} contacts: {} valid, {} catch-all default, {} not found, {} errors ({} rows skipped)",
        progress.processed_contacts,
        progress.count(StatusBucket::Valid),
        progress.count(StatusBucket::CatchallDefault),
        progress.count(StatusBucket::NotFoundValidEmails),
        progress.count(StatusBucket::Error),
        progress.skipped_rows,
    );
    println!("CSV: {}", paths.csv.display());
    println!("JSON: {}", paths.json.display());
}

pub(crate) fn print_quick_start_guidance() {
    println!("No contacts provided.");
    println!("Pass a JSON array of contacts with --input, or pipe it via stdin:");
    println!(
        r#"  echo '[{{"firstName":"Jane","lastName":"Doe","domain":"acme.com"}}]' | enricher"#
    );
}
