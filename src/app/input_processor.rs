//! Reading contact rows from `--input` or piped stdin.

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::Path;

use anyhow::{Context, Result, bail};
use enricher_core::InputRow;

use crate::cli::Args;

/// Where the rows came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InputSource {
    File(std::path::PathBuf),
    Stdin,
}

/// Reads the contact rows selected by the CLI.
///
/// Returns `None` when there is no `--input` and stdin is an interactive
/// terminal, so the caller can print guidance instead of blocking.
pub(crate) fn process_input(args: &Args) -> Result<Option<(InputSource, Vec<InputRow>)>> {
    if let Some(path) = args.input.as_deref() {
        let rows = load_contacts(path)?;
        return Ok(Some((InputSource::File(path.to_path_buf()), rows)));
    }

    if io::stdin().is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read contacts from stdin")?;
    if buffer.trim().is_empty() {
        return Ok(None);
    }
    let rows = parse_contacts(&buffer).context("Failed to parse contacts from stdin")?;
    Ok(Some((InputSource::Stdin, rows)))
}

pub(crate) fn load_contacts(path: &Path) -> Result<Vec<InputRow>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read contacts file '{}'", path.display()))?;
    parse_contacts(&raw)
        .with_context(|| format!("Failed to parse contacts file '{}'", path.display()))
}

/// Parses a JSON array of contact objects.
pub(crate) fn parse_contacts(raw: &str) -> Result<Vec<InputRow>> {
    let value: serde_json::Value = serde_json::from_str(raw).context("Invalid JSON")?;
    if !value.is_array() {
        bail!("Expected a JSON array of contact objects");
    }
    let rows: Vec<InputRow> = serde_json::from_value(value)?;
    Ok(rows)
}
