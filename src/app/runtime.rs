use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use enricher_core::{
    CredentialGate, CsvFileSink, EnrichOptions, EnrichmentJob, HttpKeyProvider, MailTesterClient,
};
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::config::{self, RunSettings};
use crate::app::{exit_handler, input_processor, output, progress_ui, terminal};
use crate::cli::Args;

pub(crate) async fn run_enricher() -> Result<ProcessExit> {
    let args = Args::parse();

    let loaded = config::load_config(&args)?;
    let file_config = loaded.config.as_ref();

    let default_level = config::resolve_default_log_level(&args, file_config);
    let no_color = terminal::is_no_color_requested(&args);
    terminal::init_tracing(
        default_level,
        terminal::should_force_cli_log_level(&args),
        no_color,
    );

    if let Some(path) = loaded.path.as_deref().filter(|_| file_config.is_some()) {
        debug!(path = %path.display(), "Loaded config file");
    }
    let settings = RunSettings::resolve(&args, file_config);
    debug!(?settings, "Resolved run settings");
    info!("Enricher starting");

    let Some((source, rows)) = input_processor::process_input(&args)? else {
        output::print_quick_start_guidance();
        return Ok(ProcessExit::Success);
    };
    let paths = output::resolve_output_paths(
        &source,
        args.output_csv.as_deref(),
        args.output_json.as_deref(),
    );

    let provider = HttpKeyProvider::new(&settings.key_provider_url, settings.request_timeout)
        .context("Failed to set up key provider")?;
    let gate = Arc::new(CredentialGate::new(Arc::new(provider)));
    let verifier = MailTesterClient::new(
        &settings.mailtester_base_url,
        Arc::clone(&gate),
        settings.min_delay,
        settings.request_timeout,
    )
    .context("Failed to set up verification client")?;
    let options = EnrichOptions::new(Arc::new(verifier))
        .with_max_combos(settings.max_combos)
        .with_wave_size(settings.wave_size);

    let job = EnrichmentJob::new(&rows);
    let sink = CsvFileSink::create(&paths.csv, job.columns().to_vec())
        .context("Failed to create CSV output")?;

    let use_spinner = terminal::should_use_spinner(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );
    let (progress_handle, progress_stop) =
        progress_ui::spawn_progress_ui(use_spinner, job.tracker().subscribe());

    let outcome = job
        .run(&options, sink, |result, snapshot| {
            debug!(
                row_id = result.contact.row_id,
                status = result.status.as_str(),
                best_email = result.best_email.as_deref().unwrap_or(""),
                processed = snapshot.processed_contacts,
                total = snapshot.total_contacts,
                "Contact finished"
            );
        })
        .await;

    progress_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let report = outcome.with_context(|| {
        format!(
            "Enrichment aborted; rows decided so far are in '{}'",
            paths.csv.display()
        )
    })?;

    if !report.missing_rows.is_empty() {
        warn!(rows = ?report.missing_rows, "Some rows never reached the CSV output");
    }

    output::save_results(&paths.json, &report.progress, &report.results)?;
    info!(
        key_fetches = gate.fetch_count(),
        key_waits = gate.wait_count(),
        "Enrichment complete"
    );
    if !args.quiet {
        output::print_completion_summary(&report.progress, &paths);
    }

    Ok(exit_handler::exit_outcome_for(&report.progress))
}
