//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Find verified email addresses for a list of contacts.
///
/// Reads contacts (first name, last name, company domain) from a JSON file,
/// checks guessed address patterns against MailTester Ninja, and writes an
/// input-ordered CSV plus a JSON result file.
#[derive(Parser, Debug)]
#[command(name = "enricher")]
#[command(author, version, about)]
pub struct Args {
    /// Contacts file: a JSON array of objects with firstName, lastName and domain
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// CSV output path (default: <input>.enriched.csv)
    #[arg(long)]
    pub output_csv: Option<PathBuf>,

    /// JSON results output path (default: <input>.results.json)
    #[arg(long)]
    pub output_json: Option<PathBuf>,

    /// Contacts verified concurrently per wave (1-500)
    #[arg(long, env = "COMBO_BATCH_SIZE", value_parser = clap::value_parser!(u16).range(1..=500))]
    pub wave_size: Option<u16>,

    /// Maximum candidate addresses tried per contact (1-50)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=50))]
    pub max_combos: Option<u8>,

    /// Minimum delay between verification requests in milliseconds (0-60000)
    #[arg(long, env = "MIN_DELAY_MS", value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub min_delay_ms: Option<u64>,

    /// HTTP request timeout in seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub request_timeout_secs: Option<u64>,

    /// Verification endpoint
    #[arg(long, env = "MAILTESTER_BASE_URL")]
    pub mailtester_base_url: Option<String>,

    /// Key provider endpoint
    #[arg(long, env = "KEY_PROVIDER_URL")]
    pub key_provider_url: Option<String>,

    /// Config file (default: $XDG_CONFIG_HOME/enricher/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Ignore the config file
    #[arg(long, conflicts_with = "config")]
    pub no_config: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored log output
    #[arg(long)]
    pub no_color: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parse_successfully() {
        let args = Args::try_parse_from(["enricher"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.input.is_none());
        assert!(args.max_combos.is_none());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["enricher", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        let result = Args::try_parse_from(["enricher", "-q", "-v"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ArgumentConflict
        );
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["enricher", "--help"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::DisplayHelp
        );
    }

    #[test]
    fn test_cli_input_and_outputs() {
        let args = Args::try_parse_from([
            "enricher",
            "-i",
            "contacts.json",
            "--output-csv",
            "out.csv",
            "--output-json",
            "out.json",
        ])
        .unwrap();
        assert_eq!(args.input, Some(PathBuf::from("contacts.json")));
        assert_eq!(args.output_csv, Some(PathBuf::from("out.csv")));
        assert_eq!(args.output_json, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn test_cli_wave_size_range() {
        let args = Args::try_parse_from(["enricher", "--wave-size", "500"]).unwrap();
        assert_eq!(args.wave_size, Some(500));

        for bad in ["0", "501"] {
            let result = Args::try_parse_from(["enricher", "--wave-size", bad]);
            assert_eq!(
                result.unwrap_err().kind(),
                clap::error::ErrorKind::ValueValidation
            );
        }
    }

    #[test]
    fn test_cli_max_combos_range() {
        let args = Args::try_parse_from(["enricher", "--max-combos", "1"]).unwrap();
        assert_eq!(args.max_combos, Some(1));

        let result = Args::try_parse_from(["enricher", "--max-combos", "51"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn test_cli_min_delay_range() {
        let args = Args::try_parse_from(["enricher", "--min-delay-ms", "0"]).unwrap();
        assert_eq!(args.min_delay_ms, Some(0));

        let result = Args::try_parse_from(["enricher", "--min-delay-ms", "60001"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn test_cli_request_timeout_zero_rejected() {
        let result = Args::try_parse_from(["enricher", "--request-timeout-secs", "0"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn test_cli_config_conflicts_with_no_config() {
        let result = Args::try_parse_from(["enricher", "--config", "a.toml", "--no-config"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ArgumentConflict
        );
    }
}
