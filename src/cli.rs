//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Automated code-grading core.
///
/// Pulls grading jobs from the message queue, runs each submission inside
/// a fresh resource-capped sandbox container, and publishes a structured
/// verdict.
#[derive(Parser, Debug)]
#[command(name = "gradecore")]
#[command(author, version, about)]
pub struct Args {
    /// Path to the JSON configuration file
    #[arg(short = 'c', long, default_value = "config.json")]
    pub config: PathBuf,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["gradecore"]).unwrap();
        assert_eq!(args.config, PathBuf::from("config.json"));
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
    }

    #[test]
    fn test_cli_config_flag_overrides_path() {
        let args = Args::try_parse_from(["gradecore", "--config", "/etc/gradecore.json"]).unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/gradecore.json"));

        let args = Args::try_parse_from(["gradecore", "-c", "local.json"]).unwrap();
        assert_eq!(args.config, PathBuf::from("local.json"));
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["gradecore", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        // --help causes early exit, so we check it returns an error with Help kind
        let result = Args::try_parse_from(["gradecore", "--help"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
