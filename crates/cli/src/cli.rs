//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use crate::types::BrowserKind;

#[derive(Debug, Parser)]
#[command(
    name = "pageprobe",
    about = "Browser-driven page availability probe",
    version
)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format for probe results
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Browser engine to probe with
    #[arg(short, long, global = true, value_enum, default_value_t = BrowserKind::Chromium)]
    pub browser: BrowserKind,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a probe plan from a TOML file
    Run {
        /// Path to the plan file
        plan: PathBuf,

        /// Override the plan's base URL
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Probe a single URL without a plan file
    Check {
        /// URL to probe
        url: String,

        /// Expected HTTP status
        #[arg(long, default_value_t = 200)]
        expect: u16,

        /// Navigation timeout in milliseconds
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_defaults_to_expecting_200() {
        let cli = Cli::parse_from(["pageprobe", "check", "http://localhost:3000/login"]);
        match cli.command {
            Commands::Check { expect, timeout_ms, .. } => {
                assert_eq!(expect, 200);
                assert_eq!(timeout_ms, 10_000);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn run_accepts_a_base_url_override() {
        let cli = Cli::parse_from([
            "pageprobe",
            "run",
            "plan.toml",
            "--base-url",
            "http://localhost:8080",
        ]);
        match cli.command {
            Commands::Run { base_url, .. } => {
                assert_eq!(base_url.as_deref(), Some("http://localhost:8080"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
