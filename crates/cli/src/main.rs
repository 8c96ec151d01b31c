//! `pageprobe`: a browser-driven page availability probe.
//!
//! Navigates a real headless browser to a list of paths on a base URL and
//! asserts the HTTP status of each response. Probe plans are TOML files;
//! `pageprobe check <url>` probes a single URL without one.

use std::process::ExitCode;

use clap::Parser;

mod cli;
mod commands;
mod error;
mod logging;
mod output;
mod plan;
mod runner;
mod session;
mod types;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    logging::init_logging(cli.verbose);

    match commands::dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Failures that went through the result envelope are already
            // on stdout; don't report them twice.
            if !err.is_output_already_printed() {
                tracing::error!(target = "probe", "{err}");
            }
            ExitCode::FAILURE
        }
    }
}
