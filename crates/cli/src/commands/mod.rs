//! Command dispatch.

mod check;
mod run;

use crate::cli::{Cli, Commands};
use crate::error::{ProbeError, Result};
use crate::output;

pub async fn dispatch(cli: Cli) -> Result<()> {
    let format = cli.format;
    let browser = cli.browser;

    let (name, result) = match cli.command {
        Commands::Run { plan, base_url } => {
            ("run", run::execute(&plan, base_url, browser, format).await)
        }
        Commands::Check {
            url,
            expect,
            timeout_ms,
        } => (
            "check",
            check::execute(&url, expect, timeout_ms, browser, format).await,
        ),
    };

    match result {
        // Errors that never reached a report still get an envelope on
        // stdout, so JSON consumers always see one.
        Err(err) if !err.is_output_already_printed() => {
            output::print_failure(name, &err, format);
            Err(ProbeError::OutputAlreadyPrinted)
        }
        other => other,
    }
}
