//! `pageprobe run <plan.toml>`

use std::path::Path;
use std::time::Duration;

use crate::error::{ProbeError, Result};
use crate::output::{self, OutputFormat};
use crate::plan::ProbePlan;
use crate::runner;
use crate::session::BrowserSession;
use crate::types::BrowserKind;

pub async fn execute(
    plan_path: &Path,
    base_url: Option<String>,
    browser: BrowserKind,
    format: OutputFormat,
) -> Result<()> {
    let mut plan = ProbePlan::from_path(plan_path)?;
    if let Some(base_url) = base_url {
        plan.set_base_url(base_url)?;
    }

    let mut session =
        BrowserSession::launch(browser, Duration::from_millis(plan.default_timeout_ms)).await?;
    let report = runner::probe(&mut session, &plan).await;

    output::print_report("run", &report, format)?;
    if report.passed() {
        Ok(())
    } else {
        Err(ProbeError::OutputAlreadyPrinted)
    }
}
