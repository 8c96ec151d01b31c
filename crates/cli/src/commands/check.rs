//! `pageprobe check <url>`

use std::time::Duration;

use crate::error::{ProbeError, Result};
use crate::output::{self, OutputFormat};
use crate::plan::ProbePlan;
use crate::runner;
use crate::session::BrowserSession;
use crate::types::BrowserKind;

pub async fn execute(
    url: &str,
    expect: u16,
    timeout_ms: u64,
    browser: BrowserKind,
    format: OutputFormat,
) -> Result<()> {
    let plan = ProbePlan::single_url(url, expect, timeout_ms)?;

    let mut session =
        BrowserSession::launch(browser, Duration::from_millis(plan.default_timeout_ms)).await?;
    let report = runner::probe(&mut session, &plan).await;

    output::print_report("check", &report, format)?;
    if report.passed() {
        Ok(())
    } else {
        Err(ProbeError::OutputAlreadyPrinted)
    }
}
