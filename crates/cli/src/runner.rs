//! Sequential probe runner.
//!
//! The runner is pure control flow over the [`ProbeDriver`] seam: warm up
//! the base URL, settle, then probe each step in plan order, stopping at
//! the first failure. It holds no state between runs.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use probe::WaitUntil;
use serde::Serialize;

use crate::plan::ProbePlan;

/// What the runner needs from a browser. Implemented by the live
/// [`crate::session::BrowserSession`] and by scripted fakes in tests.
#[async_trait]
pub trait ProbeDriver {
    /// Navigates and returns the HTTP status of the main resource, or
    /// `None` when the navigation produced no response.
    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
        wait_until: Option<WaitUntil>,
    ) -> crate::error::Result<Option<u16>>;

    /// Best-effort readiness wait after warm-up. Never fails the probe.
    async fn settle(&mut self, timeout: Duration);

    /// Releases the browser resources. Must be safe to call on an already
    /// closed driver; failures are the implementation's to log.
    async fn close(&mut self);
}

/// Runs `plan` against `driver` and closes the driver afterwards, whether
/// the run passed or failed.
pub async fn probe<D: ProbeDriver>(driver: &mut D, plan: &ProbePlan) -> ProbeReport {
    let report = run_plan(driver, plan).await;
    driver.close().await;
    report
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub base_url: String,
    /// Set when the warm-up navigation failed; no steps ran in that case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warmup_error: Option<String>,
    pub steps: Vec<StepOutcome>,
    pub duration_ms: u64,
}

impl ProbeReport {
    pub fn passed(&self) -> bool {
        self.warmup_error.is_none()
            && self
                .steps
                .iter()
                .all(|s| matches!(s.result, StepResult::Passed { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub path: String,
    pub url: String,
    pub expected: u16,
    #[serde(flatten)]
    pub result: StepResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum StepResult {
    Passed { status: u16 },
    StatusMismatch { status: u16, message: String },
    NavigationFailed { message: String },
}

/// Runs `plan` against `driver` and collects outcomes in plan order.
pub async fn run_plan<D: ProbeDriver>(driver: &mut D, plan: &ProbePlan) -> ProbeReport {
    let started = Instant::now();
    let nav_timeout = Duration::from_millis(plan.nav_timeout_ms);
    let ready_timeout = Duration::from_millis(plan.ready_timeout_ms);

    // Warm-up: reach the base URL before asserting any statuses.
    if let Err(err) = driver
        .navigate(&plan.base_url, nav_timeout, Some(WaitUntil::Commit))
        .await
    {
        tracing::warn!(target = "probe", url = %plan.base_url, "warm-up navigation failed: {err}");
        return ProbeReport {
            base_url: plan.base_url.clone(),
            warmup_error: Some(err.to_string()),
            steps: Vec::new(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
    }
    driver.settle(ready_timeout).await;

    let mut steps = Vec::with_capacity(plan.steps.len());
    for step in &plan.steps {
        let url = match plan.step_url(&step.path) {
            Ok(url) => url,
            Err(err) => {
                steps.push(StepOutcome {
                    path: step.path.clone(),
                    url: step.path.clone(),
                    expected: step.status,
                    result: StepResult::NavigationFailed {
                        message: err.to_string(),
                    },
                });
                break;
            }
        };
        tracing::info!(target = "probe", %url, expected = step.status, "probing");

        let result = match driver.navigate(&url, nav_timeout, None).await {
            Err(err) => StepResult::NavigationFailed {
                message: err.to_string(),
            },
            Ok(None) => StepResult::NavigationFailed {
                message: "navigation produced no response".to_string(),
            },
            Ok(Some(actual)) if actual == step.status => StepResult::Passed { status: actual },
            Ok(Some(actual)) => StepResult::StatusMismatch {
                status: actual,
                message: format!("expected {}, got {}", step.status, actual),
            },
        };

        let failed = !matches!(result, StepResult::Passed { .. });
        if failed {
            tracing::warn!(target = "probe", %url, "step failed");
        }
        steps.push(StepOutcome {
            path: step.path.clone(),
            url,
            expected: step.status,
            result,
        });
        // No retries; a failed step ends the run.
        if failed {
            break;
        }
    }

    ProbeReport {
        base_url: plan.base_url.clone(),
        warmup_error: None,
        steps,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}
