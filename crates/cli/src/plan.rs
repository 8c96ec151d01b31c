//! Probe plan configuration.
//!
//! A plan is a TOML file naming a base URL and an ordered list of
//! `(path, expected status)` steps:
//!
//! ```toml
//! base-url = "http://localhost:3000"
//!
//! [[step]]
//! path = "/login"
//!
//! [[step]]
//! path = "/admin"
//! status = 302
//! ```

use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::error::{ProbeError, Result};

pub const DEFAULT_NAV_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_CONTEXT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProbePlan {
    /// Root URL all step paths are joined onto.
    pub base_url: String,

    /// Per-navigation timeout.
    #[serde(default = "default_nav_timeout_ms")]
    pub nav_timeout_ms: u64,

    /// Timeout for the best-effort readiness waits after warm-up.
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// Default timeout applied to the browsing context.
    #[serde(default = "default_context_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(rename = "step", default)]
    pub steps: Vec<ProbeStep>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProbeStep {
    /// Path relative to the base URL.
    pub path: String,

    /// Expected HTTP status of the main resource.
    #[serde(default = "default_expected_status")]
    pub status: u16,
}

fn default_nav_timeout_ms() -> u64 {
    DEFAULT_NAV_TIMEOUT_MS
}

fn default_ready_timeout_ms() -> u64 {
    DEFAULT_READY_TIMEOUT_MS
}

fn default_context_timeout_ms() -> u64 {
    DEFAULT_CONTEXT_TIMEOUT_MS
}

fn default_expected_status() -> u16 {
    DEFAULT_EXPECTED_STATUS
}

/// Parse a base URL, requiring a navigable scheme.
fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| ProbeError::Plan(format!("invalid base-url '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProbeError::Plan(format!(
            "invalid base-url '{raw}': scheme must be http or https"
        )));
    }
    Ok(url)
}

impl ProbePlan {
    /// Loads and validates a plan file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let plan: ProbePlan =
            toml::from_str(&raw).map_err(|e| ProbeError::Plan(e.to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    /// A one-step plan probing `url` directly, for `check`.
    pub fn single_url(url: &str, expect: u16, nav_timeout_ms: u64) -> Result<Self> {
        let plan = Self {
            base_url: url.to_string(),
            nav_timeout_ms,
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            default_timeout_ms: DEFAULT_CONTEXT_TIMEOUT_MS,
            steps: vec![ProbeStep {
                path: String::new(),
                status: expect,
            }],
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Replaces the base URL, rejecting one the probe cannot navigate to.
    pub fn set_base_url(&mut self, raw: String) -> Result<()> {
        parse_base_url(&raw)?;
        self.base_url = raw;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let base = parse_base_url(&self.base_url)?;
        if self.steps.is_empty() {
            return Err(ProbeError::Plan("plan has no steps".to_string()));
        }
        for step in &self.steps {
            if !step.path.is_empty() {
                base.join(&step.path).map_err(|e| {
                    ProbeError::Plan(format!(
                        "cannot join path '{}' onto '{}': {e}",
                        step.path, self.base_url
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Resolves a step path against the base URL per RFC 3986: an absolute
    /// path replaces the base's path, a relative one resolves against it.
    /// An empty path probes the base URL itself.
    pub fn step_url(&self, path: &str) -> Result<String> {
        if path.is_empty() {
            return Ok(self.base_url.clone());
        }
        let base = parse_base_url(&self.base_url)?;
        let joined = base.join(path).map_err(|e| {
            ProbeError::Plan(format!(
                "cannot join path '{path}' onto '{}': {e}",
                self.base_url
            ))
        })?;
        Ok(joined.into())
    }
}
