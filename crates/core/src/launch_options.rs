//! Browser launch options.

use std::time::Duration;

use serde_json::Value;

use crate::DEFAULT_TIMEOUT_MS;

/// Options for [`crate::BrowserType::launch_with_options`].
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Run without a visible UI. The driver defaults to headless when
    /// unset.
    pub headless: Option<bool>,
    /// Extra arguments passed to the browser process.
    pub args: Option<Vec<String>>,
    /// Maximum time to wait for the browser to start.
    pub timeout: Option<Duration>,
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = Some(headless);
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the `launch` params. The driver requires a timeout, so one
    /// is always set.
    pub(crate) fn normalize(&self) -> Value {
        let mut params = serde_json::json!({});
        if let Some(headless) = self.headless {
            params["headless"] = serde_json::json!(headless);
        }
        if let Some(args) = &self.args {
            params["args"] = serde_json::json!(args);
        }
        let timeout = self
            .timeout
            .map(|t| t.as_millis() as f64)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        params["timeout"] = serde_json::json!(timeout);
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_always_sets_a_timeout() {
        let params = LaunchOptions::new().normalize();
        assert_eq!(params["timeout"], DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn normalize_carries_headless_and_args() {
        let params = LaunchOptions::new()
            .headless(true)
            .args(["--disable-dev-shm-usage", "--single-process"])
            .timeout(Duration::from_secs(10))
            .normalize();

        assert_eq!(params["headless"], true);
        assert_eq!(params["args"][1], "--single-process");
        assert_eq!(params["timeout"], 10_000.0);
    }
}
