//! Live browser session behind the runner's driver seam.
//!
//! Owns the strictly nested lifecycle: driver session, browser, context,
//! page, created in that order and released in reverse.

use std::time::Duration;

use async_trait::async_trait;
use probe::probe_runtime::ChannelOwner;
use probe::{
    Browser, BrowserContext, GotoOptions, LaunchOptions, LoadState, Page, Playwright, WaitUntil,
};

use crate::error::{ProbeError, Result};
use crate::runner::ProbeDriver;
use crate::types::BrowserKind;

/// Flags that keep the browser stable inside containers and CI runners.
const STABILITY_ARGS: &[&str] = &[
    "--window-size=1280,720",
    "--disable-dev-shm-usage",
    "--ipc=host",
    "--single-process",
];

pub struct BrowserSession {
    playwright: Playwright,
    browser: Browser,
    context: BrowserContext,
    page: Page,
    closed: bool,
}

impl BrowserSession {
    /// Launches the driver and opens a headless browser, an isolated
    /// context with `default_timeout`, and one page.
    pub async fn launch(kind: BrowserKind, default_timeout: Duration) -> Result<Self> {
        let playwright = Playwright::launch().await?;

        let options = LaunchOptions::new()
            .headless(true)
            .args(STABILITY_ARGS.iter().copied());
        let browser = kind
            .browser_type(&playwright)
            .launch_with_options(options)
            .await
            .map_err(|e| ProbeError::BrowserLaunch(e.to_string()))?;

        let context = browser.new_context().await?;
        context.set_default_timeout(default_timeout).await?;
        let page = context.new_page().await?;

        tracing::debug!(
            target = "probe",
            browser = %kind,
            version = browser.version(),
            "session ready"
        );

        Ok(Self {
            playwright,
            browser,
            context,
            page,
            closed: false,
        })
    }
}

#[async_trait]
impl ProbeDriver for BrowserSession {
    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
        wait_until: Option<WaitUntil>,
    ) -> Result<Option<u16>> {
        let mut options = GotoOptions::new().timeout(timeout);
        if let Some(wait_until) = wait_until {
            options = options.wait_until(wait_until);
        }

        let response = self
            .page
            .goto(url, Some(options))
            .await
            .map_err(|source| ProbeError::Navigation {
                url: url.to_string(),
                source,
            })?;
        Ok(response.map(|r| r.status))
    }

    async fn settle(&mut self, timeout: Duration) {
        if let Err(err) = self
            .page
            .wait_for_load_state(LoadState::DomContentLoaded, timeout)
            .await
        {
            tracing::debug!(target = "probe", "page readiness wait gave up: {err}");
        }

        match self.page.frames().await {
            Ok(frames) => {
                for frame in frames {
                    if let Err(err) = frame
                        .wait_for_load_state(LoadState::DomContentLoaded, timeout)
                        .await
                    {
                        tracing::debug!(
                            target = "probe",
                            frame = %frame.guid(),
                            "frame readiness wait gave up: {err}"
                        );
                    }
                }
            }
            Err(err) => {
                tracing::debug!(target = "probe", "frame enumeration failed: {err}");
            }
        }
    }

    /// Tears the session down in reverse creation order. Each close runs
    /// exactly once; failures are logged, never propagated.
    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(err) = self.context.close().await {
            tracing::warn!(target = "probe", "context close failed: {err}");
        }
        if let Err(err) = self.browser.close().await {
            tracing::warn!(target = "probe", "browser close failed: {err}");
        }
        if let Err(err) = self.playwright.shutdown().await {
            tracing::warn!(target = "probe", "driver shutdown failed: {err}");
        }
    }
}
