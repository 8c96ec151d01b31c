//! Typed client for the Playwright protocol, covering the surface a page
//! availability probe needs: launch a headless browser, open an isolated
//! context and page, navigate and read the HTTP status, wait for load
//! states, enumerate frames, and tear everything down.
//!
//! # Example
//!
//! ```ignore
//! use probe::{GotoOptions, LaunchOptions, Playwright, WaitUntil};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let playwright = Playwright::launch().await?;
//!     let browser = playwright
//!         .chromium()
//!         .launch_with_options(LaunchOptions::new().headless(true))
//!         .await?;
//!     let context = browser.new_context().await?;
//!     let page = context.new_page().await?;
//!
//!     let options = GotoOptions::new().wait_until(WaitUntil::Commit);
//!     if let Some(response) = page.goto("http://localhost:3000/login", Some(options)).await? {
//!         println!("{} -> {}", response.url, response.status);
//!     }
//!
//!     context.close().await?;
//!     browser.close().await?;
//!     playwright.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod init;
mod object_factory;

pub mod browser;
pub mod browser_context;
pub mod browser_type;
pub mod frame;
pub mod launch_options;
pub mod page;
pub mod playwright;
pub mod root;

pub use browser::Browser;
pub use browser_context::BrowserContext;
pub use browser_type::BrowserType;
pub use frame::{Frame, LoadState};
pub use init::initialize_playwright;
pub use launch_options::LaunchOptions;
pub use page::{GotoOptions, Page, Response, WaitUntil};
pub use playwright::Playwright;
pub use root::Root;

// Re-export the runtime for callers that need the lower layers.
pub use probe_runtime;
pub use probe_runtime::{Error, Result};

/// Default timeout in milliseconds for protocol operations. The driver
/// requires an explicit timeout on navigation calls.
pub const DEFAULT_TIMEOUT_MS: f64 = 30_000.0;
