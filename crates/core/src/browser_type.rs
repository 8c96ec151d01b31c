//! BrowserType protocol object (chromium, firefox, webkit).

use std::sync::Arc;

use probe_runtime::channel::Channel;
use probe_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection};
use probe_runtime::connection::{ConnectionLike, deserialize_arc_str};
use probe_runtime::{Error, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::launch_options::LaunchOptions;

/// One of the driver's browser engines. Obtained from
/// [`crate::Playwright::chromium`] and friends.
#[derive(Clone)]
pub struct BrowserType {
    base: ChannelOwnerImpl,
}

impl BrowserType {
    pub fn new(
        parent: Arc<dyn ChannelOwner>,
        type_name: String,
        guid: Arc<str>,
        initializer: Value,
    ) -> Self {
        Self {
            base: ChannelOwnerImpl::new(
                ParentOrConnection::Parent(parent),
                type_name,
                guid,
                initializer,
            ),
        }
    }

    /// Engine name: "chromium", "firefox", or "webkit".
    pub fn name(&self) -> &str {
        self.base.initializer()["name"].as_str().unwrap_or("")
    }

    /// Launches a browser instance.
    pub async fn launch_with_options(&self, options: LaunchOptions) -> Result<crate::Browser> {
        #[derive(Deserialize)]
        struct LaunchResponse {
            browser: BrowserReference,
        }
        #[derive(Deserialize)]
        struct BrowserReference {
            #[serde(deserialize_with = "deserialize_arc_str")]
            guid: Arc<str>,
        }

        let params = options.normalize();
        let response: LaunchResponse = self.base.channel().send("launch", params).await?;

        let browser_arc = self.connection().get_object(&response.browser.guid).await?;
        let browser = browser_arc.downcast_ref::<crate::Browser>().ok_or_else(|| {
            Error::ProtocolError(format!(
                "expected Browser object, got {}",
                browser_arc.type_name()
            ))
        })?;

        Ok(browser.clone())
    }
}

impl ChannelOwner for BrowserType {
    fn guid(&self) -> &str {
        self.base.guid()
    }
    fn type_name(&self) -> &str {
        self.base.type_name()
    }
    fn parent(&self) -> Option<Arc<dyn ChannelOwner>> {
        self.base.parent()
    }
    fn connection(&self) -> Arc<dyn ConnectionLike> {
        self.base.connection()
    }
    fn initializer(&self) -> &Value {
        self.base.initializer()
    }
    fn channel(&self) -> &Channel {
        self.base.channel()
    }
    fn dispose(&self, reason: DisposeReason) {
        self.base.dispose(reason)
    }
    fn adopt(&self, child: Arc<dyn ChannelOwner>) {
        self.base.adopt(child)
    }
    fn add_child(&self, guid: Arc<str>, child: Arc<dyn ChannelOwner>) {
        self.base.add_child(guid, child)
    }
    fn remove_child(&self, guid: &str) {
        self.base.remove_child(guid)
    }
    fn on_event(&self, method: &str, params: Value) {
        self.base.on_event(method, params)
    }
    fn was_collected(&self) -> bool {
        self.base.was_collected()
    }
}

impl std::fmt::Debug for BrowserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserType")
            .field("name", &self.name())
            .field("guid", &self.guid())
            .finish()
    }
}
