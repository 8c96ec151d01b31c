//! BrowserContext protocol object.

use std::sync::Arc;
use std::time::Duration;

use probe_runtime::channel::Channel;
use probe_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection};
use probe_runtime::connection::{ConnectionLike, deserialize_arc_str};
use probe_runtime::{Error, Result};
use serde::Deserialize;
use serde_json::Value;

/// An isolated browsing session inside a browser.
#[derive(Clone)]
pub struct BrowserContext {
    base: ChannelOwnerImpl,
}

impl BrowserContext {
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

    /// Opens a new page in this context.
    pub async fn new_page(&self) -> Result<crate::Page> {
        #[derive(Deserialize)]
        struct NewPageResponse {
            page: PageReference,
        }
        #[derive(Deserialize)]
        struct PageReference {
            #[serde(deserialize_with = "deserialize_arc_str")]
            guid: Arc<str>,
        }

        let response: NewPageResponse = self
            .base
            .channel()
            .send("newPage", serde_json::json!({}))
            .await?;

        let page_arc = self.connection().get_object(&response.page.guid).await?;
        let page = page_arc.downcast_ref::<crate::Page>().ok_or_else(|| {
            Error::ProtocolError(format!(
                "expected Page object, got {}",
                page_arc.type_name()
            ))
        })?;

        Ok(page.clone())
    }

    /// Sets the default timeout for all operations in this context.
    pub async fn set_default_timeout(&self, timeout: Duration) -> Result<()> {
        self.base
            .channel()
            .send_no_result(
                "setDefaultTimeoutNoReply",
                serde_json::json!({ "timeout": timeout.as_millis() as f64 }),
            )
            .await
    }

    /// Closes the context and all of its pages.
    pub async fn close(&self) -> Result<()> {
        self.base
            .channel()
            .send_no_result("close", serde_json::json!({}))
            .await
    }
}

impl ChannelOwner for BrowserContext {
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

impl std::fmt::Debug for BrowserContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserContext")
            .field("guid", &self.guid())
            .finish()
    }
}
