//! Browser protocol object.

use std::sync::Arc;

use probe_runtime::channel::Channel;
use probe_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection};
use probe_runtime::connection::{ConnectionLike, deserialize_arc_str};
use probe_runtime::{Error, Result};
use serde::Deserialize;
use serde_json::Value;

/// A launched browser instance. Contexts are isolated profiles inside it.
#[derive(Clone)]
pub struct Browser {
    base: ChannelOwnerImpl,
}

impl Browser {
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

    /// Browser version string from the launch.
    pub fn version(&self) -> &str {
        self.base.initializer()["version"].as_str().unwrap_or("")
    }

    /// Creates an isolated browsing context (fresh cookies and storage).
    pub async fn new_context(&self) -> Result<crate::BrowserContext> {
        #[derive(Deserialize)]
        struct NewContextResponse {
            context: ContextReference,
        }
        #[derive(Deserialize)]
        struct ContextReference {
            #[serde(deserialize_with = "deserialize_arc_str")]
            guid: Arc<str>,
        }

        let response: NewContextResponse = self
            .base
            .channel()
            .send("newContext", serde_json::json!({}))
            .await?;

        let context_arc = self.connection().get_object(&response.context.guid).await?;
        let context = context_arc
            .downcast_ref::<crate::BrowserContext>()
            .ok_or_else(|| {
                Error::ProtocolError(format!(
                    "expected BrowserContext object, got {}",
                    context_arc.type_name()
                ))
            })?;

        Ok(context.clone())
    }

    /// Closes the browser and all of its contexts.
    pub async fn close(&self) -> Result<()> {
        self.base
            .channel()
            .send_no_result("close", serde_json::json!({}))
            .await
    }
}

impl ChannelOwner for Browser {
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

impl std::fmt::Debug for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Browser")
            .field("guid", &self.guid())
            .field("version", &self.version())
            .finish()
    }
}
