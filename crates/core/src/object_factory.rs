//! Maps `__create__` type names to concrete protocol objects.
//!
//! The driver creates many object types a probe never touches
//! (SocksSupport, LocalUtils, APIRequestContext, ...). Those become
//! opaque [`RemoteObject`]s so they can still serve as parents and take
//! part in the dispose lifecycle without aborting the handshake.

use std::sync::Arc;

use probe_runtime::channel::Channel;
use probe_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection};
use probe_runtime::connection::ConnectionLike;
use probe_runtime::{Error, Result};
use serde_json::Value;

pub(crate) async fn create_object(
    parent: ParentOrConnection,
    type_name: String,
    guid: Arc<str>,
    initializer: Value,
) -> Result<Arc<dyn ChannelOwner>> {
    match type_name.as_str() {
        "Playwright" => {
            let connection = match parent {
                ParentOrConnection::Connection(c) => c,
                ParentOrConnection::Parent(p) => p.connection(),
            };
            let playwright =
                crate::Playwright::new(connection, type_name, guid, initializer).await?;
            Ok(Arc::new(playwright))
        }
        "BrowserType" => {
            let parent = required_parent(parent, "BrowserType")?;
            Ok(Arc::new(crate::BrowserType::new(
                parent,
                type_name,
                guid,
                initializer,
            )))
        }
        "Browser" => {
            let parent = required_parent(parent, "Browser")?;
            Ok(Arc::new(crate::Browser::new(
                parent,
                type_name,
                guid,
                initializer,
            )))
        }
        "BrowserContext" => {
            let parent = required_parent(parent, "BrowserContext")?;
            Ok(Arc::new(crate::BrowserContext::new(
                parent,
                type_name,
                guid,
                initializer,
            )))
        }
        "Page" => {
            let parent = required_parent(parent, "Page")?;
            Ok(Arc::new(crate::Page::new(
                parent,
                type_name,
                guid,
                initializer,
            )?))
        }
        "Frame" => {
            let parent = required_parent(parent, "Frame")?;
            Ok(Arc::new(crate::Frame::new(
                parent,
                type_name,
                guid,
                initializer,
            )))
        }
        _ => {
            tracing::debug!(
                target = "probe",
                type_name,
                guid = %guid,
                "registering opaque remote object"
            );
            Ok(Arc::new(RemoteObject {
                base: ChannelOwnerImpl::new(parent, type_name, guid, initializer),
            }))
        }
    }
}

fn required_parent(
    parent: ParentOrConnection,
    type_name: &str,
) -> Result<Arc<dyn ChannelOwner>> {
    match parent {
        ParentOrConnection::Parent(p) => Ok(p),
        ParentOrConnection::Connection(_) => Err(Error::ProtocolError(format!(
            "{type_name} objects must have a parent"
        ))),
    }
}

/// A protocol object the probe has no typed representation for. Holds its
/// place in the object tree and nothing else.
pub struct RemoteObject {
    base: ChannelOwnerImpl,
}

impl ChannelOwner for RemoteObject {
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
