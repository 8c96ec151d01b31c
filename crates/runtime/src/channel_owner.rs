//! Base trait and embeddable implementation for protocol objects.
//!
//! Every remote object (Browser, Page, Frame, ...) has a server-assigned
//! GUID, a parent in the object tree, and a [`Channel`] for RPC. Concrete
//! types embed [`ChannelOwnerImpl`] and delegate the trait methods to it,
//! overriding [`ChannelOwner::on_event`] where they track protocol events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use downcast_rs::{DowncastSync, impl_downcast};
use parking_lot::Mutex;
use serde_json::Value;

use crate::channel::Channel;
use crate::connection::ConnectionLike;

/// Why an object is being disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeReason {
    /// Explicitly closed by client code or the driver.
    Closed,
    /// Collected on the driver side.
    GarbageCollected,
}

/// A parent is either another protocol object or, for roots, the
/// connection itself.
pub enum ParentOrConnection {
    Parent(Arc<dyn ChannelOwner>),
    Connection(Arc<dyn ConnectionLike>),
}

/// Base trait for all protocol objects.
pub trait ChannelOwner: DowncastSync {
    fn guid(&self) -> &str;

    /// Protocol type name, e.g. "Browser" or "Page".
    fn type_name(&self) -> &str;

    fn parent(&self) -> Option<Arc<dyn ChannelOwner>>;

    fn connection(&self) -> Arc<dyn ConnectionLike>;

    /// Initial state from the `__create__` message.
    fn initializer(&self) -> &Value;

    fn channel(&self) -> &Channel;

    /// Disposes this object and all children recursively.
    fn dispose(&self, reason: DisposeReason);

    /// Moves a child from its old parent to this one (`__adopt__`).
    fn adopt(&self, child: Arc<dyn ChannelOwner>);

    fn add_child(&self, guid: Arc<str>, child: Arc<dyn ChannelOwner>);

    fn remove_child(&self, guid: &str);

    /// Handles a protocol event addressed to this object.
    fn on_event(&self, method: &str, params: Value);

    fn was_collected(&self) -> bool;
}
impl_downcast!(sync ChannelOwner);

impl std::fmt::Debug for dyn ChannelOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelOwner")
            .field("guid", &self.guid())
            .field("type_name", &self.type_name())
            .finish_non_exhaustive()
    }
}

/// Common state for [`ChannelOwner`] implementations. Cloning shares the
/// child registry and collected flag, so a cloned handle observes the same
/// lifecycle.
#[derive(Clone)]
pub struct ChannelOwnerImpl {
    guid: Arc<str>,
    type_name: String,
    parent: Option<Weak<dyn ChannelOwner>>,
    connection: Arc<dyn ConnectionLike>,
    children: Arc<Mutex<HashMap<Arc<str>, Arc<dyn ChannelOwner>>>>,
    channel: Channel,
    initializer: Value,
    was_collected: Arc<AtomicBool>,
}

impl ChannelOwnerImpl {
    pub fn new(
        parent: ParentOrConnection,
        type_name: String,
        guid: Arc<str>,
        initializer: Value,
    ) -> Self {
        let (connection, parent_opt) = match parent {
            ParentOrConnection::Parent(p) => {
                let conn = p.connection();
                (conn, Some(Arc::downgrade(&p)))
            }
            ParentOrConnection::Connection(c) => (c, None),
        };

        let channel = Channel::new(guid.clone(), connection.clone());

        Self {
            guid,
            type_name,
            parent: parent_opt,
            connection,
            children: Arc::new(Mutex::new(HashMap::new())),
            channel,
            initializer,
            was_collected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn parent(&self) -> Option<Arc<dyn ChannelOwner>> {
        self.parent.as_ref().and_then(|p| p.upgrade())
    }

    pub fn connection(&self) -> Arc<dyn ConnectionLike> {
        self.connection.clone()
    }

    pub fn initializer(&self) -> &Value {
        &self.initializer
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn dispose(&self, reason: DisposeReason) {
        if reason == DisposeReason::GarbageCollected {
            self.was_collected.store(true, Ordering::SeqCst);
        }

        if let Some(parent) = self.parent() {
            parent.remove_child(&self.guid);
        }
        self.connection.unregister_object(&self.guid);

        // Snapshot so no lock is held while children dispose.
        let children: Vec<_> = self.children.lock().values().cloned().collect();
        for child in children {
            child.dispose(reason);
        }
        self.children.lock().clear();
    }

    pub fn adopt(&self, child: Arc<dyn ChannelOwner>) {
        if let Some(old_parent) = child.parent() {
            old_parent.remove_child(child.guid());
        }
        self.add_child(Arc::from(child.guid()), child);
    }

    pub fn add_child(&self, guid: Arc<str>, child: Arc<dyn ChannelOwner>) {
        self.children.lock().insert(guid, child);
    }

    pub fn remove_child(&self, guid: &str) {
        self.children.lock().remove(guid);
    }

    /// Default event handling just records the event at debug level.
    pub fn on_event(&self, method: &str, params: Value) {
        tracing::debug!(
            target = "probe.runtime",
            guid = %self.guid,
            type_name = %self.type_name,
            method,
            ?params,
            "unhandled protocol event"
        );
    }

    pub fn was_collected(&self) -> bool {
        self.was_collected.load(Ordering::SeqCst)
    }
}

impl ChannelOwner for ChannelOwnerImpl {
    fn guid(&self) -> &str {
        self.guid()
    }
    fn type_name(&self) -> &str {
        self.type_name()
    }
    fn parent(&self) -> Option<Arc<dyn ChannelOwner>> {
        self.parent()
    }
    fn connection(&self) -> Arc<dyn ConnectionLike> {
        self.connection()
    }
    fn initializer(&self) -> &Value {
        self.initializer()
    }
    fn channel(&self) -> &Channel {
        self.channel()
    }
    fn dispose(&self, reason: DisposeReason) {
        self.dispose(reason)
    }
    fn adopt(&self, child: Arc<dyn ChannelOwner>) {
        self.adopt(child)
    }
    fn add_child(&self, guid: Arc<str>, child: Arc<dyn ChannelOwner>) {
        self.add_child(guid, child)
    }
    fn remove_child(&self, guid: &str) {
        self.remove_child(guid)
    }
    fn on_event(&self, method: &str, params: Value) {
        self.on_event(method, params)
    }
    fn was_collected(&self) -> bool {
        self.was_collected()
    }
}
