//! GUID-keyed registry of protocol objects with notify-on-insert waiting.
//!
//! [`DashMap`] gives lock-free concurrent access. A per-GUID [`Notify`]
//! wakes only the waiters for that object, and [`ObjectStore::wait_for`]
//! registers its waiter before checking the map so an insert between the
//! check and the wait cannot be lost.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;

use crate::channel_owner::ChannelOwner;
use crate::error::{Error, Result};

pub struct ObjectStore {
    objects: DashMap<Arc<str>, Arc<dyn ChannelOwner>>,
    waiters: DashMap<Arc<str>, Arc<Notify>>,
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            waiters: DashMap::new(),
        }
    }

    /// Inserts an object and wakes any waiters for this GUID.
    pub fn insert(&self, guid: Arc<str>, obj: Arc<dyn ChannelOwner>) {
        self.objects.insert(guid.clone(), obj);
        if let Some((_, notify)) = self.waiters.remove(&guid) {
            notify.notify_waiters();
        }
    }

    pub fn remove(&self, guid: &str) {
        self.objects.remove(guid);
    }

    /// Synchronous lookup.
    pub fn try_get(&self, guid: &str) -> Option<Arc<dyn ChannelOwner>> {
        self.objects.get(guid).map(|r| r.value().clone())
    }

    /// Waits for an object to be registered, with timeout.
    pub async fn wait_for(&self, guid: &str, timeout: Duration) -> Result<Arc<dyn ChannelOwner>> {
        let g: Arc<str> = Arc::from(guid);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notify = self
                .waiters
                .entry(g.clone())
                .or_insert_with(|| Arc::new(Notify::new()))
                .clone();
            let notified = notify.notified();

            if let Some(obj) = self.objects.get(&g) {
                let obj = obj.value().clone();
                self.abandon_waiter(&g, &notify);
                return Ok(obj);
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                self.abandon_waiter(&g, &notify);
                return Err(Self::timeout_error(&g));
            }

            tokio::select! {
                biased;
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => {
                    self.abandon_waiter(&g, &notify);
                    return Err(Self::timeout_error(&g));
                }
            }
        }
    }

    /// Drops this waiter's registration. The entry stays when another
    /// waiter still holds the same `Notify` (map + our clone account
    /// for two strong references).
    fn abandon_waiter(&self, guid: &Arc<str>, notify: &Arc<Notify>) {
        self.waiters
            .remove_if(guid, |_, n| Arc::ptr_eq(n, notify) && Arc::strong_count(n) <= 2);
    }

    fn timeout_error(guid: &str) -> Error {
        let target_type = match () {
            _ if guid.starts_with("page@") => "Page",
            _ if guid.starts_with("frame@") => "Frame",
            _ if guid.starts_with("browser-context@") => "BrowserContext",
            _ if guid.starts_with("browser@") => "Browser",
            _ if guid.starts_with("response@") => "Response",
            _ => return Error::Timeout(format!("Timeout waiting for object: {guid}")),
        };
        Error::Timeout(format!("Timeout waiting for {target_type} object: {guid}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_owner::{ChannelOwnerImpl, ParentOrConnection};
    use crate::connection::tests::noop_connection;
    use serde_json::Value;

    fn make_object(guid: &str) -> Arc<dyn ChannelOwner> {
        Arc::new(ChannelOwnerImpl::new(
            ParentOrConnection::Connection(noop_connection()),
            "Test".to_string(),
            Arc::from(guid),
            Value::Null,
        ))
    }

    #[tokio::test]
    async fn wait_for_returns_object_inserted_later() {
        let store = Arc::new(ObjectStore::new());
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_for("page@1", Duration::from_secs(1)).await })
        };

        tokio::task::yield_now().await;
        store.insert(Arc::from("page@1"), make_object("page@1"));

        let obj = waiter.await.unwrap().unwrap();
        assert_eq!(obj.guid(), "page@1");
    }

    #[tokio::test]
    async fn wait_for_times_out_with_typed_message() {
        let store = ObjectStore::new();
        let err = store
            .wait_for("response@9", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Response object"));
    }

    #[tokio::test]
    async fn timed_out_wait_cleans_up_its_waiter_entry() {
        let store = ObjectStore::new();
        store
            .wait_for("page@gone", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(store.waiters.is_empty());
    }

    #[tokio::test]
    async fn surviving_waiter_is_still_woken_after_another_times_out() {
        let store = Arc::new(ObjectStore::new());
        let patient = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_for("page@2", Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;

        store
            .wait_for("page@2", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(store.waiters.contains_key("page@2"));

        store.insert(Arc::from("page@2"), make_object("page@2"));
        let obj = patient.await.unwrap().unwrap();
        assert_eq!(obj.guid(), "page@2");
    }

    #[tokio::test]
    async fn remove_makes_object_unreachable() {
        let store = ObjectStore::new();
        store.insert(Arc::from("frame@1"), make_object("frame@1"));
        assert!(store.try_get("frame@1").is_some());
        store.remove("frame@1");
        assert!(store.try_get("frame@1").is_none());
    }
}
