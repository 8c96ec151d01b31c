//! Frame protocol object.
//!
//! Navigation and load-state waiting live here. The driver reports load
//! states incrementally through `loadstate` events with `add`/`remove`
//! fields; the frame keeps the reached set and wakes waiters on every
//! change.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use probe_runtime::channel::Channel;
use probe_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection};
use probe_runtime::connection::{ConnectionLike, deserialize_arc_str};
use probe_runtime::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Notify;

use crate::page::{GotoOptions, Response};
use crate::DEFAULT_TIMEOUT_MS;

/// A load state a frame can reach during navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "load" => Some(LoadState::Load),
            "domcontentloaded" => Some(LoadState::DomContentLoaded),
            "networkidle" => Some(LoadState::NetworkIdle),
            // "commit" and future states are not waitable.
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Frame {
    base: ChannelOwnerImpl,
    url: Arc<RwLock<String>>,
    load_states: Arc<Mutex<HashSet<LoadState>>>,
    load_notify: Arc<Notify>,
}

impl Frame {
    pub fn new(
        parent: Arc<dyn ChannelOwner>,
        type_name: String,
        guid: Arc<str>,
        initializer: Value,
    ) -> Self {
        let url = initializer["url"].as_str().unwrap_or("").to_string();
        let load_states: HashSet<LoadState> = initializer["loadStates"]
            .as_array()
            .map(|states| {
                states
                    .iter()
                    .filter_map(|s| s.as_str().and_then(LoadState::parse))
                    .collect()
            })
            .unwrap_or_default();

        let base = ChannelOwnerImpl::new(
            ParentOrConnection::Parent(parent),
            type_name,
            guid,
            initializer,
        );

        Self {
            base,
            url: Arc::new(RwLock::new(url)),
            load_states: Arc::new(Mutex::new(load_states)),
            load_notify: Arc::new(Notify::new()),
        }
    }

    pub fn url(&self) -> String {
        self.url.read().clone()
    }

    /// Navigates the frame. Returns `None` for navigations with no
    /// response (`about:blank`, `data:` URLs).
    pub async fn goto(&self, url: &str, options: Option<GotoOptions>) -> Result<Option<Response>> {
        let mut params = serde_json::json!({ "url": url });

        // The driver rejects goto without an explicit timeout.
        let options = options.unwrap_or_default();
        let timeout = options
            .timeout
            .map(|t| t.as_millis() as f64)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        params["timeout"] = serde_json::json!(timeout);
        if let Some(wait_until) = options.wait_until {
            params["waitUntil"] = serde_json::json!(wait_until.as_str());
        }

        #[derive(Deserialize)]
        struct GotoResponse {
            response: Option<ResponseReference>,
        }
        #[derive(Deserialize)]
        struct ResponseReference {
            #[serde(deserialize_with = "deserialize_arc_str")]
            guid: Arc<str>,
        }

        let goto_result: GotoResponse = self.base.channel().send("goto", params).await?;

        let Some(response_ref) = goto_result.response else {
            return Ok(None);
        };

        // The Response object's __create__ may arrive after the RPC reply.
        let response_arc = self
            .connection()
            .wait_for_object(&response_ref.guid, Duration::from_secs(1))
            .await?;
        let initializer = response_arc.initializer();

        let status = initializer["status"]
            .as_u64()
            .ok_or_else(|| Error::ProtocolError("Response missing status".to_string()))?
            as u16;
        let headers = initializer["headers"]
            .as_array()
            .ok_or_else(|| Error::ProtocolError("Response missing headers".to_string()))?
            .iter()
            .filter_map(|h| {
                let name = h["name"].as_str()?;
                let value = h["value"].as_str()?;
                Some((name.to_string(), value.to_string()))
            })
            .collect();

        Ok(Some(Response {
            url: initializer["url"]
                .as_str()
                .ok_or_else(|| Error::ProtocolError("Response missing url".to_string()))?
                .to_string(),
            status,
            status_text: initializer["statusText"].as_str().unwrap_or("").to_string(),
            ok: (200..300).contains(&status),
            headers,
        }))
    }

    /// Waits until this frame has reached `state`, or times out.
    ///
    /// Resolves immediately when the state was already reached. The waiter
    /// is registered before the set is checked so a `loadstate` event
    /// landing in between cannot be missed.
    pub async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.load_notify.notified();

            if self.load_states.lock().contains(&state) {
                return Ok(());
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(self.load_state_timeout(state));
            }

            tokio::select! {
                biased;
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => {
                    return Err(self.load_state_timeout(state));
                }
            }
        }
    }

    fn load_state_timeout(&self, state: LoadState) -> Error {
        Error::Timeout(format!(
            "Timeout waiting for load state '{}' on frame {}",
            state.as_str(),
            self.guid()
        ))
    }

    #[cfg(test)]
    fn apply_load_state_event(&self, params: &Value) {
        self.on_load_state(params)
    }

    fn on_load_state(&self, params: &Value) {
        {
            let mut states = self.load_states.lock();
            if let Some(added) = params["add"].as_str().and_then(LoadState::parse) {
                states.insert(added);
            }
            if let Some(removed) = params["remove"].as_str().and_then(LoadState::parse) {
                states.remove(&removed);
            }
        }
        self.load_notify.notify_waiters();
    }
}

impl ChannelOwner for Frame {
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
        match method {
            "loadstate" => self.on_load_state(&params),
            "navigated" => {
                if let Some(url) = params["url"].as_str() {
                    *self.url.write() = url.to_string();
                }
            }
            _ => self.base.on_event(method, params),
        }
    }
    fn was_collected(&self) -> bool {
        self.base.was_collected()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("guid", &self.guid())
            .field("url", &self.url())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_runtime::connection::{Connection, ConnectionLike};
    use probe_runtime::PipeTransport;
    use tokio::io::duplex;

    fn test_frame(initial_states: &[&str]) -> Frame {
        let (_their_stdin, our_stdin) = duplex(1024);
        let (stdout_read, _stdout_write) = duplex(1024);
        let (transport, message_rx) = PipeTransport::new(our_stdin, stdout_read);
        let connection: Arc<dyn ConnectionLike> =
            Arc::new(Connection::new(transport.into_transport_parts(message_rx)));

        Frame::new(
            Arc::new(crate::Root::new(connection.clone())),
            "Frame".to_string(),
            Arc::from("frame@test"),
            serde_json::json!({
                "url": "about:blank",
                "loadStates": initial_states,
            }),
        )
    }

    #[tokio::test]
    async fn wait_resolves_immediately_when_state_already_reached() {
        let frame = test_frame(&["commit", "domcontentloaded"]);
        frame
            .wait_for_load_state(LoadState::DomContentLoaded, Duration::from_millis(50))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_resolves_when_loadstate_event_arrives() {
        let frame = test_frame(&[]);
        let waiter = {
            let frame = frame.clone();
            tokio::spawn(async move {
                frame
                    .wait_for_load_state(LoadState::Load, Duration::from_secs(1))
                    .await
            })
        };

        tokio::task::yield_now().await;
        frame.apply_load_state_event(&serde_json::json!({ "add": "load" }));

        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wait_times_out_when_state_never_arrives() {
        let frame = test_frame(&[]);
        let err = frame
            .wait_for_load_state(LoadState::NetworkIdle, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(err.to_string().contains("networkidle"));
    }

    #[tokio::test]
    async fn removed_state_no_longer_satisfies_waiters() {
        let frame = test_frame(&["load"]);
        frame.apply_load_state_event(&serde_json::json!({ "remove": "load" }));
        let err = frame
            .wait_for_load_state(LoadState::Load, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
