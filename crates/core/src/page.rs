//! Page protocol object.
//!
//! Navigation happens on the main frame; the page delegates and keeps
//! track of its frame set through `frameAttached`/`frameDetached` events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use probe_runtime::channel::Channel;
use probe_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection};
use probe_runtime::connection::ConnectionLike;
use probe_runtime::{Error, Result};
use serde_json::Value;

use crate::frame::LoadState;

/// A single tab. Created via [`crate::BrowserContext::new_page`].
#[derive(Clone)]
pub struct Page {
    base: ChannelOwnerImpl,
    /// Current URL, updated on navigation.
    url: Arc<RwLock<String>>,
    main_frame_guid: Arc<str>,
    /// GUIDs of non-main frames currently attached.
    child_frames: Arc<Mutex<Vec<Arc<str>>>>,
}

impl Page {
    /// Called by the object factory. The initializer names the main frame,
    /// whose `__create__` precedes the page's.
    pub fn new(
        parent: Arc<dyn ChannelOwner>,
        type_name: String,
        guid: Arc<str>,
        initializer: Value,
    ) -> Result<Self> {
        let main_frame_guid: Arc<str> =
            Arc::from(initializer["mainFrame"]["guid"].as_str().ok_or_else(|| {
                Error::ProtocolError("Page initializer missing 'mainFrame.guid'".to_string())
            })?);

        let base = ChannelOwnerImpl::new(
            ParentOrConnection::Parent(parent),
            type_name,
            guid,
            initializer,
        );

        Ok(Self {
            base,
            url: Arc::new(RwLock::new("about:blank".to_string())),
            main_frame_guid,
            child_frames: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub(crate) async fn main_frame(&self) -> Result<crate::Frame> {
        let frame_arc = self.connection().get_object(&self.main_frame_guid).await?;
        let frame = frame_arc.downcast_ref::<crate::Frame>().ok_or_else(|| {
            Error::ProtocolError(format!(
                "expected Frame object, got {}",
                frame_arc.type_name()
            ))
        })?;
        Ok(frame.clone())
    }

    /// Current URL of the page.
    pub fn url(&self) -> String {
        self.url.read().clone()
    }

    /// Navigates to `url` and returns the main resource response.
    ///
    /// Returns `None` for navigations that produce no response
    /// (`about:blank`, `data:` URLs).
    pub async fn goto(&self, url: &str, options: Option<GotoOptions>) -> Result<Option<Response>> {
        let frame = self.main_frame().await.map_err(page_target_closed)?;
        let response = frame.goto(url, options).await.map_err(page_target_closed)?;

        if let Some(response) = &response {
            *self.url.write() = response.url.clone();
        } else {
            *self.url.write() = url.to_string();
        }
        Ok(response)
    }

    /// Waits until the main frame has reached `state`.
    pub async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> Result<()> {
        let frame = self.main_frame().await.map_err(page_target_closed)?;
        frame.wait_for_load_state(state, timeout).await
    }

    /// All frames currently attached, main frame first. Frames whose
    /// `__create__` has not arrived yet are skipped.
    pub async fn frames(&self) -> Result<Vec<crate::Frame>> {
        let mut guids = vec![self.main_frame_guid.clone()];
        guids.extend(self.child_frames.lock().iter().cloned());

        let mut frames = Vec::with_capacity(guids.len());
        for guid in guids {
            if let Ok(frame_arc) = self.connection().get_object(&guid).await {
                if let Some(frame) = frame_arc.downcast_ref::<crate::Frame>() {
                    frames.push(frame.clone());
                }
            }
        }
        Ok(frames)
    }
}

fn page_target_closed(e: Error) -> Error {
    match e {
        Error::TargetClosed { context, .. } => Error::TargetClosed {
            target_type: "Page".to_string(),
            context,
        },
        other => other,
    }
}

impl ChannelOwner for Page {
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
            "frameAttached" => {
                if let Some(guid) = params["frame"]["guid"].as_str() {
                    let guid: Arc<str> = Arc::from(guid);
                    let mut frames = self.child_frames.lock();
                    if guid != self.main_frame_guid && !frames.contains(&guid) {
                        frames.push(guid);
                    }
                }
            }
            "frameDetached" => {
                if let Some(guid) = params["frame"]["guid"].as_str() {
                    self.child_frames.lock().retain(|g| g.as_ref() != guid);
                }
            }
            "close" => {
                tracing::debug!(target = "probe", guid = %self.guid(), "page closed");
            }
            _ => self.base.on_event(method, params),
        }
    }
    fn was_collected(&self) -> bool {
        self.base.was_collected()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("guid", &self.guid())
            .field("url", &self.url())
            .finish()
    }
}

/// Options for [`Page::goto`].
#[derive(Debug, Clone, Default)]
pub struct GotoOptions {
    /// Maximum navigation time.
    pub timeout: Option<Duration>,
    /// When to consider navigation finished.
    pub wait_until: Option<WaitUntil>,
}

impl GotoOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn wait_until(mut self, wait_until: WaitUntil) -> Self {
        self.wait_until = Some(wait_until);
        self
    }
}

/// When a navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    /// The `load` event fired.
    Load,
    /// The `DOMContentLoaded` event fired.
    DomContentLoaded,
    /// No network connections for at least 500ms.
    NetworkIdle,
    /// The navigation was committed.
    Commit,
}

impl WaitUntil {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::Load => "load",
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::NetworkIdle => "networkidle",
            WaitUntil::Commit => "commit",
        }
    }
}

/// Main resource response of a navigation.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    pub status_text: String,
    /// Whether the status is in the 200-299 range.
    pub ok: bool,
    pub headers: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_runtime::PipeTransport;
    use probe_runtime::connection::Connection;
    use tokio::io::duplex;

    fn test_connection() -> Arc<dyn ConnectionLike> {
        let (_their_stdin, our_stdin) = duplex(1024);
        let (stdout_read, _stdout_write) = duplex(1024);
        let (transport, message_rx) = PipeTransport::new(our_stdin, stdout_read);
        Arc::new(Connection::new(transport.into_transport_parts(message_rx)))
    }

    fn test_frame(parent: Arc<dyn ChannelOwner>, guid: &str) -> Arc<dyn ChannelOwner> {
        Arc::new(crate::Frame::new(
            parent,
            "Frame".to_string(),
            Arc::from(guid),
            serde_json::json!({ "url": "about:blank", "loadStates": [] }),
        ))
    }

    fn test_page(connection: &Arc<dyn ConnectionLike>) -> Page {
        Page::new(
            Arc::new(crate::Root::new(connection.clone())),
            "Page".to_string(),
            Arc::from("page@test"),
            serde_json::json!({ "mainFrame": { "guid": "frame@main" } }),
        )
        .unwrap()
    }

    #[test]
    fn wait_until_uses_protocol_names() {
        assert_eq!(WaitUntil::Load.as_str(), "load");
        assert_eq!(WaitUntil::DomContentLoaded.as_str(), "domcontentloaded");
        assert_eq!(WaitUntil::NetworkIdle.as_str(), "networkidle");
        assert_eq!(WaitUntil::Commit.as_str(), "commit");
    }

    #[tokio::test]
    async fn new_requires_a_main_frame_guid() {
        let connection = test_connection();
        let err = Page::new(
            Arc::new(crate::Root::new(connection.clone())),
            "Page".to_string(),
            Arc::from("page@test"),
            serde_json::json!({}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ProtocolError(_)));
    }

    #[tokio::test]
    async fn starts_on_about_blank() {
        let connection = test_connection();
        let page = test_page(&connection);
        assert_eq!(page.url(), "about:blank");
    }

    #[tokio::test]
    async fn frames_tracks_attach_and_detach_main_first() {
        let connection = test_connection();
        let root: Arc<dyn ChannelOwner> = Arc::new(crate::Root::new(connection.clone()));
        connection
            .register_object(Arc::from("frame@main"), test_frame(root.clone(), "frame@main"))
            .await;
        connection
            .register_object(Arc::from("frame@child"), test_frame(root.clone(), "frame@child"))
            .await;

        let page = test_page(&connection);
        page.on_event(
            "frameAttached",
            serde_json::json!({ "frame": { "guid": "frame@child" } }),
        );
        // Repeated attach events must not duplicate the frame.
        page.on_event(
            "frameAttached",
            serde_json::json!({ "frame": { "guid": "frame@child" } }),
        );

        let frames = page.frames().await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].guid(), "frame@main");
        assert_eq!(frames[1].guid(), "frame@child");

        page.on_event(
            "frameDetached",
            serde_json::json!({ "frame": { "guid": "frame@child" } }),
        );
        let frames = page.frames().await.unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].guid(), "frame@main");
    }
}
