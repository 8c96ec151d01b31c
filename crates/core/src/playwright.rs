//! Root protocol object: owns the driver process and exposes the browser
//! types.

use std::sync::Arc;

use parking_lot::Mutex;
use probe_runtime::channel::Channel;
use probe_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection};
use probe_runtime::connection::{Connection, ConnectionLike};
use probe_runtime::{DriverProcess, Error, PipeTransport, Result};
use serde_json::Value;

use crate::BrowserType;

/// Entry point for the protocol. Launch with [`Playwright::launch`], pick
/// a browser type, and shut the driver down with [`Playwright::shutdown`]
/// when finished.
pub struct Playwright {
    base: ChannelOwnerImpl,
    chromium: Arc<dyn ChannelOwner>,
    firefox: Arc<dyn ChannelOwner>,
    webkit: Arc<dyn ChannelOwner>,
    /// Driver process, present only on the handle returned by `launch`.
    /// Option so shutdown can take ownership; Mutex for shared clones.
    server: Arc<Mutex<Option<DriverProcess>>>,
    owns_server: bool,
}

impl Playwright {
    /// Spawns the driver, wires up the connection, and performs the
    /// handshake.
    pub async fn launch() -> Result<Self> {
        tracing::debug!(target = "probe", "launching Playwright driver");
        let mut server = DriverProcess::launch().await?;
        let (stdin, stdout) = server.take_pipes()?;

        let (transport, message_rx) = PipeTransport::new(stdin, stdout);
        let parts = transport.into_transport_parts(message_rx);
        let connection: Arc<Connection> = Arc::new(Connection::new(parts));

        let conn_for_loop = Arc::clone(&connection);
        tokio::spawn(async move {
            conn_for_loop.run().await;
        });

        let playwright_obj = crate::initialize_playwright(&connection).await?;
        let playwright = playwright_obj.downcast_ref::<Playwright>().ok_or_else(|| {
            Error::ProtocolError("initialized object is not Playwright".to_string())
        })?;

        Ok(Self {
            base: playwright.base.clone(),
            chromium: Arc::clone(&playwright.chromium),
            firefox: Arc::clone(&playwright.firefox),
            webkit: Arc::clone(&playwright.webkit),
            server: Arc::new(Mutex::new(Some(server))),
            owns_server: true,
        })
    }

    /// Called by the object factory for the `__create__` of the Playwright
    /// object. The initializer carries GUID references to the three
    /// browser-type objects, which were created first.
    pub async fn new(
        connection: Arc<dyn ConnectionLike>,
        type_name: String,
        guid: Arc<str>,
        initializer: Value,
    ) -> Result<Self> {
        let base = ChannelOwnerImpl::new(
            ParentOrConnection::Connection(connection.clone()),
            type_name,
            guid,
            initializer.clone(),
        );

        let browser_type = |name: &str| -> Result<&str> {
            initializer[name]["guid"].as_str().ok_or_else(|| {
                Error::ProtocolError(format!("Playwright initializer missing '{name}.guid'"))
            })
        };

        let chromium = connection.get_object(browser_type("chromium")?).await?;
        let firefox = connection.get_object(browser_type("firefox")?).await?;
        let webkit = connection.get_object(browser_type("webkit")?).await?;

        Ok(Self {
            base,
            chromium,
            firefox,
            webkit,
            server: Arc::new(Mutex::new(None)),
            owns_server: false,
        })
    }

    pub fn chromium(&self) -> &BrowserType {
        self.chromium
            .downcast_ref::<BrowserType>()
            .expect("chromium should be BrowserType")
    }

    pub fn firefox(&self) -> &BrowserType {
        self.firefox
            .downcast_ref::<BrowserType>()
            .expect("firefox should be BrowserType")
    }

    pub fn webkit(&self) -> &BrowserType {
        self.webkit
            .downcast_ref::<BrowserType>()
            .expect("webkit should be BrowserType")
    }

    /// Terminates the driver process. Safe to call once; later calls are
    /// no-ops.
    pub async fn shutdown(&self) -> Result<()> {
        let server = self.server.lock().take();
        if let Some(mut server) = server {
            tracing::debug!(target = "probe", "shutting down Playwright driver");
            server.shutdown().await?;
        }
        Ok(())
    }
}

impl ChannelOwner for Playwright {
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

impl Drop for Playwright {
    /// Ensures the driver process does not outlive the handle when
    /// [`Playwright::shutdown`] was never called.
    fn drop(&mut self) {
        if !self.owns_server {
            return;
        }
        if let Some(mut server) = self.server.lock().take() {
            tracing::debug!(target = "probe", "drop: force-killing Playwright driver");
            server.force_kill();
        }
    }
}

impl std::fmt::Debug for Playwright {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playwright")
            .field("guid", &self.guid())
            .finish()
    }
}
