//! Protocol handshake.

use std::sync::Arc;
use std::time::Duration;

use probe_runtime::channel_owner::{ChannelOwner, ParentOrConnection};
use probe_runtime::connection::{Connection, ConnectionLike, ObjectFactory};
use probe_runtime::{Error, Result};
use serde_json::Value;

use crate::{Playwright, Root};

/// Performs the handshake with the driver and returns the Playwright
/// object.
///
/// Steps: install the object factory, register a temporary [`Root`] under
/// the empty GUID, send `initialize` (the driver answers after creating
/// the browser-type objects), look up the Playwright object the response
/// names, and unregister the root.
///
/// # Errors
///
/// Fails on a protocol error, a malformed response, or when the driver
/// does not answer within 30 seconds.
pub async fn initialize_playwright(connection: &Arc<Connection>) -> Result<Arc<dyn ChannelOwner>> {
    connection.set_factory(Arc::new(DefaultObjectFactory)).await;

    let root =
        Arc::new(Root::new(Arc::clone(connection) as Arc<dyn ConnectionLike>)) as Arc<dyn ChannelOwner>;
    connection.register_object(Arc::from(""), root.clone()).await;

    tracing::debug!(target = "probe", "root registered, sending initialize");

    let root_typed = root
        .downcast_ref::<Root>()
        .expect("root object should be Root type");

    let response = tokio::time::timeout(Duration::from_secs(30), root_typed.initialize())
        .await
        .map_err(|_| Error::Timeout("driver initialization timed out after 30s".to_string()))??;

    let playwright_guid = response["playwright"]["guid"].as_str().ok_or_else(|| {
        Error::ProtocolError("initialize response missing 'playwright.guid'".to_string())
    })?;

    let playwright_obj = connection.get_object(playwright_guid).await?;
    playwright_obj.downcast_ref::<Playwright>().ok_or_else(|| {
        Error::ProtocolError(format!(
            "object with GUID '{playwright_guid}' is not a Playwright instance"
        ))
    })?;

    // The root only matters during the handshake.
    connection.unregister_object("");

    Ok(playwright_obj)
}

struct DefaultObjectFactory;

impl ObjectFactory for DefaultObjectFactory {
    fn create_object(
        &self,
        parent: ParentOrConnection,
        type_name: String,
        guid: Arc<str>,
        initializer: Value,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Arc<dyn ChannelOwner>>> + Send + '_>,
    > {
        Box::pin(async move {
            crate::object_factory::create_object(parent, type_name, guid, initializer).await
        })
    }
}
