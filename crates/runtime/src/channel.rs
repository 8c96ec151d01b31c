//! Typed RPC proxy bound to one object GUID.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::connection::ConnectionLike;
use crate::error::Result;

/// Sends methods on behalf of a protocol object and deserializes the
/// driver's reply.
#[derive(Clone)]
pub struct Channel {
    guid: Arc<str>,
    connection: Arc<dyn ConnectionLike>,
}

impl Channel {
    pub fn new(guid: Arc<str>, connection: Arc<dyn ConnectionLike>) -> Self {
        Self { guid, connection }
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// Sends `method` with `params` and deserializes the result payload.
    pub async fn send<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let result = self.connection.send_message(&self.guid, method, params).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Sends `method` and discards whatever the driver returns.
    pub async fn send_no_result<P>(&self, method: &str, params: P) -> Result<()>
    where
        P: Serialize,
    {
        let params = serde_json::to_value(params)?;
        self.connection.send_message(&self.guid, method, params).await?;
        Ok(())
    }
}
