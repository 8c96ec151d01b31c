//! Request/response correlation and object lifecycle on top of the
//! transport.
//!
//! Outbound calls get a sequential id and a oneshot callback; the dispatch
//! loop completes callbacks for responses (messages with an `id`) and
//! routes events (no `id`) to the owning object. The `__create__`,
//! `__dispose__`, and `__adopt__` events maintain the object tree.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::channel_owner::{ChannelOwner, DisposeReason, ParentOrConnection};
use crate::error::{Error, Result};
use crate::object_store::ObjectStore;
use crate::transport::TransportParts;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The connection surface protocol objects depend on. Object-safe so the
/// object tree never needs the concrete connection type.
pub trait ConnectionLike: Send + Sync {
    /// Send a method call and await the driver's result payload.
    fn send_message(&self, guid: &str, method: &str, params: Value)
    -> BoxFuture<'_, Result<Value>>;

    fn register_object(&self, guid: Arc<str>, object: Arc<dyn ChannelOwner>) -> BoxFuture<'_, ()>;

    fn unregister_object(&self, guid: &str);

    fn get_object(&self, guid: &str) -> BoxFuture<'_, Result<Arc<dyn ChannelOwner>>>;

    /// Like [`ConnectionLike::get_object`], but waits for an object whose
    /// `__create__` has not arrived yet.
    fn wait_for_object(
        &self,
        guid: &str,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Arc<dyn ChannelOwner>>>;
}

/// Builds concrete protocol objects for `__create__` messages. Implemented
/// by the crate that owns the typed object hierarchy.
pub trait ObjectFactory: Send + Sync {
    fn create_object(
        &self,
        parent: ParentOrConnection,
        type_name: String,
        guid: Arc<str>,
        initializer: Value,
    ) -> BoxFuture<'_, Result<Arc<dyn ChannelOwner>>>;
}

/// Serde helpers so GUID fields can live in `Arc<str>` without copies at
/// every lookup.
pub fn serialize_arc_str<S>(arc: &Arc<str>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(arc)
}

pub fn deserialize_arc_str<'de, D>(deserializer: D) -> std::result::Result<Arc<str>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    Ok(Arc::from(s.as_str()))
}

/// Metadata the driver expects on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Unix timestamp in milliseconds.
    #[serde(rename = "wallTime")]
    pub wall_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal: Option<bool>,
}

impl Metadata {
    pub fn now() -> Self {
        let wall_time = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self {
            wall_time,
            internal: Some(false),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u32,
    #[serde(
        serialize_with = "serialize_arc_str",
        deserialize_with = "deserialize_arc_str"
    )]
    pub guid: Arc<str>,
    pub method: String,
    pub params: Value,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorWrapper>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorWrapper {
    pub error: ErrorPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    /// Error class name, e.g. "TimeoutError" or "TargetClosedError".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Responses carry an `id`; events do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Response(Response),
    Event(Event),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(
        serialize_with = "serialize_arc_str",
        deserialize_with = "deserialize_arc_str"
    )]
    pub guid: Arc<str>,
    pub method: String,
    pub params: Value,
}

/// The driver connection: id generation, callback correlation, the object
/// registry, and the dispatch loop.
pub struct Connection {
    last_id: AtomicU32,
    callbacks: dashmap::DashMap<u32, oneshot::Sender<Result<Value>>>,
    writer: TokioMutex<Box<dyn AsyncWrite + Unpin + Send>>,
    message_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>,
    reader_task: TokioMutex<Option<tokio::task::JoinHandle<Result<()>>>>,
    objects: ObjectStore,
    factory: RwLock<Option<Arc<dyn ObjectFactory>>>,
}

impl Connection {
    pub fn new(parts: TransportParts) -> Self {
        Self {
            last_id: AtomicU32::new(0),
            callbacks: dashmap::DashMap::new(),
            writer: TokioMutex::new(parts.writer),
            message_rx: TokioMutex::new(Some(parts.message_rx)),
            reader_task: TokioMutex::new(Some(parts.reader_task)),
            objects: ObjectStore::new(),
            factory: RwLock::new(None),
        }
    }

    /// Installs the object factory. Must happen before the first
    /// `__create__` arrives, i.e. before the handshake.
    pub async fn set_factory(&self, factory: Arc<dyn ObjectFactory>) {
        *self.factory.write() = Some(factory);
    }

    pub async fn send_message(&self, guid: &str, method: &str, params: Value) -> Result<Value> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst);
        debug!(target = "probe.runtime", id, guid, method, "sending request");

        let (tx, rx) = oneshot::channel();
        self.callbacks.insert(id, tx);

        let request = Request {
            id,
            guid: Arc::from(guid),
            method: method.to_string(),
            params,
            metadata: Metadata::now(),
        };
        let request = serde_json::to_value(&request)?;

        if let Err(e) =
            crate::transport::send_message(&mut *self.writer.lock().await, &request).await
        {
            self.callbacks.remove(&id);
            return Err(e);
        }

        rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Runs the dispatch loop until the transport closes. Spawn this once.
    pub async fn run(self: &Arc<Self>) {
        let mut message_rx = self
            .message_rx
            .lock()
            .await
            .take()
            .expect("run() can only be called once");

        while let Some(message_value) = message_rx.recv().await {
            match serde_json::from_value::<Message>(message_value) {
                Ok(message) => {
                    if let Err(e) = self.dispatch(message).await {
                        error!(target = "probe.runtime", error = %e, "dispatch failed");
                    }
                }
                Err(e) => {
                    error!(target = "probe.runtime", error = %e, "unparseable message");
                }
            }
        }

        debug!(target = "probe.runtime", "dispatch loop ended, transport closed");
        if let Some(reader_task) = self.reader_task.lock().await.take() {
            let _ = reader_task.await;
        }
    }

    pub(crate) async fn dispatch(self: &Arc<Self>, message: Message) -> Result<()> {
        match message {
            Message::Response(response) => {
                let (_, callback) = self.callbacks.remove(&response.id).ok_or_else(|| {
                    Error::ProtocolError(format!(
                        "response for unknown request id {}",
                        response.id
                    ))
                })?;

                let result = match response.error {
                    Some(wrapper) => Err(parse_protocol_error(wrapper.error)),
                    None => Ok(response.result.unwrap_or(Value::Null)),
                };
                // Receiver may have given up; that is fine.
                let _ = callback.send(result);
                Ok(())
            }
            Message::Event(event) => match event.method.as_str() {
                "__create__" => self.handle_create(&event).await,
                "__dispose__" => self.handle_dispose(&event),
                "__adopt__" => self.handle_adopt(&event),
                _ => {
                    match self.objects.try_get(&event.guid) {
                        Some(object) => object.on_event(&event.method, event.params),
                        None => debug!(
                            target = "probe.runtime",
                            guid = %event.guid,
                            method = %event.method,
                            "event for unknown object"
                        ),
                    }
                    Ok(())
                }
            },
        }
    }

    /// `__create__`: build the object through the factory and register it
    /// with the connection and its parent. Parents always precede children
    /// on the wire.
    async fn handle_create(self: &Arc<Self>, event: &Event) -> Result<()> {
        let type_name = event.params["type"]
            .as_str()
            .ok_or_else(|| Error::ProtocolError("__create__ missing 'type'".to_string()))?
            .to_string();
        let object_guid: Arc<str> = Arc::from(
            event.params["guid"]
                .as_str()
                .ok_or_else(|| Error::ProtocolError("__create__ missing 'guid'".to_string()))?,
        );
        let initializer = event.params["initializer"].clone();

        let parent_obj = self.objects.try_get(&event.guid).ok_or_else(|| {
            Error::ProtocolError(format!("parent object not found: {}", event.guid))
        })?;

        // The Playwright root hangs off the registration-only Root object,
        // so it is parented to the connection directly.
        let parent_or_conn = if type_name == "Playwright" && event.guid.is_empty() {
            ParentOrConnection::Connection(Arc::clone(self) as Arc<dyn ConnectionLike>)
        } else {
            ParentOrConnection::Parent(parent_obj.clone())
        };

        let factory = self
            .factory
            .read()
            .clone()
            .ok_or_else(|| Error::ProtocolError("no object factory installed".to_string()))?;
        let object = factory
            .create_object(parent_or_conn, type_name.clone(), object_guid.clone(), initializer)
            .await?;

        self.objects.insert(object_guid.clone(), object.clone());
        parent_obj.add_child(object_guid.clone(), object);

        debug!(target = "probe.runtime", type_name, guid = %object_guid, "created object");
        Ok(())
    }

    fn handle_dispose(&self, event: &Event) -> Result<()> {
        let reason = match event.params.get("reason").and_then(|r| r.as_str()) {
            Some("gc") => DisposeReason::GarbageCollected,
            _ => DisposeReason::Closed,
        };

        match self.objects.try_get(&event.guid) {
            Some(obj) => {
                obj.dispose(reason);
                debug!(target = "probe.runtime", guid = %event.guid, "disposed object");
            }
            None => warn!(
                target = "probe.runtime",
                guid = %event.guid,
                "dispose for unknown object"
            ),
        }
        Ok(())
    }

    fn handle_adopt(&self, event: &Event) -> Result<()> {
        let child_guid = event.params["guid"]
            .as_str()
            .ok_or_else(|| Error::ProtocolError("__adopt__ missing 'guid'".to_string()))?;

        let new_parent = self.objects.try_get(&event.guid).ok_or_else(|| {
            Error::ProtocolError(format!("parent object not found: {}", event.guid))
        })?;
        let child = self
            .objects
            .try_get(child_guid)
            .ok_or_else(|| Error::ProtocolError(format!("child object not found: {child_guid}")))?;

        new_parent.adopt(child);
        Ok(())
    }
}

impl ConnectionLike for Connection {
    fn send_message(
        &self,
        guid: &str,
        method: &str,
        params: Value,
    ) -> BoxFuture<'_, Result<Value>> {
        let guid = guid.to_string();
        let method = method.to_string();
        Box::pin(async move { Connection::send_message(self, &guid, &method, params).await })
    }

    fn register_object(&self, guid: Arc<str>, object: Arc<dyn ChannelOwner>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.objects.insert(guid, object);
        })
    }

    fn unregister_object(&self, guid: &str) {
        self.objects.remove(guid);
    }

    fn get_object(&self, guid: &str) -> BoxFuture<'_, Result<Arc<dyn ChannelOwner>>> {
        let guid = guid.to_string();
        Box::pin(async move {
            self.objects.try_get(&guid).ok_or_else(|| {
                let target_type = match () {
                    _ if guid.starts_with("page@") => "Page",
                    _ if guid.starts_with("frame@") => "Frame",
                    _ if guid.starts_with("browser-context@") => "BrowserContext",
                    _ if guid.starts_with("browser@") => "Browser",
                    _ => return Error::ProtocolError(format!("object not found: {guid}")),
                };
                Error::TargetClosed {
                    target_type: target_type.to_string(),
                    context: format!("object not found: {guid}"),
                }
            })
        })
    }

    fn wait_for_object(
        &self,
        guid: &str,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Arc<dyn ChannelOwner>>> {
        let guid = guid.to_string();
        Box::pin(async move { self.objects.wait_for(&guid, timeout).await })
    }
}

fn parse_protocol_error(error: ErrorPayload) -> Error {
    match error.name.as_deref() {
        Some("TimeoutError") => Error::Timeout(error.message),
        Some("TargetClosedError") => Error::TargetClosed {
            target_type: "target".to_string(),
            context: error.message,
        },
        _ => Error::ProtocolError(error.message),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::PipeTransport;
    use tokio::io::{AsyncReadExt, duplex};

    pub(crate) fn noop_connection() -> Arc<dyn ConnectionLike> {
        let (_their_stdin, our_stdin) = duplex(1024);
        let (stdout_read, _stdout_write) = duplex(1024);
        let (transport, message_rx) = PipeTransport::new(our_stdin, stdout_read);
        Arc::new(Connection::new(transport.into_transport_parts(message_rx)))
    }

    fn test_connection() -> (Arc<Connection>, tokio::io::DuplexStream) {
        let (their_stdin, our_stdin) = duplex(4096);
        let (stdout_read, _stdout_write) = duplex(4096);
        let (transport, message_rx) = PipeTransport::new(our_stdin, stdout_read);
        let connection = Arc::new(Connection::new(transport.into_transport_parts(message_rx)));
        (connection, their_stdin)
    }

    #[tokio::test]
    async fn request_ids_are_sequential() {
        let (connection, _stdin) = test_connection();
        assert_eq!(connection.last_id.fetch_add(1, Ordering::SeqCst), 0);
        assert_eq!(connection.last_id.fetch_add(1, Ordering::SeqCst), 1);
        assert_eq!(connection.last_id.fetch_add(1, Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn request_carries_guid_method_and_metadata() {
        let (connection, mut their_stdin) = test_connection();

        let conn = connection.clone();
        let send = tokio::spawn(async move {
            conn.send_message(
                "page@abc123",
                "goto",
                serde_json::json!({"url": "http://localhost:3000/login"}),
            )
            .await
        });

        let mut len_buf = [0u8; 4];
        their_stdin.read_exact(&mut len_buf).await.unwrap();
        let mut frame = vec![0u8; u32::from_le_bytes(len_buf) as usize];
        their_stdin.read_exact(&mut frame).await.unwrap();
        let request: Value = serde_json::from_slice(&frame).unwrap();

        assert_eq!(request["id"], 0);
        assert_eq!(request["guid"], "page@abc123");
        assert_eq!(request["method"], "goto");
        assert_eq!(request["params"]["url"], "http://localhost:3000/login");
        assert!(request["metadata"]["wallTime"].as_i64().unwrap() > 0);

        connection
            .dispatch(Message::Response(Response {
                id: 0,
                result: Some(serde_json::json!({"ok": true})),
                error: None,
            }))
            .await
            .unwrap();

        let result = send.await.unwrap().unwrap();
        assert_eq!(result["ok"], true);
    }

    #[tokio::test]
    async fn response_error_maps_to_typed_error() {
        let (connection, _stdin) = test_connection();

        let id = connection.last_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        connection.callbacks.insert(id, tx);

        connection
            .dispatch(Message::Response(Response {
                id,
                result: None,
                error: Some(ErrorWrapper {
                    error: ErrorPayload {
                        message: "Navigation timeout".to_string(),
                        name: Some("TimeoutError".to_string()),
                        stack: None,
                    },
                }),
            }))
            .await
            .unwrap();

        match rx.await.unwrap().unwrap_err() {
            Error::Timeout(msg) => assert_eq!(msg, "Navigation timeout"),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn response_for_unknown_id_is_an_error() {
        let (connection, _stdin) = test_connection();
        let result = connection
            .dispatch(Message::Response(Response {
                id: 999,
                result: Some(Value::Null),
                error: None,
            }))
            .await;
        assert!(matches!(result, Err(Error::ProtocolError(_))));
    }

    #[tokio::test]
    async fn out_of_order_responses_reach_their_callers() {
        let (connection, _stdin) = test_connection();

        let mut receivers = Vec::new();
        for id in 0..3u32 {
            connection.last_id.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = oneshot::channel();
            connection.callbacks.insert(id, tx);
            receivers.push(rx);
        }

        for id in [1u32, 0, 2] {
            connection
                .dispatch(Message::Response(Response {
                    id,
                    result: Some(serde_json::json!({"n": id})),
                    error: None,
                }))
                .await
                .unwrap();
        }

        for (id, rx) in receivers.into_iter().enumerate() {
            let result = rx.await.unwrap().unwrap();
            assert_eq!(result["n"], id as u32);
        }
    }

    #[test]
    fn messages_with_id_are_responses_without_are_events() {
        let message: Message = serde_json::from_str(r#"{"id": 42, "result": {"ok": 1}}"#).unwrap();
        assert!(matches!(message, Message::Response(r) if r.id == 42));

        let message: Message =
            serde_json::from_str(r#"{"guid": "page@abc", "method": "close", "params": {}}"#)
                .unwrap();
        match message {
            Message::Event(event) => {
                assert_eq!(event.guid.as_ref(), "page@abc");
                assert_eq!(event.method, "close");
            }
            _ => panic!("expected Event"),
        }
    }

    #[test]
    fn protocol_error_names_map_to_error_variants() {
        let error = parse_protocol_error(ErrorPayload {
            message: "timeout".to_string(),
            name: Some("TimeoutError".to_string()),
            stack: None,
        });
        assert!(matches!(error, Error::Timeout(_)));

        let error = parse_protocol_error(ErrorPayload {
            message: "closed".to_string(),
            name: Some("TargetClosedError".to_string()),
            stack: None,
        });
        assert!(matches!(error, Error::TargetClosed { .. }));

        let error = parse_protocol_error(ErrorPayload {
            message: "generic".to_string(),
            name: None,
            stack: None,
        });
        assert!(matches!(error, Error::ProtocolError(_)));
    }
}
