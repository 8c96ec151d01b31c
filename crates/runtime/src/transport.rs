//! Stdio transport to the Playwright driver.
//!
//! Frames are a 4-byte little-endian length prefix followed by a JSON
//! payload, matching the driver's wire format. Reads run on a background
//! task that feeds an unbounded mpsc channel; writes go through the
//! writer half the connection holds.

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Write one length-prefixed JSON frame.
pub async fn send_message<W>(writer: &mut W, message: &Value) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json_bytes = serde_json::to_vec(message)
        .map_err(|e| Error::TransportError(format!("failed to serialize frame: {e}")))?;

    let length = json_bytes.len() as u32;
    writer
        .write_all(&length.to_le_bytes())
        .await
        .map_err(|e| Error::TransportError(format!("failed to write length prefix: {e}")))?;
    writer
        .write_all(&json_bytes)
        .await
        .map_err(|e| Error::TransportError(format!("failed to write frame: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::TransportError(format!("failed to flush frame: {e}")))?;

    Ok(())
}

/// Paired stdio halves, before the read loop is spawned.
pub struct PipeTransport<W, R> {
    stdin: W,
    stdout: R,
    message_tx: mpsc::UnboundedSender<Value>,
}

/// Read half of the transport. Owns stdout and the inbound channel sender,
/// so the connection can hold stdin independently for writes.
pub struct PipeTransportReceiver<R> {
    stdout: R,
    message_tx: mpsc::UnboundedSender<Value>,
}

/// Everything the connection needs: the write half, the spawned read loop,
/// and the inbound message stream.
pub struct TransportParts {
    pub writer: Box<dyn AsyncWrite + Unpin + Send>,
    pub reader_task: JoinHandle<Result<()>>,
    pub message_rx: mpsc::UnboundedReceiver<Value>,
}

impl<W, R> PipeTransport<W, R>
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Wrap driver stdio handles. Returns the transport plus the receiver
    /// end of the inbound message channel.
    pub fn new(stdin: W, stdout: R) -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        (
            Self {
                stdin,
                stdout,
                message_tx,
            },
            message_rx,
        )
    }

    /// Split into the write half and the read half.
    pub fn into_parts(self) -> (W, PipeTransportReceiver<R>) {
        (
            self.stdin,
            PipeTransportReceiver {
                stdout: self.stdout,
                message_tx: self.message_tx,
            },
        )
    }

    /// Split, spawn the read loop, and bundle everything the connection
    /// needs. Must be called inside a tokio runtime.
    pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
        let (writer, receiver) = self.into_parts();
        let reader_task = tokio::spawn(receiver.run());
        TransportParts {
            writer: Box::new(writer),
            reader_task,
            message_rx,
        }
    }
}

impl<R> PipeTransportReceiver<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Read frames until EOF, a read error, or the channel consumer goes
    /// away.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let mut len_buf = [0u8; 4];
            self.stdout
                .read_exact(&mut len_buf)
                .await
                .map_err(|e| Error::TransportError(format!("failed to read length prefix: {e}")))?;

            let length = u32::from_le_bytes(len_buf) as usize;
            let mut frame = vec![0u8; length];
            self.stdout
                .read_exact(&mut frame)
                .await
                .map_err(|e| Error::TransportError(format!("failed to read frame: {e}")))?;

            let message: Value = serde_json::from_slice(&frame)
                .map_err(|e| Error::ProtocolError(format!("failed to parse frame: {e}")))?;

            if self.message_tx.send(message).is_err() {
                // Consumer is gone, normal shutdown.
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_is_little_endian() {
        let length: u32 = 1234;
        let bytes = length.to_le_bytes();

        assert_eq!(bytes[0], (length & 0xFF) as u8);
        assert_eq!(bytes[1], ((length >> 8) & 0xFF) as u8);
        assert_eq!(bytes[2], ((length >> 16) & 0xFF) as u8);
        assert_eq!(bytes[3], ((length >> 24) & 0xFF) as u8);
        assert_eq!(u32::from_le_bytes(bytes), length);
    }

    #[tokio::test]
    async fn send_message_writes_prefixed_frame() {
        let (mut our_end, their_end) = tokio::io::duplex(1024);
        let (mut writer, _receiver) = {
            let (transport, _rx) = PipeTransport::new(their_end, tokio::io::empty());
            transport.into_parts()
        };

        let message = serde_json::json!({
            "id": 1,
            "method": "test",
            "params": {"foo": "bar"}
        });
        send_message(&mut writer, &message).await.unwrap();

        let mut len_buf = [0u8; 4];
        our_end.read_exact(&mut len_buf).await.unwrap();
        let length = u32::from_le_bytes(len_buf) as usize;

        let mut frame = vec![0u8; length];
        our_end.read_exact(&mut frame).await.unwrap();

        let received: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn receiver_delivers_messages_in_order() {
        let (stdout_read, mut stdout_write) = tokio::io::duplex(4096);
        let (transport, mut rx) = PipeTransport::new(tokio::io::sink(), stdout_read);
        let (_writer, receiver) = transport.into_parts();
        let read_task = tokio::spawn(receiver.run());

        let messages = vec![
            serde_json::json!({"id": 1, "method": "first"}),
            serde_json::json!({"id": 2, "method": "second"}),
            serde_json::json!({"id": 3, "method": "third"}),
        ];
        for msg in &messages {
            let json_bytes = serde_json::to_vec(msg).unwrap();
            let length = json_bytes.len() as u32;
            stdout_write.write_all(&length.to_le_bytes()).await.unwrap();
            stdout_write.write_all(&json_bytes).await.unwrap();
        }
        stdout_write.flush().await.unwrap();

        for expected in &messages {
            let received = rx.recv().await.unwrap();
            assert_eq!(&received, expected);
        }

        drop(stdout_write);
        drop(rx);
        let _ = read_task.await;
    }

    #[tokio::test]
    async fn receiver_handles_large_frames() {
        let (stdout_read, mut stdout_write) = tokio::io::duplex(1024 * 1024);
        let (transport, mut rx) = PipeTransport::new(tokio::io::sink(), stdout_read);
        let (_writer, receiver) = transport.into_parts();
        let read_task = tokio::spawn(receiver.run());

        let message = serde_json::json!({"id": 1, "data": "x".repeat(100_000)});
        let json_bytes = serde_json::to_vec(&message).unwrap();
        assert!(json_bytes.len() > 32_768);

        let length = json_bytes.len() as u32;
        stdout_write.write_all(&length.to_le_bytes()).await.unwrap();
        stdout_write.write_all(&json_bytes).await.unwrap();
        stdout_write.flush().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), message);

        drop(stdout_write);
        drop(rx);
        let _ = read_task.await;
    }

    #[tokio::test]
    async fn truncated_length_prefix_is_an_error() {
        let (stdout_read, mut stdout_write) = tokio::io::duplex(1024);
        let (transport, _rx) = PipeTransport::new(tokio::io::sink(), stdout_read);
        let (_writer, receiver) = transport.into_parts();

        stdout_write.write_all(&[0x01, 0x02]).await.unwrap();
        stdout_write.flush().await.unwrap();
        drop(stdout_write);

        let result = receiver.run().await;
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("failed to read length prefix")
        );
    }

    #[tokio::test]
    async fn closed_pipe_is_an_error() {
        let (stdout_read, stdout_write) = tokio::io::duplex(1024);
        let (transport, _rx) = PipeTransport::new(tokio::io::sink(), stdout_read);
        let (_writer, receiver) = transport.into_parts();

        drop(stdout_write);

        assert!(receiver.run().await.is_err());
    }

    #[tokio::test]
    async fn dropped_consumer_stops_the_loop() {
        let (stdout_read, mut stdout_write) = tokio::io::duplex(1024);
        let (transport, mut rx) = PipeTransport::new(tokio::io::sink(), stdout_read);
        let (_writer, receiver) = transport.into_parts();
        let read_task = tokio::spawn(receiver.run());

        let message = serde_json::json!({"id": 1, "method": "test"});
        let json_bytes = serde_json::to_vec(&message).unwrap();
        let length = json_bytes.len() as u32;
        stdout_write.write_all(&length.to_le_bytes()).await.unwrap();
        stdout_write.write_all(&json_bytes).await.unwrap();
        stdout_write.flush().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), message);
        drop(rx);
        drop(stdout_write);

        let result = read_task.await.unwrap();
        assert!(result.is_ok() || result.unwrap_err().to_string().contains("failed to read"));
    }
}
