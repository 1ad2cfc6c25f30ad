use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use dispatch_codec::Codec;
use dispatch_manager::{PollOutcome, TaskManager};
use dispatch_shared::{ClientHandle, DispatchError, EventResult, Protocol, ResponseSink, TaskMessage, TaskStatus};

use crate::framing::{read_frame, write_frame};

const POLL_EVENT: &str = "POLL";

struct TcpResponseSink {
    codec: Codec,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl std::fmt::Debug for TcpResponseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpResponseSink").finish()
    }
}

impl ResponseSink for TcpResponseSink {
    fn deliver(&self, result: &EventResult) -> Result<(), DispatchError> {
        let frame = self.codec.encode_value(result)?;
        self.tx
            .send(frame)
            .map_err(|_| DispatchError::RoutingFailed("tcp connection closed".into()))
    }
}

/// Drives one accepted connection until the peer disconnects or sends an
/// unframeable / unverifiable frame, in which case the connection is
/// closed outright (no registry entry is created for a rejected frame).
pub async fn handle_connection<S>(stream: S, manager: Arc<TaskManager>, codec: Codec)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut read_half, write_half) = tokio::io::split(stream);
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let mut write_half = write_half;
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write_frame(&mut write_half, &frame).await.is_err() {
                break;
            }
        }
    });

    loop {
        let frame = match read_frame(&mut read_half).await {
            Ok(frame) => frame,
            Err(_) => break,
        };

        let value = match codec.decode(&frame) {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, "rejecting unverifiable frame, closing connection");
                break;
            }
        };

        let event_name = value.get("event").and_then(|v| v.as_str()).unwrap_or_default();

        if event_name == POLL_EVENT {
            handle_poll(&value, &manager, &codec, &tx);
            continue;
        }

        let message: TaskMessage = match serde_json::from_value(value) {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, "malformed task message, closing connection");
                break;
            }
        };

        let sink = ClientHandle::new(Arc::new(TcpResponseSink {
            codec: codec.clone(),
            tx: tx.clone(),
        }));

        let correlation_id = message.correlation_id.clone().unwrap_or_default();
        if let Err(err) = manager.handle_task(message, Protocol::Tcp, sink) {
            let result = EventResult::error(correlation_id, err.code(), err.to_string());
            if let Ok(frame) = codec.encode_value(&result) {
                let _ = tx.send(frame);
            }
        }
    }

    drop(tx);
    if writer_task.await.is_err() {
        warn!("tcp writer task panicked");
    }
}

fn handle_poll(
    value: &serde_json::Value,
    manager: &TaskManager,
    codec: &Codec,
    tx: &mpsc::UnboundedSender<Vec<u8>>,
) {
    let Some(task_id) = value
        .get("args")
        .and_then(|args| args.get("task_id"))
        .and_then(|v| v.as_str())
    else {
        return;
    };

    let response = match manager.poll(task_id) {
        PollOutcome::Result(result) => codec.encode_value(&result),
        PollOutcome::Status(status) => codec.encode_value(&json!({
            "status": status_word(status),
            "correlation_id": task_id,
        })),
    };

    if let Ok(frame) = response {
        let _ = tx.send(frame);
    }
}

fn status_word(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "PENDING",
        TaskStatus::NotFound => "NOT_FOUND",
    }
}
