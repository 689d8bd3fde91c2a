//! Overlapping requests, correlated by id.
//!
//! Each request runs as its own task. Responses go through a single writer
//! task so lines never interleave, and arrive in completion order.
//! `notifications/cancelled` aborts the named request; an aborted task
//! drops its store permits and writes nothing.

use super::{encode, error_response, parse_line, request_key, Incoming, McpServer, RpcError};
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{AbortHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long in-flight requests may run after input ends or shutdown starts.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

type InFlight = Arc<Mutex<HashMap<String, AbortHandle>>>;

pub async fn serve_concurrent<R, W>(
    server: McpServer,
    reader: R,
    writer: W,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<String>(256);
    let writer_task = tokio::spawn(write_loop(writer, rx));

    let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));
    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut lines = reader.lines();
    info!("Serving requests concurrently");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, no longer accepting requests");
                break;
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    if !e.is_cancelled() {
                        error!("Request task failed: {}", e);
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read request")? else {
                    info!("Input closed");
                    break;
                };
                match parse_line(&line) {
                    Incoming::Request { id, method, params } => {
                        let key = request_key(&id);
                        // Hold the lock across spawn so the task cannot finish
                        // and deregister before its handle is stored.
                        let mut registered = in_flight.lock().await;
                        if registered.contains_key(&key) {
                            warn!("Duplicate in-flight request id {}", key);
                            let response = error_response(
                                id,
                                RpcError::invalid_request("request id is already in flight"),
                            );
                            send(&tx, &response).await;
                            continue;
                        }
                        let task_server = server.clone();
                        let task_tx = tx.clone();
                        let task_in_flight = in_flight.clone();
                        let task_key = key.clone();
                        let handle = tasks.spawn(async move {
                            let response = task_server.respond(id, &method, params).await;
                            task_in_flight.lock().await.remove(&task_key);
                            send(&task_tx, &response).await;
                        });
                        registered.insert(key, handle);
                    }
                    Incoming::Notification { method, params } => {
                        if method == "notifications/cancelled" {
                            cancel(&in_flight, &params).await;
                        }
                        server.handle_notification(&method);
                    }
                    Incoming::Invalid(response) => send(&tx, &response).await,
                    Incoming::Ignored => {}
                }
            }
        }
    }

    drain(&mut tasks).await;
    drop(tx);
    match writer_task.await {
        Ok(result) => result,
        Err(e) => Err(e).context("response writer task failed"),
    }
}

async fn send(tx: &mpsc::Sender<String>, response: &Value) {
    if tx.send(encode(response)).await.is_err() {
        warn!("Response writer closed; dropping response");
    }
}

async fn cancel(in_flight: &InFlight, params: &Value) {
    let Some(request_id) = params.get("requestId") else {
        return;
    };
    let key = request_key(request_id);
    match in_flight.lock().await.remove(&key) {
        Some(handle) => {
            handle.abort();
            info!("Cancelled request {}", key);
        }
        None => info!("Cancel for request {} that is not in flight", key),
    }
}

async fn drain(tasks: &mut JoinSet<()>) {
    if tasks.is_empty() {
        return;
    }
    info!("Draining {} in-flight requests", tasks.len());
    let finished = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if finished.is_err() {
        warn!("Drain timed out; aborting {} requests", tasks.len());
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<String>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        writer
            .write_all(line.as_bytes())
            .await
            .context("failed to write response")?;
        writer.flush().await.context("failed to flush response")?;
    }
    Ok(())
}
