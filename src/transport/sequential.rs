//! One request at a time: read, dispatch, write, repeat.

use super::{encode, parse_line, Incoming, McpServer};
use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn serve_sequential<R, W>(
    server: &McpServer,
    reader: R,
    mut writer: W,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    info!("Serving requests sequentially");

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, stopping sequential transport");
                break;
            }
            line = lines.next_line() => line.context("failed to read request")?,
        };
        let Some(line) = line else {
            info!("Input closed");
            break;
        };

        let response = match parse_line(&line) {
            Incoming::Request { id, method, params } => {
                Some(server.respond(id, &method, params).await)
            }
            Incoming::Notification { method, .. } => {
                server.handle_notification(&method);
                None
            }
            Incoming::Invalid(response) => Some(response),
            Incoming::Ignored => None,
        };

        if let Some(response) = response {
            writer
                .write_all(encode(&response).as_bytes())
                .await
                .context("failed to write response")?;
            writer.flush().await.context("failed to flush response")?;
        }
    }

    Ok(())
}
