//! The command socket: one JSON request per connection, terminated by a
//! form feed, answered with plain text before the socket is closed.

use std::path::Path;

use anyhow::{anyhow, bail, Context};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;

use tether_mux::CommandRequest;

use crate::driver::{Event, EventSender};

/// Ends a request on the command socket.
pub const REQUEST_TERMINATOR: u8 = 0x0c;

/// Bind the command socket, replacing a stale socket file left by a server
/// that is no longer running.
pub fn bind(path: &Path) -> anyhow::Result<UnixListener> {
    if path.exists() {
        if std::os::unix::net::UnixStream::connect(path).is_ok() {
            bail!("a server is already listening on {}", path.display());
        }
        std::fs::remove_file(path)
            .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    UnixListener::bind(path).with_context(|| format!("failed to bind {}", path.display()))
}

/// Accept requests until the listener fails.
pub async fn serve(listener: UnixListener, events: EventSender) {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                log::error!("command socket: {e}");
                return;
            }
        };
        let events = events.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, events).await {
                log::warn!("command socket: {e:#}");
            }
        });
    }
}

async fn handle_client(mut stream: UnixStream, events: EventSender) -> anyhow::Result<()> {
    let request = read_request(&mut stream).await?;
    log::debug!("command request: {:?}", request.argv);

    let (reply, response) = oneshot::channel();
    events
        .send(Event::Command { request, reply })
        .map_err(|_| anyhow!("server is shutting down"))?;
    let text = response.await.context("server is shutting down")?;

    stream.write_all(text.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn read_request<R: AsyncRead + Unpin>(reader: R) -> anyhow::Result<CommandRequest> {
    let mut buf = Vec::new();
    BufReader::new(reader)
        .read_until(REQUEST_TERMINATOR, &mut buf)
        .await?;
    if buf.last() == Some(&REQUEST_TERMINATOR) {
        buf.pop();
    }
    let text = std::str::from_utf8(&buf).context("request is not UTF-8")?;
    CommandRequest::from_json(text).context("malformed request")
}

/// Send `request` to the server listening on `path` and return its reply.
pub async fn send(path: &Path, request: &CommandRequest) -> anyhow::Result<String> {
    let mut stream = UnixStream::connect(path)
        .await
        .with_context(|| format!("no server listening on {}", path.display()))?;

    let mut payload = request.to_json()?.into_bytes();
    payload.push(REQUEST_TERMINATOR);
    stream.write_all(&payload).await?;

    let mut reply = String::new();
    stream.read_to_string(&mut reply).await?;
    Ok(reply)
}
