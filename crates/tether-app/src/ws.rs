//! WebSocket endpoint browsers connect to.
//!
//! The handshake query carries `server-key` and optionally `connect-pid`.
//! The connection is registered with the driver before the upgrade, so a
//! refused key is answered with a plain HTTP error. After the upgrade every
//! binary or text frame is handed to the driver as inbound bytes, and the
//! driver's output is sent back as binary frames.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};

use tether_mux::{ConnectParams, ConnectionId};

use crate::driver::{Event, EventSender};

#[derive(Clone)]
pub struct WsState {
    pub events: EventSender,
}

#[derive(Debug, Default, Deserialize)]
pub struct Handshake {
    #[serde(rename = "server-key")]
    pub server_key: Option<String>,
    #[serde(rename = "connect-pid")]
    pub connect_pid: Option<String>,
}

impl From<Handshake> for ConnectParams {
    fn from(handshake: Handshake) -> Self {
        Self {
            server_key: handshake.server_key,
            connect_pid: handshake.connect_pid,
        }
    }
}

pub fn router(events: EventSender) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .with_state(WsState { events })
}

async fn index() -> &'static str {
    concat!("tether ", env!("CARGO_PKG_VERSION"), "\n")
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(handshake): Query<Handshake>,
    State(state): State<WsState>,
) -> Response {
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let (reply, accepted) = oneshot::channel();
    let connected = Event::Connected {
        params: handshake.into(),
        outbound,
        reply,
    };
    if state.events.send(connected).is_err() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let id = match accepted.await {
        Ok(Ok(id)) => id,
        Ok(Err(rejection)) => return (StatusCode::FORBIDDEN, rejection.to_string()).into_response(),
        Err(_) => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
    };

    let events = state.events.clone();
    let failed = state.events;
    ws.protocols(["domterm"])
        .on_failed_upgrade(move |e: axum::Error| {
            log::warn!("client {id}: upgrade failed: {e}");
            let _ = failed.send(Event::Closed(id));
        })
        .on_upgrade(move |socket| handle_socket(socket, id, outbound_rx, events))
}

async fn handle_socket(
    socket: WebSocket,
    id: ConnectionId,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    events: EventSender,
) {
    let (mut sender, mut receiver) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(data) = outbound.recv().await {
            if let Err(e) = sender.send(Message::Binary(data)).await {
                log::debug!("client {id}: send failed: {e}");
                return;
            }
        }
        // The driver dropped this connection.
        let _ = sender.send(Message::Close(None)).await;
    });

    while let Some(message) = receiver.next().await {
        let data = match message {
            Ok(Message::Binary(data)) => data,
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Err(e) => {
                log::debug!("client {id}: receive failed: {e}");
                break;
            }
        };
        if events.send(Event::Received { connection: id, data }).is_err() {
            break;
        }
    }

    let _ = events.send(Event::Closed(id));
    writer.abort();
}
