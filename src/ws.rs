//! Websocket front door – the axum router and the viewer transport seams
//! implemented over an axum [`WebSocket`].

use crate::error::{Result, TrackerError};
use crate::protocol::{decode_viewer_message, BusesMessage, ViewerMessage};
use crate::viewer::{Broadcaster, ViewerSink, ViewerSource};
use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Path viewers connect to.
pub const WS_PATH: &str = "/ws";

// ---------------------------------------------------------------------------
// Transport adapters
// ---------------------------------------------------------------------------

pub struct WsSource(pub SplitStream<WebSocket>);

pub struct WsSink(pub SplitSink<WebSocket, Message>);

/// What one inbound frame means for the viewer connection.
#[derive(Debug)]
enum Inbound {
    Message(ViewerMessage),
    Closed,
    /// Control frame with no payload for us.
    Skip,
}

fn read_frame(frame: Message) -> Result<Inbound> {
    match frame {
        Message::Text(text) => decode_viewer_message(text.as_str()).map(Inbound::Message),
        Message::Binary(bytes) => {
            let text =
                std::str::from_utf8(&bytes).map_err(|e| TrackerError::Transport(e.to_string()))?;
            decode_viewer_message(text).map(Inbound::Message)
        }
        Message::Close(_) => Ok(Inbound::Closed),
        // Ping/pong are answered by the websocket layer.
        Message::Ping(_) | Message::Pong(_) => Ok(Inbound::Skip),
    }
}

fn buses_frame(msg: &BusesMessage) -> Result<Message> {
    let text = serde_json::to_string(msg).map_err(TrackerError::Encode)?;
    Ok(Message::Text(text.into()))
}

fn close_frame() -> Message {
    Message::Close(Some(CloseFrame {
        code: close_code::NORMAL,
        reason: Utf8Bytes::from_static(""),
    }))
}

#[async_trait]
impl ViewerSource for WsSource {
    async fn read_json(&mut self) -> Result<Option<ViewerMessage>> {
        while let Some(frame) = self.0.next().await {
            let frame = frame.map_err(|e| TrackerError::Transport(e.to_string()))?;
            match read_frame(frame)? {
                Inbound::Message(msg) => return Ok(Some(msg)),
                Inbound::Closed => return Ok(None),
                Inbound::Skip => {}
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ViewerSink for WsSink {
    async fn write_json(&mut self, msg: &BusesMessage) -> Result<()> {
        self.0
            .send(buses_frame(msg)?)
            .await
            .map_err(|e| TrackerError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.0
            .send(close_frame())
            .await
            .map_err(|e| TrackerError::Transport(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(broadcaster: Arc<Broadcaster>) -> Router {
    Router::new()
        .route(WS_PATH, get(ws_handler))
        .with_state(broadcaster)
}

async fn ws_handler(ws: WebSocketUpgrade, State(broadcaster): State<Arc<Broadcaster>>) -> Response {
    ws.on_upgrade(move |socket| async move {
        info!("Viewer connected");
        let (sink, stream) = socket.split();
        broadcaster.serve(WsSource(stream), WsSink(sink)).await;
    })
}

/// Serve the websocket endpoint on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    broadcaster: Arc<Broadcaster>,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Start ws server at {}{}", addr, WS_PATH);
    }
    axum::serve(listener, router(broadcaster))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| TrackerError::Transport(e.to_string()))
}
