//! WebSocket subscribe handler for market-data streaming.
//!
//! Follows the teacher's split-socket + `tokio::select!` pattern: a reader
//! half watches for client pings/close, a writer half is fed by an mpsc
//! channel that `WebSocketTransport::send` forwards into, and a heartbeat
//! interval is layered on top by `MarketFanout::run_heartbeat` rather than
//! being duplicated here.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use axum::Json;
use fanout::{FanoutMessage, Transport, TransportError};
use futures::{sink::SinkExt, stream::StreamExt};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::AppState;

/// Bridges `MarketFanout`'s `Arc<dyn Transport>` contract to a live
/// WebSocket connection via an mpsc channel consumed by the writer task.
pub struct WebSocketTransport {
    sender: mpsc::Sender<Message>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, message: &FanoutMessage) -> Result<(), TransportError> {
        let json = serde_json::to_string(message)
            .map_err(|e| TransportError::Faulted(e.to_string()))?;
        self.sender
            .send(Message::Text(json))
            .await
            .map_err(|_| TransportError::Faulted("socket writer task gone".to_string()))
    }
}

#[derive(serde::Deserialize)]
pub struct SubscribeQuery {
    pub symbol: String,
    pub depth: Option<usize>,
}

pub async fn subscribe(
    Query(query): Query<SubscribeQuery>,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_subscribe(socket, query, state))
}

async fn handle_subscribe(socket: WebSocket, query: SubscribeQuery, state: AppState) {
    let SubscribeQuery { symbol, depth } = query;
    info!(%symbol, "new market-data subscriber");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(256);

    let transport = std::sync::Arc::new(WebSocketTransport { sender: tx });
    let connection_id = state.fanout.subscribe(&symbol, transport);

    if let Some(snapshot) = state.pipeline.orderbook_snapshot(&symbol, depth.unwrap_or(10)) {
        state.fanout.send_snapshot(&symbol, connection_id, snapshot).await;
    }

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Text(_)) | Ok(Message::Binary(_)) => {}
            Err(e) => {
                warn!(%symbol, error = %e, "websocket read error");
                break;
            }
        }
    }

    writer.abort();
    state.fanout.unsubscribe(&symbol, connection_id);
    info!(%symbol, "market-data subscriber disconnected");
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
