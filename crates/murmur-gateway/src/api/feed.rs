//! Live channel feed over WebSocket.
//!
//! Each store snapshot is sent as one JSON text frame holding the channel's
//! visible records, oldest first. Inbound frames other than Close are
//! ignored.

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, Path, State},
    response::Response,
};
use futures_util::stream::BoxStream;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;

use murmur_core::record::MessageRecord;

use super::ApiError;
use crate::app_state::AppState;
use crate::obs::GatewayMetrics;

pub async fn channel_feed(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<Response, ApiError> {
    let feed = state.composer().feed(&channel)?;
    let metrics = state.metrics();
    Ok(ws.on_upgrade(move |socket| pump(socket, feed, metrics, channel)))
}

async fn pump(
    socket: WebSocket,
    mut feed: BoxStream<'static, Vec<MessageRecord>>,
    metrics: Arc<GatewayMetrics>,
    channel: String,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let labels = [("channel", channel.as_str())];
    metrics.feed_subscribers.inc(&labels);
    tracing::debug!(%channel, "feed subscribed");

    loop {
        tokio::select! {
            snapshot = feed.next() => {
                let Some(records) = snapshot else { break };
                let text = match serde_json::to_string(&records) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(error=%e, "feed snapshot encode failed");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    metrics.feed_subscribers.dec(&labels);
    tracing::debug!(%channel, "feed closed");
}
