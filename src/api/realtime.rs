//! Realtime log websocket.
//!
//! Protocol (text frames):
//! - client → server: `{"type":"subscribe","deploymentId":"<id>"}`
//! - server → client: `Joined logs:<id>`, then raw log lines as published
//!
//! A connection may subscribe to several deployments. Lines are only those
//! published after the subscription; history comes from `GET /logs/:id`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::hub::{FanoutHub, HubError};

/// Message sent by a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe {
        #[serde(rename = "deploymentId")]
        deployment_id: String,
    },
}

/// Build the websocket router.
pub fn router(hub: Arc<FanoutHub>) -> Router {
    Router::new()
        .route("/", get(upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

async fn upgrade(ws: WebSocketUpgrade, State(hub): State<Arc<FanoutHub>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<FanoutHub>) {
    let (sink, stream) = socket.split();
    pump(sink, stream, hub).await;
}

/// Pump one viewer connection until either side closes.
///
/// Generic over the transport halves so the protocol can be driven without a
/// real socket.
pub(crate) async fn pump<Tx, Rx, E>(mut sink: Tx, mut stream: Rx, hub: Arc<FanoutHub>)
where
    Tx: Sink<Message> + Unpin,
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut connection = hub.connect().await;
    let id = connection.id;

    loop {
        tokio::select! {
            outbound = connection.outbox.recv() => {
                let Some(outbound) = outbound else { break };
                if sink.send(Message::Text(outbound.to_text())).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { deployment_id }) => {
                                match hub.subscribe(id, &deployment_id).await {
                                    Ok(()) => {}
                                    Err(e @ HubError::OutboxFull { .. }) => {
                                        warn!(connection_id = id, error = %e, "Subscribe not acknowledged");
                                    }
                                    Err(e) => {
                                        warn!(connection_id = id, error = %e, "Subscribe failed");
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                debug!(connection_id = id, error = %e, "Ignoring unrecognised message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(connection_id = id, error = %e, "Websocket error");
                        break;
                    }
                }
            }
        }
    }

    hub.disconnect(id).await;
}
