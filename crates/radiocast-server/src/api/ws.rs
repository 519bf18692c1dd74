//! WebSocket listener feed.
//!
//! A listener authenticates with its API key, is registered as a
//! client, and receives every released call its scope admits as a JSON
//! frame. The bounded channel between the registry and this pump is
//! where backpressure turns into dropped calls; the socket itself never
//! blocks the fan-out. Registration state is purely in-memory, so
//! listeners simply reconnect after a server restart.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use radiocast_core::call::Call;

use crate::clients::Client;

use super::payload::CallJson;
use super::routes::{scope_for_key, AppState, KeyParams};

/// Handler for `GET /api/listen`, upgrading to the listener feed.
pub(super) async fn listen(
    ws: WebSocketUpgrade,
    Query(params): Query<KeyParams>,
    State(state): State<AppState>,
) -> Response {
    let Some((user, scope)) = scope_for_key(&state.controller, &params.key) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    ws.on_upgrade(move |socket| async move {
        let capacity = state.controller.config.server.client_channel_capacity;
        let (client, rx) = Client::new(Some(user), scope, capacity);
        state.controller.clients.register(Arc::clone(&client)).await;

        pump(socket, rx).await;

        state.controller.clients.unregister(client.id).await;
        debug!(client_id = %client.id, "listener disconnected");
    })
}

/// Forward released calls to the socket until either side goes away.
async fn pump(mut socket: WebSocket, mut rx: mpsc::Receiver<Arc<Call>>) {
    loop {
        tokio::select! {
            maybe_call = rx.recv() => {
                let Some(call) = maybe_call else { break };
                let frame = CallJson::from_call(&call);
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(call_id = call.id, error = %e, "failed to encode call frame");
                        continue;
                    }
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    debug!(call_id = call.id, "listener socket closed during send");
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Listeners are receive-only; ignore anything else.
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
