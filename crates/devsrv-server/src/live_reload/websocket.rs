//! WebSocket handler for live reload.
//!
//! Handles WebSocket connections and forwards reload events to clients.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::broadcast;

use super::manager::ReloadEvent;
use crate::state::AppState;

/// Handle WebSocket upgrade for live reload.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(ref live_reload) = state.live_reload else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let receiver = live_reload.subscribe();
    ws.on_upgrade(|socket| handle_socket(socket, receiver))
}

/// Handle an established WebSocket connection.
async fn handle_socket(mut socket: WebSocket, mut receiver: broadcast::Receiver<ReloadEvent>) {
    tracing::debug!("Live reload client connected");

    loop {
        tokio::select! {
            // Forward reload events to client
            result = receiver.recv() => {
                let event = match result {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Closed) => break,
                    // Missed events: a full reload covers whatever they were
                    Err(broadcast::error::RecvError::Lagged(_)) => ReloadEvent::full_reload(),
                };
                let Ok(msg) = serde_json::to_string(&event) else {
                    continue;
                };
                if socket.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }
            // Handle client messages (for keepalive)
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!("Live reload client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_reload::LiveReloadManager;
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;
    use tokio::net::TcpListener;
    use tokio_tungstenite::connect_async;

    #[tokio::test]
    async fn test_lagged_client_gets_full_reload() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let (tx, _rx) = broadcast::channel(1);
        let state = Arc::new(AppState {
            root: root.clone(),
            live_reload: Some(LiveReloadManager::new(root, tx.clone())),
        });
        let router = axum::Router::new()
            .route("/ws", axum::routing::get(ws_handler))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await });

        let (mut socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

        // Nothing yields between sends, so the client falls two events behind
        for name in ["/a.css", "/b.css", "/c.css"] {
            tx.send(ReloadEvent::Css {
                paths: vec![name.to_owned()],
            })
            .unwrap();
        }

        let first = socket.next().await.unwrap().unwrap();
        assert_eq!(first.to_text().unwrap(), r#"{"type":"reload","paths":[]}"#);

        let second = socket.next().await.unwrap().unwrap();
        assert_eq!(
            second.to_text().unwrap(),
            r#"{"type":"css","paths":["/c.css"]}"#
        );
    }
}
