use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use tracing::debug;

use crate::state::ApiState;

/// GET /api/projects/{project}/events streams the project's control-plane
/// events to the client. Subscription starts at upgrade time; there is no
/// backfill.
pub(crate) async fn events_ws(
    State(state): State<Arc<ApiState>>,
    Path(project): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, state, project))
}

async fn stream_events(mut socket: WebSocket, state: Arc<ApiState>, project: String) {
    let rx = state.bus.subscribe();
    debug!(project, "event subscriber connected");

    loop {
        tokio::select! {
            event = rx.recv_async() => match event {
                Ok(event) if event.project == project => {
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {} // other project's event
                Err(_) => break,
            },
            message = socket.recv() => match message {
                Some(Ok(_)) => {} // nothing expected from the client
                _ => break,
            },
        }
    }
    debug!(project, "event subscriber disconnected");
}
