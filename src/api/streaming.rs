use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::handler::AppState;
use crate::funding::progress::ProgressEvent;

/// GET /funding/stream - Every progress event as a JSON text frame,
/// starting with the current state
pub async fn stream_progress(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_progress_stream(socket, state.progress.clone()))
}

fn encode(event: &ProgressEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Failed to encode progress event: {}", e);
            None
        }
    }
}

async fn handle_progress_stream(socket: WebSocket, mut progress: watch::Receiver<ProgressEvent>) {
    let (mut sender, mut receiver) = socket.split();

    let current = progress.borrow_and_update().clone();
    if let Some(text) = encode(&current) {
        if sender.send(Message::Text(text)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
                let event = progress.borrow_and_update().clone();
                let Some(text) = encode(&event) else {
                    continue;
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    debug!("Progress stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funding::session::Session;

    #[test]
    fn test_event_frames_are_json() {
        let event = ProgressEvent::from(&Session::new());
        let text = encode(&event).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["phase"], "SELECT_LEDGER");
        assert_eq!(value["step_index"], 0);
        assert!(value["error"].is_null());
    }
}
