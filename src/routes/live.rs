use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::auth::AuthenticatedUser;
use crate::AppState;

/// Live donation list. Each client gets the current snapshot on connect and
/// every subsequent one until it disconnects; closing the socket tears the
/// subscription down.
pub async fn donations_feed(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Response {
    tracing::debug!("Live feed requested by {}", user.id);
    ws.on_upgrade(move |socket| stream_snapshots(socket, state))
}

async fn stream_snapshots(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut updates = state.feed.subscribe();

    match state.feed.snapshot_json(&state.db).await {
        Ok(snapshot) => {
            if sender.send(Message::Text(snapshot.into())).await.is_err() {
                return;
            }
        }
        Err(e) => {
            tracing::error!("Initial snapshot failed: {}", e);
            return;
        }
    }

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(snapshot) => {
                    if sender.send(Message::Text(snapshot.into())).await.is_err() {
                        return;
                    }
                }
                // Skipped snapshots are harmless: the next one carries the
                // full list again.
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Feed receiver lagged, skipped {} snapshots", skipped);
                }
                Err(RecvError::Closed) => return,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                // The feed is one-way; anything else from the client is ignored.
                Some(Ok(_)) => {}
            },
        }
    }
}
