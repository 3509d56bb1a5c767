//! WebSocket upgrade handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::GameHandle;
use crate::util::rate_limit::{Admission, InputThrottle};
use crate::ws::protocol::{ClientMsg, ServerMsg};

pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";

/// Query parameters for WebSocket connection
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    pub display_name: Option<String>,
    pub thumb_url: Option<String>,
}

impl WsQuery {
    /// Display name and thumbnail with defaults applied
    pub fn identity(self) -> (String, String) {
        let display_name = self
            .display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());
        (display_name, self.thumb_url.unwrap_or_default())
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let connection_id = Uuid::new_v4();
    let (display_name, thumb_url) = query.identity();
    info!(connection_id = %connection_id, display_name = %display_name, "WebSocket upgrade");

    ws.on_upgrade(move |socket| {
        handle_socket(socket, connection_id, display_name, thumb_url, state.game)
    })
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    connection_id: Uuid,
    display_name: String,
    thumb_url: String,
    game: GameHandle,
) {
    let (mut ws_sink, ws_stream) = socket.split();

    let start = match game.connect(connection_id, display_name, thumb_url).await {
        Ok(start) => start,
        Err(e) => {
            error!(connection_id = %connection_id, error = %e, "Failed to join game");
            return;
        }
    };
    let player_id = start.player_obj.player_id.clone();

    let snapshot_rx = game.subscribe();
    match serde_json::to_string(&ServerMsg::StartData(start)) {
        Ok(json) => {
            if let Err(e) = ws_sink.send(Message::Text(json)).await {
                debug!(connection_id = %connection_id, error = %e, "Failed to send start data");
                let _ = game.disconnect(connection_id).await;
                return;
            }
        }
        Err(e) => {
            error!(connection_id = %connection_id, error = %e, "Failed to encode start data");
            let _ = game.disconnect(connection_id).await;
            return;
        }
    }

    info!(connection_id = %connection_id, player_id = %player_id, "Player session started");

    run_session(connection_id, &game, ws_sink, ws_stream, snapshot_rx).await;

    if let Err(e) = game.disconnect(connection_id).await {
        warn!(connection_id = %connection_id, error = %e, "Disconnect not delivered");
    }

    info!(connection_id = %connection_id, player_id = %player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    connection_id: Uuid,
    game: &GameHandle,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut snapshot_rx: watch::Receiver<Arc<str>>,
) {
    let mut throttle = InputThrottle::new();

    // Writer task: latest snapshot -> WebSocket. Frames published while a
    // send is in flight are skipped, only the newest one goes out.
    let writer_handle = tokio::spawn(async move {
        while snapshot_rx.changed().await.is_ok() {
            let frame = snapshot_rx.borrow_and_update().clone();
            if let Err(e) = ws_sink.send(Message::Text(frame.to_string())).await {
                debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> engine
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                match throttle.admit() {
                    Admission::Accept => {}
                    Admission::Drop { burst_start: true } => {
                        warn!(connection_id = %connection_id, "Input rate exceeded, dropping");
                        continue;
                    }
                    Admission::Drop { burst_start: false } => continue,
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        if game.send_input(connection_id, msg).await.is_err() {
                            debug!(connection_id = %connection_id, "Game engine gone");
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(
                            connection_id = %connection_id,
                            error = %e,
                            "Ignoring unparsable client message"
                        );
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                debug!(connection_id = %connection_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection_id, "Client initiated close");
                break;
            }
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }

        if writer_handle.is_finished() {
            break;
        }
    }

    writer_handle.abort();

    if throttle.dropped() > 0 {
        info!(
            connection_id = %connection_id,
            dropped = throttle.dropped(),
            "Session dropped rate limited inputs"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_defaults() {
        let (name, thumb) = WsQuery::default().identity();
        assert_eq!(name, DEFAULT_DISPLAY_NAME);
        assert_eq!(thumb, "");
    }

    #[test]
    fn test_query_from_camel_case() {
        let query: WsQuery =
            serde_json::from_str(r#"{"displayName":"  Nemo ","thumbUrl":"https://t/x.png"}"#)
                .unwrap();
        let (name, thumb) = query.identity();
        assert_eq!(name, "Nemo");
        assert_eq!(thumb, "https://t/x.png");
    }

    #[test]
    fn test_blank_name_falls_back() {
        let query = WsQuery {
            display_name: Some("   ".to_string()),
            thumb_url: None,
        };
        assert_eq!(query.identity().0, DEFAULT_DISPLAY_NAME);
    }
}
