//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{FireInput, PlayerCommand, RoomInput, ACTION_FIRE, ACTION_JUMP};
use crate::session::ConnectionContext;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection.
/// Identity arrives pre-authenticated from the upstream gateway.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub user_id: Uuid,
    pub room_id: Uuid,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    if !state.sessions.registry().contains(&query.room_id) {
        warn!(room_id = %query.room_id, "WebSocket upgrade for unknown room");
        return Response::builder()
            .status(404)
            .body("Room not found".into())
            .unwrap();
    }

    info!(user_id = %query.user_id, room_id = %query.room_id, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, query.user_id, query.room_id, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: Uuid, room_id: Uuid, state: AppState) {
    let mut context = match state.sessions.attach(user_id, room_id).await {
        Ok(context) => context,
        Err(e) => {
            warn!(user_id = %user_id, room_id = %room_id, error = %e, "Attach failed");
            return;
        }
    };

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Send welcome directly; everything afterwards rides the room broadcast
    let welcome = ServerMsg::Welcome {
        user_id,
        server_time: unix_millis(),
    };
    if send_msg(&mut ws_sink, &welcome).await.is_err() {
        state.sessions.detach(&context).await;
        return;
    }

    // Writer task: room broadcast -> WebSocket
    let mut broadcast_rx = context.room.broadcast_tx.subscribe();
    let writer_user_id = user_id;
    let writer_handle = tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(msg) => {
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(user_id = %writer_user_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        user_id = %writer_user_id,
                        lagged_count = n,
                        "Client lagged, skipping {} snapshots", n
                    );
                    // Keep the connection; the next snapshot corrects the view
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(user_id = %writer_user_id, "Broadcast channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> room command queue
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !context.limiter.check_message() {
                    // Over budget: drop the frame, no error to the client
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        if !route_client_msg(&mut context, client_msg).await {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    state.sessions.detach(&context).await;
    writer_handle.abort();

    info!(user_id = %user_id, "WebSocket connection closed");
}

/// Translate one wire message into room input.
/// Returns false when the connection should wind down.
async fn route_client_msg(context: &mut ConnectionContext, msg: ClientMsg) -> bool {
    match msg {
        ClientMsg::Join => context
            .room
            .input_tx
            .send(RoomInput::Join {
                player_id: context.user_id,
            })
            .await
            .is_ok(),

        ClientMsg::StateUpdate {
            sequence,
            move_input,
            jump,
            client_timestamp,
            ..
        } => {
            if !context.limiter.check_state_update() {
                return true;
            }

            let now = unix_millis();
            context.clock.update(client_timestamp, now);

            let command = PlayerCommand {
                player_id: context.user_id,
                sequence,
                move_input,
                action_bits: if jump { ACTION_JUMP } else { 0 },
                fire: None,
                client_timestamp,
                server_timestamp: now,
            };
            context
                .room
                .input_tx
                .send(RoomInput::Command(command))
                .await
                .is_ok()
        }

        ClientMsg::Fire {
            origin_x,
            origin_y,
            dir_x,
            dir_y,
            range,
            client_timestamp,
        } => {
            // Map the client's fire moment onto the server timeline for
            // lag compensation; 0 means "no clock", resolved to now by
            // the room
            let server_timestamp = if client_timestamp == 0 {
                0
            } else {
                context.clock.to_server_time(client_timestamp)
            };

            let command = PlayerCommand {
                player_id: context.user_id,
                sequence: 0,
                move_input: 0.0,
                action_bits: ACTION_FIRE,
                fire: Some(FireInput {
                    origin_x,
                    origin_y,
                    dir_x,
                    dir_y,
                    range,
                }),
                client_timestamp,
                server_timestamp,
            };
            context
                .room
                .input_tx
                .send(RoomInput::Command(command))
                .await
                .is_ok()
        }

        ClientMsg::Leave => {
            let _ = context
                .room
                .input_tx
                .send(RoomInput::Leave {
                    player_id: context.user_id,
                })
                .await;
            false
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
