//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::{ConnectionHandle, Delivery, GameError, PlayerId};
use crate::http::middleware::{verify_jwt, JwtClaims};
use crate::lobby::LobbyService;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Outbound queue length per connection
const OUTBOUND_BUFFER: usize = 256;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    pub token: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    // Verify JWT token before upgrading
    match verify_jwt(&query.token, &state.config.jwt_secret) {
        Ok(claims) => {
            info!(player_id = %claims.sub, "WebSocket upgrade for authenticated player");
            ws.on_upgrade(move |socket| handle_socket(socket, claims, state))
        }
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            e.into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, claims: JwtClaims, state: AppState) {
    let player_id = claims.sub;
    let avatar = claims.avatar.unwrap_or_default();

    let (ws_sink, mut ws_stream) = socket.split();
    let (connection, outbound_rx) = ConnectionHandle::channel(OUTBOUND_BUFFER);
    info!(player_id = %player_id, connection_id = %connection.id, "New WebSocket connection");

    // Spawn writer task: outbound queue -> WebSocket
    let writer_handle = tokio::spawn(write_loop(player_id.clone(), ws_sink, outbound_rx));

    connection.deliver(ServerMsg::Welcome {
        player_id: player_id.clone(),
        server_time: unix_millis(),
    });
    state
        .lobbies
        .register_connection(player_id.clone(), avatar, connection.clone())
        .await;

    let rate_limiter = ConnectionRateLimiter::new(state.config.input_rate_limit);

    // Reader loop: WebSocket -> lobby service
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %player_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        let reply = dispatch(&state.lobbies, &player_id, &connection, msg)
                            .await
                            .unwrap_or_else(|e| {
                                debug!(player_id = %player_id, error = %e, "Request failed");
                                Some(error_msg(&e))
                            });
                        if let Some(reply) = reply {
                            if connection.deliver(reply) == Delivery::Closed {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                        connection.deliver(ServerMsg::Error {
                            code: "bad_request".to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!(player_id = %player_id, "Received ping/pong");
            }
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Cleanup on disconnect
    state
        .lobbies
        .unregister_connection(&player_id, connection.id)
        .await;
    writer_handle.abort();

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Forward queued messages to the socket until either side closes
async fn write_loop(
    player_id: PlayerId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(player_id = %player_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Apply one client request. Returns the direct reply, if the request has one.
pub async fn dispatch(
    lobbies: &LobbyService,
    player_id: &PlayerId,
    connection: &ConnectionHandle,
    msg: ClientMsg,
) -> Result<Option<ServerMsg>, GameError> {
    match msg {
        ClientMsg::CreateLobby {
            lobby_name,
            player_count,
            ball_count,
            players,
        } => {
            let lobby = lobbies.create_lobby(
                player_id.clone(),
                lobby_name,
                player_count,
                ball_count,
                players,
            )?;
            Ok(Some(ServerMsg::LobbyCreated { lobby }))
        }
        ClientMsg::Start { lobby_name } => lobbies.start(&lobby_name).await.map(|_| None),
        ClientMsg::SetMovement {
            lobby_name,
            movement,
        } => lobbies
            .set_movement(&lobby_name, player_id, movement)
            .await
            .map(|_| None),
        ClientMsg::Spectate { lobby_name } => lobbies
            .add_spectator(&lobby_name, Some(player_id.as_str()), connection.clone())
            .await
            .map(|_| None),
        ClientMsg::ChangeBallCount {
            lobby_name,
            ball_count,
        } => lobbies
            .change_ball_count(&lobby_name, ball_count)
            .await
            .map(|_| None),
        ClientMsg::Terminate { lobby_name } => lobbies.terminate(&lobby_name).await.map(|_| None),
        ClientMsg::Leave => lobbies.leave(player_id, connection.id).await.map(|_| None),
        ClientMsg::ListLobbies => Ok(Some(ServerMsg::LobbyList {
            lobbies: lobbies.lobbies(),
        })),
        ClientMsg::Ping { t } => Ok(Some(ServerMsg::Pong { t })),
    }
}

fn error_msg(e: &GameError) -> ServerMsg {
    ServerMsg::Error {
        code: e.code().to_string(),
        message: e.to_string(),
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{MatchLimits, MatchRegistry, MatchSettings};
    use crate::store::RecentResults;
    use crate::util::time::MonotonicClock;
    use std::sync::Arc;
    use std::time::Duration;

    fn lobbies() -> LobbyService {
        LobbyService::new(
            Arc::new(MatchRegistry::new()),
            Arc::new(RecentResults::new(4)),
            Arc::new(MonotonicClock::new()),
            MatchSettings {
                tick_interval: Duration::from_millis(16),
                snapshot_every: 1,
                limits: MatchLimits {
                    max_players: 4,
                    max_balls: 4,
                },
                command_buffer: 16,
            },
        )
    }

    #[tokio::test]
    async fn ping_and_list_reply_directly() {
        let lobbies = lobbies();
        let (connection, _rx) = ConnectionHandle::channel(8);
        let player_id = "alice".to_string();

        let reply = dispatch(&lobbies, &player_id, &connection, ClientMsg::Ping { t: 42 })
            .await
            .unwrap();
        assert!(matches!(reply, Some(ServerMsg::Pong { t: 42 })));

        let reply = dispatch(&lobbies, &player_id, &connection, ClientMsg::ListLobbies)
            .await
            .unwrap();
        assert!(matches!(reply, Some(ServerMsg::LobbyList { lobbies }) if lobbies.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn create_then_start_through_messages() {
        let lobbies = lobbies();
        let (connection, mut rx) = ConnectionHandle::channel(1024);
        let player_id = "alice".to_string();
        lobbies
            .register_connection(player_id.clone(), String::new(), connection.clone())
            .await;

        let create = ClientMsg::CreateLobby {
            lobby_name: "room".into(),
            player_count: 1,
            ball_count: 1,
            players: vec![player_id.clone()],
        };
        let reply = dispatch(&lobbies, &player_id, &connection, create).await.unwrap();
        assert!(matches!(reply, Some(ServerMsg::LobbyCreated { ref lobby }) if lobby.lobby_name == "room"));

        let start = ClientMsg::Start {
            lobby_name: "room".into(),
        };
        assert!(dispatch(&lobbies, &player_id, &connection, start).await.unwrap().is_none());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(lobbies.lobbies()[0].started);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, ServerMsg::GameSetup(_)));
    }

    #[tokio::test]
    async fn errors_carry_stable_codes() {
        let lobbies = lobbies();
        let (connection, _rx) = ConnectionHandle::channel(8);
        let err = dispatch(
            &lobbies,
            &"bob".to_string(),
            &connection,
            ClientMsg::Terminate {
                lobby_name: "nowhere".into(),
            },
        )
        .await
        .unwrap_err();
        match error_msg(&err) {
            ServerMsg::Error { code, .. } => assert_eq!(code, "not_found"),
            other => panic!("unexpected message {other:?}"),
        }
    }
}
