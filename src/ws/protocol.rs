//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::field::EdgeKind;
use crate::game::PlayerId;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Open a lobby with a fixed roster of connected players
    CreateLobby {
        lobby_name: String,
        player_count: usize,
        ball_count: usize,
        /// Player ids in seat order
        players: Vec<PlayerId>,
    },

    /// Let the balls loose
    Start { lobby_name: String },

    /// Racket movement intent
    SetMovement {
        lobby_name: String,
        /// Signed percent of full speed (-100 to 100)
        movement: f32,
    },

    /// Watch a lobby without playing
    Spectate { lobby_name: String },

    /// Change the number of balls in play
    ChangeBallCount { lobby_name: String, ball_count: usize },

    /// Tear a lobby down
    Terminate { lobby_name: String },

    /// Leave whatever lobby this connection plays in
    Leave,

    /// Request the lobby summaries
    ListLobbies,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { player_id: PlayerId, server_time: u64 },

    /// Lobby was created
    LobbyCreated { lobby: LobbySummary },

    /// Complete match layout, sent on creation and after layout changes
    GameSetup(GameSetup),

    /// Per-tick state
    GameUpdate(GameUpdate),

    /// Personal result of a finished match
    GameOver { outcome: Outcome },

    /// Match has ended, sent to every connection of the match
    MatchEnd {
        lobby_name: String,
        reason: EndReason,
        players: Vec<PlayerId>,
        scores: Vec<i32>,
    },

    /// Active lobbies
    LobbyList { lobbies: Vec<LobbySummary> },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Lose,
}

/// Why a match stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndReason {
    /// A ball crossed this player's goal
    Goal { conceder: PlayerId },
    /// Explicit termination request
    Terminated,
    /// Every player connection left
    Abandoned,
}

/// Read-only lobby information for discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbySummary {
    pub lobby_name: String,
    pub owner_id: PlayerId,
    /// Players still connected to the match
    pub players: Vec<PlayerId>,
    pub player_count: usize,
    pub ball_count: usize,
    pub started: bool,
}

/// Full snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSetup {
    pub field_edges: Vec<EdgeSnapshot>,
    pub rackets: Vec<RacketSnapshot>,
    pub profiles: Vec<ProfileSnapshot>,
    pub balls: Vec<BallSnapshot>,
    pub started: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub index: usize,
    pub kind: EdgeKind,
    pub x: f32,
    pub y: f32,
    pub end_x: f32,
    pub end_y: f32,
    pub length: f32,
    pub angle: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RacketSnapshot {
    pub x: f32,
    pub y: f32,
    pub length: f32,
    pub angle: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub player_id: PlayerId,
    pub avatar: String,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub score: i32,
    pub eliminated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallSnapshot {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

/// Compact per-tick snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameUpdate {
    pub started: bool,
    pub balls: Vec<Position>,
    pub rackets: Vec<Position>,
    pub profiles: Vec<ProfileUpdate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub score: i32,
    pub eliminated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_type_tag() {
        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"set_movement","lobby_name":"room","movement":-35.5}"#,
        )
        .unwrap();
        match msg {
            ClientMsg::SetMovement { lobby_name, movement } => {
                assert_eq!(lobby_name, "room");
                assert_eq!(movement, -35.5);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn game_over_wire_shape() {
        let json = serde_json::to_value(ServerMsg::GameOver { outcome: Outcome::Win }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "game_over", "outcome": "win"}));
    }

    #[test]
    fn update_is_flattened_into_message() {
        let update = GameUpdate {
            started: true,
            balls: vec![Position { x: 1.0, y: 2.0 }],
            rackets: vec![],
            profiles: vec![],
        };
        let json = serde_json::to_value(ServerMsg::GameUpdate(update)).unwrap();
        assert_eq!(json["type"], "game_update");
        assert_eq!(json["started"], true);
        assert_eq!(json["balls"][0]["y"], 2.0);
    }
}
