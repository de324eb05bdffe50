//! Errors surfaced by match lifecycle operations

/// Rejected match operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Invalid match configuration: {0}")]
    Configuration(String),

    #[error("Unknown player: {0}")]
    UnknownPlayer(String),

    #[error("Lobby already active: {0}")]
    DuplicateLobby(String),

    #[error("Lobby not found: {0}")]
    NotFound(String),

    #[error("Match is shutting down: {0}")]
    MatchClosed(String),
}

impl GameError {
    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Configuration(_) => "configuration_error",
            GameError::UnknownPlayer(_) => "unknown_player",
            GameError::DuplicateLobby(_) => "duplicate_lobby",
            GameError::NotFound(_) => "not_found",
            GameError::MatchClosed(_) => "match_closed",
        }
    }
}
