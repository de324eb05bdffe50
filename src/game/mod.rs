//! Game simulation modules

pub mod ball;
pub mod collision;
pub mod connection;
pub mod error;
pub mod field;
pub mod r#match;
pub mod profile;
pub mod racket;
pub mod snapshot;

pub use connection::{ConnectionHandle, Delivery};
pub use error::GameError;
pub use r#match::{
    GameMatch, MatchCommand, MatchHandle, MatchLimits, MatchRegistry, MatchSettings, MatchSpec,
    MatchState, RosterEntry,
};

/// Opaque player identity (the token subject)
pub type PlayerId = String;
