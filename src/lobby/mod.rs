//! Lobby management

pub mod service;

pub use service::{LobbyService, Member};
