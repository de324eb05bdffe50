//! Polygon Pong Server - authoritative simulation for N-player pong
//!
//! Players sit around a regular polygon field, each guarding one goal edge
//! with a racket. Every match runs its own fixed-cadence tick loop and
//! streams snapshots to players and spectators over WebSocket.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod lobby;
pub mod store;
pub mod util;
pub mod ws;
