//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::{MatchLimits, MatchSettings};
use crate::util::time::DEFAULT_TICK_INTERVAL;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of human readable ones
    pub log_json: bool,

    /// HS256 secret for bearer token verification
    pub jwt_secret: String,
    /// Allowed client origin for CORS (comma-separated)
    pub client_origin: String,

    /// Target tick interval of every match loop
    pub tick_interval: Duration,
    /// Send a compact snapshot every N ticks
    pub snapshot_every: u32,
    pub max_players: usize,
    pub max_balls: usize,
    /// Inbound WebSocket messages per second per connection
    pub input_rate_limit: u32,
    /// How many finished matches `/matches/recent` keeps
    pub recent_results: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let snapshot_every: u32 = parse_or("SNAPSHOT_EVERY", 1)?;
        if snapshot_every == 0 {
            return Err(ConfigError::Invalid("SNAPSHOT_EVERY"));
        }
        let tick_ms: u64 = parse_or("TICK_INTERVAL_MS", DEFAULT_TICK_INTERVAL.as_millis() as u64)?;
        if tick_ms == 0 {
            return Err(ConfigError::Invalid("TICK_INTERVAL_MS"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(false),

            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),

            tick_interval: Duration::from_millis(tick_ms),
            snapshot_every,
            max_players: parse_or("MAX_PLAYERS", 8)?,
            max_balls: parse_or("MAX_BALLS", 10)?,
            input_rate_limit: parse_or("INPUT_RATE_LIMIT", 60)?,
            recent_results: parse_or("RECENT_RESULTS", 50)?,
        })
    }

    pub fn match_settings(&self) -> MatchSettings {
        MatchSettings {
            tick_interval: self.tick_interval,
            snapshot_every: self.snapshot_every,
            limits: MatchLimits {
                max_players: self.max_players,
                max_balls: self.max_balls,
            },
            command_buffer: 256,
        }
    }
}

/// Parse an optional variable, using `default` when it is unset
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test touches its own variable; the process environment is shared
    #[test]
    fn unset_values_use_default() {
        env::remove_var("RECENT_RESULTS_TEST_UNSET");
        assert_eq!(parse_or::<usize>("RECENT_RESULTS_TEST_UNSET", 50).unwrap(), 50);
    }

    #[test]
    fn bad_numbers_are_rejected() {
        env::set_var("MAX_BALLS_TEST_BAD", "lots");
        assert!(matches!(
            parse_or::<usize>("MAX_BALLS_TEST_BAD", 10),
            Err(ConfigError::Invalid("MAX_BALLS_TEST_BAD"))
        ));
        env::set_var("MAX_BALLS_TEST_BAD", " 4 ");
        assert_eq!(parse_or::<usize>("MAX_BALLS_TEST_BAD", 10).unwrap(), 4);
    }
}
