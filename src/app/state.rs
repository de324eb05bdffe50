//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::MatchRegistry;
use crate::lobby::LobbyService;
use crate::store::RecentResults;
use crate::util::time::MonotonicClock;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub lobbies: Arc<LobbyService>,
    pub match_registry: Arc<MatchRegistry>,
    pub recent_results: Arc<RecentResults>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let match_registry = Arc::new(MatchRegistry::new());
        let recent_results = Arc::new(RecentResults::new(config.recent_results));

        let lobbies = Arc::new(LobbyService::new(
            match_registry.clone(),
            recent_results.clone(),
            Arc::new(MonotonicClock::new()),
            config.match_settings(),
        ));

        Self {
            config,
            lobbies,
            match_registry,
            recent_results,
        }
    }
}
