//! Lobby service - inbound operations over the match registry

use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::game::{
    ConnectionHandle, GameError, GameMatch, MatchCommand, MatchHandle, MatchRegistry,
    MatchSettings, MatchSpec, PlayerId, RosterEntry,
};
use crate::store::MatchRecorder;
use crate::util::time::Clock;
use crate::ws::protocol::LobbySummary;

/// A connected player as seen by the transport
#[derive(Debug, Clone)]
pub struct Member {
    pub avatar: String,
    pub connection: ConnectionHandle,
}

/// Lobby service
pub struct LobbyService {
    registry: Arc<MatchRegistry>,
    recorder: Arc<dyn MatchRecorder>,
    clock: Arc<dyn Clock>,
    settings: MatchSettings,
    /// Connected players
    members: DashMap<PlayerId, Member>,
    /// Map of player -> lobby they play in or watch
    memberships: Arc<DashMap<PlayerId, String>>,
}

impl LobbyService {
    pub fn new(
        registry: Arc<MatchRegistry>,
        recorder: Arc<dyn MatchRecorder>,
        clock: Arc<dyn Clock>,
        settings: MatchSettings,
    ) -> Self {
        Self {
            registry,
            recorder,
            clock,
            settings,
            members: DashMap::new(),
            memberships: Arc::new(DashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<MatchRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    /// Register a player connection (called when WebSocket connects).
    /// A player seated in a running lobby has the seat moved to the new connection.
    pub async fn register_connection(
        &self,
        player_id: PlayerId,
        avatar: String,
        connection: ConnectionHandle,
    ) {
        let connection_id = connection.id;
        let previous = self.members.insert(
            player_id.clone(),
            Member {
                avatar,
                connection: connection.clone(),
            },
        );
        if let Some(previous) = previous {
            warn!(
                player_id = %player_id,
                previous = %previous.connection.id,
                "Player reconnected, replacing previous connection"
            );
        }
        info!(player_id = %player_id, connection_id = %connection_id, "Player connected");

        let Some(lobby_name) = self.lobby_of(&player_id) else {
            return;
        };
        let Some(handle) = self.registry.get(&lobby_name) else {
            return;
        };
        let reconnect = MatchCommand::Reconnect {
            player_id: player_id.clone(),
            connection,
        };
        if let Err(e) = handle.send(reconnect).await {
            warn!(
                player_id = %player_id,
                lobby = %lobby_name,
                error = %e,
                "Could not move seat to new connection"
            );
        }
    }

    /// Unregister a player (called when WebSocket disconnects).
    /// The player's lobby, if any, is told the connection left.
    pub async fn unregister_connection(&self, player_id: &str, connection_id: Uuid) {
        // A newer connection for the same player stays registered
        let removed = self
            .members
            .remove_if(player_id, |_, member| member.connection.id == connection_id)
            .is_some();
        if !removed {
            return;
        }

        if let Err(e) = self.leave(player_id, connection_id).await {
            warn!(player_id = %player_id, error = %e, "Could not notify lobby of disconnect");
        }
        info!(player_id = %player_id, "Player disconnected");
    }

    pub fn connected_players(&self) -> usize {
        self.members.len()
    }

    pub fn member(&self, player_id: &str) -> Option<Member> {
        self.members.get(player_id).map(|m| m.value().clone())
    }

    /// Lobby the player currently plays in or watches
    pub fn lobby_of(&self, player_id: &str) -> Option<String> {
        self.memberships.get(player_id).map(|l| l.value().clone())
    }

    /// Build a roster from connected players and create the lobby
    pub fn create_lobby(
        &self,
        owner_id: PlayerId,
        lobby_name: String,
        player_count: usize,
        ball_count: usize,
        players: Vec<PlayerId>,
    ) -> Result<LobbySummary, GameError> {
        let roster = players
            .into_iter()
            .map(|player_id| {
                let member = self
                    .member(&player_id)
                    .ok_or_else(|| GameError::UnknownPlayer(player_id.clone()))?;
                Ok(RosterEntry {
                    player_id,
                    avatar: member.avatar,
                    connection: member.connection,
                })
            })
            .collect::<Result<Vec<_>, GameError>>()?;

        self.create(MatchSpec {
            lobby_name,
            owner_id,
            player_count,
            ball_count,
            roster,
        })
    }

    /// Create a match for the roster and start its task
    pub fn create(&self, spec: MatchSpec) -> Result<LobbySummary, GameError> {
        spec.validate(&self.settings.limits)?;
        if self.registry.contains(&spec.lobby_name) {
            return Err(GameError::DuplicateLobby(spec.lobby_name));
        }
        if let Some(busy) = spec
            .roster
            .iter()
            .find_map(|e| self.lobby_of(&e.player_id).map(|l| (e.player_id.clone(), l)))
        {
            return Err(GameError::Configuration(format!(
                "player {} is already in lobby {}",
                busy.0, busy.1
            )));
        }

        let (game_match, handle) = GameMatch::new(
            spec,
            &self.settings,
            self.clock.clone(),
            self.recorder.clone(),
        )?;
        let summary = handle.summary();

        self.launch(game_match, handle)?;

        info!(
            lobby = %summary.lobby_name,
            owner_id = %summary.owner_id,
            player_count = summary.player_count,
            ball_count = summary.ball_count,
            "Created new lobby"
        );
        Ok(summary)
    }

    /// Register the match and spawn it under a supervisor that always
    /// removes it from the registry, even if the match task panics
    pub fn launch(&self, game_match: GameMatch, handle: MatchHandle) -> Result<JoinHandle<()>, GameError> {
        let lobby_name = handle.lobby_name.clone();
        let players = handle.summary().players;
        self.registry.insert(handle)?;
        for player_id in players {
            self.memberships.insert(player_id, lobby_name.clone());
        }

        let registry = self.registry.clone();
        let memberships = self.memberships.clone();

        Ok(tokio::spawn(async move {
            match tokio::spawn(game_match.run()).await {
                Ok(_) => {}
                Err(e) if e.is_panic() => {
                    error!(lobby = %lobby_name, "Match task panicked");
                }
                Err(e) => {
                    warn!(lobby = %lobby_name, error = %e, "Match task cancelled");
                }
            }

            // Cleanup after match ends
            registry.remove(&lobby_name);
            memberships.retain(|_, lobby| *lobby != lobby_name);

            info!(lobby = %lobby_name, "Match removed from registry");
        }))
    }

    pub async fn start(&self, lobby_name: &str) -> Result<(), GameError> {
        self.registry.lookup(lobby_name)?.send(MatchCommand::Start).await
    }

    /// Unknown players are ignored by the match
    pub async fn set_movement(
        &self,
        lobby_name: &str,
        player_id: &str,
        percent: f32,
    ) -> Result<(), GameError> {
        self.registry
            .lookup(lobby_name)?
            .send(MatchCommand::SetMovement {
                player_id: player_id.to_string(),
                percent,
            })
            .await
    }

    pub async fn add_spectator(
        &self,
        lobby_name: &str,
        viewer_id: Option<&str>,
        connection: ConnectionHandle,
    ) -> Result<(), GameError> {
        let handle = self.registry.lookup(lobby_name)?;
        handle.send(MatchCommand::AddSpectator(connection)).await?;
        if let Some(viewer_id) = viewer_id {
            self.memberships
                .entry(viewer_id.to_string())
                .or_insert_with(|| lobby_name.to_string());
        }
        Ok(())
    }

    pub async fn change_ball_count(&self, lobby_name: &str, ball_count: usize) -> Result<(), GameError> {
        self.settings.limits.check_ball_count(ball_count)?;
        self.registry
            .lookup(lobby_name)?
            .send(MatchCommand::ChangeBallCount(ball_count))
            .await
    }

    pub async fn terminate(&self, lobby_name: &str) -> Result<(), GameError> {
        self.registry.lookup(lobby_name)?.send(MatchCommand::Terminate).await
    }

    /// Detach a connection from the lobby the player belongs to
    pub async fn leave(&self, player_id: &str, connection_id: Uuid) -> Result<(), GameError> {
        let Some((_, lobby_name)) = self.memberships.remove(player_id) else {
            return Ok(());
        };
        self.registry
            .lookup(&lobby_name)?
            .send(MatchCommand::Leave { connection_id })
            .await
    }

    pub fn lobbies(&self) -> Vec<LobbySummary> {
        self.registry.summaries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::r#match::test_support::{open_goal_state, two_player_state};
    use crate::game::{MatchLimits, MatchState};
    use crate::store::{MatchResult, RecentResults};
    use crate::util::time::MonotonicClock;
    use crate::ws::protocol::{Outcome, ServerMsg};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_test::assert_ok;

    fn service() -> (LobbyService, Arc<RecentResults>) {
        let recorder = Arc::new(RecentResults::new(8));
        let service = LobbyService::new(
            Arc::new(MatchRegistry::new()),
            recorder.clone(),
            Arc::new(MonotonicClock::new()),
            MatchSettings {
                tick_interval: Duration::from_millis(16),
                snapshot_every: 1,
                limits: MatchLimits {
                    max_players: 8,
                    max_balls: 10,
                },
                command_buffer: 64,
            },
        );
        (service, recorder)
    }

    async fn connect(service: &LobbyService, player_id: &str) -> (Uuid, mpsc::Receiver<ServerMsg>) {
        let (connection, rx) = ConnectionHandle::channel(4096);
        let id = connection.id;
        service
            .register_connection(player_id.to_string(), format!("{player_id}.png"), connection)
            .await;
        (id, rx)
    }

    /// Panics when a finished match is recorded
    struct FailingRecorder;

    impl MatchRecorder for FailingRecorder {
        fn record(&self, result: MatchResult) {
            panic!("cannot store result of {}", result.lobby_name);
        }
    }

    /// Count setups and updates waiting in a receiver
    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> (usize, usize) {
        let (mut setups, mut updates) = (0, 0);
        while let Ok(msg) = rx.try_recv() {
            match msg {
                ServerMsg::GameSetup(_) => setups += 1,
                ServerMsg::GameUpdate(_) => updates += 1,
                _ => {}
            }
        }
        (setups, updates)
    }

    async fn wait_until_gone(service: &LobbyService, lobby_name: &str) {
        for _ in 0..1000 {
            if !service.registry().contains(lobby_name) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(16)).await;
        }
        panic!("lobby {lobby_name} is still registered");
    }

    fn game_over(rx: &mut mpsc::Receiver<ServerMsg>) -> Option<Outcome> {
        let mut outcome = None;
        while let Ok(msg) = rx.try_recv() {
            if let ServerMsg::GameOver { outcome: o } = msg {
                outcome = Some(o);
            }
        }
        outcome
    }

    #[tokio::test(start_paused = true)]
    async fn goal_removes_match_from_registry() {
        let (service, recorder) = service();
        let (alice, mut alice_rx) = ConnectionHandle::channel(4096);
        let (bob, mut bob_rx) = ConnectionHandle::channel(4096);
        let (game_match, handle) = GameMatch::with_state(
            open_goal_state(),
            vec![alice, bob],
            service.settings(),
            Arc::new(MonotonicClock::new()),
            recorder.clone(),
        );

        let task = service.launch(game_match, handle).unwrap();
        assert_eq!(service.lobbies().len(), 1);
        assert_ok!(service.start("test-lobby").await);
        task.await.unwrap();

        assert!(!service.registry().contains("test-lobby"));
        assert_eq!(game_over(&mut alice_rx), Some(Outcome::Win));
        assert_eq!(game_over(&mut bob_rx), Some(Outcome::Lose));
        assert_eq!(recorder.len(), 1);
    }

    #[tokio::test]
    async fn unknown_lobby_is_not_found() {
        let (service, _) = service();
        let (connection, _rx) = ConnectionHandle::channel(4);
        let errors = [
            service.start("ghost").await.unwrap_err(),
            service.set_movement("ghost", "a", 10.0).await.unwrap_err(),
            service.add_spectator("ghost", None, connection).await.unwrap_err(),
            service.change_ball_count("ghost", 2).await.unwrap_err(),
            service.terminate("ghost").await.unwrap_err(),
        ];
        for e in errors {
            assert_eq!(e.code(), "not_found");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn create_checks_roster_and_duplicates() {
        let (service, _) = service();
        let _a = connect(&service, "a").await;
        let _b = connect(&service, "b").await;

        let err = service
            .create_lobby("a".into(), "room".into(), 2, 1, vec!["a".into(), "nobody".into()])
            .unwrap_err();
        assert_eq!(err.code(), "unknown_player");

        let err = service
            .create_lobby("a".into(), "room".into(), 3, 1, vec!["a".into(), "b".into()])
            .unwrap_err();
        assert_eq!(err.code(), "configuration_error");

        let summary = service
            .create_lobby("a".into(), "room".into(), 2, 1, vec!["a".into(), "b".into()])
            .unwrap();
        assert_eq!(summary.players, vec!["a".to_string(), "b".to_string()]);
        assert!(!summary.started);
        assert_eq!(service.lobby_of("b").as_deref(), Some("room"));

        let _c = connect(&service, "c").await;
        let err = service
            .create_lobby("c".into(), "room".into(), 1, 1, vec!["c".into()])
            .unwrap_err();
        assert_eq!(err.code(), "duplicate_lobby");

        assert_ok!(service.terminate("room").await);
        wait_until_gone(&service, "room").await;
        assert!(service.lobby_of("a").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn ball_count_and_unknown_movement() {
        let (service, _) = service();
        let _a = connect(&service, "a").await;
        service
            .create_lobby("a".into(), "solo".into(), 1, 1, vec!["a".into()])
            .unwrap();

        assert_ok!(service.set_movement("solo", "unknown-id", 50.0).await);
        assert_ok!(service.change_ball_count("solo", 3).await);
        assert_ok!(service.change_ball_count("solo", 3).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.lobbies()[0].ball_count, 3);

        let err = service.change_ball_count("solo", 11).await.unwrap_err();
        assert_eq!(err.code(), "configuration_error");

        assert_ok!(service.terminate("solo").await);
        wait_until_gone(&service, "solo").await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_of_last_player_abandons_lobby() {
        let (service, recorder) = service();
        let (a_id, _a_rx) = connect(&service, "a").await;
        service
            .create_lobby("a".into(), "solo".into(), 1, 1, vec!["a".into()])
            .unwrap();
        assert_ok!(service.start("solo").await);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Stale connection ids are ignored
        service.unregister_connection("a", Uuid::new_v4()).await;
        assert_eq!(service.connected_players(), 1);

        service.unregister_connection("a", a_id).await;
        assert_eq!(service.connected_players(), 0);
        wait_until_gone(&service, "solo").await;

        let results = recorder.recent();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].reason, crate::ws::protocol::EndReason::Abandoned);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnected_player_keeps_the_lobby() {
        let (service, _) = service();
        let (old_id, old_rx) = connect(&service, "a").await;
        service
            .create_lobby("a".into(), "solo".into(), 1, 1, vec!["a".into()])
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (_, mut new_rx) = connect(&service, "a").await;
        drop(old_rx);
        service.unregister_connection("a", old_id).await;
        assert_eq!(service.connected_players(), 1);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(service.registry().contains("solo"));
        assert_eq!(service.lobby_of("a").as_deref(), Some("solo"));
        let (setups, updates) = drain(&mut new_rx);
        assert_eq!(setups, 1);
        assert!(updates > 0);

        assert_ok!(service.terminate("solo").await);
        wait_until_gone(&service, "solo").await;
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_match_leaves_other_lobbies_running() {
        let (service, recorder) = service();
        let (alice, _alice_rx) = ConnectionHandle::channel(4096);
        let (bob, _bob_rx) = ConnectionHandle::channel(4096);
        let (broken, broken_handle) = GameMatch::with_state(
            two_player_state(1),
            vec![alice, bob],
            service.settings(),
            Arc::new(MonotonicClock::new()),
            Arc::new(FailingRecorder),
        );
        let broken_task = service.launch(broken, broken_handle).unwrap();

        let (carol, mut carol_rx) = ConnectionHandle::channel(4096);
        let other_state = MatchState::new(
            "other".into(),
            "carol".into(),
            1,
            vec![("carol".into(), String::new())],
            3,
        )
        .unwrap();
        let (other, other_handle) = GameMatch::with_state(
            other_state,
            vec![carol],
            service.settings(),
            Arc::new(MonotonicClock::new()),
            recorder.clone(),
        );
        let _other_task = service.launch(other, other_handle).unwrap();
        assert_eq!(service.lobby_of("alice").as_deref(), Some("test-lobby"));

        assert_ok!(service.start("test-lobby").await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Recording the result of a started match panics inside the task
        let _ = service.terminate("test-lobby").await;
        broken_task.await.unwrap();

        assert!(!service.registry().contains("test-lobby"));
        assert!(service.lobby_of("alice").is_none());
        assert!(service.lobby_of("bob").is_none());

        assert!(service.registry().contains("other"));
        assert_eq!(service.lobby_of("carol").as_deref(), Some("other"));
        drain(&mut carol_rx);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let (_, updates) = drain(&mut carol_rx);
        assert!(updates > 0);
        assert!(recorder.is_empty());

        assert_ok!(service.terminate("other").await);
        wait_until_gone(&service, "other").await;
    }
}
