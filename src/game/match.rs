//! Match state and authoritative tick loop

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::RwLock;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::{MatchRecorder, MatchResult};
use crate::util::time::{Clock, TickPacer};
use crate::ws::protocol::{EndReason, LobbySummary, Outcome, ServerMsg};

use super::ball::{Ball, BALL_RADIUS};
use super::collision::Collision;
use super::connection::{ConnectionHandle, Delivery};
use super::error::GameError;
use super::field::Field;
use super::profile::Profile;
use super::racket::Racket;
use super::snapshot::SnapshotBuilder;
use super::PlayerId;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Being assembled
    Created,
    /// Rackets may move, balls wait
    WaitingToStart,
    /// Balls in play
    Running,
    /// Loop has exited
    Terminated,
}

/// Upper bounds enforced on lobby configuration
#[derive(Debug, Clone, Copy)]
pub struct MatchLimits {
    pub max_players: usize,
    pub max_balls: usize,
}

impl MatchLimits {
    pub fn check_ball_count(&self, ball_count: usize) -> Result<(), GameError> {
        if ball_count == 0 || ball_count > self.max_balls {
            return Err(GameError::Configuration(format!(
                "ball count must be between 1 and {}, got {ball_count}",
                self.max_balls
            )));
        }
        Ok(())
    }
}

/// Runtime knobs shared by every match
#[derive(Debug, Clone)]
pub struct MatchSettings {
    pub tick_interval: Duration,
    /// Send a compact snapshot every N ticks
    pub snapshot_every: u32,
    pub limits: MatchLimits,
    pub command_buffer: usize,
}

/// One seat of the roster
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub player_id: PlayerId,
    pub avatar: String,
    pub connection: ConnectionHandle,
}

/// Everything needed to create a match
#[derive(Debug, Clone)]
pub struct MatchSpec {
    pub lobby_name: String,
    pub owner_id: PlayerId,
    pub player_count: usize,
    pub ball_count: usize,
    /// Players in seat order
    pub roster: Vec<RosterEntry>,
}

impl MatchSpec {
    pub fn validate(&self, limits: &MatchLimits) -> Result<(), GameError> {
        if self.lobby_name.trim().is_empty() {
            return Err(GameError::Configuration("lobby name is empty".to_string()));
        }
        if self.player_count == 0 || self.player_count > limits.max_players {
            return Err(GameError::Configuration(format!(
                "player count must be between 1 and {}, got {}",
                limits.max_players, self.player_count
            )));
        }
        limits.check_ball_count(self.ball_count)?;
        if self.roster.len() != self.player_count {
            return Err(GameError::Configuration(format!(
                "roster has {} players, expected {}",
                self.roster.len(),
                self.player_count
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.roster.iter().find(|e| !seen.insert(&e.player_id)) {
            return Err(GameError::Configuration(format!(
                "player {} appears twice in the roster",
                dup.player_id
            )));
        }
        Ok(())
    }
}

/// Simulation state (owned by match task)
pub struct MatchState {
    pub lobby_name: String,
    pub owner_id: PlayerId,
    pub phase: MatchPhase,
    pub started: bool,
    pub tick: u64,
    pub field: Field,
    /// Indexed by seat
    pub rackets: Vec<Racket>,
    /// Indexed by seat
    pub profiles: Vec<Profile>,
    pub balls: Vec<Ball>,
    pub rng: ChaCha8Rng,
}

impl MatchState {
    /// Build the field, one racket and profile per seat, and `ball_count` served balls.
    /// `seats` holds (player id, avatar) in seat order.
    pub fn new(
        lobby_name: String,
        owner_id: PlayerId,
        ball_count: usize,
        seats: Vec<(PlayerId, String)>,
        seed: u64,
    ) -> Result<Self, GameError> {
        if ball_count == 0 {
            return Err(GameError::Configuration(
                "a match needs at least one ball".to_string(),
            ));
        }
        let field = Field::build(seats.len())?;

        let mut rackets = Vec::with_capacity(seats.len());
        let mut profiles = Vec::with_capacity(seats.len());
        for ((player_id, avatar), edge) in seats.into_iter().zip(field.goal_edges()) {
            let seat = profiles.len();
            rackets.push(Racket::for_edge(edge, seat));
            profiles.push(Profile::new(player_id, avatar, edge, seat));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let balls = (0..ball_count).map(|_| Ball::serve(&field, &mut rng)).collect();

        Ok(Self {
            lobby_name,
            owner_id,
            phase: MatchPhase::Created,
            started: false,
            tick: 0,
            field,
            rackets,
            profiles,
            balls,
            rng,
        })
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.profiles.iter().map(|p| p.player_id.clone()).collect()
    }

    pub fn scores(&self) -> Vec<i32> {
        self.profiles.iter().map(|p| p.score).collect()
    }

    /// Store a movement intent. Unknown players are ignored (returns false).
    pub fn set_movement(&mut self, player_id: &str, percent: f32) -> bool {
        match self.profiles.iter_mut().find(|p| p.player_id == player_id) {
            Some(profile) => {
                profile.set_movement(percent);
                true
            }
            None => false,
        }
    }

    /// Returns true when this call started the match
    pub fn start(&mut self) -> bool {
        if self.started {
            return false;
        }
        self.started = true;
        self.phase = MatchPhase::Running;
        true
    }

    /// Grow or shrink the ball list to `count`, leaving existing balls alone.
    /// Returns whether anything changed.
    pub fn set_ball_count(&mut self, count: usize) -> Result<bool, GameError> {
        if count == 0 {
            return Err(GameError::Configuration(
                "a match needs at least one ball".to_string(),
            ));
        }
        let before = self.balls.len();
        while self.balls.len() < count {
            let ball = Ball::serve(&self.field, &mut self.rng);
            self.balls.push(ball);
        }
        self.balls.truncate(count);
        Ok(before != count)
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// Rackets slide first, then each ball moves and is checked against the
    /// field. Returns the seat that conceded, if any; the scan stops there.
    pub fn step(&mut self, dt: f32) -> Option<usize> {
        self.tick += 1;

        for (racket, profile) in self.rackets.iter_mut().zip(&self.profiles) {
            if let Some(edge) = self.field.goal_edge(racket.seat) {
                racket.slide(profile.movement, edge, dt);
            }
        }

        if !self.started {
            return None;
        }

        for ball in &mut self.balls {
            ball.integrate(dt);
            if let Some(Collision::Goal { seat }) = ball.detect_collision(&self.field, &self.rackets)
            {
                return Some(seat);
            }
            if self.field.is_outside(ball.position, BALL_RADIUS * 2.0) {
                warn!(lobby = %self.lobby_name, "Ball escaped the field, serving again");
                *ball = Ball::serve(&self.field, &mut self.rng);
            }
        }
        None
    }

    /// Apply a conceded goal to the scores and work out who is told what.
    ///
    /// Alone, the player loses. Two players: the other one wins. With more
    /// players only the conceder is told; the match still ends.
    pub fn resolve_goal(&mut self, seat: usize) -> Vec<(PlayerId, Outcome)> {
        for profile in &mut self.profiles {
            if profile.seat == seat {
                profile.concede();
            } else {
                profile.award_point();
            }
        }

        let conceder = match self.profiles.get(seat) {
            Some(p) => p.player_id.clone(),
            None => return Vec::new(),
        };
        match self.profiles.len() {
            2 => self
                .profiles
                .iter()
                .map(|p| {
                    let outcome = if p.seat == seat {
                        Outcome::Lose
                    } else {
                        Outcome::Win
                    };
                    (p.player_id.clone(), outcome)
                })
                .collect(),
            _ => vec![(conceder, Outcome::Lose)],
        }
    }
}

/// Requests applied by the match task between ticks
#[derive(Debug)]
pub enum MatchCommand {
    SetMovement { player_id: PlayerId, percent: f32 },
    Start,
    AddSpectator(ConnectionHandle),
    ChangeBallCount(usize),
    /// A player came back on a new connection; their seat follows it
    Reconnect {
        player_id: PlayerId,
        connection: ConnectionHandle,
    },
    /// A connection (player or spectator) went away
    Leave { connection_id: Uuid },
    Terminate,
}

/// Handle to a running match
#[derive(Debug, Clone)]
pub struct MatchHandle {
    pub lobby_name: String,
    command_tx: mpsc::Sender<MatchCommand>,
    summary: Arc<RwLock<LobbySummary>>,
}

impl MatchHandle {
    pub fn summary(&self) -> LobbySummary {
        self.summary.read().clone()
    }

    /// Players still connected
    pub fn player_count(&self) -> usize {
        self.summary.read().players.len()
    }

    pub async fn send(&self, command: MatchCommand) -> Result<(), GameError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| GameError::MatchClosed(self.lobby_name.clone()))
    }
}

/// Registry of all active matches, keyed by lobby name
pub struct MatchRegistry {
    matches: DashMap<String, MatchHandle>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn get(&self, lobby_name: &str) -> Option<MatchHandle> {
        self.matches.get(lobby_name).map(|m| m.value().clone())
    }

    pub fn lookup(&self, lobby_name: &str) -> Result<MatchHandle, GameError> {
        self.get(lobby_name)
            .ok_or_else(|| GameError::NotFound(lobby_name.to_string()))
    }

    /// Insert unless the name is taken
    pub fn insert(&self, handle: MatchHandle) -> Result<(), GameError> {
        match self.matches.entry(handle.lobby_name.clone()) {
            Entry::Occupied(entry) => Err(GameError::DuplicateLobby(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(handle);
                Ok(())
            }
        }
    }

    pub fn contains(&self, lobby_name: &str) -> bool {
        self.matches.contains_key(lobby_name)
    }

    pub fn remove(&self, lobby_name: &str) -> Option<MatchHandle> {
        self.matches.remove(lobby_name).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.matches
            .iter()
            .map(|m| m.value().player_count())
            .sum()
    }

    /// Lobby summaries sorted by name
    pub fn summaries(&self) -> Vec<LobbySummary> {
        let mut summaries: Vec<LobbySummary> =
            self.matches.iter().map(|m| m.value().summary()).collect();
        summaries.sort_by(|a, b| a.lobby_name.cmp(&b.lobby_name));
        summaries
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A player seat's connection, `None` once it left
struct Seat {
    player_id: PlayerId,
    connection: Option<ConnectionHandle>,
}

/// The authoritative game match
pub struct GameMatch {
    state: MatchState,
    seats: Vec<Seat>,
    spectators: Vec<ConnectionHandle>,
    command_rx: mpsc::Receiver<MatchCommand>,
    summary: Arc<RwLock<LobbySummary>>,
    snapshot_builder: SnapshotBuilder,
    pacer: TickPacer,
    clock: Arc<dyn Clock>,
    recorder: Arc<dyn MatchRecorder>,
    running: bool,
    end_reason: Option<EndReason>,
    started_clock: Option<Duration>,
    started_at: Option<DateTime<Utc>>,
}

impl GameMatch {
    /// Create a new match, checking the roster against `settings.limits`
    pub fn new(
        spec: MatchSpec,
        settings: &MatchSettings,
        clock: Arc<dyn Clock>,
        recorder: Arc<dyn MatchRecorder>,
    ) -> Result<(Self, MatchHandle), GameError> {
        spec.validate(&settings.limits)?;

        let seats = spec
            .roster
            .iter()
            .map(|entry| (entry.player_id.clone(), entry.avatar.clone()))
            .collect();
        let state = MatchState::new(
            spec.lobby_name,
            spec.owner_id,
            spec.ball_count,
            seats,
            rand::random::<u64>(),
        )?;
        let connections = spec.roster.into_iter().map(|entry| entry.connection).collect();

        Ok(Self::with_state(state, connections, settings, clock, recorder))
    }

    /// Wrap an already built state. `connections` are in seat order.
    pub fn with_state(
        state: MatchState,
        connections: Vec<ConnectionHandle>,
        settings: &MatchSettings,
        clock: Arc<dyn Clock>,
        recorder: Arc<dyn MatchRecorder>,
    ) -> (Self, MatchHandle) {
        let (command_tx, command_rx) = mpsc::channel(settings.command_buffer.max(1));

        let seats: Vec<Seat> = state
            .profiles
            .iter()
            .zip(connections.into_iter().map(Some).chain(std::iter::repeat_with(|| None)))
            .map(|(profile, connection)| Seat {
                player_id: profile.player_id.clone(),
                connection,
            })
            .collect();

        let summary = Arc::new(RwLock::new(LobbySummary {
            lobby_name: state.lobby_name.clone(),
            owner_id: state.owner_id.clone(),
            players: seats
                .iter()
                .filter(|s| s.connection.is_some())
                .map(|s| s.player_id.clone())
                .collect(),
            player_count: state.profiles.len(),
            ball_count: state.balls.len(),
            started: state.started,
        }));

        let handle = MatchHandle {
            lobby_name: state.lobby_name.clone(),
            command_tx,
            summary: summary.clone(),
        };

        let game_match = Self {
            state,
            seats,
            spectators: Vec::new(),
            command_rx,
            summary,
            snapshot_builder: SnapshotBuilder::new(settings.snapshot_every),
            pacer: TickPacer::new(settings.tick_interval),
            clock,
            recorder,
            running: true,
            end_reason: None,
            started_clock: None,
            started_at: None,
        };

        (game_match, handle)
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Run the authoritative tick loop until a terminal condition.
    /// Returns the recorded result when the match had started.
    pub async fn run(mut self) -> Option<MatchResult> {
        info!(
            lobby = %self.state.lobby_name,
            players = self.state.profiles.len(),
            balls = self.state.balls.len(),
            "Match loop started"
        );

        let setup = SnapshotBuilder::build_setup(&self.state);
        self.broadcast(ServerMsg::GameSetup(setup));
        if self.state.phase == MatchPhase::Created {
            self.state.phase = MatchPhase::WaitingToStart;
        }

        loop {
            let tick_start = self.clock.now();
            let elapsed = self.pacer.begin_tick(tick_start);

            // Drain commands before touching the simulation
            self.process_commands();
            if !self.running {
                break;
            }

            let conceded = self.state.step(elapsed.as_secs_f32());
            if conceded.is_some() {
                self.snapshot_builder.force_next();
            }

            if self.snapshot_builder.should_send() {
                let update = SnapshotBuilder::build_update(&self.state);
                self.broadcast(ServerMsg::GameUpdate(update));
            }

            if let Some(seat) = conceded {
                self.handle_goal(seat);
                break;
            }

            if self.all_players_gone() {
                info!(lobby = %self.state.lobby_name, "All players left, ending match");
                self.end_reason = Some(EndReason::Abandoned);
                break;
            }

            let processing = self.clock.now().saturating_sub(tick_start);
            tokio::time::sleep(self.pacer.delay_after(processing)).await;
        }

        self.finish()
    }

    /// Apply every queued command
    fn process_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(command) => self.apply_command(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.stop(EndReason::Terminated);
                    break;
                }
            }
        }
    }

    fn apply_command(&mut self, command: MatchCommand) {
        match command {
            MatchCommand::SetMovement { player_id, percent } => {
                if !self.state.set_movement(&player_id, percent) {
                    debug!(
                        lobby = %self.state.lobby_name,
                        player_id = %player_id,
                        "Ignoring movement for unknown player"
                    );
                }
            }
            MatchCommand::Start => {
                if self.state.start() {
                    self.started_clock = Some(self.clock.now());
                    self.started_at = Some(Utc::now());
                    self.summary.write().started = true;
                    info!(lobby = %self.state.lobby_name, "Match started!");
                }
            }
            MatchCommand::AddSpectator(connection) => {
                let setup = SnapshotBuilder::build_setup(&self.state);
                if connection.deliver(ServerMsg::GameSetup(setup)) != Delivery::Closed {
                    info!(
                        lobby = %self.state.lobby_name,
                        connection_id = %connection.id,
                        "Spectator joined"
                    );
                    self.spectators.push(connection);
                }
            }
            MatchCommand::ChangeBallCount(count) => match self.state.set_ball_count(count) {
                Ok(true) => {
                    self.summary.write().ball_count = self.state.balls.len();
                    let setup = SnapshotBuilder::build_setup(&self.state);
                    self.broadcast(ServerMsg::GameSetup(setup));
                    info!(lobby = %self.state.lobby_name, balls = count, "Ball count changed");
                }
                Ok(false) => {}
                Err(e) => warn!(lobby = %self.state.lobby_name, error = %e, "Rejected ball count"),
            },
            MatchCommand::Reconnect {
                player_id,
                connection,
            } => self.reattach(&player_id, connection),
            MatchCommand::Leave { connection_id } => self.detach(connection_id),
            MatchCommand::Terminate => {
                info!(lobby = %self.state.lobby_name, "Termination requested");
                self.stop(EndReason::Terminated);
            }
        }
    }

    fn stop(&mut self, reason: EndReason) {
        self.running = false;
        self.end_reason.get_or_insert(reason);
    }

    /// Point a player's seat at a new connection and bring it up to date
    fn reattach(&mut self, player_id: &str, connection: ConnectionHandle) {
        let Some(seat) = self.seats.iter_mut().find(|s| s.player_id == player_id) else {
            debug!(
                lobby = %self.state.lobby_name,
                player_id = %player_id,
                "Reconnect for a player without a seat"
            );
            return;
        };
        let setup = SnapshotBuilder::build_setup(&self.state);
        connection.deliver(ServerMsg::GameSetup(setup));
        seat.connection = Some(connection);
        info!(
            lobby = %self.state.lobby_name,
            player_id = %player_id,
            "Player reconnected to match"
        );
        self.refresh_players();
    }

    /// Forget a connection, whether it played or watched
    fn detach(&mut self, connection_id: Uuid) {
        self.spectators.retain(|c| c.id != connection_id);
        for seat in &mut self.seats {
            if seat.connection.as_ref().map(|c| c.id) == Some(connection_id) {
                seat.connection = None;
                info!(
                    lobby = %self.state.lobby_name,
                    player_id = %seat.player_id,
                    "Player left match"
                );
            }
        }
        self.refresh_players();
    }

    fn refresh_players(&self) {
        let players = self
            .seats
            .iter()
            .filter(|s| s.connection.is_some())
            .map(|s| s.player_id.clone())
            .collect();
        self.summary.write().players = players;
    }

    fn all_players_gone(&self) -> bool {
        self.seats
            .iter()
            .all(|s| s.connection.as_ref().map_or(true, ConnectionHandle::is_closed))
    }

    /// Fire-and-forget delivery to every connection; closed ones are dropped
    fn broadcast(&mut self, msg: ServerMsg) {
        let mut seat_closed = false;
        for seat in &mut self.seats {
            if let Some(connection) = &seat.connection {
                match connection.deliver(msg.clone()) {
                    Delivery::Delivered => {}
                    Delivery::Dropped => {
                        debug!(player_id = %seat.player_id, "Outbound queue full, message dropped")
                    }
                    Delivery::Closed => {
                        seat.connection = None;
                        seat_closed = true;
                    }
                }
            }
        }
        self.spectators
            .retain(|c| c.deliver(msg.clone()) != Delivery::Closed);
        if seat_closed {
            self.refresh_players();
        }
    }

    fn send_to(&self, player_id: &str, msg: ServerMsg) {
        let connection = self
            .seats
            .iter()
            .find(|s| s.player_id == player_id)
            .and_then(|s| s.connection.as_ref());
        if let Some(connection) = connection {
            if connection.deliver(msg) != Delivery::Delivered {
                warn!(player_id = %player_id, "Could not deliver result");
            }
        }
    }

    fn handle_goal(&mut self, seat: usize) {
        let outcomes = self.state.resolve_goal(seat);
        let conceder = self
            .state
            .profiles
            .get(seat)
            .map(|p| p.player_id.clone())
            .unwrap_or_default();
        info!(lobby = %self.state.lobby_name, conceder = %conceder, "Goal conceded");

        for (player_id, outcome) in outcomes {
            self.send_to(&player_id, ServerMsg::GameOver { outcome });
        }
        self.stop(EndReason::Goal { conceder });
    }

    /// Tear down: notify every connection and hand the result to the recorder
    fn finish(mut self) -> Option<MatchResult> {
        self.running = false;
        self.state.phase = MatchPhase::Terminated;
        let reason = self.end_reason.take().unwrap_or(EndReason::Terminated);

        self.broadcast(ServerMsg::MatchEnd {
            lobby_name: self.state.lobby_name.clone(),
            reason: reason.clone(),
            players: self.state.player_ids(),
            scores: self.state.scores(),
        });

        let result = match (self.started_at, self.started_clock) {
            (Some(started_at), Some(started_clock)) => {
                let duration = self.clock.now().saturating_sub(started_clock);
                let result = MatchResult {
                    lobby_name: self.state.lobby_name.clone(),
                    players: self.state.player_ids(),
                    scores: self.state.scores(),
                    duration_ms: duration.as_millis() as u64,
                    started_at,
                    ended_at: Utc::now(),
                    reason: reason.clone(),
                };
                self.recorder.record(result.clone());
                Some(result)
            }
            _ => None,
        };

        info!(
            lobby = %self.state.lobby_name,
            reason = ?reason,
            ticks = self.state.tick,
            "Match ended"
        );
        result
    }
}
