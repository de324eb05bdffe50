//! Snapshot building for network transmission

use crate::ws::protocol::{
    BallSnapshot, EdgeSnapshot, GameSetup, GameUpdate, Position, ProfileSnapshot, ProfileUpdate,
    RacketSnapshot,
};

use super::r#match::MatchState;

/// Decides when per-tick snapshots go out and builds them
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for important events)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Everything a client needs to draw the match from scratch
    pub fn build_setup(state: &MatchState) -> GameSetup {
        GameSetup {
            field_edges: state
                .field
                .edges
                .iter()
                .map(|edge| {
                    let end = edge.end();
                    EdgeSnapshot {
                        index: edge.index,
                        kind: edge.kind,
                        x: edge.anchor.x,
                        y: edge.anchor.y,
                        end_x: end.x,
                        end_y: end.y,
                        length: edge.length,
                        angle: edge.angle_degrees,
                    }
                })
                .collect(),
            rackets: state
                .rackets
                .iter()
                .map(|r| RacketSnapshot {
                    x: r.position.x,
                    y: r.position.y,
                    length: r.length,
                    angle: r.angle_degrees,
                })
                .collect(),
            profiles: state
                .profiles
                .iter()
                .map(|p| ProfileSnapshot {
                    player_id: p.player_id.clone(),
                    avatar: p.avatar.clone(),
                    x: p.anchor.x,
                    y: p.anchor.y,
                    rotation: p.rotation_degrees,
                    score: p.score,
                    eliminated: p.eliminated,
                })
                .collect(),
            balls: state
                .balls
                .iter()
                .map(|b| BallSnapshot {
                    x: b.position.x,
                    y: b.position.y,
                    radius: b.radius,
                })
                .collect(),
            started: state.started,
        }
    }

    /// Moving parts only
    pub fn build_update(state: &MatchState) -> GameUpdate {
        GameUpdate {
            started: state.started,
            balls: state
                .balls
                .iter()
                .map(|b| Position {
                    x: b.position.x,
                    y: b.position.y,
                })
                .collect(),
            rackets: state
                .rackets
                .iter()
                .map(|r| Position {
                    x: r.position.x,
                    y: r.position.y,
                })
                .collect(),
            profiles: state
                .profiles
                .iter()
                .map(|p| ProfileUpdate {
                    x: p.anchor.x,
                    y: p.anchor.y,
                    rotation: p.rotation_degrees,
                    score: p.score,
                    eliminated: p.eliminated,
                })
                .collect(),
        }
    }
}
