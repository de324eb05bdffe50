//! Finished match records handed to persistence

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::info;

use crate::game::PlayerId;
use crate::ws::protocol::EndReason;

/// Final record of a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub lobby_name: String,
    /// Players in seat order
    pub players: Vec<PlayerId>,
    /// Scores aligned with `players`
    pub scores: Vec<i32>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub reason: EndReason,
}

/// Sink for finished matches
pub trait MatchRecorder: Send + Sync {
    fn record(&self, result: MatchResult);
}

/// Keeps the most recent results in memory
pub struct RecentResults {
    capacity: usize,
    results: Mutex<VecDeque<MatchResult>>,
}

impl RecentResults {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            results: Mutex::new(VecDeque::new()),
        }
    }

    /// Newest first
    pub fn recent(&self) -> Vec<MatchResult> {
        self.results.lock().iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MatchRecorder for RecentResults {
    fn record(&self, result: MatchResult) {
        info!(
            lobby = %result.lobby_name,
            players = ?result.players,
            scores = ?result.scores,
            duration_ms = result.duration_ms,
            "Match result recorded"
        );
        let mut results = self.results.lock();
        if results.len() == self.capacity {
            results.pop_front();
        }
        results.push_back(result);
    }
}
