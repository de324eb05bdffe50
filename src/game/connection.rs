//! Delivery handle for a player or spectator connection

use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

/// What happened to a message handed to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Receiver is behind; this message was skipped
    Dropped,
    /// Receiver is gone
    Closed,
}

/// Cheap, cloneable sender side of one connection's outbound queue
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    tx: mpsc::Sender<ServerMsg>,
}

impl ConnectionHandle {
    /// New connection with a bounded outbound queue
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerMsg>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    /// Queue a message without waiting
    pub fn deliver(&self, msg: ServerMsg) -> Delivery {
        match self.tx.try_send(msg) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
