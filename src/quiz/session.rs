//! Per-user quiz sessions and the table that holds them.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

/// How questions are ordered once a quiz starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderMode {
    Ordered,
    Random,
}

/// Lifecycle phase of a session. `Completed` is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingTopic,
    AwaitingOrder,
    InProgress,
    Completed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingTopic => "awaiting topic",
            Self::AwaitingOrder => "awaiting order",
            Self::InProgress => "in progress",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Answering state of a running quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub topic: String,
    /// Permutation of the topic's question indices.
    pub order: Vec<usize>,
    pub position: usize,
    pub score: usize,
}

impl Progress {
    pub fn new(topic: String, order: Vec<usize>) -> Self {
        Self { topic, order, position: 0, score: 0 }
    }

    pub fn total(&self) -> usize {
        self.order.len()
    }

    /// Index into the topic of the question being asked, if any remain.
    pub fn current(&self) -> Option<usize> {
        self.order.get(self.position).copied()
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.order.len()
    }
}

/// One user's quiz session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    /// Waiting for a topic. `preset` skips the order question when set.
    AwaitingTopic { preset: Option<OrderMode> },
    AwaitingOrder { topic: String },
    InProgress(Progress),
}

impl Session {
    pub fn fresh() -> Self {
        Self::AwaitingTopic { preset: None }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Self::AwaitingTopic { .. } => Phase::AwaitingTopic,
            Self::AwaitingOrder { .. } => Phase::AwaitingOrder,
            Self::InProgress(_) => Phase::InProgress,
        }
    }

    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::AwaitingTopic { .. } => None,
            Self::AwaitingOrder { topic } => Some(topic),
            Self::InProgress(p) => Some(&p.topic),
        }
    }

    pub fn progress(&self) -> Option<&Progress> {
        match self {
            Self::InProgress(p) => Some(p),
            _ => None,
        }
    }
}

/// Exclusive slot for one user's session. `None` means no session.
pub type SessionSlot = Arc<AsyncMutex<Option<Session>>>;

/// Sessions keyed by user id, locked per user.
///
/// The table mutex only guards slot lookup, insertion and removal and is
/// never held across an await point. Transitions lock the user's slot.
#[derive(Default)]
pub struct SessionTable {
    slots: Mutex<HashMap<i64, SessionSlot>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the user's slot, creating an empty one if needed.
    pub fn slot(&self, user_id: i64) -> SessionSlot {
        let mut slots = self.slots.lock().expect("session table lock poisoned");
        slots.entry(user_id).or_default().clone()
    }

    /// Drop the user's slot if it is empty and nobody else holds it.
    pub fn prune(&self, user_id: i64) {
        let mut slots = self.slots.lock().expect("session table lock poisoned");
        let removable = match slots.get(&user_id) {
            Some(slot) => {
                Arc::strong_count(slot) == 1
                    && slot.try_lock().map(|s| s.is_none()).unwrap_or(false)
            }
            None => false,
        };
        if removable {
            slots.remove(&user_id);
        }
    }

    /// Snapshot of the user's session, if one exists and is not locked.
    ///
    /// The table lock is held while reading so the snapshot never keeps a
    /// slot alive past a concurrent `prune`.
    pub fn get(&self, user_id: i64) -> Option<Session> {
        let slots = self.slots.lock().expect("session table lock poisoned");
        let guard = slots.get(&user_id)?.try_lock().ok()?;
        guard.clone()
    }

    /// Number of users with a live session.
    ///
    /// A slot locked by an in-flight transition counts as live, since its
    /// outcome is not known yet.
    pub fn active(&self) -> usize {
        let slots = self.slots.lock().expect("session table lock poisoned");
        slots
            .values()
            .filter(|slot| slot.try_lock().map(|s| s.is_some()).unwrap_or(true))
            .count()
    }

    /// Number of allocated slots, including empty ones still in use.
    pub fn slot_count(&self) -> usize {
        self.slots.lock().expect("session table lock poisoned").len()
    }
}
