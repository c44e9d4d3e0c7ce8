//! Routes events to the state machine, one transition per user at a time.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::quiz::bank::QuestionBank;
use crate::quiz::machine::{transition, Effect, Event, Shuffler};
use crate::quiz::session::{Phase, Session, SessionTable};
use crate::quiz::transport::Transport;

/// Owns the session table and drives transitions.
pub struct Dispatcher<T> {
    bank: Arc<QuestionBank>,
    sessions: SessionTable,
    shuffler: Arc<dyn Shuffler>,
    transport: T,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(bank: Arc<QuestionBank>, shuffler: Arc<dyn Shuffler>, transport: T) -> Self {
        Self {
            bank,
            sessions: SessionTable::new(),
            shuffler,
            transport,
        }
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Snapshot of a user's session.
    pub fn session(&self, user_id: i64) -> Option<Session> {
        self.sessions.get(user_id)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.active()
    }

    /// Run one transition for `user_id` and store the result.
    ///
    /// Events for the same user are serialized on the user's slot lock;
    /// other users are not blocked.
    pub async fn apply(&self, user_id: i64, event: Event) -> Vec<Effect> {
        let slot = self.sessions.slot(user_id);
        let effects = {
            let mut guard = slot.lock().await;
            let before = guard.as_ref().map(Session::phase);
            let label = format!("{:?}", event);

            let result = transition(&self.bank, guard.take(), event, self.shuffler.as_ref());
            let after = result.session.as_ref().map(Session::phase);
            log_transition(user_id, before, after, &label, &result.session);

            *guard = result.session;
            result.effects
        };
        drop(slot);
        self.sessions.prune(user_id);
        effects
    }

    /// Apply the event and deliver the effects to `chat_id`.
    ///
    /// Delivery happens after the slot lock is released. A failed send is
    /// logged and does not undo the transition.
    pub async fn handle(&self, user_id: i64, chat_id: i64, event: Event) {
        let effects = self.apply(user_id, event).await;
        for effect in &effects {
            if let Err(e) = self.transport.send(chat_id, effect).await {
                warn!("Failed to deliver effect to chat {} (user {}): {}", chat_id, user_id, e);
            }
        }
    }
}

fn log_transition(
    user_id: i64,
    before: Option<Phase>,
    after: Option<Phase>,
    event: &str,
    session: &Option<Session>,
) {
    match (before, after, session) {
        (Some(Phase::InProgress), None, _) => {
            info!("User {} is {}", user_id, Phase::Completed);
        }
        (_, Some(Phase::InProgress), Some(Session::InProgress(p))) if before != after => {
            info!(
                "User {} started topic '{}' ({} questions, order {:?})",
                user_id,
                p.topic,
                p.total(),
                p.order
            );
        }
        _ if before == after => debug!("User {} stays {} on {}", user_id, describe(before), event),
        _ => info!("User {}: {} -> {} on {}", user_id, describe(before), describe(after), event),
    }
}

fn describe(phase: Option<Phase>) -> String {
    phase.map(|p| p.to_string()).unwrap_or_else(|| "no session".to_string())
}
