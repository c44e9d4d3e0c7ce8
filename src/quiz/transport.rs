//! Delivery of effects to users.

use std::future::Future;

use crate::quiz::machine::Effect;

/// Delivers effects to a chat.
///
/// Errors are reported as strings; the dispatcher logs them and moves on.
pub trait Transport: Send + Sync {
    fn send(&self, chat_id: i64, effect: &Effect) -> impl Future<Output = Result<(), String>> + Send;
}
