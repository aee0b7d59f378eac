//! Per-conversation turn exclusion.
//!
//! At most one turn streams on a conversation at a time. A claim is taken
//! before the user message is written and released when the turn stream is
//! dropped, whichever way the turn ended.

use std::sync::Arc;

use dashmap::DashSet;
use uuid::Uuid;

/// Registry of conversations with a turn in flight.
#[derive(Debug, Clone, Default)]
pub struct TurnLocks {
    active: Arc<DashSet<Uuid>>,
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `conversation_id` for one turn. Returns `None` if another turn
    /// already holds it.
    pub fn try_claim(&self, conversation_id: Uuid) -> Option<TurnClaim> {
        if !self.active.insert(conversation_id) {
            return None;
        }
        Some(TurnClaim {
            conversation_id,
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self, conversation_id: &Uuid) -> bool {
        self.active.contains(conversation_id)
    }
}

/// Held for the lifetime of one turn; releases the conversation on drop.
#[derive(Debug)]
pub struct TurnClaim {
    conversation_id: Uuid,
    active: Arc<DashSet<Uuid>>,
}

impl Drop for TurnClaim {
    fn drop(&mut self) {
        self.active.remove(&self.conversation_id);
    }
}
