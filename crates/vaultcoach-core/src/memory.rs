//! Per-session conversation memory. Sessions are explicit: the store hands the
//! composer an immutable snapshot and the gateway records the finished exchange
//! afterwards, so concurrent callers on different sessions never interleave.

use std::collections::VecDeque;

use dashmap::DashMap;

use crate::prompt::ChatTurn;

/// Turns replayed into a prompt (the most recent exchanges).
pub const HISTORY_REPLAY_LIMIT: usize = 3;

/// Turns retained per session (3 user + 3 assistant).
pub const HISTORY_RETAIN_LIMIT: usize = 6;

/// Rolling history for one session, capped at [`HISTORY_RETAIN_LIMIT`] turns.
#[derive(Debug, Default, Clone)]
pub struct SessionContext {
    turns: VecDeque<ChatTurn>,
}

impl SessionContext {
    /// Snapshot of the retained turns, oldest first.
    pub fn turns(&self) -> Vec<ChatTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Appends a completed exchange and truncates to the retention cap.
    pub fn record_exchange(&mut self, question: &str, reply: &str) {
        self.turns.push_back(ChatTurn::user(question));
        self.turns.push_back(ChatTurn::assistant(reply));
        while self.turns.len() > HISTORY_RETAIN_LIMIT {
            self.turns.pop_front();
        }
    }
}

/// Session store keyed by the caller-supplied session id. Owns persistence of
/// the rolling histories; the composer only ever sees snapshots.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionContext>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// History snapshot for a session; empty for unseen ids.
    pub fn snapshot(&self, session_id: &str) -> Vec<ChatTurn> {
        self.sessions
            .get(session_id)
            .map(|ctx| ctx.turns())
            .unwrap_or_default()
    }

    pub fn record_exchange(&self, session_id: &str, question: &str, reply: &str) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .record_exchange(question, reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_never_exceeds_six_turns() {
        let store = SessionStore::new();
        for i in 0..10 {
            store.record_exchange("s1", &format!("q{i}"), &format!("a{i}"));
        }
        let turns = store.snapshot("s1");
        assert_eq!(turns.len(), HISTORY_RETAIN_LIMIT);
        // Oldest retained turn is the user half of exchange 7.
        assert_eq!(turns[0].content, "q7");
        assert_eq!(turns[5].content, "a9");
    }

    #[test]
    fn sessions_are_isolated() {
        let store = SessionStore::new();
        store.record_exchange("alice", "hi", "hello");
        store.record_exchange("bob", "yo", "hey");
        assert_eq!(store.snapshot("alice").len(), 2);
        assert_eq!(store.snapshot("alice")[0].content, "hi");
        assert_eq!(store.snapshot("bob")[0].content, "yo");
        assert!(store.snapshot("carol").is_empty());
    }
}
