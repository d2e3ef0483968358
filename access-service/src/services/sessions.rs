//! In-process store of pending verification sessions, one per phone.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::models::VerificationSession;

/// Result of presenting a code against the store.
#[derive(Debug)]
pub enum ConsumeOutcome {
    /// The code matched; the session has been removed.
    Consumed(VerificationSession),
    /// Wrong code. `remaining` is how many more wrong codes the session takes
    /// before it is destroyed.
    Rejected { remaining: u32 },
    /// No live session for this phone and token.
    NotFound,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, VerificationSession>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `session`, replacing any session already held for its phone.
    pub fn insert(&self, session: VerificationSession) -> Option<VerificationSession> {
        self.sessions.insert(session.phone.clone(), session)
    }

    /// Check `code` for the session bound to `phone` and `token_id`, removing
    /// it on a match. The check and removal happen under the entry lock, so
    /// of two concurrent matching calls exactly one sees `Consumed`.
    pub fn consume(
        &self,
        phone: &str,
        token_id: &str,
        code: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> ConsumeOutcome {
        let Entry::Occupied(mut entry) = self.sessions.entry(phone.to_string()) else {
            return ConsumeOutcome::NotFound;
        };

        if entry.get().token_id != token_id {
            return ConsumeOutcome::NotFound;
        }

        if entry.get().is_expired(now) {
            entry.remove();
            return ConsumeOutcome::NotFound;
        }

        if entry.get().code_matches(code) {
            return ConsumeOutcome::Consumed(entry.remove());
        }

        let session = entry.get_mut();
        session.attempts += 1;
        let remaining = max_attempts.saturating_sub(session.attempts);
        if remaining == 0 {
            entry.remove();
        }
        ConsumeOutcome::Rejected { remaining }
    }

    /// Remove the session for `phone` only if it is still the one issued
    /// with `token_id`.
    pub fn discard(&self, phone: &str, token_id: &str) -> bool {
        self.sessions
            .remove_if(phone, |_, session| session.token_id == token_id)
            .is_some()
    }

    /// Drop every session that has expired by `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now));
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionPurpose;
    use chrono::Duration;
    use std::sync::Arc;

    const PHONE: &str = "+15550100";

    fn session(token_id: &str, now: DateTime<Utc>) -> VerificationSession {
        VerificationSession::new(
            PHONE.to_string(),
            "123456",
            token_id.to_string(),
            SessionPurpose::Login,
            now,
            now + Duration::seconds(300),
        )
    }

    #[test]
    fn test_match_consumes_once() {
        let store = SessionStore::new();
        let now = Utc::now();
        store.insert(session("t1", now));

        assert!(matches!(
            store.consume(PHONE, "t1", "123456", now, 5),
            ConsumeOutcome::Consumed(_)
        ));
        assert!(matches!(
            store.consume(PHONE, "t1", "123456", now, 5),
            ConsumeOutcome::NotFound
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_replaced_session_ignores_old_token() {
        let store = SessionStore::new();
        let now = Utc::now();
        store.insert(session("t1", now));
        assert!(store.insert(session("t2", now)).is_some());

        assert!(matches!(
            store.consume(PHONE, "t1", "123456", now, 5),
            ConsumeOutcome::NotFound
        ));
        assert!(!store.discard(PHONE, "t1"));
        assert_eq!(store.len(), 1);
        assert!(store.discard(PHONE, "t2"));
    }

    #[test]
    fn test_attempts_exhaust_session() {
        let store = SessionStore::new();
        let now = Utc::now();
        store.insert(session("t1", now));

        assert!(matches!(
            store.consume(PHONE, "t1", "000000", now, 2),
            ConsumeOutcome::Rejected { remaining: 1 }
        ));
        assert!(matches!(
            store.consume(PHONE, "t1", "000000", now, 2),
            ConsumeOutcome::Rejected { remaining: 0 }
        ));
        assert!(matches!(
            store.consume(PHONE, "t1", "123456", now, 2),
            ConsumeOutcome::NotFound
        ));
    }

    #[test]
    fn test_expired_session_is_not_found() {
        let store = SessionStore::new();
        let now = Utc::now();
        store.insert(session("t1", now));

        let later = now + Duration::seconds(301);
        assert!(matches!(
            store.consume(PHONE, "t1", "123456", later, 5),
            ConsumeOutcome::NotFound
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let store = SessionStore::new();
        let now = Utc::now();
        store.insert(session("t1", now - Duration::seconds(600)));
        let mut fresh = session("t2", now);
        fresh.phone = "+15550199".to_string();
        store.insert(fresh);

        assert_eq!(store.purge_expired(now), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_verify_has_one_winner() {
        let store = Arc::new(SessionStore::new());
        let now = Utc::now();
        store.insert(session("t1", now));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    matches!(
                        store.consume(PHONE, "t1", "123456", now, 5),
                        ConsumeOutcome::Consumed(_)
                    )
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
