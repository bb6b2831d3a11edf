use serde::Serialize;

use crate::models::{Session, SessionAvailability, Signup};

/// Seats left in a session. `Unlimited` is distinct from `Remaining(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Seats {
    Unlimited,
    /// May go negative if capacity was lowered below the current headcount.
    Remaining(i64),
}

impl Seats {
    pub fn is_exhausted(self) -> bool {
        matches!(self, Seats::Remaining(n) if n <= 0)
    }
}

pub fn count_for_session(session_id: &str, signups: &[Signup]) -> i64 {
    signups
        .iter()
        .filter(|s| s.sessions.iter().any(|id| id == session_id))
        .count() as i64
}

pub fn remaining_seats(session: &Session, signups: &[Signup]) -> Seats {
    match session.capacity {
        None | Some(0) => Seats::Unlimited,
        Some(capacity) => Seats::Remaining(capacity - count_for_session(&session.id, signups)),
    }
}

pub fn is_full(session: &Session, signups: &[Signup]) -> bool {
    remaining_seats(session, signups).is_exhausted()
}

pub fn availability(sessions: Vec<Session>, signups: &[Signup]) -> Vec<SessionAvailability> {
    sessions
        .into_iter()
        .map(|session| {
            let remaining = remaining_seats(&session, signups);
            SessionAvailability {
                session,
                remaining,
                full: remaining.is_exhausted(),
            }
        })
        .collect()
}
