use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signup {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Ids of the sessions this student holds a seat in.
    pub sessions: Vec<String>,
    pub timestamp: String,
}

#[derive(Debug, FromRow)]
pub(crate) struct SignupRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub timestamp: String,
}

impl SignupRow {
    pub(crate) fn with_sessions(self, sessions: Vec<String>) -> Signup {
        Signup {
            id: self.id,
            name: self.name,
            email: self.email,
            sessions,
            timestamp: self.timestamp,
        }
    }
}

/// Body of `POST /signups`. Sessions are given by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitSignupRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub sessions: Vec<String>,
}

/// A validated ledger write, sessions already resolved to ids.
#[derive(Debug, Clone)]
pub struct NewSignup {
    pub name: String,
    pub email: String,
    pub session_ids: Vec<String>,
}
