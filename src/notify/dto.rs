use serde::{Deserialize, Serialize};

/// Body posted to the notification endpoint for every saved signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupPayload {
    pub name: String,
    pub email: String,
    /// Session names, in the order the student picked them.
    pub sessions: Vec<String>,
}
