use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupDeadline {
    pub deadline: DateTime<Utc>,
}

impl SignupDeadline {
    /// Submissions are accepted up to and including the deadline itself.
    pub fn has_passed(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }
}

/// Response of `GET /settings/signup`.
#[derive(Debug, Clone, Serialize)]
pub struct SignupWindow {
    pub deadline: Option<DateTime<Utc>>,
    pub open: bool,
}

impl SignupWindow {
    pub fn at(deadline: Option<SignupDeadline>, now: DateTime<Utc>) -> Self {
        Self {
            deadline: deadline.map(|d| d.deadline),
            open: !deadline.is_some_and(|d| d.has_passed(now)),
        }
    }
}
