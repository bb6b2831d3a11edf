use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;
use crate::services::capacity::Seats;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    /// Display name. Submissions refer to sessions by this name.
    pub name: String,
    pub teacher_email: String,
    pub description: String,
    pub image_url: Option<String>,
    /// `None` and `Some(0)` both mean the session has no seat limit.
    pub capacity: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSessionRequest {
    pub name: String,
    pub teacher_email: String,
    #[serde(default)]
    pub description: String,
    pub image_url: Option<String>,
    pub capacity: Option<i64>,
}

impl NewSessionRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Session name is required".to_string()));
        }
        if self.teacher_email.trim().is_empty() {
            return Err(AppError::Validation("Teacher email is required".to_string()));
        }
        validate_capacity(self.capacity)
    }
}

/// Partial edit of a session. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSessionRequest {
    pub name: Option<String>,
    pub teacher_email: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub capacity: Option<i64>,
}

impl UpdateSessionRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AppError::Validation("Session name is required".to_string()));
        }
        validate_capacity(self.capacity)
    }
}

fn validate_capacity(capacity: Option<i64>) -> Result<(), AppError> {
    match capacity {
        Some(c) if c < 0 => Err(AppError::Validation(format!(
            "Capacity must not be negative (got {})",
            c
        ))),
        _ => Ok(()),
    }
}

/// A catalog entry together with the seats left at the time it was read.
#[derive(Debug, Clone, Serialize)]
pub struct SessionAvailability {
    #[serde(flatten)]
    pub session: Session,
    pub remaining: Seats,
    pub full: bool,
}
