use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::signup::SignupRow;
use crate::models::{
    NewSessionRequest, NewSignup, Session, Signup, SignupDeadline, UpdateSessionRequest,
};

const SIGNUP_SETTINGS_KEY: &str = "signup";

/// Result of a ledger write. A lost seat race is not an error at this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Saved(Signup),
    /// No seat could be claimed in this session; nothing was written.
    SessionFull(String),
}

pub async fn fetch_sessions(db: &SqlitePool) -> Result<Vec<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        "SELECT id, name, teacher_email, description, image_url, capacity FROM sessions ORDER BY name"
    )
    .fetch_all(db)
    .await
}

pub async fn fetch_sessions_for_teacher(
    db: &SqlitePool,
    teacher_email: &str,
) -> Result<Vec<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        "SELECT id, name, teacher_email, description, image_url, capacity FROM sessions WHERE teacher_email = ? ORDER BY name"
    )
    .bind(teacher_email)
    .fetch_all(db)
    .await
}

pub async fn find_session_by_id(db: &SqlitePool, id: &str) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        "SELECT id, name, teacher_email, description, image_url, capacity FROM sessions WHERE id = ?"
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn insert_session(
    db: &SqlitePool,
    req: NewSessionRequest,
) -> Result<Session, AppError> {
    req.validate()?;
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO sessions
            (id, name, teacher_email, description, image_url, capacity)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#
    )
    .bind(&id)
    .bind(&req.name)
    .bind(&req.teacher_email)
    .bind(&req.description)
    .bind(&req.image_url)
    .bind(req.capacity)
    .execute(db)
    .await
    .map_err(session_write_error)?;

    Ok(Session {
        id,
        name: req.name,
        teacher_email: req.teacher_email,
        description: req.description,
        image_url: req.image_url,
        capacity: req.capacity,
    })
}

fn session_write_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return AppError::Conflict("A session with this name already exists".to_string());
        }
    }
    AppError::Database(e)
}

/// Signups reference sessions by id, so a rename carries every seat along.
pub async fn update_session(
    db: &SqlitePool,
    id: &str,
    req: UpdateSessionRequest,
) -> Result<Option<Session>, AppError> {
    req.validate()?;

    let mut current = match find_session_by_id(db, id).await? {
        Some(s) => s,
        None => return Ok(None),
    };

    if let Some(name) = req.name {
        current.name = name;
    }
    if let Some(teacher_email) = req.teacher_email {
        current.teacher_email = teacher_email;
    }
    if let Some(description) = req.description {
        current.description = description;
    }
    if let Some(image_url) = req.image_url {
        current.image_url = Some(image_url);
    }
    if let Some(capacity) = req.capacity {
        current.capacity = Some(capacity);
    }

    sqlx::query(
        r#"
        UPDATE sessions
        SET name = ?1,
            teacher_email = ?2,
            description = ?3,
            image_url = ?4,
            capacity = ?5
        WHERE id = ?6
        "#
    )
    .bind(&current.name)
    .bind(&current.teacher_email)
    .bind(&current.description)
    .bind(&current.image_url)
    .bind(current.capacity)
    .bind(id)
    .execute(db)
    .await
    .map_err(session_write_error)?;

    Ok(Some(current))
}

/// Removes the session and every seat held in it. The signups themselves stay.
pub async fn delete_session(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result > 0)
}

/// Roster of one session.
pub async fn fetch_signups_for_session(
    db: &SqlitePool,
    session_id: &str,
) -> Result<Vec<Signup>, sqlx::Error> {
    Ok(fetch_signups(db)
        .await?
        .into_iter()
        .filter(|s| s.sessions.iter().any(|id| id == session_id))
        .collect())
}

pub async fn fetch_signups(db: &SqlitePool) -> Result<Vec<Signup>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SignupRow>(
        "SELECT id, name, email, timestamp FROM signups ORDER BY timestamp"
    )
    .fetch_all(db)
    .await?;

    let links: Vec<(String, String)> = sqlx::query_as(
        "SELECT signup_id, session_id FROM signup_sessions ORDER BY rowid"
    )
    .fetch_all(db)
    .await?;

    let mut sessions_by_signup: HashMap<String, Vec<String>> = HashMap::new();
    for (signup_id, session_id) in links {
        sessions_by_signup.entry(signup_id).or_default().push(session_id);
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let sessions = sessions_by_signup.remove(&row.id).unwrap_or_default();
            row.with_sessions(sessions)
        })
        .collect())
}

/// Exact, case-sensitive match on the stored email.
pub async fn find_signup_by_email(
    db: &SqlitePool,
    email: &str,
) -> Result<Option<Signup>, sqlx::Error> {
    let row = match sqlx::query_as::<_, SignupRow>(
        "SELECT id, name, email, timestamp FROM signups WHERE email = ?"
    )
    .bind(email)
    .fetch_optional(db)
    .await? {
        Some(r) => r,
        None => return Ok(None),
    };

    let sessions: Vec<String> = sqlx::query_scalar(
        "SELECT session_id FROM signup_sessions WHERE signup_id = ? ORDER BY rowid"
    )
    .bind(&row.id)
    .fetch_all(db)
    .await?;

    Ok(Some(row.with_sessions(sessions)))
}

pub async fn count_for_session(db: &SqlitePool, session_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM signup_sessions WHERE session_id = ?")
        .bind(session_id)
        .fetch_one(db)
        .await
}

/// Inserts or replaces the signup for `signup.email` in one transaction.
///
/// The email is unique in the table, so two racing submissions for the same
/// address converge on a single record. Seats the student already held are
/// kept unconditionally; every other seat is claimed with a conditional
/// insert that only matches while the session still has room. If any claim
/// fails the transaction is rolled back and the previous record is untouched.
pub async fn upsert_signup(
    db: &SqlitePool,
    signup: &NewSignup,
) -> Result<UpsertOutcome, sqlx::Error> {
    let mut tx = db.begin().await?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    // Writing first takes the database write lock for the rest of the transaction.
    let row = sqlx::query_as::<_, SignupRow>(
        r#"
        INSERT INTO signups (id, name, email, timestamp)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(email) DO UPDATE SET name = excluded.name
        RETURNING id, name, email, timestamp
        "#
    )
    .bind(&id)
    .bind(&signup.name)
    .bind(&signup.email)
    .bind(&now)
    .fetch_one(&mut *tx)
    .await?;

    let held: Vec<String> = sqlx::query_scalar(
        "SELECT session_id FROM signup_sessions WHERE signup_id = ?"
    )
    .bind(&row.id)
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM signup_sessions WHERE signup_id = ?")
        .bind(&row.id)
        .execute(&mut *tx)
        .await?;

    for session_id in &signup.session_ids {
        let claimed = if held.contains(session_id) {
            sqlx::query("INSERT INTO signup_sessions (signup_id, session_id) VALUES (?1, ?2)")
                .bind(&row.id)
                .bind(session_id)
                .execute(&mut *tx)
                .await?
                .rows_affected()
        } else {
            sqlx::query(
                r#"
                INSERT INTO signup_sessions (signup_id, session_id)
                SELECT ?1, s.id FROM sessions s
                WHERE s.id = ?2
                  AND (
                    s.capacity IS NULL
                    OR s.capacity = 0
                    OR (SELECT COUNT(*) FROM signup_sessions ss WHERE ss.session_id = s.id) < s.capacity
                  )
                "#
            )
            .bind(&row.id)
            .bind(session_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
        };

        if claimed == 0 {
            tx.rollback().await?;
            return Ok(UpsertOutcome::SessionFull(session_id.clone()));
        }
    }

    tx.commit().await?;

    Ok(UpsertOutcome::Saved(row.with_sessions(signup.session_ids.clone())))
}

/// `None` when no deadline was ever configured.
pub async fn fetch_deadline(db: &SqlitePool) -> Result<Option<SignupDeadline>, sqlx::Error> {
    let raw: Option<String> = sqlx::query_scalar("SELECT deadline FROM settings WHERE key = ?")
        .bind(SIGNUP_SETTINGS_KEY)
        .fetch_optional(db)
        .await?;

    raw.map(|ts| {
        DateTime::parse_from_rfc3339(&ts)
            .map(|dt| SignupDeadline { deadline: dt.with_timezone(&Utc) })
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))
    })
    .transpose()
}

pub async fn set_deadline(db: &SqlitePool, deadline: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, deadline) VALUES (?1, ?2)
        ON CONFLICT(key) DO UPDATE SET deadline = excluded.deadline
        "#
    )
    .bind(SIGNUP_SETTINGS_KEY)
    .bind(deadline.to_rfc3339())
    .execute(db)
    .await?;

    Ok(())
}
