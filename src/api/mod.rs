use axum::Json;
use axum::extract::{Path, Query};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use chrono::Utc;
use serde::Deserialize;

use crate::db::{self, repository};
use crate::error::AppError;
use crate::models::*;
use crate::services::capacity;
use crate::state::AppState;

#[derive(Deserialize)]
struct SessionQueryParams {
    teacher_email: Option<String>,
}

#[derive(Deserialize)]
struct SignupQueryParams {
    email: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}/signups", get(session_roster))
        .route("/signups", get(find_signup).post(submit_signup))
        .route("/settings/signup", get(signup_window))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    db::bounded(
        state.store_timeout,
        "health check",
        sqlx::query("select 1").execute(&state.db),
    )
    .await?;
    Ok(StatusCode::OK)
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<SessionQueryParams>
) -> Result<Json<Vec<SessionAvailability>>, AppError> {
    let timeout = state.store_timeout;
    let sessions = match params.teacher_email {
        Some(email) => {
            db::bounded(
                timeout,
                "catalog fetch",
                repository::fetch_sessions_for_teacher(&state.db, &email),
            )
            .await?
        }
        None => db::bounded(timeout, "catalog fetch", repository::fetch_sessions(&state.db)).await?,
    };
    let signups = db::bounded(timeout, "ledger fetch", repository::fetch_signups(&state.db)).await?;
    Ok(Json(capacity::availability(sessions, &signups)))
}

async fn session_roster(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<Json<Vec<Signup>>, AppError> {
    let timeout = state.store_timeout;
    db::bounded(timeout, "catalog fetch", repository::find_session_by_id(&state.db, &id))
        .await?
        .ok_or(AppError::NotFound)?;
    let roster = db::bounded(
        timeout,
        "roster fetch",
        repository::fetch_signups_for_session(&state.db, &id),
    )
    .await?;
    Ok(Json(roster))
}

async fn find_signup(
    State(state): State<AppState>,
    Query(params): Query<SignupQueryParams>
) -> Result<Json<Signup>, AppError> {
    let signup = db::bounded(
        state.store_timeout,
        "signup lookup",
        repository::find_signup_by_email(&state.db, &params.email),
    )
    .await?
    .ok_or(AppError::NotFound)?;
    Ok(Json(signup))
}

async fn signup_window(State(state): State<AppState>) -> Result<Json<SignupWindow>, AppError> {
    let deadline = db::bounded(
        state.store_timeout,
        "deadline fetch",
        repository::fetch_deadline(&state.db),
    )
    .await?;
    Ok(Json(SignupWindow::at(deadline, Utc::now())))
}

async fn submit_signup(
    State(state): State<AppState>,
    Json(req): Json<SubmitSignupRequest>
) -> Result<Json<Signup>, AppError> {
    let workflow = state.workflow();
    let mut form = workflow.open(Utc::now()).await?;
    form.set_name(req.name)?;
    form.set_email(req.email)?;
    for name in &req.sessions {
        if !form.selection().contains(name) {
            form.toggle_session(name)?;
        }
    }

    let signup = workflow.submit(&mut form, Utc::now()).await?;
    Ok(Json(signup))
}
