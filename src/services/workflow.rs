use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::db::{self, repository::{self, UpsertOutcome}};
use crate::error::AppError;
use crate::models::{NewSignup, Session, Signup};
use crate::notify::{SignupNotifier, SignupPayload};
use crate::services::capacity;
use crate::services::selection::{SessionSelection, Toggle};

const UNAVAILABLE_MESSAGE: &str = "The signup service is unavailable, please try again.";

/// Where a signup form is in its lifecycle.
///
/// `Validating` and `Submitting` are only observable while `submit` runs.
/// A rejected submission goes straight back to `Editing` with a message.
/// `Closed` and `Confirmed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormState {
    Editing,
    Validating,
    Submitting,
    Confirmed,
    Closed,
}

/// State of one student's signup attempt.
#[derive(Debug, Clone)]
pub struct SignupForm {
    state: FormState,
    name: String,
    email: String,
    selection: SessionSelection,
    existing_id: Option<String>,
    message: Option<String>,
    retry: bool,
}

impl SignupForm {
    fn with_state(state: FormState) -> Self {
        Self {
            state,
            name: String::new(),
            email: String::new(),
            selection: SessionSelection::new(),
            existing_id: None,
            message: None,
            retry: false,
        }
    }

    pub fn state(&self) -> FormState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn selection(&self) -> &SessionSelection {
        &self.selection
    }

    /// Id of the ledger record this form will update, once known.
    pub fn existing_id(&self) -> Option<&str> {
        self.existing_id.as_deref()
    }

    /// First blocking error of the last action, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Set after a store failure; the same submission can be sent again.
    pub fn can_retry(&self) -> bool {
        self.retry
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), AppError> {
        self.ensure_editing()?;
        self.name = name.into();
        Ok(())
    }

    /// Changing the email after `lookup_existing` loaded a record drops the
    /// loaded name and sessions, which belong to the previous address.
    pub fn set_email(&mut self, email: impl Into<String>) -> Result<(), AppError> {
        self.ensure_editing()?;
        let email = email.into();
        if email == self.email {
            return Ok(());
        }
        if self.existing_id.take().is_some() {
            self.name.clear();
            self.selection = SessionSelection::new();
        }
        self.email = email;
        Ok(())
    }

    /// Selects or deselects a session by name. A fourth pick is refused
    /// immediately and surfaces as the form message.
    pub fn toggle_session(&mut self, name: &str) -> Result<Toggle, AppError> {
        self.ensure_editing()?;
        match self.selection.toggle(name) {
            Ok(toggle) => {
                self.message = None;
                Ok(toggle)
            }
            Err(e) => {
                self.message = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn ensure_editing(&self) -> Result<(), AppError> {
        match self.state {
            FormState::Editing => Ok(()),
            FormState::Closed => Err(AppError::Closed),
            _ => Err(AppError::Conflict("signup already submitted".to_string())),
        }
    }

    fn reject(&mut self, err: &AppError) {
        self.state = FormState::Editing;
        self.retry = err.is_unavailable();
        self.message = Some(if self.retry {
            UNAVAILABLE_MESSAGE.to_string()
        } else {
            err.to_string()
        });
    }
}

/// Drives a signup form against the store and the notification sink.
pub struct SignupWorkflow {
    db: SqlitePool,
    notifier: Arc<dyn SignupNotifier>,
    store_timeout: Duration,
}

impl SignupWorkflow {
    pub fn new(db: SqlitePool, notifier: Arc<dyn SignupNotifier>, store_timeout: Duration) -> Self {
        Self { db, notifier, store_timeout }
    }

    /// Entry guard. Past the deadline the form starts out `Closed`.
    pub async fn open(&self, now: DateTime<Utc>) -> Result<SignupForm, AppError> {
        let deadline = self.bounded("deadline fetch", repository::fetch_deadline(&self.db)).await?;

        if deadline.is_some_and(|d| d.has_passed(now)) {
            info!("signup opened after deadline, form closed");
            let mut form = SignupForm::with_state(FormState::Closed);
            form.message = Some(AppError::Closed.to_string());
            return Ok(form);
        }

        Ok(SignupForm::with_state(FormState::Editing))
    }

    /// Looks up an earlier signup for the form's email and, if one exists,
    /// loads its name and sessions into the form.
    pub async fn lookup_existing(&self, form: &mut SignupForm) -> Result<Option<Signup>, AppError> {
        form.ensure_editing()?;
        if form.email.trim().is_empty() {
            return Ok(None);
        }

        let result = self.load_existing(form).await;
        if let Err(e) = &result {
            form.reject(e);
        }
        result
    }

    async fn load_existing(&self, form: &mut SignupForm) -> Result<Option<Signup>, AppError> {
        let existing = match self
            .bounded("signup lookup", repository::find_signup_by_email(&self.db, &form.email))
            .await?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        let sessions = self.bounded("catalog fetch", repository::fetch_sessions(&self.db)).await?;
        let names = existing.sessions.iter().filter_map(|id| {
            sessions.iter().find(|s| &s.id == id).map(|s| s.name.as_str())
        });

        form.selection = SessionSelection::from_names(names)?;
        form.name = existing.name.clone();
        form.existing_id = Some(existing.id.clone());
        form.message = None;
        form.retry = false;
        Ok(Some(existing))
    }

    /// Validates and saves the form.
    ///
    /// On success the form is `Confirmed`. Validation and capacity failures
    /// return it to `Editing` with the entered values kept; store failures do
    /// the same and mark it retryable. Past the deadline it becomes `Closed`
    /// without writing anything.
    pub async fn submit(&self, form: &mut SignupForm, now: DateTime<Utc>) -> Result<Signup, AppError> {
        form.ensure_editing()?;

        match self.run_submit(form, now).await {
            Ok(signup) => {
                form.state = FormState::Confirmed;
                form.existing_id = Some(signup.id.clone());
                form.message = None;
                form.retry = false;
                Ok(signup)
            }
            Err(AppError::Closed) => {
                info!("submission from {} after deadline", form.email);
                form.state = FormState::Closed;
                form.retry = false;
                form.message = Some(AppError::Closed.to_string());
                Err(AppError::Closed)
            }
            Err(e) => {
                if e.is_validation() {
                    warn!("submission from {} rejected: {}", form.email, e);
                } else if e.is_unavailable() {
                    error!("submission from {} aborted: {}", form.email, e);
                }
                form.reject(&e);
                Err(e)
            }
        }
    }

    async fn run_submit(&self, form: &mut SignupForm, now: DateTime<Utc>) -> Result<Signup, AppError> {
        let deadline = self.bounded("deadline fetch", repository::fetch_deadline(&self.db)).await?;
        if deadline.is_some_and(|d| d.has_passed(now)) {
            return Err(AppError::Closed);
        }

        form.state = FormState::Validating;
        if form.name.trim().is_empty() {
            return Err(AppError::Validation("Please enter your name".to_string()));
        }
        if form.email.trim().is_empty() {
            return Err(AppError::Validation("Please enter your email".to_string()));
        }
        if form.selection.is_empty() {
            return Err(AppError::Validation("Please select at least one session".to_string()));
        }

        // Fresh snapshot right before the capacity decision.
        let sessions = self.bounded("catalog fetch", repository::fetch_sessions(&self.db)).await?;
        let signups = self.bounded("ledger fetch", repository::fetch_signups(&self.db)).await?;

        let chosen = resolve_names(&sessions, form.selection.names())?;
        let existing = signups.iter().find(|s| s.email == form.email);

        // Seats the student already holds are not re-checked.
        for session in &chosen {
            let held = existing.is_some_and(|e| e.sessions.contains(&session.id));
            if !held && capacity::is_full(session, &signups) {
                return Err(AppError::Capacity(session.name.clone()));
            }
        }
        form.existing_id = existing.map(|e| e.id.clone());

        form.state = FormState::Submitting;
        let new_signup = NewSignup {
            name: form.name.clone(),
            email: form.email.clone(),
            session_ids: chosen.iter().map(|s| s.id.clone()).collect(),
        };

        let signup = match self
            .bounded("ledger write", repository::upsert_signup(&self.db, &new_signup))
            .await?
        {
            UpsertOutcome::Saved(signup) => signup,
            UpsertOutcome::SessionFull(session_id) => {
                let name = chosen
                    .iter()
                    .find(|s| s.id == session_id)
                    .map(|s| s.name.clone())
                    .unwrap_or(session_id);
                return Err(AppError::Capacity(name));
            }
        };

        info!(
            "signup saved for {} ({} sessions, {})",
            signup.email,
            signup.sessions.len(),
            if form.existing_id.is_some() { "updated" } else { "new" }
        );

        self.dispatch_notification(SignupPayload {
            name: signup.name.clone(),
            email: signup.email.clone(),
            sessions: chosen.iter().map(|s| s.name.clone()).collect(),
        });

        Ok(signup)
    }

    /// The ledger is the system of record; the sink is told afterwards and its
    /// outcome never reaches the caller.
    fn dispatch_notification(&self, payload: SignupPayload) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&payload).await {
                warn!("notification for {} failed: {}", payload.email, e);
            }
        });
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        db::bounded(self.store_timeout, what, fut).await
    }
}

fn resolve_names<'a>(sessions: &'a [Session], names: &[String]) -> Result<Vec<&'a Session>, AppError> {
    names
        .iter()
        .map(|name| {
            sessions
                .iter()
                .find(|s| &s.name == name)
                .ok_or_else(|| AppError::Validation(format!("Unknown session: {}", name)))
        })
        .collect()
}
