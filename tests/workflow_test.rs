use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use careerday::db::{self, repository};
use careerday::error::AppError;
use careerday::models::{NewSessionRequest, Session};
use careerday::notify::{NoopSignupNotifier, SignupNotifier, SignupPayload};
use careerday::services::{FormState, Seats, SignupWorkflow, Toggle, capacity};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::mpsc;

const STORE_TIMEOUT: Duration = Duration::from_secs(5);

async fn setup_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create database");

    db::MIGRATOR.run(&pool).await.expect("Failed to run migrations");
    pool
}

async fn add_session(pool: &SqlitePool, name: &str, capacity: Option<i64>) -> Session {
    repository::insert_session(
        pool,
        NewSessionRequest {
            name: name.to_string(),
            teacher_email: "teacher@school.org".to_string(),
            description: format!("{} session", name),
            image_url: None,
            capacity,
        },
    )
    .await
    .expect("Failed to insert session")
}

fn workflow(pool: &SqlitePool) -> SignupWorkflow {
    SignupWorkflow::new(pool.clone(), Arc::new(NoopSignupNotifier), STORE_TIMEOUT)
}

fn ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
}

async fn submit(
    wf: &SignupWorkflow,
    name: &str,
    email: &str,
    sessions: &[&str],
) -> Result<careerday::models::Signup, AppError> {
    let mut form = wf.open(Utc::now()).await?;
    form.set_name(name)?;
    form.set_email(email)?;
    for s in sessions {
        form.toggle_session(s)?;
    }
    wf.submit(&mut form, Utc::now()).await
}

struct RecordingNotifier {
    tx: mpsc::UnboundedSender<SignupPayload>,
}

#[async_trait]
impl SignupNotifier for RecordingNotifier {
    async fn notify(&self, payload: &SignupPayload) -> Result<(), AppError> {
        self.tx.send(payload.clone()).ok();
        Ok(())
    }
}

struct FailingNotifier;

#[async_trait]
impl SignupNotifier for FailingNotifier {
    async fn notify(&self, _payload: &SignupPayload) -> Result<(), AppError> {
        Err(AppError::Notification("endpoint returned 500".to_string()))
    }
}

#[tokio::test]
async fn test_robotics_end_to_end() {
    let pool = setup_db().await;
    let robotics = add_session(&pool, "Robotics", Some(1)).await;
    let wf = workflow(&pool);

    let mut form_a = wf.open(Utc::now()).await.unwrap();
    form_a.set_name("Alice").unwrap();
    form_a.set_email("alice@x.com").unwrap();
    form_a.toggle_session("Robotics").unwrap();
    let saved = wf.submit(&mut form_a, Utc::now()).await.expect("Alice should be confirmed");

    assert_eq!(form_a.state(), FormState::Confirmed);
    assert_eq!(saved.sessions, vec![robotics.id.clone()]);

    let signups = repository::fetch_signups(&pool).await.unwrap();
    assert_eq!(capacity::remaining_seats(&robotics, &signups), Seats::Remaining(0));

    let mut form_b = wf.open(Utc::now()).await.unwrap();
    form_b.set_name("Bob").unwrap();
    form_b.set_email("bob@x.com").unwrap();
    form_b.toggle_session("Robotics").unwrap();
    let err = wf.submit(&mut form_b, Utc::now()).await.unwrap_err();

    assert!(matches!(err, AppError::Capacity(ref name) if name == "Robotics"));
    assert_eq!(form_b.state(), FormState::Editing);
    assert_eq!(form_b.name(), "Bob");
    assert_eq!(form_b.selection().names(), ["Robotics"]);
    assert!(form_b.message().unwrap().contains("Robotics"));
    assert!(!form_b.can_retry());
}

#[tokio::test]
async fn test_sequential_submissions_respect_capacity() {
    let pool = setup_db().await;
    let lab = add_session(&pool, "Lab", Some(2)).await;
    let wf = workflow(&pool);

    let mut confirmed = 0;
    for i in 0..5 {
        match submit(&wf, "Student", &format!("s{}@x.com", i), &["Lab"]).await {
            Ok(_) => confirmed += 1,
            Err(e) => assert!(matches!(e, AppError::Capacity(_)), "unexpected error: {:?}", e),
        }
    }

    assert_eq!(confirmed, 2);
    assert_eq!(repository::count_for_session(&pool, &lab.id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_racing_students_cannot_overbook() {
    let pool = setup_db().await;
    let lab = add_session(&pool, "Lab", Some(1)).await;

    let mut handles = Vec::new();
    for i in 0..6 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let wf = workflow(&pool);
            submit(&wf, "Student", &format!("r{}@x.com", i), &["Lab"]).await
        }));
    }

    let mut confirmed = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(_) => confirmed += 1,
            Err(e) => assert!(matches!(e, AppError::Capacity(_)), "unexpected error: {:?}", e),
        }
    }

    assert_eq!(confirmed, 1);
    assert_eq!(repository::count_for_session(&pool, &lab.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_resubmission_replaces_sessions() {
    let pool = setup_db().await;
    let s1 = add_session(&pool, "S1", None).await;
    add_session(&pool, "S2", None).await;
    let wf = workflow(&pool);

    let first = submit(&wf, "Ada", "a@x.com", &["S1", "S2"]).await.unwrap();

    let mut form = wf.open(Utc::now()).await.unwrap();
    form.set_email("a@x.com").unwrap();
    let existing = wf.lookup_existing(&mut form).await.unwrap().expect("signup should exist");
    assert_eq!(existing.id, first.id);
    assert_eq!(form.existing_id(), Some(first.id.as_str()));
    assert_eq!(form.name(), "Ada");
    assert_eq!(form.selection().names(), ["S1", "S2"]);

    assert_eq!(form.toggle_session("S2").unwrap(), Toggle::Removed);
    let second = wf.submit(&mut form, Utc::now()).await.unwrap();

    assert_eq!(second.id, first.id);
    let all = repository::fetch_signups(&pool).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].sessions, vec![s1.id]);
}

#[tokio::test]
async fn test_resubmission_keeps_own_seat_in_full_session() {
    let pool = setup_db().await;
    let small = add_session(&pool, "Small", Some(1)).await;
    let open = add_session(&pool, "Open", None).await;
    let wf = workflow(&pool);

    submit(&wf, "Ada", "a@x.com", &["Small"]).await.unwrap();
    let updated = submit(&wf, "Ada", "a@x.com", &["Small", "Open"]).await
        .expect("held seat must not count against the student");

    assert_eq!(updated.sessions, vec![small.id.clone(), open.id]);
    assert_eq!(repository::count_for_session(&pool, &small.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_fourth_session_rejected_at_selection_time() {
    let pool = setup_db().await;
    let wf = workflow(&pool);

    let mut form = wf.open(Utc::now()).await.unwrap();
    for name in ["A", "B", "C"] {
        form.toggle_session(name).unwrap();
    }
    let err = form.toggle_session("D").unwrap_err();

    assert!(err.is_validation());
    assert_eq!(form.selection().len(), 3);
    assert_eq!(form.state(), FormState::Editing);
    assert!(form.message().is_some());
}

#[tokio::test]
async fn test_deadline_cutoff() {
    let pool = setup_db().await;
    add_session(&pool, "Robotics", None).await;
    let deadline = ts("2026-05-01T12:00:00Z");
    repository::set_deadline(&pool, deadline).await.unwrap();
    let wf = workflow(&pool);

    let before = deadline - chrono::Duration::seconds(1);
    let after = deadline + chrono::Duration::seconds(1);

    // Opened in time, submitted too late.
    let mut late = wf.open(before).await.unwrap();
    assert_eq!(late.state(), FormState::Editing);
    late.set_name("Late").unwrap();
    late.set_email("late@x.com").unwrap();
    late.toggle_session("Robotics").unwrap();
    let err = wf.submit(&mut late, after).await.unwrap_err();
    assert!(matches!(err, AppError::Closed));
    assert_eq!(late.state(), FormState::Closed);
    assert!(repository::fetch_signups(&pool).await.unwrap().is_empty());

    // Opened too late: nothing can be entered.
    let mut closed = wf.open(after).await.unwrap();
    assert_eq!(closed.state(), FormState::Closed);
    assert!(matches!(closed.set_name("x"), Err(AppError::Closed)));
    assert!(matches!(wf.submit(&mut closed, after).await, Err(AppError::Closed)));

    let mut on_time = wf.open(before).await.unwrap();
    on_time.set_name("On Time").unwrap();
    on_time.set_email("ontime@x.com").unwrap();
    on_time.toggle_session("Robotics").unwrap();
    wf.submit(&mut on_time, before).await.expect("submission before deadline");
    assert_eq!(on_time.state(), FormState::Confirmed);
    assert_eq!(repository::fetch_signups(&pool).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_fields_return_to_editing() {
    let pool = setup_db().await;
    add_session(&pool, "Robotics", None).await;
    let wf = workflow(&pool);

    let mut form = wf.open(Utc::now()).await.unwrap();
    form.set_email("a@x.com").unwrap();
    form.toggle_session("Robotics").unwrap();
    let err = wf.submit(&mut form, Utc::now()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(form.state(), FormState::Editing);
    assert_eq!(form.email(), "a@x.com");

    form.set_name("Ada").unwrap();
    form.toggle_session("Robotics").unwrap();
    let err = wf.submit(&mut form, Utc::now()).await.unwrap_err();
    assert_eq!(err.to_string(), "Please select at least one session");

    form.toggle_session("Basket Weaving").unwrap();
    let err = wf.submit(&mut form, Utc::now()).await.unwrap_err();
    assert_eq!(err.to_string(), "Unknown session: Basket Weaving");
    assert!(repository::fetch_signups(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_confirmed_is_terminal() {
    let pool = setup_db().await;
    add_session(&pool, "Robotics", None).await;
    let wf = workflow(&pool);

    let mut form = wf.open(Utc::now()).await.unwrap();
    form.set_name("Ada").unwrap();
    form.set_email("a@x.com").unwrap();
    form.toggle_session("Robotics").unwrap();
    wf.submit(&mut form, Utc::now()).await.unwrap();

    assert!(matches!(form.toggle_session("Robotics"), Err(AppError::Conflict(_))));
    assert!(matches!(wf.submit(&mut form, Utc::now()).await, Err(AppError::Conflict(_))));
    assert_eq!(form.state(), FormState::Confirmed);
}

#[tokio::test]
async fn test_notification_receives_session_names() {
    let pool = setup_db().await;
    add_session(&pool, "Robotics", None).await;
    add_session(&pool, "Nursing", None).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let wf = SignupWorkflow::new(pool.clone(), Arc::new(RecordingNotifier { tx }), STORE_TIMEOUT);

    submit(&wf, "Ada", "a@x.com", &["Nursing", "Robotics"]).await.unwrap();

    let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("notification not sent")
        .expect("channel closed");
    assert_eq!(
        payload,
        SignupPayload {
            name: "Ada".to_string(),
            email: "a@x.com".to_string(),
            sessions: vec!["Nursing".to_string(), "Robotics".to_string()],
        }
    );
}

#[tokio::test]
async fn test_failed_notification_still_confirms() {
    let pool = setup_db().await;
    add_session(&pool, "Robotics", None).await;
    let wf = SignupWorkflow::new(pool.clone(), Arc::new(FailingNotifier), STORE_TIMEOUT);

    let mut form = wf.open(Utc::now()).await.unwrap();
    form.set_name("Ada").unwrap();
    form.set_email("a@x.com").unwrap();
    form.toggle_session("Robotics").unwrap();
    wf.submit(&mut form, Utc::now()).await.expect("ledger write should stand");

    assert_eq!(form.state(), FormState::Confirmed);
    assert!(repository::find_signup_by_email(&pool, "a@x.com").await.unwrap().is_some());
}

#[tokio::test]
async fn test_store_failure_is_retryable() {
    let pool = setup_db().await;
    add_session(&pool, "Robotics", None).await;
    let wf = workflow(&pool);

    let mut form = wf.open(Utc::now()).await.unwrap();
    form.set_name("Ada").unwrap();
    form.set_email("a@x.com").unwrap();
    form.toggle_session("Robotics").unwrap();

    pool.close().await;
    let err = wf.submit(&mut form, Utc::now()).await.unwrap_err();

    assert!(err.is_unavailable());
    assert_eq!(form.state(), FormState::Editing);
    assert!(form.can_retry());
    assert_eq!(form.name(), "Ada");
    assert_eq!(form.selection().names(), ["Robotics"]);
}

#[tokio::test]
async fn test_store_timeout_surfaces_unavailable() {
    let pool = setup_db().await;
    let wf = SignupWorkflow::new(pool.clone(), Arc::new(NoopSignupNotifier), Duration::from_millis(100));

    // Hold the only connection so every store call waits.
    let _conn = pool.acquire().await.unwrap();
    let err = wf.open(Utc::now()).await.unwrap_err();

    assert!(matches!(err, AppError::Unavailable(_)));
}

#[tokio::test]
async fn test_changing_email_after_lookup_drops_loaded_signup() {
    let pool = setup_db().await;
    add_session(&pool, "S1", None).await;
    let wf = workflow(&pool);
    submit(&wf, "Ada", "a@x.com", &["S1"]).await.unwrap();

    let mut form = wf.open(Utc::now()).await.unwrap();
    form.set_email("a@x.com").unwrap();
    wf.lookup_existing(&mut form).await.unwrap().expect("signup should exist");
    assert_eq!(form.name(), "Ada");

    // Same address again keeps what was loaded.
    form.set_email("a@x.com").unwrap();
    assert!(form.existing_id().is_some());

    form.set_email("b@x.com").unwrap();
    assert_eq!(form.existing_id(), None);
    assert_eq!(form.name(), "");
    assert!(form.selection().is_empty());

    // Typed values on a form without a loaded record are kept.
    let mut fresh = wf.open(Utc::now()).await.unwrap();
    fresh.set_name("Cy").unwrap();
    fresh.toggle_session("S1").unwrap();
    fresh.set_email("c@x.com").unwrap();
    assert_eq!(fresh.name(), "Cy");
    assert_eq!(fresh.selection().len(), 1);
}
