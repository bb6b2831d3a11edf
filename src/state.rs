use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::notify::SignupNotifier;
use crate::services::SignupWorkflow;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub notifier: Arc<dyn SignupNotifier>,
    pub store_timeout: Duration,
}

impl AppState {
    pub fn workflow(&self) -> SignupWorkflow {
        SignupWorkflow::new(self.db.clone(), self.notifier.clone(), self.store_timeout)
    }
}
