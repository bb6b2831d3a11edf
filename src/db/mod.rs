pub mod repository;

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::AppError;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Opens the store, creating the database file on first start.
pub async fn connect(database_url: &str, acquire_timeout: Duration) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(acquire_timeout)
        .connect_with(options)
        .await
}

/// Runs one store call under `timeout`. Expiry is `AppError::Unavailable`.
pub async fn bounded<T, E, F>(timeout: Duration, what: &str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, E>>,
    AppError: From<E>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(AppError::from),
        Err(_) => Err(AppError::Unavailable(format!(
            "{} timed out after {:?}",
            what, timeout
        ))),
    }
}
