pub mod dto;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::AppError;

pub use dto::SignupPayload;

#[derive(Clone, Debug)]
pub struct NotifyConfig {
    pub url: String,
    pub timeout: Duration,
}

/// Best-effort sink that receives a copy of every saved signup.
#[async_trait]
pub trait SignupNotifier: Send + Sync {
    async fn notify(&self, payload: &SignupPayload) -> Result<(), AppError>;
}

pub struct HttpSignupNotifier {
    client: Client,
    config: NotifyConfig,
}

impl HttpSignupNotifier {
    pub fn new(config: NotifyConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl SignupNotifier for HttpSignupNotifier {
    async fn notify(&self, payload: &SignupPayload) -> Result<(), AppError> {
        let response = self.client
            .post(&self.config.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| AppError::Notification(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Notification(format!("endpoint returned {}: {}", status, body)));
        }

        tracing::debug!("signup for {} forwarded ({})", payload.email, status);
        Ok(())
    }
}

pub struct NoopSignupNotifier;

#[async_trait]
impl SignupNotifier for NoopSignupNotifier {
    async fn notify(&self, _payload: &SignupPayload) -> Result<(), AppError> {
        Ok(())
    }
}
