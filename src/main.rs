use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use careerday::api::router;
use careerday::config::AppConfig;
use careerday::db;
use careerday::notify::{HttpSignupNotifier, NoopSignupNotifier, NotifyConfig, SignupNotifier};
use careerday::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "careerday=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let pool = db::connect(&config.database_url, config.store_timeout).await?;
    db::MIGRATOR.run(&pool).await?;

    let notifier: Arc<dyn SignupNotifier> = match &config.notify_url {
        Some(url) => {
            info!("forwarding signups to {}", url);
            Arc::new(HttpSignupNotifier::new(NotifyConfig {
                url: url.clone(),
                timeout: config.notify_timeout,
            })?)
        }
        None => {
            info!("SIGNUP_NOTIFY_URL not set, notifications disabled");
            Arc::new(NoopSignupNotifier)
        }
    };

    let state = AppState {
        db: pool.clone(),
        notifier,
        store_timeout: config.store_timeout,
    };

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
