use std::sync::Arc;

use govori::{
    app,
    config::{AppConfig, StoreBackend},
    db,
    profiles::{memory_repo::InMemoryProfileRepository, pg_repo::PgProfileRepository, repo::ProfileRepository},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "govori=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let pool = match &config.store {
        StoreBackend::Postgres {
            database_url,
            max_connections,
        } => {
            let pool = db::connect(database_url, *max_connections).await?;
            db::migrate(&pool).await?;
            Some(pool)
        }
        StoreBackend::Memory => None,
    };

    let repo: Arc<dyn ProfileRepository> = match &pool {
        Some(pool) => Arc::new(PgProfileRepository::new(pool.clone())),
        None => {
            tracing::warn!("using in-memory profile store; profiles are lost on exit");
            Arc::new(InMemoryProfileRepository::new())
        }
    };

    let state = AppState::new(&config.identity, repo)?;
    let result = app::serve(app::build_app(state), &config.host, config.port).await;

    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("database pool closed");
    }

    result
}
