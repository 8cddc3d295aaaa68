use std::sync::Arc;

use folio::auth::seed_admin;
use folio::config::AppConfig;
use folio::db::{init_pool, run_migrations};
use folio::error::AppError;
use folio::routes::create_router;
use folio::state::AppState;
use folio::store::SqliteStore;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = AppConfig::from_env()?;
    let db = init_pool(&config.database_url).await?;

    if let Err(err) = run_migrations(&db).await {
        error!("migration failed: {err:?}");
        return Err(err);
    }

    let store = Arc::new(SqliteStore::new(db.clone()));
    if let Some(seed) = &config.admin_seed {
        seed_admin(store.as_ref(), seed).await?;
    }

    let state = AppState::new(config.clone(), store.clone(), store);
    let app = create_router(state);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;

    db.close().await;
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,folio=debug,tower_http=info".into());

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
