mod app;
mod archive;
mod config;
mod constants;
mod converter;
mod db;
mod error;
mod handlers;
mod password;
mod quota;
mod shutdown;
mod state;
mod token;
mod util;

use std::net::SocketAddr;
use std::time::Duration;

use tracing::info;

use crate::archive::OutputStore;
use crate::config::AppConfig;
use crate::constants::OUTPUT_SWEEP_INTERVAL_SECS;
use crate::shutdown::Shutdown;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let _ = dotenvy::dotenv();
    let config = AppConfig::from_env();

    for dir in [config.data_dir.clone(), config.temp_dir(), config.outputs_dir()] {
        tokio::fs::create_dir_all(&dir)
            .await
            .unwrap_or_else(|e| panic!("create {} must succeed: {e}", dir.display()));
    }

    let db = db::connect(&config.database_url, 5)
        .await
        .expect("database must open");
    db::migrate(&db).await.expect("schema must apply");

    if let Some(admin) = &config.admin {
        db::users::ensure_admin(&db, &admin.email, &admin.password, &admin.name)
            .await
            .expect("admin seed must succeed");
    }

    let mut shutdown = Shutdown::listen();
    let sweeper = tokio::spawn(OutputStore::new(config.outputs_dir()).run_sweeper(
        config.output_ttl,
        Duration::from_secs(OUTPUT_SWEEP_INTERVAL_SECS),
        shutdown.clone(),
    ));

    let state = AppState::new(&config, db);
    let app = app::build_router(state);

    info!(bind = %config.bind, "starting server");
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .expect("bind must succeed");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown.requested().await;
        })
        .await
        .expect("server must start");
    let _ = sweeper.await;
    info!("server stopped");
}
