//! Tabletop Back binary entrypoint wiring REST, WebSocket and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tabletop_back::{
    config::{AppConfig, StorageBackend},
    dao::exercise_store::memory::MemoryExerciseStore,
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::new(AppConfig::load());
    start_storage(&app_state).await;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the configured storage backend. MongoDB connects in the background; the server
/// answers in degraded mode until it is reachable.
async fn start_storage(state: &SharedState) {
    match StorageBackend::from_env() {
        StorageBackend::Memory => install_memory_store(state).await,
        StorageBackend::Mongo => spawn_mongo_supervisor(state).await,
    }
}

async fn install_memory_store(state: &SharedState) {
    info!("using in-memory storage; data is lost on restart");
    state.set_store(Arc::new(MemoryExerciseStore::new())).await;
}

#[cfg(feature = "mongo-store")]
async fn spawn_mongo_supervisor(state: &SharedState) {
    use tabletop_back::{
        dao::{
            exercise_store::{
                ExerciseStore,
                mongodb::{MongoConfig, MongoExerciseStore},
            },
            storage::StorageError,
        },
        services::storage_supervisor,
    };

    let mongo_uri = env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
    let mongo_db = env::var("MONGO_DB").ok();

    tokio::spawn(storage_supervisor::run(state.clone(), move || {
        let uri = mongo_uri.clone();
        let db = mongo_db.clone();
        async move {
            let config = MongoConfig::from_uri(&uri, db.as_deref())
                .await
                .map_err(StorageError::from)?;
            let store = MongoExerciseStore::connect(config)
                .await
                .map_err(StorageError::from)?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn ExerciseStore>)
        }
    }));
}

#[cfg(not(feature = "mongo-store"))]
async fn spawn_mongo_supervisor(state: &SharedState) {
    warn!("built without the `mongo-store` feature; falling back to in-memory storage");
    install_memory_store(state).await;
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
