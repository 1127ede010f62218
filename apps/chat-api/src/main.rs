use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_api::config::Config;
use chat_api::db::store::MemoryStore;
use chat_api::db::{pg::PgStore, Stores};
use chat_api::queue::{memory, MemoryQueue, NotificationQueue, RedisQueue, RetryConfig, RetryingQueue};
use chat_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let stores = match &config.database_url {
        Some(url) => Stores::postgres(PgStore::new(chat_api::db::pool::connect(url))),
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Stores::memory(Arc::new(MemoryStore::new()))
        }
    };

    let broker: Arc<dyn NotificationQueue> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisQueue::connect(url)
                .await
                .expect("failed to connect to redis"),
        ),
        None => {
            tracing::warn!("REDIS_URL not set, using in-process notification queue");
            let (queue, rx) = MemoryQueue::new();
            tokio::spawn(memory::drain_to_log(rx));
            Arc::new(queue)
        }
    };
    let queue = Arc::new(RetryingQueue::new(
        broker,
        RetryConfig {
            max_retries: config.queue_max_retries,
            initial_backoff: config.queue_retry_backoff,
            ..RetryConfig::default()
        },
    ));

    let state = AppState::new(config, stores, queue);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(chat_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "chat-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(?e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
