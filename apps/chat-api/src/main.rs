use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_api::chat::handler::ChatService;
use chat_api::chat::store::MemoryChatStore;
use chat_api::config::Config;
use chat_api::directory::{FileDirectory, SubscriberDirectory};
use chat_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing - env vars may be set externally)
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

    let directory: Arc<dyn SubscriberDirectory> = match &config.subscribers_file {
        Some(path) => {
            let directory = FileDirectory::load(path);
            tracing::info!(%path, subscribers = directory.len(), "subscriber directory loaded");
            Arc::new(directory)
        }
        None => Arc::new(FileDirectory::empty()),
    };

    // In-memory store: chat history does not survive a restart. Swap in a
    // durable ChatStore implementation here when that becomes a requirement.
    let store = Arc::new(MemoryChatStore::new());

    let state = AppState {
        config: Arc::new(config),
        chat: Arc::new(ChatService::new(store, directory)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = chat_api::routes::router()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "chat-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
