pub mod chat;
pub mod config;
pub mod directory;
pub mod error;
pub mod models;
pub mod routes;

use std::sync::Arc;

use chat::handler::ChatService;
use config::Config;

/// Shared application state available to all route handlers.
///
/// There are no process-wide singletons: tests build isolated instances
/// per case and a durable `ChatStore` can be substituted without touching
/// routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub chat: Arc<ChatService>,
}
