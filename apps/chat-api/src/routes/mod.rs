pub mod health;
pub mod stats;

use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(stats::router())
        .merge(crate::chat::server::router())
}
