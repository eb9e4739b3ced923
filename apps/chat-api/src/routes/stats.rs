use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::chat::stats;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/chat/stats", get(chat_stats))
}

/// Aggregate connection/conversation/message counts for the admin console.
async fn chat_stats(State(state): State<AppState>) -> impl IntoResponse {
    match stats::collect(&state.chat).await {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => {
            tracing::error!(?err, "failed to collect chat statistics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "message": "Failed to collect statistics" })),
            )
                .into_response()
        }
    }
}
