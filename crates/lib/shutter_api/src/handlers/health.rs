//! Liveness/readiness handler.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::models::HealthResponse;

/// `GET /api/health` — service liveness plus database connectivity.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_connected = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();

    Json(HealthResponse {
        status: "ok".to_string(),
        db_connected,
    })
}
