use axum::extract::State;
use axum::response::Response;
use serde::Serialize;

use crate::routes::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

/// Liveness plus a round trip to the document store.
pub async fn health_check(State(state): State<AppState>) -> Result<Response, AppError> {
    state.registry.ping().await?;

    let payload = HealthPayload {
        status: "ok",
        service: "eventhub-api",
    };
    Ok(success(payload, "Health check successful"))
}
