use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{
    bulk_update_status, cancel_registration, check_in, create_event, delete_event, get_event,
    get_event_by_slug, get_registration, health_check, list_events, list_registrations, register,
    update_event,
};
use crate::registry::EventRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<EventRegistry>,
}

impl AppState {
    pub fn new(registry: EventRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }
}

pub fn create_routes(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events", get(list_events).post(create_event))
        .route("/events/bulk", post(bulk_update_status))
        .route("/events/registrations", get(list_registrations))
        .route("/events/registrations/:id", get(get_registration))
        .route("/events/registrations/:id/cancel", post(cancel_registration))
        .route("/events/registrations/:id/check-in", post(check_in))
        .route("/events/slug/:slug", get(get_event_by_slug))
        .route(
            "/events/:id",
            get(get_event).patch(update_event).delete(delete_event),
        )
        .route("/events/:id/registrations", post(register))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config.production))
        .layer(create_cors_layer(&config.cors_allowed_origins))
}
