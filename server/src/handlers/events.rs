use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Event, EventPatch, EventStatus, NewEvent};
use crate::registry::{effective_price, is_registration_open, EventFilter, RegistryError};
use crate::routes::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};

#[derive(Debug, Serialize)]
pub struct TierPrice {
    pub tier_id: String,
    pub name: String,
    pub is_default: bool,
    pub effective_price: Decimal,
    pub early_bird_active: bool,
}

/// Event as shown to clients, with the figures a booking page needs
/// computed against the server clock.
#[derive(Debug, Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: Event,
    pub available: u32,
    pub registration_open: bool,
    pub prices: Vec<TierPrice>,
}

impl EventView {
    pub fn at(event: Event, now: DateTime<Utc>) -> Result<Self, RegistryError> {
        let prices = event
            .pricing
            .iter()
            .map(|tier| {
                let effective_price = effective_price(&event, Some(&tier.id), now)?;
                Ok(TierPrice {
                    tier_id: tier.id.clone(),
                    name: tier.name.clone(),
                    is_default: tier.is_default,
                    effective_price,
                    early_bird_active: effective_price != tier.price,
                })
            })
            .collect::<Result<Vec<_>, RegistryError>>()?;

        Ok(Self {
            available: event.capacity.available(),
            registration_open: is_registration_open(&event, now),
            prices,
            event,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkStatusRequest {
    pub ids: Vec<String>,
    pub status: EventStatus,
}

pub async fn list_events(
    State(state): State<AppState>,
    filter: Result<Query<EventFilter>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(filter) = filter?;
    let events = state.registry.list_events(&filter).await?;
    let now = state.registry.now();

    let views = events
        .into_iter()
        .map(|event| EventView::at(event, now))
        .collect::<Result<Vec<_>, _>>()?;
    let message = format!("Found {} event(s)", views.len());
    Ok(success(views, message))
}

pub async fn create_event(
    State(state): State<AppState>,
    payload: Result<Json<NewEvent>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(new_event) = payload?;
    let event = state.registry.create_event(new_event).await?;
    Ok(created(
        EventView::at(event, state.registry.now())?,
        "Event created",
    ))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let event = state.registry.get_event(&id).await?;
    Ok(success(
        EventView::at(event, state.registry.now())?,
        "Event retrieved",
    ))
}

pub async fn get_event_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let event = state.registry.get_event_by_slug(&slug).await?;
    Ok(success(
        EventView::at(event, state.registry.now())?,
        "Event retrieved",
    ))
}

pub async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<EventPatch>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(patch) = payload?;
    let event = state.registry.update_event(&id, &patch).await?;
    Ok(success(
        EventView::at(event, state.registry.now())?,
        "Event updated",
    ))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    state.registry.delete_event(&id).await?;
    Ok(empty_success("Event deleted"))
}

pub async fn bulk_update_status(
    State(state): State<AppState>,
    payload: Result<Json<BulkStatusRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    if request.ids.is_empty() {
        return Err(AppError::ValidationError(
            "ids must contain at least one event id".to_string(),
        ));
    }

    let outcomes = state
        .registry
        .bulk_update_status(&request.ids, request.status)
        .await;
    let updated = outcomes.iter().filter(|o| o.updated).count();
    let message = format!("Updated {} of {} event(s)", updated, outcomes.len());
    Ok(success(outcomes, message))
}
