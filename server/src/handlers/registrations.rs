use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use crate::models::{PaymentStatus, RegistrationRequest, RegistrationStatus};
use crate::registry::RegistrationFilter;
use crate::routes::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Default, Deserialize)]
pub struct RegistrationQuery {
    pub event_id: Option<String>,
    /// `pending` selects on payment status; any other value is a
    /// registration status.
    pub status: Option<String>,
    pub payment_status: Option<PaymentStatus>,
}

impl RegistrationQuery {
    fn into_filter(self) -> Result<RegistrationFilter, AppError> {
        let mut filter = RegistrationFilter {
            event_id: self.event_id,
            status: None,
            payment_status: self.payment_status,
        };

        match self.status.as_deref().map(str::trim) {
            None | Some("") => {}
            Some("pending") => filter.payment_status = Some(PaymentStatus::Pending),
            Some(raw) => {
                let status: RegistrationStatus =
                    serde_json::from_value(serde_json::Value::String(raw.to_string())).map_err(
                        |_| AppError::ValidationError(format!("unknown registration status '{}'", raw)),
                    )?;
                filter.status = Some(status);
            }
        }
        Ok(filter)
    }
}

pub async fn register(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let registration = state.registry.register(&event_id, &request).await?;

    let message = match registration.status {
        RegistrationStatus::Waitlist => "Event is full, added to the waitlist",
        _ => "Registration confirmed",
    };
    Ok(created(registration, message))
}

pub async fn list_registrations(
    State(state): State<AppState>,
    query: Result<Query<RegistrationQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query?;
    let filter = query.into_filter()?;
    let registrations = state.registry.list_registrations(&filter).await?;
    let message = format!("Found {} registration(s)", registrations.len());
    Ok(success(registrations, message))
}

pub async fn get_registration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let registration = state.registry.get_registration(&id).await?;
    Ok(success(registration, "Registration retrieved"))
}

pub async fn cancel_registration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let cancellation = state.registry.cancel_registration(&id).await?;
    Ok(success(cancellation, "Registration cancelled"))
}

pub async fn check_in(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let registration = state.registry.check_in(&id).await?;
    Ok(success(registration, "Attendee checked in"))
}
