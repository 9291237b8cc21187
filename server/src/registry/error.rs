use thiserror::Error;

use crate::store::{Retryable, StoreError, EVENTS, EVENT_REGISTRATIONS};

/// Business-level outcome of a registry operation that did not succeed.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{resource} '{id}' not found")]
    NotFound { resource: &'static str, id: String },

    #[error("attendee already holds an active registration for event '{event_id}'")]
    DuplicateRegistration { event_id: String },

    #[error("registration for event '{event_id}' is closed")]
    EventClosed { event_id: String },

    #[error("event '{event_id}' is full")]
    EventFull { event_id: String },

    #[error("cannot move {entity} from '{from}' to '{to}'")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },

    #[error("{0}")]
    Validation(String),

    #[error("the record was modified concurrently, please retry")]
    Conflict,

    #[error("document store unavailable")]
    StoreUnavailable(#[source] StoreError),

    /// Stored data that can't be decoded or has the wrong shape.
    #[error("stored data could not be processed")]
    Internal(#[source] StoreError),
}

impl RegistryError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        RegistryError::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::NotFound { .. } => "NOT_FOUND",
            RegistryError::DuplicateRegistration { .. } => "DUPLICATE_REGISTRATION",
            RegistryError::EventClosed { .. } => "EVENT_CLOSED",
            RegistryError::EventFull { .. } => "EVENT_FULL",
            RegistryError::InvalidTransition { .. } => "INVALID_TRANSITION",
            RegistryError::Validation(_) => "VALIDATION_ERROR",
            RegistryError::Conflict => "CONFLICT",
            RegistryError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            RegistryError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => RegistryError::Conflict,
            StoreError::NotFound { collection, id } => {
                let resource = match collection.as_str() {
                    EVENTS => "event",
                    EVENT_REGISTRATIONS => "registration",
                    _ => "document",
                };
                RegistryError::NotFound { resource, id }
            }
            err @ (StoreError::Malformed(_) | StoreError::InvalidDocument(_)) => {
                RegistryError::Internal(err)
            }
            err @ (StoreError::Unavailable(_) | StoreError::Database(_)) => {
                RegistryError::StoreUnavailable(err)
            }
        }
    }
}

impl Retryable for RegistryError {
    fn is_retryable(&self) -> bool {
        match self {
            RegistryError::Conflict => true,
            RegistryError::StoreUnavailable(err) => err.is_retryable(),
            _ => false,
        }
    }
}
