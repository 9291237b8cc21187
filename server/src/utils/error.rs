use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::registry::RegistryError;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Request clashes with the current state of a resource.
    #[error("{message}")]
    Conflict {
        code: &'static str,
        message: String,
        details: Option<Value>,
    },

    /// Well-formed request the event cannot accept right now.
    #[error("{message}")]
    Unprocessable {
        code: &'static str,
        message: String,
        details: Option<Value>,
    },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict { code, .. } | AppError::Unprocessable { code, .. } => *code,
            AppError::ServiceUnavailable(_) => "STORE_UNAVAILABLE",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::ServiceUnavailable(msg) | AppError::InternalServerError(msg) => {
                error!(code = self.code(), message = %msg, "Application error");
            }
            _ => {
                warn!(code = self.code(), message = %self, "Request rejected");
            }
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            RegistryError::NotFound { .. } => AppError::NotFound(message),
            RegistryError::Validation(msg) => AppError::ValidationError(msg),
            RegistryError::DuplicateRegistration { event_id } => AppError::Conflict {
                code,
                message,
                details: Some(json!({ "event_id": event_id })),
            },
            RegistryError::InvalidTransition { from, to, .. } => AppError::Conflict {
                code,
                message,
                details: Some(json!({ "from": from, "to": to })),
            },
            RegistryError::Conflict => AppError::Conflict {
                code,
                message,
                details: None,
            },
            RegistryError::EventClosed { event_id } | RegistryError::EventFull { event_id } => {
                AppError::Unprocessable {
                    code,
                    message,
                    details: Some(json!({ "event_id": event_id })),
                }
            }
            RegistryError::StoreUnavailable(source) => {
                AppError::ServiceUnavailable(format!("{:?}", source))
            }
            RegistryError::Internal(source) => {
                AppError::InternalServerError(format!("{:?}", source))
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Store and internal failures are logged above, never echoed back.
        let (message, details) = match self {
            AppError::ValidationError(msg) | AppError::NotFound(msg) => (msg, None),
            AppError::Conflict {
                message, details, ..
            }
            | AppError::Unprocessable {
                message, details, ..
            } => (message, details),
            AppError::ServiceUnavailable(_) => {
                ("The event store is temporarily unavailable".to_string(), None)
            }
            AppError::InternalServerError(_) => ("An internal error occurred".to_string(), None),
        };

        error_response(code, message, details, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn test_registry_errors_map_to_http_status() {
        let cases = [
            (RegistryError::not_found("event", "e1"), StatusCode::NOT_FOUND),
            (
                RegistryError::Validation("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                RegistryError::DuplicateRegistration {
                    event_id: "e1".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (RegistryError::Conflict, StatusCode::CONFLICT),
            (
                RegistryError::InvalidTransition {
                    entity: "registration",
                    from: "cancelled",
                    to: "cancelled",
                },
                StatusCode::CONFLICT,
            ),
            (
                RegistryError::EventClosed {
                    event_id: "e1".to_string(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                RegistryError::EventFull {
                    event_id: "e1".to_string(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                RegistryError::StoreUnavailable(StoreError::Unavailable("down".to_string())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, status) in cases {
            let code = err.code();
            let app: AppError = err.into();
            assert_eq!(app.status_code(), status);
            assert_eq!(app.code(), code);
        }

        let app: AppError =
            RegistryError::from(StoreError::InvalidDocument("not an object".to_string())).into();
        assert_eq!(app.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.code(), "INTERNAL_SERVER_ERROR");
    }

    #[test]
    fn test_store_details_are_not_exposed() {
        let app: AppError =
            RegistryError::StoreUnavailable(StoreError::Unavailable("10.0.0.7 refused".into()))
                .into();
        let response = app.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
