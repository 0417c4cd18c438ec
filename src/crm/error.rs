use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::{response::IntoResponse, Json};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use log::error;

use super::response::ApiResponse;

pub const LEAD_HAS_PROJECT: &str = "Lead already has a project";
pub const QUOTE_ALREADY_INVOICED: &str = "Invoice already exists for this quote";

#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        details: Vec<String>,
    },
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CrmError {
    pub fn not_found(entity: &str) -> Self {
        Self::NotFound(format!("{entity} not found"))
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn validation(details: Vec<String>) -> Self {
        Self::Validation {
            message: "Request validation failed".to_string(),
            details,
        }
    }

    /// Message without the variant prefix, as sent to clients.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::InvalidState(msg)
            | Self::Unauthorized(msg)
            | Self::Database(msg)
            | Self::Internal(msg) => msg,
            Self::Validation { message, .. } => message,
        }
    }
}

impl From<DieselError> for CrmError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound("Record not found".to_string()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info) => {
                match info.constraint_name() {
                    Some("crm_projects_lead_id_key") => Self::invalid_state(LEAD_HAS_PROJECT),
                    Some("crm_invoices_quote_id_key") => {
                        Self::invalid_state(QUOTE_ALREADY_INVOICED)
                    }
                    _ => Self::invalid_state(format!("Conflicting write: {}", info.message())),
                }
            }
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for CrmError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        Self::Database(format!("Connection pool error: {err}"))
    }
}

impl From<JsonRejection> for CrmError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation {
            message: "Malformed request body".to_string(),
            details: vec![rejection.body_text()],
        }
    }
}

impl From<PathRejection> for CrmError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation {
            message: "Invalid path parameter".to_string(),
            details: vec![rejection.body_text()],
        }
    }
}

impl From<QueryRejection> for CrmError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation {
            message: "Invalid query string".to_string(),
            details: vec![rejection.body_text()],
        }
    }
}

impl From<tokio::task::JoinError> for CrmError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for CrmError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState(_) => StatusCode::BAD_REQUEST,
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Database(_) | Self::Internal(_) => {
                error!("{self}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let details = match &self {
            Self::Validation { details, .. } => Some(details.clone()),
            _ => None,
        };
        let body: ApiResponse<()> = ApiResponse::failure(self.message().to_string(), details);
        (status, Json(body)).into_response()
    }
}
