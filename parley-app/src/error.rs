use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parley_core::{ParleyError, Tier};
use serde_json::json;
use tracing::error;

use crate::storage::StoreError;

/// Errors returned by command functions; rendered as `{"error": ...}` JSON.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("tier '{requested}' is locked; unlocked tiers: {unlocked}")]
    TierLocked { requested: Tier, unlocked: String },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TierLocked { .. } => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RoomNotFound(_) => AppError::NotFound(err.to_string()),
            StoreError::RoomInactive(_) | StoreError::NoSession(_) => {
                AppError::Conflict(err.to_string())
            }
            StoreError::Domain(domain) => domain.into(),
            other => {
                error!("storage failure: {other}");
                AppError::Internal(other.to_string())
            }
        }
    }
}

impl From<ParleyError> for AppError {
    fn from(err: ParleyError) -> Self {
        match err {
            ParleyError::EmptyInput => AppError::Unprocessable(err.to_string()),
            ParleyError::TerminalState => AppError::Conflict(err.to_string()),
            ParleyError::InvalidScript(_) => AppError::BadRequest(err.to_string()),
            other => {
                error!("engine failure: {other}");
                AppError::Internal(other.to_string())
            }
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        error!("blocking task failed: {err}");
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        assert_eq!(
            AppError::from(ParleyError::EmptyInput).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(StoreError::Domain(ParleyError::TerminalState)).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(StoreError::RoomNotFound("room-1".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(ParleyError::InvariantViolation("two open".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn tier_locked_names_the_tiers() {
        let err = AppError::TierLocked {
            requested: Tier::Hard,
            unlocked: "easy".into(),
        };
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "tier 'hard' is locked; unlocked tiers: easy");
    }
}
