//! API error types with HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, ErrorKind};
use projections::ProjectionError;
use settlement::SettlementError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable identity headers on the request.
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unauthenticated(_) | ApiError::Forbidden(_) => ErrorKind::Forbidden,
            ApiError::BadRequest(_) => ErrorKind::Validation,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Settlement(e) => e.kind(),
            ApiError::Domain(e) => e.kind(),
            ApiError::Projection(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            other => status_for(other.kind()),
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidTransition | ErrorKind::ConcurrencyConflict => StatusCode::CONFLICT,
        ErrorKind::InsufficientBalance => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::RemoteUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        metrics::counter!("api_errors_total", "kind" => kind.as_str()).increment(1);
        if status.is_server_error() {
            tracing::error!(error = %self, kind = %kind, "request failed");
        } else {
            tracing::debug!(error = %self, kind = %kind, "request rejected");
        }

        let body = serde_json::json!({ "error": self.to_string(), "kind": kind.as_str() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AggregateId;
    use domain::{OrderError, WalletError};

    #[test]
    fn test_kind_to_status() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::InvalidTransition), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::ConcurrencyConflict), StatusCode::CONFLICT);
        assert_eq!(
            status_for(ErrorKind::InsufficientBalance),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(ErrorKind::RemoteUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_domain_errors_keep_their_kind() {
        let err = ApiError::from(DomainError::from(WalletError::InsufficientBalance {
            balance: 50,
            requested: 60,
        }));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err = ApiError::from(SettlementError::OrderNotFound(AggregateId::new()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = ApiError::from(DomainError::from(OrderError::NotPlaced));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_missing_identity_is_unauthorized() {
        let err = ApiError::Unauthenticated("missing x-actor-role header".into());
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
