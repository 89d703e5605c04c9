//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fulfillment::FulfillmentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Error raised by the fulfillment core.
    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({ "error": self.to_string() });
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Fulfillment(err) => {
                if let FulfillmentError::InsufficientStock { shortfalls } = err {
                    body["shortfalls"] = serde_json::to_value(shortfalls).unwrap_or_default();
                }
                body["retryable"] = serde_json::Value::Bool(err.is_retryable());
                fulfillment_status(err)
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self, %status, "request failed");
        }
        (status, axum::Json(body)).into_response()
    }
}

fn fulfillment_status(err: &FulfillmentError) -> StatusCode {
    match err {
        FulfillmentError::InvalidTransition { .. }
        | FulfillmentError::InsufficientStock { .. }
        | FulfillmentError::Conflict(_) => StatusCode::CONFLICT,
        FulfillmentError::UnknownOrder(_)
        | FulfillmentError::UnknownProduct(_)
        | FulfillmentError::UnknownSize { .. }
        | FulfillmentError::UnknownInventoryItem(_) => StatusCode::NOT_FOUND,
        FulfillmentError::InvalidOrder(_)
        | FulfillmentError::InvalidMovement(_)
        | FulfillmentError::InvalidCatalog(_) => StatusCode::BAD_REQUEST,
        FulfillmentError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        FulfillmentError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        FulfillmentError::SideEffectFailed { .. } => StatusCode::BAD_GATEWAY,
    }
}

#[cfg(test)]
mod tests {
    use common::{OrderId, OrderStatus, SideEffectKind};
    use store::StoreError;

    use super::*;

    fn status_of(err: FulfillmentError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn maps_core_errors_to_status_codes() {
        assert_eq!(
            status_of(FulfillmentError::InvalidTransition {
                current: OrderStatus::Paid,
                requested: OrderStatus::Ready,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(FulfillmentError::InsufficientStock {
                shortfalls: Vec::new()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(FulfillmentError::UnknownOrder(OrderId::new())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(FulfillmentError::InvalidMovement("zero".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(FulfillmentError::StorageUnavailable(StoreError::Database(
                sqlx::Error::PoolTimedOut
            ))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(FulfillmentError::Storage(StoreError::Unsupported("modifiers"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(FulfillmentError::Conflict(StoreError::UniqueViolation {
                constraint: "orders_pkey".to_string()
            })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(FulfillmentError::SideEffectFailed {
                kind: SideEffectKind::PrintTicket,
                reason: "paper out".to_string(),
            }),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn client_errors_keep_their_status() {
        let response = ApiError::BadRequest("bad id".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = ApiError::NotFound("missing".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
