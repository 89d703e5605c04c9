//! HTTP handlers, grouped by resource.

pub mod catalog;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod orders;
pub mod reconciliation;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use fulfillment::{BroadcastNotifier, FileTicketPrinter, FulfillmentService};
use store::FulfillmentStore;
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying the id of the already-authenticated user.
pub const ACTOR_HEADER: &str = "x-user-id";

/// The fulfillment service as wired by the server.
pub type AppService<S> = FulfillmentService<S, FileTicketPrinter, BroadcastNotifier>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: FulfillmentStore> {
    pub service: AppService<S>,
}

/// The user performing the request.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub UserId);

impl<T> FromRequestParts<T> for Actor
where
    T: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &T) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| ApiError::BadRequest(format!("Missing {ACTOR_HEADER} header")))?;
        let value = value
            .to_str()
            .map_err(|e| ApiError::BadRequest(format!("Invalid {ACTOR_HEADER} header: {e}")))?;
        let uuid = parse_uuid(value)?;
        Ok(Actor(UserId::from(uuid)))
    }
}

fn parse_uuid(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id.trim()).map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
