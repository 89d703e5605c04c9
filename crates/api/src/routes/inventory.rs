//! Stock administration endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::BalanceCheck;
use fulfillment::{NewInventoryItem, StockMovementInput};
use serde::Serialize;
use store::{FulfillmentStore, InventoryItemRecord, MovementRecord};

use super::{Actor, AppState};
use crate::error::ApiError;

#[derive(Serialize)]
pub struct IntegrityResponse {
    pub consistent: bool,
    pub items: Vec<BalanceCheck>,
}

/// POST /inventory/items: create a stock item.
#[tracing::instrument(skip(state, req))]
pub async fn create_item<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    Json(req): Json<NewInventoryItem>,
) -> Result<(StatusCode, Json<InventoryItemRecord>), ApiError> {
    let item = state.service.add_inventory_item(req, actor).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// POST /inventory/movements: book a purchase, a manual exit or an adjustment.
#[tracing::instrument(skip(state, req))]
pub async fn record_movement<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    Json(req): Json<StockMovementInput>,
) -> Result<(StatusCode, Json<MovementRecord>), ApiError> {
    let movement = state.service.record_stock_movement(req, actor).await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

/// GET /inventory/integrity: compare every balance with its movement history.
#[tracing::instrument(skip(state))]
pub async fn integrity<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<IntegrityResponse>, ApiError> {
    let items = state.service.verify_inventory().await?;
    let consistent = items.iter().all(|check| check.consistent);
    if !consistent {
        tracing::warn!("Inventory balances diverge from movement history");
    }
    Ok(Json(IntegrityResponse { consistent, items }))
}
