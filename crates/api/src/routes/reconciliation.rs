//! Reconciliation trigger.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use fulfillment::{ReconciliationOptions, ReconciliationReport};
use store::FulfillmentStore;

use super::{Actor, AppState};
use crate::error::ApiError;

/// POST /reconciliation: backfill deductions missing from ready orders.
#[tracing::instrument(skip(state))]
pub async fn run<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    Json(options): Json<ReconciliationOptions>,
) -> Result<Json<ReconciliationReport>, ApiError> {
    let report = state.service.reconcile(options, actor).await?;
    Ok(Json(report))
}
