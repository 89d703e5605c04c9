//! Product management endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use fulfillment::ProductDefinition;
use store::{FulfillmentStore, ProductRecord};

use super::AppState;
use crate::error::ApiError;

/// POST /products: store a product with its sizes and recipe.
#[tracing::instrument(skip(state, req), fields(product = %req.product.name))]
pub async fn register<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<ProductDefinition>,
) -> Result<(StatusCode, Json<ProductRecord>), ApiError> {
    let product = state.service.register_product(req).await?;
    Ok((StatusCode::CREATED, Json(product)))
}
