//! Order lifecycle, kitchen and manual side-effect endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Money, OrderId, OrderStatus, TableId};
use domain::{AddItems, CreateOrder, NewItem, Order};
use fulfillment::{
    DeductionOutcome, OrderDetail, ReprintOutcome, StockAvailability, TicketDispatch,
    TransitionOptions, TransitionOutcome,
};
use serde::{Deserialize, Serialize};
use store::{
    CustomerInfo, FulfillmentStore, MarkerRecord, MovementRecord, OrderItemRecord, OrderRecord,
};

use super::{Actor, AppState, parse_uuid};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub table_id: Option<TableId>,
    #[serde(default)]
    pub customer: CustomerInfo,
    #[serde(default)]
    pub discount_cents: i64,
    #[serde(default)]
    pub estimated_prep_minutes: Option<u32>,
    #[serde(default)]
    pub items: Vec<NewItem>,
}

#[derive(Deserialize)]
pub struct AddItemsRequest {
    pub items: Vec<NewItem>,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
    /// Deduct what is on hand instead of failing on a shortfall.
    #[serde(default)]
    pub force: bool,
}

#[derive(Deserialize, Default)]
pub struct ForceQuery {
    #[serde(default)]
    pub force: bool,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub record: OrderRecord,
    pub items: Vec<OrderItemRecord>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let (record, items) = order.into_parts();
        Self { record, items }
    }
}

#[derive(Serialize)]
pub struct OrderDetailResponse {
    pub order: OrderResponse,
    pub deducted: bool,
    pub printed: bool,
    pub markers: Vec<MarkerRecord>,
    pub movements: Vec<MovementRecord>,
}

impl From<OrderDetail> for OrderDetailResponse {
    fn from(detail: OrderDetail) -> Self {
        Self {
            deducted: detail.deducted(),
            printed: detail.printed(),
            order: detail.order.into(),
            markers: detail.markers,
            movements: detail.movements,
        }
    }
}

#[derive(Serialize)]
pub struct TransitionResponse {
    pub order: OrderResponse,
    pub previous: OrderStatus,
    pub changed: bool,
    pub forced: bool,
    pub movements: Vec<MovementRecord>,
    pub ticket: Option<TicketDispatch>,
}

impl From<TransitionOutcome> for TransitionResponse {
    fn from(outcome: TransitionOutcome) -> Self {
        Self {
            order: outcome.order.into(),
            previous: outcome.previous,
            changed: outcome.changed,
            forced: outcome.forced,
            movements: outcome.movements,
            ticket: outcome.ticket,
        }
    }
}

// -- Handlers --

/// POST /orders: create a new order.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let mut cmd = CreateOrder::new(actor)
        .with_customer(req.customer)
        .with_discount(Money::from_cents(req.discount_cents));
    if let Some(table_id) = req.table_id {
        cmd = cmd.for_table(table_id);
    }
    if let Some(minutes) = req.estimated_prep_minutes {
        cmd = cmd.with_estimated_prep(minutes);
    }
    cmd.items = req.items;

    let order = state.service.create_order(cmd).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/{id}: the order with its markers and movements.
#[tracing::instrument(skip(state))]
pub async fn get<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetailResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let detail = state.service.get_order_detail(order_id).await?;
    Ok(Json(detail.into()))
}

/// POST /orders/{id}/items: append lines to an open order.
#[tracing::instrument(skip(state, req))]
pub async fn add_items<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<AddItemsRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .service
        .add_items(AddItems::new(order_id, req.items))
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/status: move the order along its lifecycle.
#[tracing::instrument(skip(state, req), fields(status = %req.status, force = req.force))]
pub async fn transition<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let outcome = state
        .service
        .transition_status(
            order_id,
            req.status,
            actor,
            TransitionOptions { force: req.force },
        )
        .await?;
    Ok(Json(outcome.into()))
}

/// POST /orders/{id}/payment: the payment collaborator's "fully paid" signal.
#[tracing::instrument(skip(state))]
pub async fn settle_payment<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let outcome = state.service.settle_payment(order_id, actor).await?;
    Ok(Json(outcome.into()))
}

/// POST /orders/{id}/reprint: print the kitchen ticket again.
#[tracing::instrument(skip(state))]
pub async fn reprint<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<Json<ReprintOutcome>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let outcome = state.service.reprint_ticket(order_id, actor).await?;
    Ok(Json(outcome))
}

/// POST /orders/{id}/deductions: deduct the recipe again on operator request.
#[tracing::instrument(skip(state, query))]
pub async fn deduct<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    Query(query): Query<ForceQuery>,
) -> Result<(StatusCode, Json<DeductionOutcome>), ApiError> {
    let order_id = parse_order_id(&id)?;
    let outcome = state
        .service
        .manual_deduction(order_id, actor, query.force)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /orders/{id}/availability: requirement vs. stock on hand.
#[tracing::instrument(skip(state))]
pub async fn availability<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<StockAvailability>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let availability = state.service.stock_availability(order_id).await?;
    Ok(Json(availability))
}

/// GET /kitchen/orders: orders on the kitchen display, oldest first.
#[tracing::instrument(skip(state))]
pub async fn kitchen<S: FulfillmentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.service.list_kitchen_orders().await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    parse_uuid(id).map(OrderId::from)
}
