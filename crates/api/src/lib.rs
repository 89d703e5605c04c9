//! HTTP API server for the order-fulfillment core.
//!
//! Provides REST endpoints for orders, the kitchen display, stock
//! administration and reconciliation, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use fulfillment::{BroadcastNotifier, FileTicketPrinter, FulfillmentService};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use store::{FulfillmentStore, PostgresStore, StoreError};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: FulfillmentStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/items", post(routes::orders::add_items::<S>))
        .route("/orders/{id}/status", post(routes::orders::transition::<S>))
        .route("/orders/{id}/payment", post(routes::orders::settle_payment::<S>))
        .route("/orders/{id}/reprint", post(routes::orders::reprint::<S>))
        .route("/orders/{id}/deductions", post(routes::orders::deduct::<S>))
        .route(
            "/orders/{id}/availability",
            get(routes::orders::availability::<S>),
        )
        .route("/kitchen/orders", get(routes::orders::kitchen::<S>))
        .route("/reconciliation", post(routes::reconciliation::run::<S>))
        .route("/inventory/items", post(routes::inventory::create_item::<S>))
        .route(
            "/inventory/movements",
            post(routes::inventory::record_movement::<S>),
        )
        .route("/inventory/integrity", get(routes::inventory::integrity::<S>))
        .route("/products", post(routes::catalog::register::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over `store`, spooling tickets to the
/// configured directory and fanning events out through `notifier`.
pub fn create_state<S: FulfillmentStore + 'static>(
    store: S,
    config: &Config,
    notifier: BroadcastNotifier,
) -> Arc<AppState<S>> {
    let printer = FileTicketPrinter::new(config.ticket_spool_dir.clone());
    let service = FulfillmentService::new(
        Arc::new(store),
        Arc::new(printer),
        Arc::new(notifier),
        config.pricing(),
    );
    Arc::new(AppState { service })
}

/// Connects to PostgreSQL, applies migrations and probes the schema.
///
/// The storage timeout bounds both pool acquisition and every statement.
pub async fn connect_postgres(url: &str, config: &Config) -> Result<PostgresStore, StoreError> {
    let timeout_ms = config.storage_timeout.as_millis().to_string();
    let options: PgConnectOptions = url.parse()?;
    let options = options.options([("statement_timeout", timeout_ms)]);

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.storage_timeout)
        .connect_with(options)
        .await?;

    let mut store = PostgresStore::new(pool).await?;
    store.run_migrations().await?;
    Ok(store)
}
