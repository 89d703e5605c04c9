//! Prometheus metrics endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}

/// Registers descriptions for the counters and histograms the core records.
pub fn describe() {
    metrics::describe_counter!("orders_created_total", "Orders created");
    metrics::describe_counter!(
        "order_transitions_total",
        "Committed order status changes, by target status"
    );
    metrics::describe_histogram!(
        "order_transition_duration_seconds",
        metrics::Unit::Seconds,
        "Time spent in a status change, including side effects"
    );
    metrics::describe_counter!(
        "inventory_movements_total",
        "Ledger movements written, by origin"
    );
    metrics::describe_counter!(
        "side_effects_executed_total",
        "Side effects performed, by kind and repeat flag"
    );
    metrics::describe_counter!(
        "side_effects_skipped_total",
        "Side effects skipped because a marker already existed"
    );
    metrics::describe_counter!(
        "ticket_print_failures_total",
        "Kitchen tickets that failed to print"
    );
    metrics::describe_counter!(
        "notification_failures_total",
        "Notifications that could not be published"
    );
    metrics::describe_counter!(
        "reconciliation_orders_total",
        "Orders visited by reconciliation, by outcome"
    );
}
