//! Backfill of inventory deductions that were never recorded.
//!
//! Orders that reached `ready` while the deduction path was broken carry no
//! `inventory-deduct` marker. The job replays the deduction for each of them
//! through the same coordinator the live path uses, so it can run while
//! service is open.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{OrderId, OrderStatus, UserId};
use domain::lock_order;
use serde::{Deserialize, Serialize};
use store::{FulfillmentStore, UnitOfWork};

use crate::coordinator::{EffectContext, EnsureOutcome, SideEffectCoordinator};
use crate::effects::InventoryDeduction;
use crate::error::FulfillmentError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationOptions {
    /// Only orders created at or before this instant are scanned.
    pub as_of: Option<DateTime<Utc>>,
    /// Rehearse the whole run in one unit of work and roll it back.
    #[serde(default)]
    pub dry_run: bool,
}

/// An order the job could not repair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationFailure {
    pub order_id: OrderId,
    pub reason: String,
}

/// Aggregate counts of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub scanned: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errored: usize,
    pub movements_created: usize,
    pub dry_run: bool,
    pub failures: Vec<ReconciliationFailure>,
}

enum OrderOutcome {
    Processed { movements: usize },
    Skipped,
}

pub struct ReconciliationJob<S: FulfillmentStore> {
    store: Arc<S>,
}

impl<S: FulfillmentStore> ReconciliationJob<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Applies the missing deduction to every ready order without a marker.
    ///
    /// Orders are visited oldest first, each in its own unit of work. A
    /// failing order is counted as errored and the run continues; only a
    /// failure to list the candidates aborts the run.
    ///
    /// A dry run visits every order inside a single unit of work that is
    /// rolled back at the end, so stock taken by earlier orders is already
    /// gone when later ones are checked. It holds its locks for the whole
    /// scan, and a storage failure aborts it.
    #[tracing::instrument(skip(self))]
    pub async fn run(
        &self,
        options: ReconciliationOptions,
        actor: UserId,
    ) -> Result<ReconciliationReport, FulfillmentError> {
        let candidates = self
            .store
            .orders_with_status(&OrderStatus::DEDUCTED, options.as_of)
            .await?;

        let mut report = ReconciliationReport {
            dry_run: options.dry_run,
            ..Default::default()
        };
        let mut rehearsal = if options.dry_run {
            Some(self.store.begin().await?)
        } else {
            None
        };
        for order in candidates {
            report.scanned += 1;
            let result = match rehearsal.as_mut() {
                Some(uow) => Self::reconcile_in(uow.as_mut(), order.id, actor).await,
                None => self.reconcile_order(order.id, actor).await,
            };
            match result {
                Ok(OrderOutcome::Processed { movements }) => {
                    report.processed += 1;
                    report.movements_created += movements;
                    metrics::counter!("reconciliation_orders_total", "outcome" => "processed")
                        .increment(1);
                }
                Ok(OrderOutcome::Skipped) => {
                    report.skipped += 1;
                    metrics::counter!("reconciliation_orders_total", "outcome" => "skipped")
                        .increment(1);
                }
                Err(
                    err @ (FulfillmentError::StorageUnavailable(_) | FulfillmentError::Storage(_)),
                ) if rehearsal.is_some() => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        order_id = %order.id,
                        error = %err,
                        "Reconciliation failed for order"
                    );
                    report.errored += 1;
                    report.failures.push(ReconciliationFailure {
                        order_id: order.id,
                        reason: err.to_string(),
                    });
                    metrics::counter!("reconciliation_orders_total", "outcome" => "errored")
                        .increment(1);
                }
            }
        }

        // Rolls the rehearsal back.
        drop(rehearsal);

        tracing::info!(
            scanned = report.scanned,
            processed = report.processed,
            skipped = report.skipped,
            errored = report.errored,
            dry_run = report.dry_run,
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn reconcile_order(
        &self,
        order_id: OrderId,
        actor: UserId,
    ) -> Result<OrderOutcome, FulfillmentError> {
        let mut uow = self.store.begin().await?;
        let outcome = Self::reconcile_in(uow.as_mut(), order_id, actor).await?;
        if let OrderOutcome::Processed { .. } = outcome {
            uow.commit().await?;
        }
        Ok(outcome)
    }

    async fn reconcile_in(
        uow: &mut dyn UnitOfWork,
        order_id: OrderId,
        actor: UserId,
    ) -> Result<OrderOutcome, FulfillmentError> {
        let order = lock_order(uow, order_id).await?;
        // Moved on (paid or cancelled) since the scan.
        if !OrderStatus::DEDUCTED.contains(&order.status()) {
            return Ok(OrderOutcome::Skipped);
        }

        let ctx = EffectContext::new(&order, actor, Utc::now());
        let outcome = SideEffectCoordinator::ensure_once(
            uow,
            &InventoryDeduction::reconciliation(),
            &ctx,
        )
        .await?;

        match outcome {
            EnsureOutcome::AlreadyDone(_) => Ok(OrderOutcome::Skipped),
            EnsureOutcome::Performed { output, .. } => Ok(OrderOutcome::Processed {
                movements: output.movements.len(),
            }),
        }
    }
}

impl<S: FulfillmentStore> Clone for ReconciliationJob<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}
