//! Side-effect coordinator for exactly-once effects per order.
//!
//! The coordinator never commits. The marker is written through the caller's
//! unit of work, next to whatever the effect wrote, so "effect done" and
//! "marker recorded" always land in the same commit or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MarkerId, SideEffectKind, UserId};
use domain::Order;
use store::{MarkerRecord, UnitOfWork};

use crate::error::FulfillmentError;

/// What an effect needs to know about the order it runs for.
#[derive(Debug, Clone, Copy)]
pub struct EffectContext<'a> {
    pub order: &'a Order,
    pub actor: UserId,
    pub now: DateTime<Utc>,
}

impl<'a> EffectContext<'a> {
    pub fn new(order: &'a Order, actor: UserId, now: DateTime<Utc>) -> Self {
        Self { order, actor, now }
    }
}

/// Output of an effect together with what its marker should record.
#[derive(Debug, Clone)]
pub struct Performed<T> {
    pub output: T,
    /// The effect bypassed a safety check (forced deduction).
    pub forced: bool,
    pub detail: serde_json::Value,
}

impl<T> Performed<T> {
    pub fn new(output: T) -> Self {
        Self {
            output,
            forced: false,
            detail: serde_json::Value::Null,
        }
    }

    pub fn forced(mut self, forced: bool) -> Self {
        self.forced = forced;
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// An operation guarded by an idempotency marker.
///
/// Implementations do their storage writes through the given unit of work
/// and must not commit it.
#[async_trait]
pub trait SideEffect: Send + Sync {
    type Output: Send;

    fn kind(&self) -> SideEffectKind;

    async fn perform(
        &self,
        uow: &mut dyn UnitOfWork,
        ctx: &EffectContext<'_>,
    ) -> Result<Performed<Self::Output>, FulfillmentError>;
}

/// Result of a coordinated effect.
#[derive(Debug, Clone)]
pub enum EnsureOutcome<T> {
    /// A non-repeat marker already existed; the effect did not run.
    AlreadyDone(MarkerRecord),

    /// The effect ran and its marker was written.
    Performed { output: T, marker: MarkerRecord },
}

impl<T> EnsureOutcome<T> {
    pub fn marker(&self) -> &MarkerRecord {
        match self {
            EnsureOutcome::AlreadyDone(marker) => marker,
            EnsureOutcome::Performed { marker, .. } => marker,
        }
    }

    pub fn was_performed(&self) -> bool {
        matches!(self, EnsureOutcome::Performed { .. })
    }

    /// The effect's output when it ran.
    pub fn into_output(self) -> Option<T> {
        match self {
            EnsureOutcome::AlreadyDone(_) => None,
            EnsureOutcome::Performed { output, .. } => Some(output),
        }
    }
}

/// Runs side effects at most once (automatic path) or always (manual path).
pub struct SideEffectCoordinator;

impl SideEffectCoordinator {
    /// Runs `effect` unless a non-repeat marker for (order, kind) exists.
    ///
    /// The order row must already be locked by `uow`, which serialises
    /// concurrent callers on the marker check.
    #[tracing::instrument(skip_all, fields(order_id = %ctx.order.id(), kind = %effect.kind()))]
    pub async fn ensure_once<E: SideEffect + ?Sized>(
        uow: &mut dyn UnitOfWork,
        effect: &E,
        ctx: &EffectContext<'_>,
    ) -> Result<EnsureOutcome<E::Output>, FulfillmentError> {
        let kind = effect.kind();
        if let Some(existing) = uow.find_marker(ctx.order.id(), kind).await? {
            metrics::counter!("side_effects_skipped_total", "kind" => kind.as_str()).increment(1);
            tracing::debug!(performed_at = %existing.performed_at, "Side effect already recorded");
            return Ok(EnsureOutcome::AlreadyDone(existing));
        }

        Self::run(uow, effect, ctx, false).await
    }

    /// Always runs `effect` and records a marker flagged as a repeat.
    ///
    /// Existing markers are never consulted or touched.
    #[tracing::instrument(skip_all, fields(order_id = %ctx.order.id(), kind = %effect.kind()))]
    pub async fn ensure_repeatable<E: SideEffect + ?Sized>(
        uow: &mut dyn UnitOfWork,
        effect: &E,
        ctx: &EffectContext<'_>,
    ) -> Result<EnsureOutcome<E::Output>, FulfillmentError> {
        Self::run(uow, effect, ctx, true).await
    }

    async fn run<E: SideEffect + ?Sized>(
        uow: &mut dyn UnitOfWork,
        effect: &E,
        ctx: &EffectContext<'_>,
        repeat: bool,
    ) -> Result<EnsureOutcome<E::Output>, FulfillmentError> {
        let kind = effect.kind();
        let performed = effect.perform(uow, ctx).await?;

        let marker = MarkerRecord {
            id: MarkerId::new(),
            order_id: ctx.order.id(),
            kind,
            is_repeat: repeat,
            forced: performed.forced,
            performed_by: ctx.actor,
            performed_at: ctx.now,
            detail: performed.detail,
        };
        uow.insert_marker(&marker).await?;

        metrics::counter!(
            "side_effects_executed_total",
            "kind" => kind.as_str(),
            "repeat" => if repeat { "true" } else { "false" }
        )
        .increment(1);
        tracing::info!(repeat, forced = marker.forced, "Side effect recorded");

        Ok(EnsureOutcome::Performed {
            output: performed.output,
            marker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use common::{Money, OrderId, OrderStatus};
    use store::{CustomerInfo, FulfillmentStore, InMemoryStore, OrderRecord};

    /// Counts invocations; optionally fails.
    struct CountingEffect {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingEffect {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl SideEffect for CountingEffect {
        type Output = usize;

        fn kind(&self) -> SideEffectKind {
            SideEffectKind::PrintTicket
        }

        async fn perform(
            &self,
            _uow: &mut dyn UnitOfWork,
            _ctx: &EffectContext<'_>,
        ) -> Result<Performed<usize>, FulfillmentError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(FulfillmentError::SideEffectFailed {
                    kind: SideEffectKind::PrintTicket,
                    reason: "jammed".to_string(),
                });
            }
            Ok(Performed::new(n).with_detail(serde_json::json!({ "call": n })))
        }
    }

    async fn stored_order(store: &InMemoryStore) -> Order {
        let now = Utc::now();
        let record = OrderRecord {
            id: OrderId::new(),
            table_id: None,
            customer: CustomerInfo::default(),
            subtotal: Money::zero(),
            discount: Money::zero(),
            tax: Money::zero(),
            suggested_tip: Money::zero(),
            total: Money::zero(),
            status: OrderStatus::Preparing,
            created_by: UserId::new(),
            created_at: now,
            updated_at: now,
            estimated_prep_minutes: None,
            pickup_at: None,
        };
        let mut uow = store.begin().await.unwrap();
        uow.insert_order(&record).await.unwrap();
        uow.commit().await.unwrap();
        Order::from_records(record, Vec::new())
    }

    async fn once(
        store: &InMemoryStore,
        order: &Order,
        effect: &CountingEffect,
    ) -> EnsureOutcome<usize> {
        let mut uow = store.begin().await.unwrap();
        let ctx = EffectContext::new(order, UserId::new(), Utc::now());
        let outcome = SideEffectCoordinator::ensure_once(uow.as_mut(), effect, &ctx)
            .await
            .unwrap();
        uow.commit().await.unwrap();
        outcome
    }

    #[tokio::test]
    async fn automatic_path_runs_once() {
        let store = InMemoryStore::new();
        let order = stored_order(&store).await;
        let effect = CountingEffect::new(false);

        let first = once(&store, &order, &effect).await;
        let second = once(&store, &order, &effect).await;

        assert!(first.was_performed());
        assert!(!second.was_performed());
        assert_eq!(second.marker().id, first.marker().id);
        assert_eq!(effect.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.marker_count().await, 1);
    }

    #[tokio::test]
    async fn repeatable_path_always_runs_and_flags_repeat() {
        let store = InMemoryStore::new();
        let order = stored_order(&store).await;
        let effect = CountingEffect::new(false);
        once(&store, &order, &effect).await;

        let mut uow = store.begin().await.unwrap();
        let ctx = EffectContext::new(&order, UserId::new(), Utc::now());
        let outcome = SideEffectCoordinator::ensure_repeatable(uow.as_mut(), &effect, &ctx)
            .await
            .unwrap();
        uow.commit().await.unwrap();

        assert!(outcome.marker().is_repeat);
        assert_eq!(outcome.into_output(), Some(2));

        let markers = store.markers(order.id()).await.unwrap();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers.iter().filter(|m| !m.is_repeat).count(), 1);
    }

    #[tokio::test]
    async fn failed_effect_leaves_no_marker() {
        let store = InMemoryStore::new();
        let order = stored_order(&store).await;
        let effect = CountingEffect::new(true);

        let mut uow = store.begin().await.unwrap();
        let ctx = EffectContext::new(&order, UserId::new(), Utc::now());
        let result = SideEffectCoordinator::ensure_once(uow.as_mut(), &effect, &ctx).await;
        drop(uow);

        assert!(matches!(
            result,
            Err(FulfillmentError::SideEffectFailed { .. })
        ));
        assert_eq!(store.marker_count().await, 0);
    }
}
