//! Banana reconciler
//!
//! One pass reads the record, classifies its lifecycle state from the fields
//! alone, and performs at most one store write:
//! - add the finalizer to a new record
//! - paint the banana and record the observed color in status
//! - clean up and remove the finalizer from a record marked for deletion
//!
//! Every write carries the resourceVersion read at the top of the pass, so a
//! concurrent writer turns our write into a retryable conflict instead of a
//! lost update.

use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::action::guarded;
use crate::controllers::Context;
use crate::crd::{Banana, BananaStatus, Identity};
use crate::error::{Error, Result};
use crate::events::{emit, LifecycleEvent};
use crate::finalizer::{self, LifecycleState, Step};
use crate::metrics;

/// What a successful pass did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// No record behind the identity
    Gone,
    /// Finalizer written; convergence happens on a later pass
    FinalizerAdded,
    /// Action applied and status written
    Painted,
    /// Already converged, nothing done
    UpToDate,
    /// Cleanup ran and the finalizer was removed
    Released,
    /// Deletion requested but our finalizer was already gone
    AlreadyReleased,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Gone => "gone",
            Outcome::FinalizerAdded => "finalizer_added",
            Outcome::Painted => "painted",
            Outcome::UpToDate => "up_to_date",
            Outcome::Released => "released",
            Outcome::AlreadyReleased => "already_released",
        }
    }
}

/// Reconcile the record behind `identity`
pub async fn reconcile(identity: &Identity, ctx: &Context) -> Result<Outcome> {
    let Some(banana) = ctx.store.get(identity).await? else {
        info!(%identity, "Banana not found: ignoring resource");
        return Ok(Outcome::Gone);
    };

    let state = LifecycleState::classify(&banana);
    debug!(%identity, state = state.as_str(), "Classified Banana");

    let outcome = match state.next_step() {
        Step::AddFinalizer => register_finalizer(identity, banana, ctx).await?,
        Step::Converge => paint(identity, banana, ctx).await?,
        Step::CleanupAndRelease => release(identity, banana, ctx).await?,
        Step::Nothing if state == LifecycleState::Released => {
            debug!(%identity, "Banana is being deleted and already released");
            Outcome::AlreadyReleased
        }
        Step::Nothing => Outcome::UpToDate,
    };

    metrics::OUTCOMES.with_label_values(&[outcome.as_str()]).inc();
    Ok(outcome)
}

async fn register_finalizer(identity: &Identity, mut banana: Banana, ctx: &Context) -> Result<Outcome> {
    finalizer::add_finalizer(&mut banana);
    let updated = ctx.store.update(&banana).await.map_err(|e| {
        error!(%identity, error = %e, "Failed to add finalizer");
        count_conflict(e)
    })?;

    info!(%identity, "Finalizer added");
    metrics::FINALIZER_OPERATIONS.with_label_values(&["add"]).inc();
    emit(ctx.events.as_ref(), &updated, LifecycleEvent::FinalizerAdded).await;
    Ok(Outcome::FinalizerAdded)
}

async fn paint(identity: &Identity, mut banana: Banana, ctx: &Context) -> Result<Outcome> {
    let desired = banana.spec.clone();
    info!(
        %identity,
        desired = %desired.color,
        observed = %banana.observed_color(),
        "Painting Banana"
    );

    let started = Instant::now();
    let applied = guarded(
        "apply",
        ctx.config.action_timeout,
        &ctx.shutdown,
        ctx.action.apply(identity, &desired),
    )
    .await
    .and_then(|observed| {
        if observed.color == desired.color {
            Ok(observed)
        } else {
            Err(Error::action(format!(
                "painted '{}' but '{}' was requested",
                observed.color, desired.color
            )))
        }
    });
    let outcome = if applied.is_ok() { "success" } else { "failure" };
    metrics::PAINTS_TOTAL.with_label_values(&[outcome]).inc();
    metrics::PAINT_DURATION
        .with_label_values(&[outcome])
        .observe(started.elapsed().as_secs_f64());

    if let Err(e) = applied {
        warn!(%identity, error = %e, "Failed to paint Banana");
        emit(
            ctx.events.as_ref(),
            &banana,
            LifecycleEvent::ActionFailed {
                action: "apply",
                message: e.to_string(),
            },
        )
        .await;
        return Err(e);
    }

    banana.status = Some(BananaStatus {
        color: desired.color.clone(),
    });
    let updated = ctx.store.update_status(&banana).await.map_err(|e| {
        error!(%identity, error = %e, "Failed to update Banana status");
        count_conflict(e)
    })?;

    info!(%identity, color = %desired.color, "Banana status updated");
    emit(
        ctx.events.as_ref(),
        &updated,
        LifecycleEvent::Painted {
            color: desired.color,
        },
    )
    .await;
    Ok(Outcome::Painted)
}

async fn release(identity: &Identity, mut banana: Banana, ctx: &Context) -> Result<Outcome> {
    info!(%identity, "Banana is being deleted");

    let cleaned = guarded(
        "cleanup",
        ctx.config.action_timeout,
        &ctx.shutdown,
        ctx.action.cleanup(identity),
    )
    .await;
    if let Err(e) = cleaned {
        warn!(%identity, error = %e, "Failed to clean up Banana");
        metrics::CLEANUPS.with_label_values(&["failure"]).inc();
        emit(
            ctx.events.as_ref(),
            &banana,
            LifecycleEvent::ActionFailed {
                action: "cleanup",
                message: e.to_string(),
            },
        )
        .await;
        return Err(e);
    }
    metrics::CLEANUPS.with_label_values(&["success"]).inc();
    emit(ctx.events.as_ref(), &banana, LifecycleEvent::CleanedUp).await;

    finalizer::remove_finalizer(&mut banana);
    ctx.store.update(&banana).await.map_err(|e| {
        error!(%identity, error = %e, "Failed to remove finalizer");
        count_conflict(e)
    })?;

    info!(%identity, "Finalizer removed");
    metrics::FINALIZER_OPERATIONS.with_label_values(&["remove"]).inc();
    emit(ctx.events.as_ref(), &banana, LifecycleEvent::FinalizerRemoved).await;
    Ok(Outcome::Released)
}

fn count_conflict(e: Error) -> Error {
    if e.is_conflict() {
        metrics::VERSION_CONFLICTS.inc();
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use mockall::predicate::always;
    use tokio_util::sync::CancellationToken;

    use crate::action::MockConvergenceAction;
    use crate::config::OperatorConfig;
    use crate::crd::BananaSpec;
    use crate::events::MockEventSink;
    use crate::finalizer::FINALIZER_NAME;
    use crate::store::MockResourceStore;

    fn identity() -> Identity {
        Identity::new("default", "white")
    }

    fn banana(spec: &str, status: Option<&str>, finalized: bool, deleting: bool) -> Banana {
        let mut b = Banana::new("white", BananaSpec::new(spec));
        b.metadata = ObjectMeta {
            name: Some("white".to_string()),
            namespace: Some("default".to_string()),
            resource_version: Some("42".to_string()),
            finalizers: finalized.then(|| vec![FINALIZER_NAME.to_string()]),
            deletion_timestamp: deleting.then(|| Time(Utc::now())),
            ..Default::default()
        };
        b.status = status.map(|c| BananaStatus {
            color: c.to_string(),
        });
        b
    }

    fn quiet_events() -> MockEventSink {
        let mut events = MockEventSink::new();
        events.expect_publish().returning(|_, _| Ok(()));
        events
    }

    fn context(store: MockResourceStore, action: MockConvergenceAction) -> Context {
        Context::with_capabilities(
            Arc::new(store),
            Arc::new(action),
            Arc::new(quiet_events()),
            OperatorConfig::default(),
            CancellationToken::new(),
        )
    }

    fn store_returning(record: Option<Banana>) -> MockResourceStore {
        let mut store = MockResourceStore::new();
        store
            .expect_get()
            .times(1)
            .returning(move |_| Ok(record.clone()));
        store
    }

    #[tokio::test]
    async fn missing_record_is_terminal_success() {
        let mut store = store_returning(None);
        store.expect_update().never();
        store.expect_update_status().never();
        let mut action = MockConvergenceAction::new();
        action.expect_apply().never();

        let outcome = reconcile(&identity(), &context(store, action)).await.unwrap();
        assert_eq!(outcome, Outcome::Gone);
    }

    #[tokio::test]
    async fn transient_fetch_failure_is_retryable_error() {
        let mut store = MockResourceStore::new();
        store
            .expect_get()
            .returning(|_| Err(Error::StoreUnavailable("etcd down".to_string())));
        let err = reconcile(&identity(), &context(store, MockConvergenceAction::new()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "store");
    }

    #[tokio::test]
    async fn new_record_only_gains_finalizer() {
        let mut store = store_returning(Some(banana("white", None, false, false)));
        store
            .expect_update()
            .times(1)
            .withf(|b| finalizer::has_finalizer(b) && b.metadata.resource_version.as_deref() == Some("42"))
            .returning(|b| Ok(b.clone()));
        store.expect_update_status().never();
        let mut action = MockConvergenceAction::new();
        action.expect_apply().never();

        let outcome = reconcile(&identity(), &context(store, action)).await.unwrap();
        assert_eq!(outcome, Outcome::FinalizerAdded);
    }

    #[tokio::test]
    async fn converged_record_is_pure_noop() {
        let mut store = store_returning(Some(banana("white", Some("white"), true, false)));
        store.expect_update().never();
        store.expect_update_status().never();
        let mut action = MockConvergenceAction::new();
        action.expect_apply().never();
        action.expect_cleanup().never();

        let outcome = reconcile(&identity(), &context(store, action)).await.unwrap();
        assert_eq!(outcome, Outcome::UpToDate);
    }

    #[tokio::test]
    async fn paint_writes_status_equal_to_applied_spec() {
        let mut store = store_returning(Some(banana("white", Some("black"), true, false)));
        store.expect_update().never();
        store
            .expect_update_status()
            .times(1)
            .withf(|b| b.observed_color() == "white" && b.metadata.resource_version.as_deref() == Some("42"))
            .returning(|b| Ok(b.clone()));
        let mut action = MockConvergenceAction::new();
        action
            .expect_apply()
            .times(1)
            .withf(|_, desired| desired.color == "white")
            .returning(|_, desired| {
                Ok(BananaStatus {
                    color: desired.color.clone(),
                })
            });

        let outcome = reconcile(&identity(), &context(store, action)).await.unwrap();
        assert_eq!(outcome, Outcome::Painted);
    }

    #[tokio::test]
    async fn failed_paint_leaves_record_untouched() {
        let mut store = store_returning(Some(banana("white", None, true, false)));
        store.expect_update().never();
        store.expect_update_status().never();
        let mut action = MockConvergenceAction::new();
        action
            .expect_apply()
            .times(1)
            .returning(|_, _| Err(Error::action("paint jammed")));

        let err = reconcile(&identity(), &context(store, action)).await.unwrap_err();
        assert_eq!(err.kind(), "action");
    }

    #[tokio::test]
    async fn mismatched_observation_is_not_written() {
        let mut store = store_returning(Some(banana("white", None, true, false)));
        store.expect_update_status().never();
        let mut action = MockConvergenceAction::new();
        action.expect_apply().returning(|_, _| {
            Ok(BananaStatus {
                color: "grey".to_string(),
            })
        });

        let err = reconcile(&identity(), &context(store, action)).await.unwrap_err();
        assert!(err.to_string().contains("grey"));
    }

    #[tokio::test]
    async fn status_conflict_surfaces_as_retryable() {
        let mut store = store_returning(Some(banana("white", None, true, false)));
        store.expect_update_status().times(1).returning(|b| {
            Err(Error::VersionConflict {
                identity: Identity::of(b),
                expected: "42".to_string(),
            })
        });
        let mut action = MockConvergenceAction::new();
        action.expect_apply().returning(|_, d| {
            Ok(BananaStatus {
                color: d.color.clone(),
            })
        });

        let err = reconcile(&identity(), &context(store, action)).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn deletion_cleans_up_then_removes_finalizer() {
        let mut store = store_returning(Some(banana("white", Some("white"), true, true)));
        store.expect_update_status().never();
        store
            .expect_update()
            .times(1)
            .withf(|b| !finalizer::has_finalizer(b))
            .returning(|b| Ok(b.clone()));
        let mut action = MockConvergenceAction::new();
        action.expect_apply().never();
        action.expect_cleanup().times(1).returning(|_| Ok(()));

        let outcome = reconcile(&identity(), &context(store, action)).await.unwrap();
        assert_eq!(outcome, Outcome::Released);
    }

    #[tokio::test]
    async fn failed_cleanup_keeps_finalizer() {
        let mut store = store_returning(Some(banana("white", Some("white"), true, true)));
        store.expect_update().never();
        let mut action = MockConvergenceAction::new();
        action
            .expect_cleanup()
            .times(1)
            .returning(|_| Err(Error::action("bucket locked")));

        let err = reconcile(&identity(), &context(store, action)).await.unwrap_err();
        assert_eq!(err.kind(), "action");
    }

    #[tokio::test]
    async fn deletion_without_finalizer_does_nothing() {
        let mut store = store_returning(Some(banana("white", None, false, true)));
        store.expect_update().never();
        store.expect_update_status().never();
        let mut action = MockConvergenceAction::new();
        action.expect_apply().never();
        action.expect_cleanup().never();

        let outcome = reconcile(&identity(), &context(store, action)).await.unwrap();
        assert_eq!(outcome, Outcome::AlreadyReleased);
    }

    #[tokio::test]
    async fn cancelled_paint_writes_nothing() {
        let mut store = store_returning(Some(banana("white", None, true, false)));
        store.expect_update_status().never();
        let mut action = MockConvergenceAction::new();
        action.expect_apply().returning(|_, d| {
            Ok(BananaStatus {
                color: d.color.clone(),
            })
        });
        let ctx = context(store, action);
        ctx.shutdown.cancel();

        let err = reconcile(&identity(), &ctx).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled("apply")));
    }

    #[tokio::test]
    async fn event_sink_failure_does_not_fail_pass() {
        let mut store = store_returning(Some(banana("white", None, false, false)));
        store.expect_update().returning(|b| Ok(b.clone()));
        let mut events = MockEventSink::new();
        events
            .expect_publish()
            .with(always(), mockall::predicate::eq(LifecycleEvent::FinalizerAdded))
            .times(1)
            .returning(|_, _| Err(Error::StoreUnavailable("events api down".to_string())));
        let ctx = Context::with_capabilities(
            Arc::new(store),
            Arc::new(MockConvergenceAction::new()),
            Arc::new(events),
            OperatorConfig::default(),
            CancellationToken::new(),
        );

        assert_eq!(reconcile(&identity(), &ctx).await.unwrap(), Outcome::FinalizerAdded);
    }
}
