//! Banana controller
//!
//! Watches Banana resources and triggers reconciliation. The kube runtime
//! runs distinct objects concurrently and never runs two passes for the same
//! object at once.

use std::sync::Arc;

use futures::StreamExt;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument, warn};

use crate::controllers::Context;
use crate::crd::{Banana, Identity};
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::banana as banana_reconciler;

const KIND: &str = "Banana";

/// Run the Banana controller
///
/// Stops taking new work once the context's shutdown token is cancelled and
/// returns after in-flight passes drain.
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<Banana> = match &context.config.watch_namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("Banana CRD not installed: {}", e);
        return;
    }

    info!(
        namespace = context.config.watch_namespace.as_deref().unwrap_or("*"),
        "Starting Banana controller"
    );
    metrics::set_ready(true);

    Controller::new(api, WatcherConfig::default())
        .graceful_shutdown_on(context.shutdown.clone().cancelled_owned())
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled Banana"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Reconciliation error");
                }
            }
        })
        .await;

    metrics::set_ready(false);
}

/// Main reconciliation function
#[instrument(skip(obj, ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<Banana>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&[KIND])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&[KIND]).inc();

    // The watched object may be stale; the reconciler re-reads by identity
    let identity = Identity::of(&obj);
    match banana_reconciler::reconcile(&identity, &ctx).await {
        Ok(outcome) => {
            ctx.backoff.reset(&identity);
            info!(%identity, outcome = outcome.as_str(), "Reconcile pass finished");
            Ok(Action::await_change())
        }
        Err(e) => {
            metrics::RECONCILIATION_ERRORS
                .with_label_values(&[KIND, e.kind()])
                .inc();
            Err(e)
        }
    }
}

/// Error policy for the controller
fn error_policy(obj: Arc<Banana>, error: &Error, ctx: Arc<Context>) -> Action {
    let identity = Identity::of(&obj);
    let delay = ctx.backoff.next_delay(&identity, error);
    error!(
        %identity,
        error = %error,
        kind = error.kind(),
        retry_in = ?delay,
        "Reconciliation failed, scheduling retry"
    );
    Action::requeue(delay)
}
