//! Convergence actions
//!
//! The side-effecting work behind a reconcile pass: `apply` makes reality
//! match the desired spec and `cleanup` releases whatever `apply` created.
//! Both may be invoked more than once for the same input and must tolerate it.

mod paint;

pub use paint::PaintAction;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
use mockall::automock;

use crate::crd::{BananaSpec, BananaStatus, Identity};
use crate::error::{Error, Result};

/// Pluggable external action invoked by the reconciler
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConvergenceAction: Send + Sync {
    /// Drive the external world towards `desired` and report what was observed
    async fn apply(&self, identity: &Identity, desired: &BananaSpec) -> Result<BananaStatus>;

    /// Release external resources tied to the record; idempotent
    async fn cleanup(&self, identity: &Identity) -> Result<()>;
}

/// Run an action under a deadline and the operator's shutdown token
///
/// A timed-out or cancelled action is dropped mid-flight; the caller must not
/// write anything to the store afterwards.
pub async fn guarded<T, F>(
    name: &'static str,
    timeout: Duration,
    shutdown: &CancellationToken,
    action: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(Error::Cancelled(name)),
        outcome = tokio::time::timeout(timeout, action) => match outcome {
            Ok(result) => result,
            Err(_) => Err(Error::ActionTimeout {
                action: name,
                seconds: timeout.as_secs(),
            }),
        },
    }
}
