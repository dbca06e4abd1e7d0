//! Kubernetes controllers for the Banana CRD
//!
//! This module contains the controller implementation that watches for CRD
//! changes and triggers reconciliation.

mod banana_controller;

pub use banana_controller::run as run_banana_controller;

use std::sync::Arc;

use kube::Client;
use tokio_util::sync::CancellationToken;

use crate::action::{ConvergenceAction, PaintAction};
use crate::backoff::RetryBackoff;
use crate::config::OperatorConfig;
use crate::events::{EventSink, KubeEventSink, LogEventSink};
use crate::store::{KubeStore, ResourceStore};

/// Controller name used as event reporter
pub const CONTROLLER_NAME: &str = "banana-operator";

/// Capabilities shared by every reconcile pass
///
/// Nothing here remembers per-record lifecycle state; the record itself is
/// the only source of truth.
pub struct Context {
    /// Backing store for Banana records
    pub store: Arc<dyn ResourceStore>,
    /// Paint and cleanup actions
    pub action: Arc<dyn ConvergenceAction>,
    /// Lifecycle event destination
    pub events: Arc<dyn EventSink>,
    /// Operator settings
    pub config: OperatorConfig,
    /// Cancelled on shutdown to abort in-flight actions
    pub shutdown: CancellationToken,
    /// Retry delays for failed passes
    pub backoff: RetryBackoff,
}

impl Context {
    /// Create the production context on top of a Kubernetes client
    pub fn new(client: Client, config: OperatorConfig, shutdown: CancellationToken) -> Self {
        let events: Arc<dyn EventSink> = if config.publish_events {
            Arc::new(KubeEventSink::new(client.clone(), CONTROLLER_NAME))
        } else {
            Arc::new(LogEventSink)
        };
        let action = PaintAction::new(config.paint_duration, config.cleanup_duration);
        Self::with_capabilities(
            Arc::new(KubeStore::new(client)),
            Arc::new(action),
            events,
            config,
            shutdown,
        )
    }

    /// Create a context from explicit capabilities
    pub fn with_capabilities(
        store: Arc<dyn ResourceStore>,
        action: Arc<dyn ConvergenceAction>,
        events: Arc<dyn EventSink>,
        config: OperatorConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let backoff = RetryBackoff::new(config.retry_base, config.retry_max);
        Self {
            store,
            action,
            events,
            config,
            shutdown,
            backoff,
        }
    }
}
