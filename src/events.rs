//! Lifecycle events
//!
//! Events are informational. A failed publish is logged and never fails the
//! reconcile pass that raised it.

use async_trait::async_trait;
use kube::{
    runtime::events::{Event, EventType, Recorder, Reporter},
    Client, Resource,
};
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

use crate::crd::{Banana, Identity};
use crate::error::Result;

/// Something noteworthy that happened to a Banana
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    FinalizerAdded,
    Painted { color: String },
    CleanedUp,
    FinalizerRemoved,
    ActionFailed { action: &'static str, message: String },
}

impl LifecycleEvent {
    pub fn reason(&self) -> &'static str {
        match self {
            LifecycleEvent::FinalizerAdded => "FinalizerAdded",
            LifecycleEvent::Painted { .. } => "Painted",
            LifecycleEvent::CleanedUp => "CleanedUp",
            LifecycleEvent::FinalizerRemoved => "FinalizerRemoved",
            LifecycleEvent::ActionFailed { .. } => "ActionFailed",
        }
    }

    pub fn note(&self) -> String {
        match self {
            LifecycleEvent::FinalizerAdded => "Finalizer registered".to_string(),
            LifecycleEvent::Painted { color } => format!("Banana painted {}", color),
            LifecycleEvent::CleanedUp => "External resources released".to_string(),
            LifecycleEvent::FinalizerRemoved => "Finalizer removed, deletion may proceed".to_string(),
            LifecycleEvent::ActionFailed { action, message } => {
                format!("{} failed: {}", action, message)
            }
        }
    }

    fn is_warning(&self) -> bool {
        matches!(self, LifecycleEvent::ActionFailed { .. })
    }
}

/// Destination for lifecycle events
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, banana: &Banana, event: LifecycleEvent) -> Result<()>;
}

/// Publishes Kubernetes Events against the Banana
pub struct KubeEventSink {
    client: Client,
    reporter: Reporter,
}

impl KubeEventSink {
    pub fn new(client: Client, controller: impl Into<String>) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: controller.into(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(&self, banana: &Banana, event: LifecycleEvent) -> Result<()> {
        let recorder = Recorder::new(
            self.client.clone(),
            self.reporter.clone(),
            banana.object_ref(&()),
        );
        recorder
            .publish(Event {
                type_: if event.is_warning() {
                    EventType::Warning
                } else {
                    EventType::Normal
                },
                reason: event.reason().to_string(),
                note: Some(event.note()),
                action: "Reconciling".to_string(),
                secondary: None,
            })
            .await?;
        Ok(())
    }
}

/// Writes events to the log only
#[derive(Clone, Copy, Debug, Default)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, banana: &Banana, event: LifecycleEvent) -> Result<()> {
        let identity = Identity::of(banana);
        if event.is_warning() {
            warn!(%identity, reason = event.reason(), note = %event.note(), "Banana event");
        } else {
            info!(%identity, reason = event.reason(), note = %event.note(), "Banana event");
        }
        Ok(())
    }
}

/// Publish without letting a sink failure escape
pub async fn emit(sink: &dyn EventSink, banana: &Banana, event: LifecycleEvent) {
    let reason = event.reason();
    if let Err(e) = sink.publish(banana, event).await {
        warn!(identity = %Identity::of(banana), reason, error = %e, "Failed to publish event");
    }
}
