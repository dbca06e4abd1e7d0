//! Painting action
//!
//! Stands in for a slow external system: painting and cleaning a banana each
//! take a configurable amount of time.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::ConvergenceAction;
use crate::crd::{BananaSpec, BananaStatus, Identity};
use crate::error::Result;

/// Paints bananas after a simulated delay
#[derive(Clone, Debug)]
pub struct PaintAction {
    paint_duration: Duration,
    cleanup_duration: Duration,
}

impl PaintAction {
    pub fn new(paint_duration: Duration, cleanup_duration: Duration) -> Self {
        Self {
            paint_duration,
            cleanup_duration,
        }
    }
}

impl Default for PaintAction {
    fn default() -> Self {
        Self::new(Duration::from_secs(3), Duration::from_secs(3))
    }
}

#[async_trait]
impl ConvergenceAction for PaintAction {
    async fn apply(&self, identity: &Identity, desired: &BananaSpec) -> Result<BananaStatus> {
        info!(%identity, color = %desired.color, "Painting Banana");
        tokio::time::sleep(self.paint_duration).await;
        info!(%identity, color = %desired.color, "Banana painted successfully");
        Ok(BananaStatus {
            color: desired.color.clone(),
        })
    }

    async fn cleanup(&self, identity: &Identity) -> Result<()> {
        info!(%identity, "Cleaning up Banana");
        tokio::time::sleep(self.cleanup_duration).await;
        info!(%identity, "Banana cleaned up successfully");
        Ok(())
    }
}
