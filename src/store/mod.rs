//! Resource store contract
//!
//! The reconciler reaches the backing store only through [`ResourceStore`],
//! so the control logic runs the same against the Kubernetes API server
//! ([`KubeStore`]) and the in-process model used by tests ([`InMemoryStore`]).

mod kube_store;
mod memory;

pub use kube_store::KubeStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::crd::{Banana, Identity};
use crate::error::Result;

/// Optimistically-concurrent CRUD over Banana records
///
/// Writes carry the `resourceVersion` they were read at; a mismatch surfaces
/// as [`crate::Error::VersionConflict`] and is never retried blindly.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch a record; `None` when it does not exist
    async fn get(&self, identity: &Identity) -> Result<Option<Banana>>;

    /// Create a new record
    async fn create(&self, banana: &Banana) -> Result<Banana>;

    /// Replace spec and metadata, guarded by the record's resourceVersion
    ///
    /// Removing the last finalizer from a record marked for deletion
    /// physically removes it.
    async fn update(&self, banana: &Banana) -> Result<Banana>;

    /// Replace the status subresource, guarded by the record's resourceVersion
    async fn update_status(&self, banana: &Banana) -> Result<Banana>;

    /// Request deletion; records with finalizers are only marked
    async fn delete(&self, identity: &Identity) -> Result<()>;

    /// List records, optionally restricted to one namespace
    async fn list(&self, namespace: Option<String>) -> Result<Vec<Banana>>;
}
