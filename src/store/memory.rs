//! In-process store with API-server write semantics
//!
//! Mirrors what the Kubernetes API server does for a custom resource with a
//! status subresource: every accepted write bumps a global resourceVersion,
//! stale writes are rejected, `update` cannot touch status and
//! `update_status` cannot touch anything else, and deletion is two-phase
//! while finalizers are present.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use super::ResourceStore;
use crate::crd::{Banana, Identity};
use crate::error::{Error, Result};

#[derive(Default)]
struct State {
    objects: BTreeMap<Identity, Banana>,
    resource_version: u64,
    writes: usize,
    unavailable: bool,
}

impl State {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    /// Admission shared by `update` and `update_status`
    fn admit(&self, banana: &Banana) -> Result<(Identity, Banana)> {
        let identity = Identity::of(banana);
        let current = self
            .objects
            .get(&identity)
            .cloned()
            .ok_or_else(|| Error::NotFound(identity.clone()))?;
        let expected = banana.metadata.resource_version.clone().unwrap_or_default();
        if current.metadata.resource_version.as_deref() != Some(expected.as_str()) {
            return Err(Error::VersionConflict { identity, expected });
        }
        Ok((identity, current))
    }
}

/// Shared, cloneable-by-`Arc` in-memory store
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of write calls (create, update, update_status, delete) received
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    /// Make every call fail as if the store were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Whether a record is physically present
    pub fn contains(&self, identity: &Identity) -> bool {
        self.lock().objects.contains_key(identity)
    }

    fn check_available(state: &State) -> Result<()> {
        if state.unavailable {
            return Err(Error::StoreUnavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }

    fn writer(&self) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.writes += 1;
        Self::check_available(&state)?;
        Ok(state)
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get(&self, identity: &Identity) -> Result<Option<Banana>> {
        let state = self.lock();
        Self::check_available(&state)?;
        Ok(state.objects.get(identity).cloned())
    }

    async fn create(&self, banana: &Banana) -> Result<Banana> {
        let mut state = self.writer()?;
        let identity = Identity::of(banana);
        if state.objects.contains_key(&identity) {
            return Err(Error::VersionConflict {
                identity,
                expected: String::new(),
            });
        }

        let mut created = banana.clone();
        let version = state.next_version();
        created.metadata.namespace = Some(identity.namespace.clone());
        created.metadata.resource_version = Some(version.clone());
        created.metadata.uid = Some(format!("uid-{}", version));
        created.metadata.generation = Some(1);
        created.metadata.creation_timestamp = Some(Time(Utc::now()));
        created.metadata.deletion_timestamp = None;
        // status is a subresource and is dropped on create
        created.status = None;

        state.objects.insert(identity, created.clone());
        Ok(created)
    }

    async fn update(&self, banana: &Banana) -> Result<Banana> {
        let mut state = self.writer()?;
        let (identity, current) = state.admit(banana)?;

        let mut updated = banana.clone();
        updated.metadata.namespace = current.metadata.namespace.clone();
        updated.metadata.uid = current.metadata.uid.clone();
        updated.metadata.creation_timestamp = current.metadata.creation_timestamp.clone();
        updated.metadata.deletion_timestamp = current.metadata.deletion_timestamp.clone();
        updated.metadata.generation = current.metadata.generation;
        updated.status = current.status.clone();

        if current.is_deleting() {
            let before = current.metadata.finalizers.clone().unwrap_or_default();
            let gained = updated
                .metadata
                .finalizers
                .iter()
                .flatten()
                .any(|f| !before.contains(f));
            if gained {
                return Err(Error::Rejected {
                    identity,
                    reason: "finalizers cannot be added once deletion is requested".to_string(),
                });
            }
        }

        if updated == current {
            return Ok(current);
        }
        if updated.spec != current.spec {
            updated.metadata.generation = current.metadata.generation.map(|g| g + 1);
        }
        updated.metadata.resource_version = Some(state.next_version());

        let released = updated
            .metadata
            .finalizers
            .as_ref()
            .map_or(true, |f| f.is_empty());
        if updated.is_deleting() && released {
            state.objects.remove(&identity);
        } else {
            state.objects.insert(identity, updated.clone());
        }
        Ok(updated)
    }

    async fn update_status(&self, banana: &Banana) -> Result<Banana> {
        let mut state = self.writer()?;
        let (identity, current) = state.admit(banana)?;

        let mut updated = current.clone();
        updated.status = banana.status.clone();
        if updated == current {
            return Ok(current);
        }
        updated.metadata.resource_version = Some(state.next_version());
        state.objects.insert(identity, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, identity: &Identity) -> Result<()> {
        let mut state = self.writer()?;
        let Some(mut current) = state.objects.get(identity).cloned() else {
            return Err(Error::NotFound(identity.clone()));
        };

        let blocked = current
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| !f.is_empty());
        if !blocked {
            state.objects.remove(identity);
        } else if !current.is_deleting() {
            current.metadata.deletion_timestamp = Some(Time(Utc::now()));
            current.metadata.resource_version = Some(state.next_version());
            state.objects.insert(identity.clone(), current);
        }
        Ok(())
    }

    async fn list(&self, namespace: Option<String>) -> Result<Vec<Banana>> {
        let state = self.lock();
        Self::check_available(&state)?;
        Ok(state
            .objects
            .iter()
            .filter(|(id, _)| namespace.as_ref().map_or(true, |ns| &id.namespace == ns))
            .map(|(_, b)| b.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{BananaSpec, BananaStatus};
    use crate::finalizer::{add_finalizer, remove_finalizer};

    fn banana(name: &str, color: &str) -> Banana {
        let mut b = Banana::new(name, BananaSpec::new(color));
        b.metadata.namespace = Some("default".to_string());
        b
    }

    #[tokio::test]
    async fn create_assigns_version_and_drops_status() {
        let store = InMemoryStore::new();
        let mut b = banana("white", "white");
        b.status = Some(BananaStatus {
            color: "white".to_string(),
        });

        let created = store.create(&b).await.unwrap();
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));
        assert!(created.status.is_none());
        assert!(store.create(&b).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let store = InMemoryStore::new();
        let created = store.create(&banana("white", "white")).await.unwrap();

        let mut first = created.clone();
        add_finalizer(&mut first);
        store.update(&first).await.unwrap();

        let mut second = created;
        second.spec.color = "green".to_string();
        let err = store.update(&second).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn update_preserves_status_and_status_update_preserves_spec() {
        let store = InMemoryStore::new();
        let created = store.create(&banana("white", "white")).await.unwrap();

        let mut painted = created.clone();
        painted.spec.color = "ignored".to_string();
        painted.status = Some(BananaStatus {
            color: "white".to_string(),
        });
        let after_status = store.update_status(&painted).await.unwrap();
        assert_eq!(after_status.spec.color, "white");
        assert_eq!(after_status.observed_color(), "white");

        let mut respec = after_status.clone();
        respec.spec.color = "green".to_string();
        respec.status = None;
        let after_update = store.update(&respec).await.unwrap();
        assert_eq!(after_update.observed_color(), "white");
        assert_eq!(after_update.metadata.generation, Some(2));
    }

    #[tokio::test]
    async fn unchanged_write_keeps_version() {
        let store = InMemoryStore::new();
        let created = store.create(&banana("white", "white")).await.unwrap();
        let same = store.update(&created).await.unwrap();
        assert_eq!(same.metadata.resource_version, created.metadata.resource_version);
    }

    #[tokio::test]
    async fn delete_is_two_phase_with_finalizer() {
        let store = InMemoryStore::new();
        let id = Identity::new("default", "yellow");
        let created = store.create(&banana("yellow", "yellow")).await.unwrap();
        let mut guarded = created.clone();
        add_finalizer(&mut guarded);
        store.update(&guarded).await.unwrap();

        tokio_test::assert_ok!(store.delete(&id).await);
        let marked = store.get(&id).await.unwrap().unwrap();
        assert!(marked.is_deleting());

        let mut released = marked.clone();
        remove_finalizer(&mut released);
        store.update(&released).await.unwrap();
        assert!(!store.contains(&id));
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn finalizer_cannot_be_added_after_deletion_mark() {
        let store = InMemoryStore::new();
        let id = Identity::new("default", "yellow");
        let created = store.create(&banana("yellow", "yellow")).await.unwrap();
        let mut guarded = created.clone();
        guarded.metadata.finalizers = Some(vec!["other.io/guard".to_string()]);
        store.update(&guarded).await.unwrap();
        store.delete(&id).await.unwrap();

        let mut marked = store.get(&id).await.unwrap().unwrap();
        marked
            .metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push("late.io/guard".to_string());
        let err = tokio_test::assert_err!(store.update(&marked).await);
        assert!(matches!(err, Error::Rejected { .. }));
    }

    #[tokio::test]
    async fn delete_without_finalizers_removes_immediately() {
        let store = InMemoryStore::new();
        let id = Identity::new("default", "green");
        store.create(&banana("green", "green")).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(!store.contains(&id));
    }

    #[tokio::test]
    async fn unavailable_store_fails_transiently() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        let err = store
            .get(&Identity::new("default", "white"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "store");
    }

    #[tokio::test]
    async fn list_filters_by_namespace() {
        let store = InMemoryStore::new();
        store.create(&banana("a", "white")).await.unwrap();
        let mut other = banana("b", "white");
        other.metadata.namespace = Some("fruit".to_string());
        store.create(&other).await.unwrap();

        assert_eq!(store.list(None).await.unwrap().len(), 2);
        assert_eq!(store.list(Some("fruit".to_string())).await.unwrap().len(), 1);
    }
}
