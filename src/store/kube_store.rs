//! ResourceStore backed by the Kubernetes API server

use async_trait::async_trait;
use kube::{
    api::{DeleteParams, ListParams, PostParams},
    Api, Client,
};
use tracing::debug;

use super::ResourceStore;
use crate::crd::{Banana, Identity};
use crate::error::{Error, Result};

const FIELD_MANAGER: &str = "banana-operator";

/// Kubernetes-backed store
///
/// Writes use PUT (`replace`/`replace_status`) so the API server enforces the
/// resourceVersion carried by the record.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Banana> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params() -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(FIELD_MANAGER.to_string()),
        }
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get(&self, identity: &Identity) -> Result<Option<Banana>> {
        Ok(self.api(&identity.namespace).get_opt(&identity.name).await?)
    }

    async fn create(&self, banana: &Banana) -> Result<Banana> {
        let identity = Identity::of(banana);
        self.api(&identity.namespace)
            .create(&Self::post_params(), banana)
            .await
            .map_err(|e| Error::from_write(&identity, None, e))
    }

    async fn update(&self, banana: &Banana) -> Result<Banana> {
        let identity = Identity::of(banana);
        let expected = banana.metadata.resource_version.as_deref();
        debug!(%identity, resource_version = ?expected, "Replacing Banana");
        self.api(&identity.namespace)
            .replace(&identity.name, &Self::post_params(), banana)
            .await
            .map_err(|e| Error::from_write(&identity, expected, e))
    }

    async fn update_status(&self, banana: &Banana) -> Result<Banana> {
        let identity = Identity::of(banana);
        let expected = banana.metadata.resource_version.as_deref();
        debug!(%identity, resource_version = ?expected, "Replacing Banana status");
        let data = serde_json::to_vec(banana)?;
        self.api(&identity.namespace)
            .replace_status(&identity.name, &Self::post_params(), data)
            .await
            .map_err(|e| Error::from_write(&identity, expected, e))
    }

    async fn delete(&self, identity: &Identity) -> Result<()> {
        self.api(&identity.namespace)
            .delete(&identity.name, &DeleteParams::default())
            .await
            .map_err(|e| Error::from_write(identity, None, e))?;
        Ok(())
    }

    async fn list(&self, namespace: Option<String>) -> Result<Vec<Banana>> {
        let api: Api<Banana> = match namespace {
            Some(ns) => self.api(&ns),
            None => Api::all(self.client.clone()),
        };
        Ok(api.list(&ListParams::default()).await?.items)
    }
}
