//! Custom Resource Definitions for the Banana Operator

mod banana;

pub use banana::*;

use kube::CustomResourceExt;

use crate::error::Result;

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Result<Vec<String>> {
    Ok(vec![serde_yaml::to_string(&Banana::crd())?])
}
