//! Banana Kubernetes Operator
//!
//! This operator paints Banana resources to the color requested in their
//! spec and runs cleanup through a finalizer before they are deleted.

pub mod action;
pub mod backoff;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod events;
pub mod finalizer;
pub mod metrics;
pub mod reconcilers;
pub mod store;

pub use error::{Error, Result};
