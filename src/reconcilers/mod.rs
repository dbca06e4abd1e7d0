//! Reconcilers for the Banana CRD
//!
//! This module contains the business logic for reconciling each CRD type.
//! Reconcilers are responsible for:
//! - Deciding the lifecycle step from the current record
//! - Invoking the convergence and cleanup actions
//! - Writing finalizers and status back to the store

pub mod banana;
