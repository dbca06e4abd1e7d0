//! Finalizer lifecycle of a Banana
//!
//! The lifecycle is derived from the record alone: whether our finalizer is
//! present, whether deletion was requested, and whether the observed color
//! matches the desired one. Nothing is remembered between passes, so a
//! restarted operator resumes exactly where the record says it is.

use crate::crd::Banana;

/// Finalizer owned by this operator
pub const FINALIZER_NAME: &str = "bananas.fruits.com/finalizer";

/// Where a Banana currently sits in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// Live record without our finalizer
    FinalizerPending,
    /// Finalizer present, observed color differs from desired
    Converging,
    /// Finalizer present, observed color matches desired
    Converged,
    /// Deletion requested while our finalizer still blocks removal
    CleanupPending,
    /// Deletion requested and our finalizer is already gone
    Released,
}

/// The single step a pass takes for a given state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    AddFinalizer,
    Converge,
    CleanupAndRelease,
    Nothing,
}

impl LifecycleState {
    /// Classify a record from its current fields
    pub fn classify(banana: &Banana) -> Self {
        let finalized = has_finalizer(banana);
        match (banana.is_deleting(), finalized) {
            (true, true) => LifecycleState::CleanupPending,
            (true, false) => LifecycleState::Released,
            (false, false) => LifecycleState::FinalizerPending,
            (false, true) if banana.is_converged() => LifecycleState::Converged,
            (false, true) => LifecycleState::Converging,
        }
    }

    pub fn next_step(self) -> Step {
        match self {
            LifecycleState::FinalizerPending => Step::AddFinalizer,
            LifecycleState::Converging => Step::Converge,
            LifecycleState::CleanupPending => Step::CleanupAndRelease,
            LifecycleState::Converged | LifecycleState::Released => Step::Nothing,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::FinalizerPending => "FinalizerPending",
            LifecycleState::Converging => "Converging",
            LifecycleState::Converged => "Converged",
            LifecycleState::CleanupPending => "CleanupPending",
            LifecycleState::Released => "Released",
        }
    }
}

/// Check whether our finalizer is on the record
pub fn has_finalizer(banana: &Banana) -> bool {
    banana
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == FINALIZER_NAME))
}

/// Add our finalizer to a local copy; returns false if nothing changed.
///
/// A record already marked for deletion never gains the finalizer.
pub fn add_finalizer(banana: &mut Banana) -> bool {
    if banana.is_deleting() || has_finalizer(banana) {
        return false;
    }
    banana
        .metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(FINALIZER_NAME.to_string());
    true
}

/// Remove our finalizer from a local copy; returns false if it was absent
pub fn remove_finalizer(banana: &mut Banana) -> bool {
    let Some(finalizers) = banana.metadata.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|s| s != FINALIZER_NAME);
    finalizers.len() != before
}
