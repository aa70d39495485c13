//! Scaling algorithms for the autoscaler
//!
//! An algorithm turns a [`ScalingInput`] - current/min/max replicas plus the
//! list of metric ratios - into a [`ScalingResult`]. Algorithms live in a
//! named [`Registry`]; the built-ins are registered with the global
//! [`default_registry`] at first use, and external plugins can be added at
//! startup through the [`plugin`] loader.

mod builtin;
mod registry;
mod smooth;

pub mod plugin;

pub use builtin::{AverageRatio, MaxRatio, WeightedRatio};
pub use registry::{default_registry, Registry, RegistryError};
pub use smooth::CappedSmoothRatio;

use async_trait::async_trait;

/// Input parameters for a scaling calculation
///
/// `metric_ratios` is the compacted list of current/target ratios in the
/// canonical signal order (P99 latency, P95 latency, GPU, queue depth);
/// disabled or unavailable signals contribute no element.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScalingInput {
    /// Replicas currently set on the target
    pub current_replicas: i32,
    /// Lower replica bound
    pub min_replicas: i32,
    /// Upper replica bound
    pub max_replicas: i32,
    /// Ratios of current/target for each available metric
    pub metric_ratios: Vec<f64>,
    /// Deadband around a summary ratio of 1.0; 0 disables the deadband
    pub tolerance: f64,
    /// Policy name, for stateful algorithms to key per-policy state
    pub policy_name: String,
    /// Policy namespace; empty for cluster-scoped policies
    pub policy_namespace: String,
}

impl ScalingInput {
    /// Stable per-policy key for stateful algorithms
    pub fn policy_key(&self) -> String {
        if self.policy_namespace.is_empty() {
            self.policy_name.clone()
        } else {
            format!("{}/{}", self.policy_namespace, self.policy_name)
        }
    }
}

/// Output of a scaling calculation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScalingResult {
    /// Replica count the target should converge to
    pub desired_replicas: i32,
    /// Short human-readable explanation of the decision
    pub reason: String,
}

impl ScalingResult {
    /// Create a result from a replica count and reason
    pub fn new(desired_replicas: i32, reason: impl Into<String>) -> Self {
        Self {
            desired_replicas,
            reason: reason.into(),
        }
    }
}

/// Interface every scaling algorithm must implement
///
/// Implementations may hold configuration (tolerance, weights) but must be
/// safe for concurrent invocation; any per-policy state must be keyed by the
/// input's [`policy_key`](ScalingInput::policy_key).
#[async_trait]
pub trait ScalingAlgorithm: Send + Sync {
    /// Unique, case-sensitive name of the algorithm
    fn name(&self) -> &str;

    /// Compute the desired replica count for the given input
    ///
    /// The tolerance carried by the input always takes precedence over any
    /// tolerance embedded in the algorithm instance, and 0 is a valid request
    /// for no deadband. Every return path must clamp to [min, max].
    async fn compute_scale(&self, input: &ScalingInput) -> crate::Result<ScalingResult>;

    /// Return a copy of this algorithm with the given weights bound
    ///
    /// Algorithms without per-metric weights return `None` (the default).
    /// Implementations must never mutate `self`: the registry shares one
    /// instance across concurrent reconciliations.
    fn bind_weights(&self, _weights: &[f64]) -> Option<Box<dyn ScalingAlgorithm>> {
        None
    }
}

/// Clamp a replica count to the inclusive [min, max] range
///
/// Applied unconditionally at every algorithm exit and again by the
/// reconciler, so an out-of-bounds starting count self-heals.
pub fn clamp_replicas(desired: i32, min: i32, max: i32) -> i32 {
    desired.max(min).min(max)
}
