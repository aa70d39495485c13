//! Error types for the Inferscale operator

use thiserror::Error;

/// Main error type for Inferscale operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation error for CRD specs
    #[error("validation error: {0}")]
    Validation(String),

    /// The scale target referenced by a policy does not exist
    #[error("target {kind} {name:?} not found")]
    TargetNotFound {
        /// Kind of the missing workload
        kind: String,
        /// Name of the missing workload
        name: String,
    },

    /// The policy references a kind the controller cannot scale
    #[error("unsupported target kind: {0}")]
    UnsupportedKind(String),

    /// The replica write lost an optimistic-concurrency race
    ///
    /// Retried on the next requeue rather than in-pass.
    #[error("conflict writing replicas to {kind} {name:?}")]
    WriteConflict {
        /// Kind of the contended workload
        kind: String,
        /// Name of the contended workload
        name: String,
    },

    /// The metrics source itself could not be reached
    ///
    /// Distinct from a single signal returning no data: this aborts the
    /// whole snapshot and surfaces as `Ready=False, MetricsFetchFailed`.
    #[error("metrics source unreachable: {0}")]
    MetricsUnavailable(String),

    /// A single signal query failed or returned no data
    #[error("failed to fetch {signal} metric: {source_msg}")]
    MetricFetch {
        /// Which signal was being queried
        signal: String,
        /// Underlying failure description
        source_msg: String,
    },

    /// A scaling algorithm returned an error from compute_scale
    #[error("scaling computation failed: {0}")]
    Compute(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a target-not-found error for the given workload
    pub fn target_not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::TargetNotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a write-conflict error for the given workload
    pub fn write_conflict(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::WriteConflict {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a metrics-source-unreachable error
    pub fn metrics_unavailable(msg: impl Into<String>) -> Self {
        Self::MetricsUnavailable(msg.into())
    }

    /// Create a per-signal metric fetch error
    pub fn metric_fetch(signal: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::MetricFetch {
            signal: signal.into(),
            source_msg: cause.into(),
        }
    }

    /// Create a compute error with the given message
    pub fn compute(msg: impl Into<String>) -> Self {
        Self::Compute(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Propagation Through a Reconciliation Pass
    // ==========================================================================
    //
    // These tests demonstrate how errors flow through the system during a
    // reconciliation pass. Each error kind represents a different failure
    // point with specific handling requirements in the reconciler.

    /// Story: A policy points at a Deployment that was deleted
    ///
    /// The reconciler surfaces this as Ready=False with reason TargetNotFound
    /// and requeues; the error message names the missing workload.
    #[test]
    fn story_missing_target_names_the_workload() {
        let err = Error::target_not_found("Deployment", "llm-server");
        assert!(err.to_string().contains("Deployment"));
        assert!(err.to_string().contains("llm-server"));

        match err {
            Error::TargetNotFound { kind, name } => {
                assert_eq!(kind, "Deployment");
                assert_eq!(name, "llm-server");
            }
            _ => panic!("Expected TargetNotFound variant"),
        }
    }

    /// Story: Prometheus is down versus a single query returning nothing
    ///
    /// A transport failure aborts the whole snapshot; a per-signal miss only
    /// degrades the ratio list. The two must stay distinguishable.
    #[test]
    fn story_snapshot_failure_is_distinct_from_signal_failure() {
        let whole = Error::metrics_unavailable("connection refused");
        assert!(whole.to_string().contains("unreachable"));

        let single = Error::metric_fetch("gpu_utilization", "no data returned from query");
        assert!(single.to_string().contains("gpu_utilization"));
        assert!(single.to_string().contains("no data"));

        assert!(matches!(whole, Error::MetricsUnavailable(_)));
        assert!(matches!(single, Error::MetricFetch { .. }));
    }

    /// Story: A write conflict is transient, not fatal
    ///
    /// When another client updated the workload between our read and write,
    /// the error carries enough context to log, and the pass requeues.
    #[test]
    fn story_write_conflict_carries_target_identity() {
        let err = Error::write_conflict("StatefulSet", "vllm");
        assert!(err.to_string().contains("StatefulSet"));
        assert!(err.to_string().contains("vllm"));
    }

    /// Story: Error helper functions accept both String and &str
    ///
    /// For ergonomic API usage, error constructors accept anything that
    /// implements Into<String>.
    #[test]
    fn story_error_construction_ergonomics() {
        let target = "llm-server";
        let err = Error::validation(format!("policy for {} is invalid", target));
        assert!(err.to_string().contains("llm-server"));

        let err = Error::compute("weights were all zero");
        assert!(err.to_string().contains("weights"));
    }

    /// Story: Errors are categorized for proper handling in the reconciler
    ///
    /// Different kinds demand different strategies: degrade, requeue, or
    /// surface on a condition without retrying in-pass.
    #[test]
    fn story_error_categorization_for_reconciler_handling() {
        fn categorize(err: &Error) -> &'static str {
            match err {
                Error::Validation(_) => "reject",
                Error::TargetNotFound { .. } => "condition_and_requeue",
                Error::UnsupportedKind(_) => "condition_and_requeue",
                Error::WriteConflict { .. } => "requeue",
                Error::Kube(_) => "requeue",
                Error::MetricsUnavailable(_) => "condition_and_requeue",
                Error::MetricFetch { .. } => "degrade",
                Error::Compute(_) => "hold_replicas",
            }
        }

        assert_eq!(
            categorize(&Error::metric_fetch("latency_p99", "timeout")),
            "degrade"
        );
        assert_eq!(
            categorize(&Error::target_not_found("Deployment", "gone")),
            "condition_and_requeue"
        );
        assert_eq!(categorize(&Error::compute("bad input")), "hold_replicas");
    }
}
