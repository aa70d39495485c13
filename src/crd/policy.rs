//! AutoscalerPolicy Custom Resource Definition
//!
//! An AutoscalerPolicy binds a target workload (Deployment or StatefulSet)
//! to inference signals - tail latency, GPU utilization, request queue depth -
//! together with replica bounds, a cooldown, and an optional algorithm choice.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    AlgorithmSpec, Condition, ConditionStatus, CurrentMetrics, MetricsSpec, TargetRef,
};

/// Specification for an AutoscalerPolicy
///
/// The target workload lives in the same namespace as the policy. Replica
/// bounds, cooldown, and metric targets are validated by the admission
/// webhook before the controller observes the object; [`validate`] encodes
/// the same preconditions.
///
/// [`validate`]: AutoscalerPolicySpec::validate
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "inferscale.dev",
    version = "v1alpha1",
    kind = "AutoscalerPolicy",
    plural = "autoscalerpolicies",
    shortname = "asp",
    status = "AutoscalerPolicyStatus",
    namespaced,
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.targetRef.name"}"#,
    printcolumn = r#"{"name":"Min","type":"integer","jsonPath":".spec.minReplicas"}"#,
    printcolumn = r#"{"name":"Max","type":"integer","jsonPath":".spec.maxReplicas"}"#,
    printcolumn = r#"{"name":"Current","type":"integer","jsonPath":".status.currentReplicas"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalerPolicySpec {
    /// Reference to the target Deployment or StatefulSet
    pub target_ref: TargetRef,

    /// Minimum number of replicas (0 is treated as 1)
    #[serde(default)]
    pub min_replicas: i32,

    /// Maximum number of replicas
    pub max_replicas: i32,

    /// Cooldown between scaling events in seconds (0 selects the 300s default)
    #[serde(default)]
    pub cooldown_period: i32,

    /// Signal configuration for scaling decisions
    pub metrics: MetricsSpec,

    /// Algorithm selection and tuning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<AlgorithmSpec>,
}

impl AutoscalerPolicySpec {
    /// Minimum replicas with the zero-means-one default applied
    pub fn effective_min_replicas(&self) -> i32 {
        if self.min_replicas == 0 {
            1
        } else {
            self.min_replicas
        }
    }

    /// Cooldown with the zero-means-default rule applied
    pub fn effective_cooldown(&self) -> std::time::Duration {
        let secs = if self.cooldown_period <= 0 {
            crate::DEFAULT_COOLDOWN_SECS
        } else {
            self.cooldown_period as u64
        };
        std::time::Duration::from_secs(secs)
    }

    /// Validate the policy specification
    ///
    /// Same rules the admission webhook enforces.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.target_ref.name.is_empty() {
            return Err(crate::Error::validation("targetRef.name is required"));
        }
        if self.target_ref.target_kind().is_err() {
            return Err(crate::Error::validation(
                "targetRef.kind must be Deployment or StatefulSet",
            ));
        }

        if self.max_replicas <= 0 {
            return Err(crate::Error::validation(
                "maxReplicas must be greater than 0",
            ));
        }
        if self.min_replicas < 0 {
            return Err(crate::Error::validation("minReplicas cannot be negative"));
        }
        if self.min_replicas > self.max_replicas {
            return Err(crate::Error::validation(
                "minReplicas cannot be greater than maxReplicas",
            ));
        }
        if self.cooldown_period < 0 {
            return Err(crate::Error::validation(
                "cooldownPeriod cannot be negative",
            ));
        }

        if let Some(algorithm) = &self.algorithm {
            if let Some(tolerance) = algorithm.tolerance {
                if !(0.0..=1.0).contains(&tolerance) {
                    return Err(crate::Error::validation(
                        "algorithm.tolerance must be between 0 and 1",
                    ));
                }
            }
            if algorithm.weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
                return Err(crate::Error::validation(
                    "algorithm.weights must be non-negative finite numbers",
                ));
            }
        }

        self.metrics.validate()
    }

    /// Apply the defaulting webhook's rules in place
    pub fn set_defaults(&mut self) {
        if self.min_replicas == 0 {
            self.min_replicas = 1;
        }
        if self.cooldown_period == 0 {
            self.cooldown_period = crate::DEFAULT_COOLDOWN_SECS as i32;
        }
        if self.target_ref.api_version.is_empty() {
            self.target_ref.api_version = "apps/v1".to_string();
        }
    }
}

impl MetricsSpec {
    /// Validate the metric sub-specs
    ///
    /// At least one signal must be enabled with valid targets.
    pub fn validate(&self) -> Result<(), crate::Error> {
        let mut has_enabled = false;

        if let Some(latency) = &self.latency {
            if latency.enabled {
                has_enabled = true;
                if latency.target_p99_ms <= 0 && latency.target_p95_ms <= 0 {
                    return Err(crate::Error::validation(
                        "latency metric enabled but no target specified",
                    ));
                }
            }
        }

        if let Some(gpu) = &self.gpu_utilization {
            if gpu.enabled {
                has_enabled = true;
                if gpu.target_percentage <= 0 || gpu.target_percentage > 100 {
                    return Err(crate::Error::validation(
                        "gpuUtilization.targetPercentage must be between 1 and 100",
                    ));
                }
            }
        }

        if let Some(queue) = &self.request_queue_depth {
            if queue.enabled {
                has_enabled = true;
                if queue.target_depth < 0 {
                    return Err(crate::Error::validation(
                        "requestQueueDepth.targetDepth cannot be negative",
                    ));
                }
            }
        }

        if !has_enabled {
            return Err(crate::Error::validation(
                "at least one metric must be enabled",
            ));
        }

        Ok(())
    }
}

/// Status for an AutoscalerPolicy
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalerPolicyStatus {
    /// Current number of replicas on the target
    #[serde(default)]
    pub current_replicas: i32,

    /// Replica count the last pass decided on
    #[serde(default)]
    pub desired_replicas: i32,

    /// Last time the controller wrote a new replica count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scale_time: Option<chrono::DateTime<chrono::Utc>>,

    /// Signal readings from the last pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_metrics: Option<CurrentMetrics>,

    /// Name of the algorithm the last pass used
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_algorithm: String,

    /// Human-readable reason for the last scaling decision
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_scale_reason: String,

    /// Conditions representing the latest available observations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl AutoscalerPolicyStatus {
    /// Set replica counts and return self for chaining
    pub fn replicas(mut self, current: i32, desired: i32) -> Self {
        self.current_replicas = current;
        self.desired_replicas = desired;
        self
    }

    /// Set the last-used algorithm and decision reason for chaining
    pub fn decision(mut self, algorithm: impl Into<String>, reason: impl Into<String>) -> Self {
        self.last_algorithm = algorithm.into();
        self.last_scale_reason = reason.into();
        self
    }

    /// Set the current metric readings and return self for chaining
    pub fn metrics(mut self, metrics: CurrentMetrics) -> Self {
        self.current_metrics = Some(metrics);
        self
    }

    /// Add or replace a condition and return self for chaining
    ///
    /// Replaces any existing condition of the same type. When the incoming
    /// condition has the same status and reason as the one it replaces, the
    /// original transition time is preserved so that `lastTransitionTime`
    /// reflects real transitions only.
    pub fn condition(mut self, condition: Condition) -> Self {
        self.set_condition(condition);
        self
    }

    /// In-place variant of [`condition`](Self::condition)
    pub fn set_condition(&mut self, mut condition: Condition) {
        if let Some(existing) = self.conditions.iter().find(|c| c.type_ == condition.type_) {
            if existing.status == condition.status && existing.reason == condition.reason {
                condition.last_transition_time = existing.last_transition_time;
            }
        }
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
    }

    /// Look up a condition by type
    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Whether a condition with the given shape is already present
    ///
    /// Used to deduplicate warning events: an event tied to a condition is
    /// emitted only when the condition is transitioning into this shape.
    pub fn has_condition(&self, type_: &str, status: ConditionStatus, reason: &str) -> bool {
        self.conditions
            .iter()
            .any(|c| c.type_ == type_ && c.status == status && c.reason == reason)
    }
}
