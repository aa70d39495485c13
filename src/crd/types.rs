//! Supporting types for the AutoscalerPolicy CRD

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Workload kinds the controller knows how to scale
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum TargetKind {
    /// apps/v1 Deployment
    #[default]
    Deployment,
    /// apps/v1 StatefulSet
    StatefulSet,
}

impl std::str::FromStr for TargetKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Deployment" => Ok(Self::Deployment),
            "StatefulSet" => Ok(Self::StatefulSet),
            _ => Err(crate::Error::validation(format!(
                "invalid target kind: {s}, expected Deployment or StatefulSet"
            ))),
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deployment => write!(f, "Deployment"),
            Self::StatefulSet => write!(f, "StatefulSet"),
        }
    }
}

/// Reference to the workload whose replica count is managed
///
/// The target always lives in the same namespace as the policy. The kind is
/// carried as the raw wire string and parsed to [`TargetKind`] at the point
/// of use, so a kind outside the supported set surfaces as an
/// `UnsupportedKind` error instead of failing deserialization.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    /// API version of the target resource (defaulted to "apps/v1")
    #[serde(default)]
    pub api_version: String,

    /// Kind of the target resource (Deployment or StatefulSet)
    pub kind: String,

    /// Name of the target resource
    pub name: String,
}

impl TargetRef {
    /// Parse the kind string into a supported [`TargetKind`]
    pub fn target_kind(&self) -> Result<TargetKind, crate::Error> {
        self.kind
            .parse()
            .map_err(|_| crate::Error::UnsupportedKind(self.kind.clone()))
    }
}

/// Signal configuration for scaling decisions
///
/// At least one sub-spec must be enabled with valid targets; the admission
/// webhook enforces this before a policy reaches the controller.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSpec {
    /// Latency-based scaling configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyMetric>,

    /// GPU utilization-based scaling configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_utilization: Option<GpuUtilizationMetric>,

    /// Request queue depth-based scaling configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_queue_depth: Option<QueueDepthMetric>,
}

/// Latency-based scaling signal
///
/// At least one of the P99/P95 targets must be positive when enabled.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LatencyMetric {
    /// Whether latency-based scaling is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Target P99 latency in milliseconds
    #[serde(default)]
    pub target_p99_ms: i32,

    /// Target P95 latency in milliseconds
    #[serde(default)]
    pub target_p95_ms: i32,

    /// Custom Prometheus query overriding the built-in latency query
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prometheus_query: String,
}

/// GPU utilization scaling signal
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GpuUtilizationMetric {
    /// Whether GPU-based scaling is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Target GPU utilization percentage (1-100)
    #[serde(default)]
    pub target_percentage: i32,

    /// Custom Prometheus query overriding the built-in GPU query
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prometheus_query: String,
}

/// Request queue depth scaling signal
///
/// `target_depth` is per-replica: the observed depth is divided by
/// `target_depth * currentReplicas` so that a fixed per-replica service
/// quota yields a ratio of 1 at equilibrium.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueDepthMetric {
    /// Whether queue-depth-based scaling is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Target queue depth per replica
    #[serde(default)]
    pub target_depth: i32,

    /// Custom Prometheus query overriding the built-in queue query
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prometheus_query: String,
}

/// Scaling algorithm selection and tuning
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmSpec {
    /// Name of a registered algorithm; empty selects the default (MaxRatio)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Tolerance band around 1.0; unset means the 0.1 default.
    ///
    /// An explicit 0 is honored as a true zero deadband.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,

    /// Per-metric weights for WeightedRatio, aligned positionally to the
    /// emitted ratio list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weights: Vec<f64>,
}

/// Current signal readings, reported in status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentMetrics {
    /// Current P99 latency in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_p99_ms: Option<i32>,

    /// Current P95 latency in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_p95_ms: Option<i32>,

    /// Current GPU utilization percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_utilization_percent: Option<i32>,

    /// Current request queue depth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_queue_depth: Option<i64>,
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (Ready, Scaling, AlgorithmValid)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod target_kind {
        use super::*;

        #[test]
        fn test_from_str_valid() {
            assert_eq!(
                "Deployment".parse::<TargetKind>().unwrap(),
                TargetKind::Deployment
            );
            assert_eq!(
                "StatefulSet".parse::<TargetKind>().unwrap(),
                TargetKind::StatefulSet
            );
        }

        #[test]
        fn test_from_str_is_case_sensitive() {
            // Kubernetes kinds are case-sensitive; lowercase must not parse
            assert!("deployment".parse::<TargetKind>().is_err());
            assert!("statefulset".parse::<TargetKind>().is_err());
        }

        #[test]
        fn test_from_str_invalid() {
            let result = "DaemonSet".parse::<TargetKind>();
            assert!(result.is_err());
            assert!(result
                .unwrap_err()
                .to_string()
                .contains("invalid target kind"));
        }

        #[test]
        fn test_display() {
            assert_eq!(TargetKind::Deployment.to_string(), "Deployment");
            assert_eq!(TargetKind::StatefulSet.to_string(), "StatefulSet");
        }
    }

    mod conditions {
        use super::*;

        #[test]
        fn test_condition_carries_reason_and_message() {
            let c = Condition::new(
                "Ready",
                ConditionStatus::False,
                "TargetNotFound",
                "Deployment \"llm-server\" not found",
            );
            assert_eq!(c.type_, "Ready");
            assert_eq!(c.status, ConditionStatus::False);
            assert_eq!(c.reason, "TargetNotFound");
            assert!(c.message.contains("llm-server"));
        }

        #[test]
        fn test_condition_status_display_matches_kubernetes() {
            assert_eq!(ConditionStatus::True.to_string(), "True");
            assert_eq!(ConditionStatus::False.to_string(), "False");
            assert_eq!(ConditionStatus::Unknown.to_string(), "Unknown");
        }
    }

    mod wire_format {
        use super::*;

        #[test]
        fn test_metrics_spec_uses_camel_case_keys() {
            let spec = MetricsSpec {
                latency: Some(LatencyMetric {
                    enabled: true,
                    target_p99_ms: 100,
                    target_p95_ms: 0,
                    prometheus_query: String::new(),
                }),
                gpu_utilization: None,
                request_queue_depth: None,
            };

            let json = serde_json::to_value(&spec).unwrap();
            assert!(json["latency"]["targetP99Ms"].is_number());
            assert_eq!(json["latency"]["targetP99Ms"], 100);
            // Empty custom query is omitted entirely
            assert!(json["latency"].get("prometheusQuery").is_none());
        }

        #[test]
        fn test_algorithm_spec_distinguishes_zero_from_unset_tolerance() {
            let unset: AlgorithmSpec = serde_json::from_str(r#"{"name":"MaxRatio"}"#).unwrap();
            assert_eq!(unset.tolerance, None);

            let zero: AlgorithmSpec =
                serde_json::from_str(r#"{"name":"MaxRatio","tolerance":0.0}"#).unwrap();
            assert_eq!(zero.tolerance, Some(0.0));
        }
    }
}
