//! Custom Resource Definitions for Inferscale
//!
//! Defines the AutoscalerPolicy CRD and its supporting types. Validation and
//! defaulting mirror the admission webhook's rules so the controller can
//! assume well-formed objects while staying safe against unguarded clusters.

mod policy;
mod types;

pub use policy::{AutoscalerPolicy, AutoscalerPolicySpec, AutoscalerPolicyStatus};
pub use types::{
    AlgorithmSpec, Condition, ConditionStatus, CurrentMetrics, GpuUtilizationMetric,
    LatencyMetric, MetricsSpec, QueueDepthMetric, TargetKind, TargetRef,
};
