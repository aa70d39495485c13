//! Controller metrics exposed for scraping
//!
//! Every reconciliation pass records its decision, replica counts, signal
//! readings, and timing here; the `/metrics` endpoint renders the default
//! registry as Prometheus text exposition.

use once_cell::sync::Lazy;
use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, register_int_gauge_vec,
    Encoder, GaugeVec, HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};

/// Scaling decisions by direction (up, down, none)
pub static SCALING_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "autoscaler_scaling_decisions_total",
        "Total number of scaling decisions made by the autoscaler",
        &["namespace", "policy", "direction"]
    )
    .unwrap()
});

/// Current replica count of the target workload
pub static CURRENT_REPLICAS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "autoscaler_current_replicas",
        "Current number of replicas for the target workload",
        &["namespace", "policy", "target"]
    )
    .unwrap()
});

/// Desired replica count for the target workload
pub static DESIRED_REPLICAS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "autoscaler_desired_replicas",
        "Desired number of replicas for the target workload",
        &["namespace", "policy", "target"]
    )
    .unwrap()
});

/// Current value of each scaling signal
pub static METRIC_VALUE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "autoscaler_metric_value",
        "Current value of the metric being used for scaling",
        &["namespace", "policy", "metric_type"]
    )
    .unwrap()
});

/// Target value of each scaling signal
pub static METRIC_TARGET: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "autoscaler_metric_target",
        "Target value of the metric being used for scaling",
        &["namespace", "policy", "metric_type"]
    )
    .unwrap()
});

/// Reconciliation pass duration
pub static RECONCILE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "autoscaler_reconcile_duration_seconds",
        "Duration of reconciliation loops in seconds",
        &["namespace", "policy"]
    )
    .unwrap()
});

/// Reconciliation errors by kind
pub static RECONCILE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "autoscaler_reconcile_errors_total",
        "Total number of reconciliation errors",
        &["namespace", "policy", "error_type"]
    )
    .unwrap()
});

/// Whether cooldown currently suppresses scaling (1) or not (0)
pub static COOLDOWN_ACTIVE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "autoscaler_cooldown_active",
        "Whether cooldown is currently active (1) or not (0)",
        &["namespace", "policy"]
    )
    .unwrap()
});

/// Unix timestamp of the last scaling event
pub static LAST_SCALE_TIME: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "autoscaler_last_scale_time_seconds",
        "Unix timestamp of the last scaling event",
        &["namespace", "policy"]
    )
    .unwrap()
});

/// Record a scaling decision (direction: "up", "down", or "none")
pub fn record_scaling_decision(namespace: &str, policy: &str, direction: &str) {
    SCALING_DECISIONS
        .with_label_values(&[namespace, policy, direction])
        .inc();
}

/// Record current and desired replica counts
pub fn record_replica_counts(
    namespace: &str,
    policy: &str,
    target: &str,
    current: i32,
    desired: i32,
) {
    CURRENT_REPLICAS
        .with_label_values(&[namespace, policy, target])
        .set(i64::from(current));
    DESIRED_REPLICAS
        .with_label_values(&[namespace, policy, target])
        .set(i64::from(desired));
}

/// Record a signal's current value alongside its target
pub fn record_metric_values(
    namespace: &str,
    policy: &str,
    metric_type: &str,
    value: f64,
    target: f64,
) {
    METRIC_VALUE
        .with_label_values(&[namespace, policy, metric_type])
        .set(value);
    METRIC_TARGET
        .with_label_values(&[namespace, policy, metric_type])
        .set(target);
}

/// Record the duration of a reconciliation pass
pub fn record_reconcile_duration(namespace: &str, policy: &str, seconds: f64) {
    RECONCILE_DURATION
        .with_label_values(&[namespace, policy])
        .observe(seconds);
}

/// Record a reconciliation error of the given kind
pub fn record_reconcile_error(namespace: &str, policy: &str, error_type: &str) {
    RECONCILE_ERRORS
        .with_label_values(&[namespace, policy, error_type])
        .inc();
}

/// Record whether cooldown is suppressing scaling for a policy
pub fn record_cooldown_active(namespace: &str, policy: &str, active: bool) {
    COOLDOWN_ACTIVE
        .with_label_values(&[namespace, policy])
        .set(i64::from(active));
}

/// Record the unix timestamp of the last scaling event
pub fn record_last_scale_time(namespace: &str, policy: &str, timestamp: f64) {
    LAST_SCALE_TIME
        .with_label_values(&[namespace, policy])
        .set(timestamp);
}

/// Render all registered metrics as Prometheus text exposition
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: A pass's recordings show up in the exposition
    ///
    /// Covers the full family set an operator dashboards against.
    #[test]
    fn story_recorded_metrics_appear_in_exposition() {
        record_scaling_decision("inference", "llm-policy", "up");
        record_replica_counts("inference", "llm-policy", "llm-server", 2, 4);
        record_metric_values("inference", "llm-policy", "latency_p99_ms", 200.0, 100.0);
        record_reconcile_duration("inference", "llm-policy", 0.042);
        record_reconcile_error("inference", "llm-policy", "TargetNotFound");
        record_cooldown_active("inference", "llm-policy", true);
        record_last_scale_time("inference", "llm-policy", 1_715_000_000.0);

        let exposition = render();
        for family in [
            "autoscaler_scaling_decisions_total",
            "autoscaler_current_replicas",
            "autoscaler_desired_replicas",
            "autoscaler_metric_value",
            "autoscaler_metric_target",
            "autoscaler_reconcile_duration_seconds",
            "autoscaler_reconcile_errors_total",
            "autoscaler_cooldown_active",
            "autoscaler_last_scale_time_seconds",
        ] {
            assert!(exposition.contains(family), "missing family {family}");
        }
    }

    /// Story: Cooldown gauge flips between 0 and 1
    #[test]
    fn story_cooldown_gauge_tracks_state() {
        record_cooldown_active("default", "flip", true);
        assert_eq!(
            COOLDOWN_ACTIVE.with_label_values(&["default", "flip"]).get(),
            1
        );
        record_cooldown_active("default", "flip", false);
        assert_eq!(
            COOLDOWN_ACTIVE.with_label_values(&["default", "flip"]).get(),
            0
        );
    }
}
