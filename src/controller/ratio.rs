//! Metric-to-ratio translation
//!
//! Turns a policy's metric configuration plus the latest signal readings
//! into the compacted ratio list handed to the scaling algorithm. Canonical
//! order: P99 latency, P95 latency, GPU utilization, queue depth. Signals
//! that are disabled, unread, or zero-valued contribute no element - this is
//! the mechanism by which the controller degrades gracefully when a signal
//! source is unavailable.

use crate::crd::{CurrentMetrics, MetricsSpec};

/// Build the ratio list for a scaling decision
///
/// Each ratio is current/target. Queue depth is normalized per replica: the
/// observed depth is compared against `target_depth * current_replicas`, so
/// a fixed per-replica service quota yields a ratio of 1 at equilibrium.
/// Ratios are guaranteed finite and positive; anything else is dropped.
pub fn build_metric_ratios(
    spec: &MetricsSpec,
    current_replicas: i32,
    metrics: &CurrentMetrics,
) -> Vec<f64> {
    let mut ratios = Vec::new();

    if let Some(latency) = &spec.latency {
        if latency.enabled {
            if let Some(p99) = metrics.latency_p99_ms {
                if latency.target_p99_ms > 0 && p99 > 0 {
                    push_ratio(&mut ratios, f64::from(p99) / f64::from(latency.target_p99_ms));
                }
            }
            if let Some(p95) = metrics.latency_p95_ms {
                if latency.target_p95_ms > 0 && p95 > 0 {
                    push_ratio(&mut ratios, f64::from(p95) / f64::from(latency.target_p95_ms));
                }
            }
        }
    }

    if let Some(gpu) = &spec.gpu_utilization {
        if gpu.enabled {
            if let Some(percent) = metrics.gpu_utilization_percent {
                if gpu.target_percentage > 0 && percent > 0 {
                    push_ratio(
                        &mut ratios,
                        f64::from(percent) / f64::from(gpu.target_percentage),
                    );
                }
            }
        }
    }

    if let Some(queue) = &spec.request_queue_depth {
        if queue.enabled {
            if let Some(depth) = metrics.request_queue_depth {
                if queue.target_depth > 0 && depth > 0 && current_replicas > 0 {
                    push_ratio(
                        &mut ratios,
                        depth as f64 / (f64::from(queue.target_depth) * f64::from(current_replicas)),
                    );
                }
            }
        }
    }

    ratios
}

fn push_ratio(ratios: &mut Vec<f64>, ratio: f64) {
    if ratio.is_finite() && ratio > 0.0 {
        ratios.push(ratio);
    }
}
