//! User-visible event publishing
//!
//! Wraps the Kubernetes event recorder behind a trait so the reconciler can
//! be tested against a mock. Events are best-effort: a publish failure is
//! logged and never fails the pass. Deduplication of the UnknownAlgorithm
//! warning is handled by the reconciler, which only publishes on a condition
//! transition.

use async_trait::async_trait;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use tracing::warn;

#[cfg(test)]
use mockall::automock;

use crate::crd::AutoscalerPolicy;

/// Event reason: the target was scaled up
pub const REASON_SCALED_UP: &str = "ScaledUp";
/// Event reason: the target was scaled down
pub const REASON_SCALED_DOWN: &str = "ScaledDown";
/// Event reason: the scaling operation failed
pub const REASON_SCALING_FAILED: &str = "ScalingFailed";
/// Event reason: the metrics source could not be reached
pub const REASON_METRICS_FAILED: &str = "MetricsFetchFailed";
/// Event reason: the scale target was not found
pub const REASON_TARGET_NOT_FOUND: &str = "TargetNotFound";
/// Event reason: cooldown suppressed a scaling decision
pub const REASON_COOLDOWN: &str = "CooldownActive";
/// Event reason: the requested algorithm is not registered
pub const REASON_UNKNOWN_ALGORITHM: &str = "UnknownAlgorithm";

/// Publisher for user-visible policy events
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PolicyEvents: Send + Sync {
    /// The target was scaled between the given replica counts
    async fn scaled(&self, policy: &AutoscalerPolicy, from: i32, to: i32);

    /// A replica write failed
    async fn scaling_failed(&self, policy: &AutoscalerPolicy, message: &str);

    /// The metrics source was unreachable
    async fn metrics_failed(&self, policy: &AutoscalerPolicy, message: &str);

    /// The target workload does not exist
    async fn target_not_found(&self, policy: &AutoscalerPolicy, message: &str);

    /// Cooldown suppressed a would-have-scaled decision
    async fn cooldown_active(&self, policy: &AutoscalerPolicy, remaining_secs: u64);

    /// The requested algorithm is not registered; a fallback was used
    async fn unknown_algorithm(
        &self,
        policy: &AutoscalerPolicy,
        requested: &str,
        fallback: &str,
        available: &[String],
    );
}

/// Kubernetes event recorder-backed publisher
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as the inferscale controller
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: "inferscale-controller".to_string(),
            instance: std::env::var("HOSTNAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }

    async fn publish(&self, policy: &AutoscalerPolicy, event: Event) {
        let reference = policy.object_ref(&());
        if let Err(e) = self.recorder.publish(&event, &reference).await {
            warn!(error = %e, "failed to publish event");
        }
    }
}

#[async_trait]
impl PolicyEvents for KubeEventPublisher {
    async fn scaled(&self, policy: &AutoscalerPolicy, from: i32, to: i32) {
        let reason = if to > from {
            REASON_SCALED_UP
        } else {
            REASON_SCALED_DOWN
        };
        self.publish(
            policy,
            Event {
                type_: EventType::Normal,
                reason: reason.to_string(),
                note: Some(format!(
                    "Scaled {}/{} from {} to {} replicas",
                    policy.spec.target_ref.kind, policy.spec.target_ref.name, from, to
                )),
                action: "Scale".to_string(),
                secondary: None,
            },
        )
        .await;
    }

    async fn scaling_failed(&self, policy: &AutoscalerPolicy, message: &str) {
        self.publish(
            policy,
            Event {
                type_: EventType::Warning,
                reason: REASON_SCALING_FAILED.to_string(),
                note: Some(format!(
                    "Failed to scale {}/{}: {}",
                    policy.spec.target_ref.kind, policy.spec.target_ref.name, message
                )),
                action: "Scale".to_string(),
                secondary: None,
            },
        )
        .await;
    }

    async fn metrics_failed(&self, policy: &AutoscalerPolicy, message: &str) {
        self.publish(
            policy,
            Event {
                type_: EventType::Warning,
                reason: REASON_METRICS_FAILED.to_string(),
                note: Some(format!("Failed to fetch metrics: {message}")),
                action: "FetchMetrics".to_string(),
                secondary: None,
            },
        )
        .await;
    }

    async fn target_not_found(&self, policy: &AutoscalerPolicy, message: &str) {
        self.publish(
            policy,
            Event {
                type_: EventType::Warning,
                reason: REASON_TARGET_NOT_FOUND.to_string(),
                note: Some(format!(
                    "Target {}/{} not found: {}",
                    policy.spec.target_ref.kind, policy.spec.target_ref.name, message
                )),
                action: "ResolveTarget".to_string(),
                secondary: None,
            },
        )
        .await;
    }

    async fn cooldown_active(&self, policy: &AutoscalerPolicy, remaining_secs: u64) {
        self.publish(
            policy,
            Event {
                type_: EventType::Normal,
                reason: REASON_COOLDOWN.to_string(),
                note: Some(format!(
                    "Scaling skipped, cooldown active for {remaining_secs} more seconds"
                )),
                action: "Scale".to_string(),
                secondary: None,
            },
        )
        .await;
    }

    async fn unknown_algorithm(
        &self,
        policy: &AutoscalerPolicy,
        requested: &str,
        fallback: &str,
        available: &[String],
    ) {
        self.publish(
            policy,
            Event {
                type_: EventType::Warning,
                reason: REASON_UNKNOWN_ALGORITHM.to_string(),
                note: Some(format!(
                    "spec.algorithm.name={requested:?} is not registered; falling back to \
                     {fallback:?}. Available: {available:?}"
                )),
                action: "ResolveAlgorithm".to_string(),
                secondary: None,
            },
        )
        .await;
    }
}
