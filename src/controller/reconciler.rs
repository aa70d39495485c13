//! AutoscalerPolicy reconciliation
//!
//! One pass: read current replicas, snapshot the signals, build the ratio
//! list, run the selected algorithm, gate on cooldown, write the new replica
//! count, then update status and conditions. Status is written after the
//! scale write so observers see the new desired count and the Scaling
//! condition together.
//!
//! The controller runtime serializes passes per policy; distinct policies
//! reconcile concurrently on the worker pool. Cancellation is cooperative:
//! dropping the pass future aborts outstanding I/O, and any partial state
//! (a scale write without its status update) self-corrects on the next
//! requeue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use super::cooldown::CooldownLedger;
use super::events::PolicyEvents;
use super::ratio::build_metric_ratios;
use super::target::{KubeScaleTarget, ScaleTarget};
use crate::crd::{
    AutoscalerPolicy, AutoscalerPolicyStatus, Condition, ConditionStatus, CurrentMetrics,
    MetricsSpec,
};
use crate::metrics::exporter;
use crate::metrics::MetricsSource;
use crate::scaling::{clamp_replicas, default_registry, Registry, ScalingInput};
use crate::{Error, Result, DEFAULT_ALGORITHM, DEFAULT_REQUEUE_SECS, DEFAULT_TOLERANCE};

/// Condition type: the policy reached a decision this pass
pub const CONDITION_READY: &str = "Ready";
/// Condition type: a scale write just happened (or just failed)
pub const CONDITION_SCALING: &str = "Scaling";
/// Condition type: the requested algorithm resolves in the registry
pub const CONDITION_ALGORITHM_VALID: &str = "AlgorithmValid";

/// Writer for the policy status subresource
///
/// Trait seam so tests can capture status updates without a cluster.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Patch the status subresource of the named policy
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &AutoscalerPolicyStatus,
    ) -> Result<()>;
}

/// Kubernetes-backed status writer
pub struct KubeStatusWriter {
    client: Client,
}

impl KubeStatusWriter {
    /// Create a writer using the given Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &AutoscalerPolicyStatus,
    ) -> Result<()> {
        let api: Api<AutoscalerPolicy> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "status": status });
        api.patch_status(
            name,
            &PatchParams::apply("inferscale-controller"),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }
}

/// Controller context shared across all reconciliation passes
///
/// Holds the trait-object seams (target adapter, status writer, event
/// publisher, metrics source) plus the algorithm registry and the cooldown
/// ledger. Everything is Arc-shared: passes for distinct policies run
/// concurrently.
pub struct Context {
    /// Adapter for the target workload's replica field
    pub targets: Arc<dyn ScaleTarget>,
    /// Writer for the policy status subresource
    pub status: Arc<dyn StatusWriter>,
    /// Publisher for user-visible events
    pub events: Arc<dyn PolicyEvents>,
    /// Signal source; None runs the loop without metrics
    pub metrics: Option<Arc<dyn MetricsSource>>,
    /// Algorithm registry consulted for policy algorithm names
    pub registry: Arc<Registry>,
    /// Cooldown ledger gating successive scale writes
    pub cooldowns: Arc<CooldownLedger>,
}

impl Context {
    /// Create a production context from a Kubernetes client
    pub fn new(client: Client, metrics: Option<Arc<dyn MetricsSource>>) -> Self {
        Self {
            targets: Arc::new(KubeScaleTarget::new(client.clone())),
            status: Arc::new(KubeStatusWriter::new(client.clone())),
            events: Arc::new(super::events::KubeEventPublisher::new(client)),
            metrics,
            registry: default_registry(),
            cooldowns: Arc::new(CooldownLedger::new()),
        }
    }
}

/// Outcome of the desired-replica calculation
struct Decision {
    desired: i32,
    algorithm: String,
    reason: String,
    /// Algorithm name the policy asked for; empty when unset
    requested: String,
    /// True when the requested algorithm was not registered
    requested_missing: bool,
}

/// Reconcile one AutoscalerPolicy
///
/// Returns the requeue action for the next pass, or an error for transient
/// failures the framework should retry with backoff.
#[instrument(skip(policy, ctx), fields(policy = %policy.name_any(), namespace = %policy.namespace().unwrap_or_default()))]
pub async fn reconcile(policy: Arc<AutoscalerPolicy>, ctx: Arc<Context>) -> Result<Action> {
    let pass_started = Instant::now();
    let namespace = policy.namespace().unwrap_or_default();
    let name = policy.name_any();
    let policy_key = format!("{namespace}/{name}");

    // A policy on its way out only needs its cooldown entry reclaimed.
    if policy.metadata.deletion_timestamp.is_some() {
        debug!("policy is being deleted, dropping cooldown entry");
        ctx.cooldowns.remove(&policy_key);
        return Ok(Action::await_change());
    }

    info!(target = %policy.spec.target_ref.name, "reconciling policy");

    // Status scratchpad; conditions carry over from the observed object so
    // transition checks (event dedup) see the previous pass.
    let mut status = policy.status.clone().unwrap_or_default();

    // Read current replicas from the target workload.
    let current_replicas = match ctx.targets.current_replicas(&policy).await {
        Ok(n) => n,
        Err(e @ Error::TargetNotFound { .. }) => {
            warn!(error = %e, "scale target not found");
            exporter::record_reconcile_error(&namespace, &name, "TargetNotFound");
            ctx.events.target_not_found(&policy, &e.to_string()).await;
            status.set_condition(Condition::new(
                CONDITION_READY,
                ConditionStatus::False,
                "TargetNotFound",
                e.to_string(),
            ));
            patch_status(&ctx, &namespace, &name, &status).await;
            return Ok(requeue());
        }
        Err(e @ Error::UnsupportedKind(_)) => {
            warn!(error = %e, "policy references an unscalable kind");
            exporter::record_reconcile_error(&namespace, &name, "UnsupportedKind");
            status.set_condition(Condition::new(
                CONDITION_READY,
                ConditionStatus::False,
                "UnsupportedKind",
                e.to_string(),
            ));
            patch_status(&ctx, &namespace, &name, &status).await;
            return Ok(requeue());
        }
        // Transient: no state changes, the framework retries with backoff.
        Err(e) => return Err(e),
    };

    // Snapshot the signals. Individual failures degrade the snapshot; an
    // unreachable source aborts the pass.
    let current_metrics = match fetch_signals(&policy, ctx.metrics.as_deref()).await {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "metrics source unreachable");
            exporter::record_reconcile_error(&namespace, &name, "MetricsFetchFailed");
            ctx.events.metrics_failed(&policy, &e.to_string()).await;
            status.set_condition(Condition::new(
                CONDITION_READY,
                ConditionStatus::False,
                "MetricsFetchFailed",
                e.to_string(),
            ));
            patch_status(&ctx, &namespace, &name, &status).await;
            return Ok(requeue());
        }
    };
    record_signal_gauges(&namespace, &name, &policy.spec.metrics, &current_metrics);

    // Resolve the algorithm and compute the desired count.
    let decision = calculate_desired(&policy, current_replicas, &current_metrics, &ctx).await;

    // AlgorithmValid condition and deduplicated warning event: the event is
    // published only when the condition is transitioning into the
    // (False, UnknownAlgorithm) shape, not on every pass it stays there.
    if !decision.requested.is_empty() {
        if decision.requested_missing {
            let transitioning = !status.has_condition(
                CONDITION_ALGORITHM_VALID,
                ConditionStatus::False,
                "UnknownAlgorithm",
            );
            if transitioning {
                ctx.events
                    .unknown_algorithm(
                        &policy,
                        &decision.requested,
                        &decision.algorithm,
                        &ctx.registry.list(),
                    )
                    .await;
            }
            status.set_condition(Condition::new(
                CONDITION_ALGORITHM_VALID,
                ConditionStatus::False,
                "UnknownAlgorithm",
                format!(
                    "Algorithm {:?} not found, using fallback {:?}",
                    decision.requested, decision.algorithm
                ),
            ));
        } else {
            status.set_condition(Condition::new(
                CONDITION_ALGORITHM_VALID,
                ConditionStatus::True,
                "AlgorithmFound",
                format!("Using algorithm {:?}", decision.algorithm),
            ));
        }
    }

    // Clamp once more at the reconciler layer; the algorithms already clamp
    // but bounds enforcement must not depend on a plugin behaving.
    let min_replicas = policy.spec.effective_min_replicas();
    let desired = clamp_replicas(decision.desired, min_replicas, policy.spec.max_replicas);

    // Cooldown gate and scale write.
    let cooldown = policy.spec.effective_cooldown();
    let mut wrote = false;
    let mut suppressed = false;

    if desired != current_replicas {
        if !ctx.cooldowns.eligible(&policy_key, cooldown) {
            suppressed = true;
            let remaining = ctx.cooldowns.remaining(&policy_key, cooldown);
            info!(
                remaining_secs = remaining.as_secs(),
                desired, "cooldown active, skipping scale"
            );
            ctx.events
                .cooldown_active(&policy, remaining.as_secs())
                .await;
        } else {
            info!(
                current = current_replicas,
                desired,
                algorithm = %decision.algorithm,
                reason = %decision.reason,
                "scaling target"
            );
            match ctx.targets.set_replicas(&policy, desired).await {
                Ok(()) => {
                    ctx.cooldowns.record(&policy_key);
                    wrote = true;
                    status.set_condition(Condition::new(
                        CONDITION_SCALING,
                        ConditionStatus::True,
                        "Scaled",
                        format!(
                            "Scaled from {} to {} replicas using {} algorithm",
                            current_replicas, desired, decision.algorithm
                        ),
                    ));
                    ctx.events.scaled(&policy, current_replicas, desired).await;
                }
                Err(e) => {
                    error!(error = %e, "failed to scale target");
                    exporter::record_reconcile_error(&namespace, &name, "ScaleFailed");
                    status.set_condition(Condition::new(
                        CONDITION_SCALING,
                        ConditionStatus::False,
                        "ScaleFailed",
                        e.to_string(),
                    ));
                    ctx.events.scaling_failed(&policy, &e.to_string()).await;

                    // The decision is still recorded; the ledger is not.
                    status.current_replicas = current_replicas;
                    status.desired_replicas = desired;
                    status.current_metrics = Some(current_metrics);
                    status.last_algorithm = decision.algorithm;
                    status.last_scale_reason = decision.reason;
                    patch_status(&ctx, &namespace, &name, &status).await;
                    return Ok(requeue());
                }
            }
        }
    }
    exporter::record_cooldown_active(&namespace, &name, suppressed);

    // Final status update, after the write so observers see the new desired
    // count and the Scaling condition together. A suppressed pass still
    // records the would-have-scaled desired.
    status.current_replicas = current_replicas;
    status.desired_replicas = desired;
    status.current_metrics = Some(current_metrics);
    status.last_algorithm = decision.algorithm.clone();
    status.last_scale_reason = decision.reason.clone();
    if wrote {
        let now = Utc::now();
        status.last_scale_time = Some(now);
        exporter::record_last_scale_time(&namespace, &name, now.timestamp() as f64);
    }
    status.set_condition(Condition::new(
        CONDITION_READY,
        ConditionStatus::True,
        "Ready",
        "Policy is active",
    ));
    patch_status(&ctx, &namespace, &name, &status).await;

    let direction = if !wrote {
        "none"
    } else if desired > current_replicas {
        "up"
    } else {
        "down"
    };
    exporter::record_scaling_decision(&namespace, &name, direction);
    exporter::record_replica_counts(
        &namespace,
        &name,
        &policy.spec.target_ref.name,
        current_replicas,
        desired,
    );
    exporter::record_reconcile_duration(&namespace, &name, pass_started.elapsed().as_secs_f64());

    Ok(requeue())
}

/// Error policy for the controller
///
/// Transient failures surface here; the pass made no state changes, so a
/// plain requeue retries it.
pub fn error_policy(policy: Arc<AutoscalerPolicy>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        policy = %policy.name_any(),
        "reconciliation failed"
    );
    exporter::record_reconcile_error(
        &policy.namespace().unwrap_or_default(),
        &policy.name_any(),
        "Transient",
    );
    requeue()
}

fn requeue() -> Action {
    Action::requeue(Duration::from_secs(DEFAULT_REQUEUE_SECS))
}

async fn patch_status(
    ctx: &Context,
    namespace: &str,
    name: &str,
    status: &AutoscalerPolicyStatus,
) {
    if let Err(e) = ctx.status.patch_status(namespace, name, status).await {
        error!(error = %e, "failed to update status");
    }
}

/// Snapshot the enabled signals from the metrics source
///
/// Per-signal failures are logged and leave that reading absent; only
/// [`Error::MetricsUnavailable`] (the source itself is unreachable) aborts
/// the snapshot. Latency getters return seconds and are converted to
/// milliseconds here.
async fn fetch_signals(
    policy: &AutoscalerPolicy,
    source: Option<&dyn MetricsSource>,
) -> Result<CurrentMetrics> {
    let mut current = CurrentMetrics::default();
    let Some(source) = source else {
        return Ok(current);
    };
    let metrics = &policy.spec.metrics;

    if let Some(latency) = &metrics.latency {
        if latency.enabled {
            if latency.target_p99_ms > 0 {
                match source.latency_p99(&latency.prometheus_query).await {
                    Ok(seconds) => current.latency_p99_ms = Some((seconds * 1000.0) as i32),
                    Err(e @ Error::MetricsUnavailable(_)) => return Err(e),
                    Err(e) => warn!(error = %e, "skipping p99 latency signal"),
                }
            }
            if latency.target_p95_ms > 0 {
                match source.latency_p95(&latency.prometheus_query).await {
                    Ok(seconds) => current.latency_p95_ms = Some((seconds * 1000.0) as i32),
                    Err(e @ Error::MetricsUnavailable(_)) => return Err(e),
                    Err(e) => warn!(error = %e, "skipping p95 latency signal"),
                }
            }
        }
    }

    if let Some(gpu) = &metrics.gpu_utilization {
        if gpu.enabled {
            match source.gpu_utilization(&gpu.prometheus_query).await {
                Ok(percent) => current.gpu_utilization_percent = Some(percent as i32),
                Err(e @ Error::MetricsUnavailable(_)) => return Err(e),
                Err(e) => warn!(error = %e, "skipping gpu utilization signal"),
            }
        }
    }

    if let Some(queue) = &metrics.request_queue_depth {
        if queue.enabled {
            match source.queue_depth(&queue.prometheus_query).await {
                Ok(depth) => current.request_queue_depth = Some(depth),
                Err(e @ Error::MetricsUnavailable(_)) => return Err(e),
                Err(e) => warn!(error = %e, "skipping queue depth signal"),
            }
        }
    }

    Ok(current)
}

/// Export gauge readings for each enabled signal with a value
fn record_signal_gauges(
    namespace: &str,
    policy: &str,
    spec: &MetricsSpec,
    metrics: &CurrentMetrics,
) {
    if let Some(latency) = &spec.latency {
        if latency.enabled {
            if let Some(p99) = metrics.latency_p99_ms {
                exporter::record_metric_values(
                    namespace,
                    policy,
                    "latency_p99_ms",
                    f64::from(p99),
                    f64::from(latency.target_p99_ms),
                );
            }
            if let Some(p95) = metrics.latency_p95_ms {
                exporter::record_metric_values(
                    namespace,
                    policy,
                    "latency_p95_ms",
                    f64::from(p95),
                    f64::from(latency.target_p95_ms),
                );
            }
        }
    }
    if let Some(gpu) = &spec.gpu_utilization {
        if gpu.enabled {
            if let Some(percent) = metrics.gpu_utilization_percent {
                exporter::record_metric_values(
                    namespace,
                    policy,
                    "gpu_utilization_percent",
                    f64::from(percent),
                    f64::from(gpu.target_percentage),
                );
            }
        }
    }
    if let Some(queue) = &spec.request_queue_depth {
        if queue.enabled {
            if let Some(depth) = metrics.request_queue_depth {
                exporter::record_metric_values(
                    namespace,
                    policy,
                    "request_queue_depth",
                    depth as f64,
                    f64::from(queue.target_depth),
                );
            }
        }
    }
}

/// Resolve the algorithm, build the ratio list, and compute the scale
///
/// Falls back along: configured registry entry, the default algorithm in
/// the configured registry, the default algorithm in the global registry.
/// When nothing resolves, or the computation errors, the current count is
/// held - the loop must never panic over configuration.
async fn calculate_desired(
    policy: &AutoscalerPolicy,
    current_replicas: i32,
    current_metrics: &CurrentMetrics,
    ctx: &Context,
) -> Decision {
    let mut algorithm_name = DEFAULT_ALGORITHM.to_string();
    let mut tolerance = DEFAULT_TOLERANCE;
    let mut weights: Vec<f64> = Vec::new();
    let mut requested = String::new();

    if let Some(spec) = &policy.spec.algorithm {
        if !spec.name.is_empty() {
            requested = spec.name.clone();
            algorithm_name = spec.name.clone();
        }
        // An explicit 0 is a real request for no deadband
        if let Some(configured) = spec.tolerance {
            tolerance = configured;
        }
        weights = spec.weights.clone();
    }

    let mut requested_missing = false;
    let algorithm = match ctx.registry.get(&algorithm_name) {
        Ok(a) => a,
        Err(e) => {
            warn!(error = %e, algorithm = %algorithm_name, "algorithm not found, falling back to default");
            if !requested.is_empty() {
                requested_missing = true;
            }
            algorithm_name = DEFAULT_ALGORITHM.to_string();
            match ctx
                .registry
                .get(DEFAULT_ALGORITHM)
                .or_else(|_| default_registry().get(DEFAULT_ALGORITHM))
            {
                Ok(a) => a,
                Err(e) => {
                    error!(error = %e, "no valid scaling algorithm available, keeping current replicas");
                    return Decision {
                        desired: current_replicas,
                        algorithm: algorithm_name,
                        reason: "no algorithm available".to_string(),
                        requested,
                        requested_missing,
                    };
                }
            }
        }
    };

    let input = ScalingInput {
        current_replicas,
        min_replicas: policy.spec.effective_min_replicas(),
        max_replicas: policy.spec.max_replicas,
        metric_ratios: build_metric_ratios(&policy.spec.metrics, current_replicas, current_metrics),
        tolerance,
        policy_name: policy.name_any(),
        policy_namespace: policy.namespace().unwrap_or_default(),
    };

    // Per-policy weights bind to a private copy; the registered instance is
    // shared across reconciliations and must never be mutated.
    let computed = if weights.is_empty() {
        algorithm.compute_scale(&input).await
    } else {
        match algorithm.bind_weights(&weights) {
            Some(bound) => bound.compute_scale(&input).await,
            None => algorithm.compute_scale(&input).await,
        }
    };

    match computed {
        Ok(result) => {
            info!(
                algorithm = %algorithm_name,
                current = current_replicas,
                desired = result.desired_replicas,
                reason = %result.reason,
                tolerance,
                "calculated desired replicas"
            );
            Decision {
                desired: result.desired_replicas,
                algorithm: algorithm_name,
                reason: result.reason,
                requested,
                requested_missing,
            }
        }
        Err(e) => {
            error!(error = %e, algorithm = %algorithm_name, "algorithm computation failed, keeping current replicas");
            Decision {
                desired: current_replicas,
                algorithm: algorithm_name,
                reason: "computation failed".to_string(),
                requested,
                requested_missing,
            }
        }
    }
}
