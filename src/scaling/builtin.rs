//! Built-in scaling algorithms
//!
//! All three built-ins share the same skeleton: an empty ratio list holds the
//! current count, a summary ratio within tolerance of 1.0 holds the current
//! count, and otherwise the target is `ceil(current * ratio)`. Every exit
//! clamps to [min, max] so an out-of-bounds starting count self-heals even
//! when no scaling is called for.

use async_trait::async_trait;

use super::{clamp_replicas, ScalingAlgorithm, ScalingInput, ScalingResult};
use crate::Result;

/// Hold the current replica count, clamped, with the given reason
fn hold(input: &ScalingInput, reason: &str) -> ScalingResult {
    ScalingResult::new(
        clamp_replicas(
            input.current_replicas,
            input.min_replicas,
            input.max_replicas,
        ),
        reason,
    )
}

/// Scale by `ceil(current * ratio)`, clamped, with the given reason
fn scale_by(input: &ScalingInput, ratio: f64, reason: &str) -> ScalingResult {
    let desired = (f64::from(input.current_replicas) * ratio).ceil() as i32;
    ScalingResult::new(
        clamp_replicas(desired, input.min_replicas, input.max_replicas),
        reason,
    )
}

fn within_tolerance(ratio: f64, tolerance: f64) -> bool {
    (ratio - 1.0).abs() <= tolerance
}

/// Scales on the worst (largest) metric ratio
///
/// The summary ratio is floored at 1.0, so MaxRatio never initiates a
/// scale-down: when every signal sits below target the result stays at the
/// clamped current count. The most-loaded signal alone drives scale-up,
/// which suits heterogeneous signals where any one of them saturating is
/// reason enough to grow.
#[derive(Clone, Debug)]
pub struct MaxRatio {
    /// Tolerance configured at registration; the input's tolerance wins
    pub tolerance: f64,
}

impl MaxRatio {
    /// Create a MaxRatio algorithm with the given tolerance
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

#[async_trait]
impl ScalingAlgorithm for MaxRatio {
    fn name(&self) -> &str {
        "MaxRatio"
    }

    async fn compute_scale(&self, input: &ScalingInput) -> Result<ScalingResult> {
        if input.metric_ratios.is_empty() {
            return Ok(hold(input, "no metrics available"));
        }

        // Floor at 1.0: ratios below target never pull the count down
        let max_ratio = input.metric_ratios.iter().copied().fold(1.0, f64::max);

        if within_tolerance(max_ratio, input.tolerance) {
            return Ok(hold(input, "within tolerance"));
        }

        Ok(scale_by(input, max_ratio, "scaled based on max ratio"))
    }
}

/// Scales on the arithmetic mean of the metric ratios
///
/// Balances the signals against each other: one saturated signal can be
/// offset by idle ones. Unlike [`MaxRatio`] the mean can drop below 1.0, so
/// AverageRatio scales down when the fleet is collectively under target.
#[derive(Clone, Debug)]
pub struct AverageRatio {
    /// Tolerance configured at registration; the input's tolerance wins
    pub tolerance: f64,
}

impl AverageRatio {
    /// Create an AverageRatio algorithm with the given tolerance
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

#[async_trait]
impl ScalingAlgorithm for AverageRatio {
    fn name(&self) -> &str {
        "AverageRatio"
    }

    async fn compute_scale(&self, input: &ScalingInput) -> Result<ScalingResult> {
        if input.metric_ratios.is_empty() {
            return Ok(hold(input, "no metrics available"));
        }

        let sum: f64 = input.metric_ratios.iter().sum();
        let avg_ratio = sum / input.metric_ratios.len() as f64;

        if within_tolerance(avg_ratio, input.tolerance) {
            return Ok(hold(input, "within tolerance"));
        }

        Ok(scale_by(input, avg_ratio, "scaled based on average ratio"))
    }
}

/// Scales on a weighted mean of the metric ratios
///
/// Weights align positionally to the compacted ratio list; positions past
/// the end of the weight list default to 1. A per-policy weight override is
/// applied through [`bind_weights`](ScalingAlgorithm::bind_weights), which
/// returns a fresh copy so the registered instance is never mutated.
#[derive(Clone, Debug)]
pub struct WeightedRatio {
    /// Tolerance configured at registration; the input's tolerance wins
    pub tolerance: f64,
    /// Per-position weights; missing positions weigh 1
    pub weights: Vec<f64>,
}

impl WeightedRatio {
    /// Create a WeightedRatio algorithm with the given tolerance and weights
    pub fn new(tolerance: f64, weights: Vec<f64>) -> Self {
        Self { tolerance, weights }
    }
}

#[async_trait]
impl ScalingAlgorithm for WeightedRatio {
    fn name(&self) -> &str {
        "WeightedRatio"
    }

    async fn compute_scale(&self, input: &ScalingInput) -> Result<ScalingResult> {
        if input.metric_ratios.is_empty() {
            return Ok(hold(input, "no metrics available"));
        }

        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        for (i, ratio) in input.metric_ratios.iter().enumerate() {
            let weight = self.weights.get(i).copied().unwrap_or(1.0);
            weighted_sum += ratio * weight;
            total_weight += weight;
        }

        if total_weight == 0.0 {
            return Ok(hold(input, "total weight is zero"));
        }

        let weighted_ratio = weighted_sum / total_weight;

        if within_tolerance(weighted_ratio, input.tolerance) {
            return Ok(hold(input, "within tolerance"));
        }

        Ok(scale_by(
            input,
            weighted_ratio,
            "scaled based on weighted ratio",
        ))
    }

    fn bind_weights(&self, weights: &[f64]) -> Option<Box<dyn ScalingAlgorithm>> {
        Some(Box::new(Self {
            tolerance: self.tolerance,
            weights: weights.to_vec(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_TOLERANCE;

    fn input(current: i32, min: i32, max: i32, ratios: &[f64]) -> ScalingInput {
        ScalingInput {
            current_replicas: current,
            min_replicas: min,
            max_replicas: max,
            metric_ratios: ratios.to_vec(),
            tolerance: DEFAULT_TOLERANCE,
            policy_name: "test-policy".to_string(),
            policy_namespace: "default".to_string(),
        }
    }

    // =========================================================================
    // Shared Skeleton Stories
    // =========================================================================
    //
    // Every built-in holds on an empty ratio list, holds within tolerance,
    // and clamps on every exit path - including the early returns.

    /// Story: No signals means no opinion - hold the current count
    #[tokio::test]
    async fn story_empty_ratios_hold_current_replicas() {
        for algorithm in algorithms() {
            let result = algorithm.compute_scale(&input(4, 1, 10, &[])).await.unwrap();
            assert_eq!(result.desired_replicas, 4, "{}", algorithm.name());
            assert_eq!(result.reason, "no metrics available");
        }
    }

    /// Story: Even the no-metrics early return repairs out-of-bounds counts
    ///
    /// A target hand-scaled below minReplicas is pulled back up on the very
    /// next pass, whatever path the algorithm takes.
    #[tokio::test]
    async fn story_every_exit_clamps_to_bounds() {
        for algorithm in algorithms() {
            // Empty-ratio exit, current below min
            let result = algorithm.compute_scale(&input(2, 3, 10, &[])).await.unwrap();
            assert_eq!(result.desired_replicas, 3, "{}", algorithm.name());

            // Within-tolerance exit, current above max
            let result = algorithm
                .compute_scale(&input(15, 1, 10, &[1.0]))
                .await
                .unwrap();
            assert_eq!(result.desired_replicas, 10, "{}", algorithm.name());
            assert_eq!(result.reason, "within tolerance");
        }
    }

    /// Story: A ratio exactly at 1.0 sits inside the deadband
    ///
    /// current=2, min=3: the ratio is 1.0 so no scaling, but the clamp still
    /// pushes the count up to the floor.
    #[tokio::test]
    async fn story_floor_clamp_applies_within_tolerance() {
        let algorithm = MaxRatio::new(DEFAULT_TOLERANCE);
        let result = algorithm
            .compute_scale(&input(2, 3, 10, &[1.0]))
            .await
            .unwrap();
        assert_eq!(result.desired_replicas, 3);
        assert_eq!(result.reason, "within tolerance");
    }

    /// Story: An explicit zero tolerance disables the deadband
    ///
    /// With tolerance 0, a ratio of 1.05 is actionable rather than absorbed.
    #[tokio::test]
    async fn story_zero_tolerance_is_honored() {
        let algorithm = MaxRatio::new(DEFAULT_TOLERANCE);
        let mut inp = input(4, 1, 20, &[1.05]);
        inp.tolerance = 0.0;

        let result = algorithm.compute_scale(&inp).await.unwrap();
        // ceil(4 * 1.05) = 5
        assert_eq!(result.desired_replicas, 5);
        assert_eq!(result.reason, "scaled based on max ratio");
    }

    fn algorithms() -> Vec<Box<dyn ScalingAlgorithm>> {
        vec![
            Box::new(MaxRatio::new(DEFAULT_TOLERANCE)),
            Box::new(AverageRatio::new(DEFAULT_TOLERANCE)),
            Box::new(WeightedRatio::new(DEFAULT_TOLERANCE, Vec::new())),
        ]
    }

    // =========================================================================
    // MaxRatio Stories
    // =========================================================================

    /// Story: P99 latency at double its target doubles the fleet
    ///
    /// target=100ms, observed p99=200ms, ratio 2.0: 2 replicas become 4.
    #[tokio::test]
    async fn story_latency_breach_scales_up() {
        let algorithm = MaxRatio::new(DEFAULT_TOLERANCE);
        let result = algorithm
            .compute_scale(&input(2, 1, 10, &[2.0]))
            .await
            .unwrap();
        assert_eq!(result.desired_replicas, 4);
        assert_eq!(result.reason, "scaled based on max ratio");
    }

    /// Story: A runaway ratio is capped at maxReplicas
    ///
    /// p99 at 5x target from 8 replicas wants 40; the policy caps at 10.
    #[tokio::test]
    async fn story_scale_up_capped_at_max() {
        let algorithm = MaxRatio::new(DEFAULT_TOLERANCE);
        let result = algorithm
            .compute_scale(&input(8, 1, 10, &[5.0]))
            .await
            .unwrap();
        assert_eq!(result.desired_replicas, 10);
    }

    /// Story: The worst signal wins the tie-break
    ///
    /// Latency at 1.5x and GPU at 2.0x: the GPU ratio drives the decision.
    #[tokio::test]
    async fn story_max_ratio_driven_by_worst_signal() {
        let algorithm = MaxRatio::new(DEFAULT_TOLERANCE);
        let result = algorithm
            .compute_scale(&input(2, 1, 10, &[1.5, 2.0]))
            .await
            .unwrap();
        assert_eq!(result.desired_replicas, 4);
    }

    /// Story: MaxRatio never scales down
    ///
    /// Every signal far below target still floors the summary ratio at 1.0,
    /// which is inside any tolerance band - the count holds.
    #[tokio::test]
    async fn story_max_ratio_never_scales_down() {
        let algorithm = MaxRatio::new(DEFAULT_TOLERANCE);
        let result = algorithm
            .compute_scale(&input(8, 1, 10, &[0.2, 0.4]))
            .await
            .unwrap();
        assert_eq!(result.desired_replicas, 8);
        assert_eq!(result.reason, "within tolerance");
    }

    // =========================================================================
    // AverageRatio Stories
    // =========================================================================

    /// Story: The mean balances a hot signal against a satisfied one
    ///
    /// Ratios {1.5, 2.0} average to 1.75: 2 replicas become ceil(3.5) = 4.
    /// With 4 replicas and ratios {2.0, 1.0} the mean is 1.5: 4 become 6.
    #[tokio::test]
    async fn story_average_ratio_uses_the_mean() {
        let algorithm = AverageRatio::new(DEFAULT_TOLERANCE);

        let result = algorithm
            .compute_scale(&input(2, 1, 10, &[1.5, 2.0]))
            .await
            .unwrap();
        assert_eq!(result.desired_replicas, 4);
        assert_eq!(result.reason, "scaled based on average ratio");

        let result = algorithm
            .compute_scale(&input(4, 1, 10, &[2.0, 1.0]))
            .await
            .unwrap();
        assert_eq!(result.desired_replicas, 6);
    }

    /// Story: AverageRatio scales down when the fleet is under target
    ///
    /// Ratios {0.4, 0.6} average to 0.5: 8 replicas become ceil(4.0) = 4.
    #[tokio::test]
    async fn story_average_ratio_scales_down() {
        let algorithm = AverageRatio::new(DEFAULT_TOLERANCE);
        let result = algorithm
            .compute_scale(&input(8, 1, 10, &[0.4, 0.6]))
            .await
            .unwrap();
        assert_eq!(result.desired_replicas, 4);
    }

    // =========================================================================
    // WeightedRatio Stories
    // =========================================================================

    /// Story: Weights shift the decision toward the favored signal
    ///
    /// Ratios {2.0, 1.0} with weights {3, 1} give (6+1)/4 = 1.75:
    /// 2 replicas become 4. Unweighted the mean would be 1.5 and yield 3.
    #[tokio::test]
    async fn story_weights_bias_the_summary_ratio() {
        let weighted = WeightedRatio::new(DEFAULT_TOLERANCE, vec![3.0, 1.0]);
        let result = weighted
            .compute_scale(&input(2, 1, 10, &[2.0, 1.0]))
            .await
            .unwrap();
        assert_eq!(result.desired_replicas, 4);
        assert_eq!(result.reason, "scaled based on weighted ratio");

        let unweighted = WeightedRatio::new(DEFAULT_TOLERANCE, Vec::new());
        let result = unweighted
            .compute_scale(&input(2, 1, 10, &[2.0, 1.0]))
            .await
            .unwrap();
        assert_eq!(result.desired_replicas, 3);
    }

    /// Story: Positions past the weight list default to weight 1
    #[tokio::test]
    async fn story_missing_weights_default_to_one() {
        let algorithm = WeightedRatio::new(DEFAULT_TOLERANCE, vec![2.0]);
        // (2.0*2 + 1.0*1) / 3 = 5/3 ~= 1.667 -> ceil(2 * 1.667) = 4
        let result = algorithm
            .compute_scale(&input(2, 1, 10, &[2.0, 1.0]))
            .await
            .unwrap();
        assert_eq!(result.desired_replicas, 4);
    }

    /// Story: All-zero weights cannot produce a ratio - hold the count
    #[tokio::test]
    async fn story_zero_total_weight_holds_current() {
        let algorithm = WeightedRatio::new(DEFAULT_TOLERANCE, vec![0.0, 0.0]);
        let result = algorithm
            .compute_scale(&input(5, 1, 10, &[2.0, 3.0]))
            .await
            .unwrap();
        assert_eq!(result.desired_replicas, 5);
        assert_eq!(result.reason, "total weight is zero");
    }

    /// Story: Per-policy weights never leak into the shared instance
    ///
    /// The registry hands out one WeightedRatio for every policy; a policy
    /// that overrides weights gets a private copy and the registered
    /// instance's weights stay untouched.
    #[tokio::test]
    async fn story_bound_weights_do_not_mutate_the_shared_instance() {
        let shared = WeightedRatio::new(DEFAULT_TOLERANCE, vec![1.0, 1.0]);

        let bound = shared
            .bind_weights(&[9.0, 0.0])
            .expect("WeightedRatio supports weight binding");

        // The copy scales on the overridden weights: (2.0*9 + 1.0*0)/9 = 2.0
        let result = bound
            .compute_scale(&input(2, 1, 10, &[2.0, 1.0]))
            .await
            .unwrap();
        assert_eq!(result.desired_replicas, 4);

        // The shared instance still averages evenly: (2.0 + 1.0)/2 = 1.5
        assert_eq!(shared.weights, vec![1.0, 1.0]);
        let result = shared
            .compute_scale(&input(2, 1, 10, &[2.0, 1.0]))
            .await
            .unwrap();
        assert_eq!(result.desired_replicas, 3);
    }

    /// Story: Algorithms without weights decline to bind them
    #[test]
    fn story_only_weighted_ratio_binds_weights() {
        assert!(MaxRatio::new(DEFAULT_TOLERANCE)
            .bind_weights(&[1.0])
            .is_none());
        assert!(AverageRatio::new(DEFAULT_TOLERANCE)
            .bind_weights(&[1.0])
            .is_none());
    }
}
