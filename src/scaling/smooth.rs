//! Capped, smoothed scaling algorithm
//!
//! The reference stateful algorithm: exponential smoothing over the max
//! ratio damps metric noise, and per-cycle caps on the step size prevent a
//! single hot pass from doubling the fleet. Not registered by default -
//! register it explicitly, or build it as a plugin and drop it in the
//! plugin directory.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{clamp_replicas, ScalingAlgorithm, ScalingInput, ScalingResult};
use crate::Result;

/// Scaling algorithm with exponential smoothing and capped step sizes
///
/// Smoothed ratios are tracked per policy, keyed by
/// [`ScalingInput::policy_key`], under the algorithm's own lock - the
/// pattern any stateful algorithm should follow, since one instance serves
/// concurrent reconciliations for many policies.
pub struct CappedSmoothRatio {
    /// Weight given to the newest observation (0-1); higher reacts faster
    pub smoothing_factor: f64,
    /// Maximum fractional increase per cycle (0.5 = +50%)
    pub max_scale_up_percent: f64,
    /// Maximum fractional decrease per cycle (0.25 = -25%)
    pub max_scale_down_percent: f64,

    smoothed_ratios: Mutex<HashMap<String, f64>>,
}

impl CappedSmoothRatio {
    /// Create the algorithm with its conventional tuning
    ///
    /// 30% weight to new observations, at most +50%/-25% per cycle.
    pub fn new() -> Self {
        Self {
            smoothing_factor: 0.3,
            max_scale_up_percent: 0.5,
            max_scale_down_percent: 0.25,
            smoothed_ratios: Mutex::new(HashMap::new()),
        }
    }

    /// Fold the newest max ratio into the policy's smoothed ratio
    fn smooth(&self, key: String, current_max: f64) -> f64 {
        let mut ratios = self.smoothed_ratios.lock().expect("smoothing lock poisoned");
        let smoothed = match ratios.get(&key) {
            Some(previous) => {
                self.smoothing_factor * current_max + (1.0 - self.smoothing_factor) * previous
            }
            None => current_max,
        };
        ratios.insert(key, smoothed);
        smoothed
    }
}

impl Default for CappedSmoothRatio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScalingAlgorithm for CappedSmoothRatio {
    fn name(&self) -> &str {
        "CappedSmoothRatio"
    }

    async fn compute_scale(&self, input: &ScalingInput) -> Result<ScalingResult> {
        if input.metric_ratios.is_empty() {
            return Ok(ScalingResult::new(
                clamp_replicas(
                    input.current_replicas,
                    input.min_replicas,
                    input.max_replicas,
                ),
                "no metrics available",
            ));
        }

        let current_max = input.metric_ratios.iter().copied().fold(1.0, f64::max);
        let smoothed = self.smooth(input.policy_key(), current_max);

        if (smoothed - 1.0).abs() <= input.tolerance {
            return Ok(ScalingResult::new(
                clamp_replicas(
                    input.current_replicas,
                    input.min_replicas,
                    input.max_replicas,
                ),
                "within tolerance after smoothing",
            ));
        }

        let current = f64::from(input.current_replicas);
        let uncapped = current * smoothed;

        let capped = if smoothed > 1.0 {
            uncapped.min(current + current * self.max_scale_up_percent)
        } else {
            uncapped.max(current - current * self.max_scale_down_percent)
        };
        let desired = clamp_replicas(
            capped.ceil() as i32,
            input.min_replicas,
            input.max_replicas,
        );

        Ok(ScalingResult::new(desired, "scaled with capped smoothing"))
    }
}
