//! Controller implementation for AutoscalerPolicy
//!
//! The reconciliation loop plus its collaborators: the metric-to-ratio
//! translator, the target workload adapter, the cooldown ledger, and the
//! event publisher. Controllers follow the Kubernetes pattern: observe
//! current state, compute desired state, apply the difference.

mod cooldown;
mod events;
mod ratio;
mod reconciler;
mod target;

pub use cooldown::CooldownLedger;
pub use events::{KubeEventPublisher, PolicyEvents};
pub use ratio::build_metric_ratios;
pub use reconciler::{
    error_policy, reconcile, Context, KubeStatusWriter, StatusWriter, CONDITION_ALGORITHM_VALID,
    CONDITION_READY, CONDITION_SCALING,
};
pub use target::{KubeScaleTarget, ScaleTarget};
