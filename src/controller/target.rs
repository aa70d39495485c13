//! Target workload adapter
//!
//! Reads and writes the replica field of the workload a policy binds to,
//! hiding the kind-specific access behind one interface. Writes use
//! optimistic concurrency: a conflicting update surfaces as
//! [`Error::WriteConflict`] and is retried on the next requeue rather than
//! in-pass.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::api::{Api, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{AutoscalerPolicy, TargetKind};
use crate::{Error, Result};

/// Uniform access to the replica field of a policy's target workload
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScaleTarget: Send + Sync {
    /// Read the current replica count; an absent field reads as 1
    async fn current_replicas(&self, policy: &AutoscalerPolicy) -> Result<i32>;

    /// Write a new replica count
    ///
    /// A no-op (and not an error) when the workload already sits at
    /// `replicas`.
    async fn set_replicas(&self, policy: &AutoscalerPolicy, replicas: i32) -> Result<()>;
}

/// Kubernetes-backed scale target adapter
pub struct KubeScaleTarget {
    client: Client,
}

impl KubeScaleTarget {
    /// Create an adapter using the given Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn stateful_sets(&self, namespace: &str) -> Api<StatefulSet> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map a kube API error onto the adapter's failure kinds
fn map_kube_error(err: kube::Error, kind: &str, name: &str) -> Error {
    if let kube::Error::Api(ref response) = err {
        match response.code {
            404 => return Error::target_not_found(kind, name),
            409 => return Error::write_conflict(kind, name),
            _ => {}
        }
    }
    Error::Kube(err)
}

#[async_trait]
impl ScaleTarget for KubeScaleTarget {
    async fn current_replicas(&self, policy: &AutoscalerPolicy) -> Result<i32> {
        let namespace = policy.namespace().unwrap_or_default();
        let name = &policy.spec.target_ref.name;

        match policy.spec.target_ref.target_kind()? {
            TargetKind::Deployment => {
                let deployment = self
                    .deployments(&namespace)
                    .get(name)
                    .await
                    .map_err(|e| map_kube_error(e, "Deployment", name))?;
                Ok(deployment
                    .spec
                    .and_then(|s| s.replicas)
                    .unwrap_or(1))
            }
            TargetKind::StatefulSet => {
                let stateful_set = self
                    .stateful_sets(&namespace)
                    .get(name)
                    .await
                    .map_err(|e| map_kube_error(e, "StatefulSet", name))?;
                Ok(stateful_set
                    .spec
                    .and_then(|s| s.replicas)
                    .unwrap_or(1))
            }
        }
    }

    async fn set_replicas(&self, policy: &AutoscalerPolicy, replicas: i32) -> Result<()> {
        let namespace = policy.namespace().unwrap_or_default();
        let name = &policy.spec.target_ref.name;

        match policy.spec.target_ref.target_kind()? {
            TargetKind::Deployment => {
                let api = self.deployments(&namespace);
                let mut deployment = api
                    .get(name)
                    .await
                    .map_err(|e| map_kube_error(e, "Deployment", name))?;

                let spec = deployment.spec.get_or_insert_with(Default::default);
                if spec.replicas == Some(replicas) {
                    debug!(target = %name, replicas, "target already at desired replicas");
                    return Ok(());
                }
                spec.replicas = Some(replicas);

                api.replace(name, &PostParams::default(), &deployment)
                    .await
                    .map_err(|e| map_kube_error(e, "Deployment", name))?;
                Ok(())
            }
            TargetKind::StatefulSet => {
                let api = self.stateful_sets(&namespace);
                let mut stateful_set = api
                    .get(name)
                    .await
                    .map_err(|e| map_kube_error(e, "StatefulSet", name))?;

                let spec = stateful_set.spec.get_or_insert_with(Default::default);
                if spec.replicas == Some(replicas) {
                    debug!(target = %name, replicas, "target already at desired replicas");
                    return Ok(());
                }
                spec.replicas = Some(replicas);

                api.replace(name, &PostParams::default(), &stateful_set)
                    .await
                    .map_err(|e| map_kube_error(e, "StatefulSet", name))?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: HTTP status codes map onto the adapter's failure kinds
    ///
    /// 404 means the target is gone, 409 means we lost an optimistic
    /// concurrency race; anything else passes through as a kube error.
    #[test]
    fn story_api_errors_map_to_failure_kinds() {
        let not_found = kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "deployments \"llm\" not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        });
        assert!(matches!(
            map_kube_error(not_found, "Deployment", "llm"),
            Error::TargetNotFound { .. }
        ));

        let conflict = kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "the object has been modified".to_string(),
            reason: "Conflict".to_string(),
            code: 409,
        });
        assert!(matches!(
            map_kube_error(conflict, "Deployment", "llm"),
            Error::WriteConflict { .. }
        ));

        let server_error = kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "etcd timeout".to_string(),
            reason: "InternalError".to_string(),
            code: 500,
        });
        assert!(matches!(
            map_kube_error(server_error, "Deployment", "llm"),
            Error::Kube(_)
        ));
    }
}
