//! LKECluster CRD for managed Kubernetes clusters

use std::fmt;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ManagedStatus, ResourceSpec};
use crate::managed::{same_tags, Lifecycle, ManagedResource};
use crate::Error;

/// LKECluster declares a Linode Kubernetes Engine cluster.
///
/// Example:
/// ```yaml
/// apiVersion: keel.dev/v1alpha1
/// kind: LKECluster
/// metadata:
///   name: prod
/// spec:
///   providerConfigRef:
///     name: default
///   forProvider:
///     label: prod
///     region: us-east
///     k8sVersion: "1.31"
///     nodePools:
///       - type: g6-standard-2
///         count: 3
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "keel.dev",
    version = "v1alpha1",
    kind = "LKECluster",
    root = "LkeCluster",
    namespaced,
    status = "LkeClusterStatus",
    shortname = "lke",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".metadata.annotations.keel\\.dev/external-name"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.atProvider.k8sVersion"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LkeClusterSpec {
    /// Credentials, reclaim policy and connection secret target
    #[serde(flatten)]
    pub resource: ResourceSpec,

    /// Desired cluster parameters
    pub for_provider: LkeClusterParameters,
}

/// Desired cluster parameters
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LkeClusterParameters {
    /// Display label
    pub label: String,

    /// Region (create-only)
    pub region: String,

    /// Kubernetes minor version; raising it upgrades the cluster
    pub k8s_version: String,

    /// Tags applied to the cluster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Initial node pools (create-only; manage later pools with LKENodePool)
    pub node_pools: Vec<NodePoolTemplate>,
}

/// Node pool created together with a cluster
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolTemplate {
    /// Plan type of every node
    #[serde(rename = "type")]
    pub pool_type: String,

    /// Number of nodes
    pub count: u32,
}

/// Cluster state reported by the provider
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LkeClusterObservation {
    /// Provider identifier
    pub id: u64,

    /// Provider lifecycle label (ready, not_ready)
    pub status: String,

    /// Current label
    pub label: String,

    /// Region
    pub region: String,

    /// Current Kubernetes version
    pub k8s_version: String,

    /// Current tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Creation timestamp reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    /// Last update timestamp reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

/// A correction a cluster needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LkeClusterDrift {
    /// Label differs
    Label(String),
    /// Tags differ
    Tags(Vec<String>),
    /// Kubernetes version differs
    K8sVersion(String),
}

impl fmt::Display for LkeClusterDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label(label) => write!(f, "label -> {label}"),
            Self::Tags(tags) => write!(f, "tags -> [{}]", tags.join(",")),
            Self::K8sVersion(v) => write!(f, "k8sVersion -> {v}"),
        }
    }
}

/// LKECluster status
pub type LkeClusterStatus = ManagedStatus<LkeClusterObservation>;

impl ManagedResource for LkeCluster {
    type Parameters = LkeClusterParameters;
    type Observation = LkeClusterObservation;
    type Drift = LkeClusterDrift;

    fn resource_spec(&self) -> &ResourceSpec {
        &self.spec.resource
    }

    fn parameters(&self) -> &LkeClusterParameters {
        &self.spec.for_provider
    }

    fn managed_status(&self) -> Option<&LkeClusterStatus> {
        self.status.as_ref()
    }

    fn from_parts(name: &str, resource: ResourceSpec, parameters: LkeClusterParameters) -> Self {
        LkeCluster::new(
            name,
            LkeClusterSpec {
                resource,
                for_provider: parameters,
            },
        )
    }

    fn drift(
        desired: &LkeClusterParameters,
        observed: &LkeClusterObservation,
    ) -> Vec<LkeClusterDrift> {
        let mut drift = Vec::new();
        if desired.label != observed.label {
            drift.push(LkeClusterDrift::Label(desired.label.clone()));
        }
        if !same_tags(&desired.tags, &observed.tags) {
            drift.push(LkeClusterDrift::Tags(desired.tags.clone()));
        }
        if desired.k8s_version != observed.k8s_version {
            drift.push(LkeClusterDrift::K8sVersion(desired.k8s_version.clone()));
        }
        drift
    }

    fn lifecycle(observed: &LkeClusterObservation) -> Lifecycle {
        match observed.status.as_str() {
            "ready" => Lifecycle::Available,
            "not_ready" => Lifecycle::Creating,
            other => Lifecycle::Unavailable(other.to_string()),
        }
    }

    fn validate(&self) -> crate::Result<()> {
        let params = &self.spec.for_provider;
        if params.label.is_empty() || params.region.is_empty() || params.k8s_version.is_empty() {
            return Err(Error::validation_for(
                self.name_any(),
                "label, region and k8sVersion are required",
            ));
        }
        if params.node_pools.is_empty() {
            return Err(Error::validation_for(
                self.name_any(),
                "at least one node pool is required",
            ));
        }
        if let Some(pool) = params.node_pools.iter().find(|p| p.count == 0) {
            return Err(Error::validation_for(
                self.name_any(),
                format!("node pool of type {} must have at least one node", pool.pool_type),
            ));
        }
        Ok(())
    }
}
