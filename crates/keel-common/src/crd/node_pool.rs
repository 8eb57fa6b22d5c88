//! LKENodePool CRD for node pools attached to an LKE cluster

use std::fmt;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{LocalReference, ManagedStatus, ResourceSpec};
use crate::managed::{Lifecycle, ManagedResource};
use crate::Error;

/// LKENodePool declares a node pool inside an LKE cluster.
///
/// The cluster is named either directly by `clusterId` or through
/// `clusterRef`, which points at an LKECluster record in the same namespace
/// and is resolved to that record's external name before creation.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "keel.dev",
    version = "v1alpha1",
    kind = "LKENodePool",
    root = "LkeNodePool",
    namespaced,
    status = "LkeNodePoolStatus",
    shortname = "lkepool",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".metadata.annotations.keel\\.dev/external-name"}"#,
    printcolumn = r#"{"name":"Count","type":"integer","jsonPath":".status.atProvider.count"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LkeNodePoolSpec {
    /// Credentials, reclaim policy and connection secret target
    #[serde(flatten)]
    pub resource: ResourceSpec,

    /// Desired pool parameters
    pub for_provider: LkeNodePoolParameters,
}

/// Desired pool parameters
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LkeNodePoolParameters {
    /// Provider identifier of the owning cluster (create-only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<u64>,

    /// LKECluster record owning this pool (create-only, ignored when `clusterId` is set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_ref: Option<LocalReference>,

    /// Plan type of every node (create-only)
    #[serde(rename = "type")]
    pub pool_type: String,

    /// Number of nodes
    pub count: u32,
}

/// Pool state reported by the provider
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LkeNodePoolObservation {
    /// Provider pool identifier
    pub id: u64,

    /// Provider identifier of the owning cluster
    pub cluster_id: u64,

    /// Plan type
    #[serde(rename = "type")]
    pub pool_type: String,

    /// Current node count
    pub count: u32,

    /// Current members
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<NodeObservation>,
}

/// One node of a pool
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeObservation {
    /// Node identifier
    pub id: String,

    /// Backing compute instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<u64>,

    /// Provider label (ready, not_ready)
    pub status: String,
}

/// A correction a pool needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LkeNodePoolDrift {
    /// Node count differs
    Count(u32),
}

impl fmt::Display for LkeNodePoolDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "count -> {count}"),
        }
    }
}

/// LKENodePool status
pub type LkeNodePoolStatus = ManagedStatus<LkeNodePoolObservation>;

/// Format the external name of a pool
pub fn pool_external_name(cluster_id: u64, pool_id: u64) -> String {
    format!("{cluster_id}/{pool_id}")
}

/// Split a pool external name into `(cluster_id, pool_id)`
pub fn parse_pool_external_name(external_name: &str) -> crate::Result<(u64, u64)> {
    let mismatch = |msg: &str| Error::identity_mismatch("LKENodePool", external_name, msg);
    let (cluster, pool) = external_name
        .split_once('/')
        .ok_or_else(|| mismatch("expected <clusterId>/<poolId>"))?;
    let cluster_id = cluster
        .parse()
        .map_err(|_| mismatch("cluster id is not a number"))?;
    let pool_id = pool
        .parse()
        .map_err(|_| mismatch("pool id is not a number"))?;
    Ok((cluster_id, pool_id))
}

impl ManagedResource for LkeNodePool {
    type Parameters = LkeNodePoolParameters;
    type Observation = LkeNodePoolObservation;
    type Drift = LkeNodePoolDrift;

    fn resource_spec(&self) -> &ResourceSpec {
        &self.spec.resource
    }

    fn parameters(&self) -> &LkeNodePoolParameters {
        &self.spec.for_provider
    }

    fn managed_status(&self) -> Option<&LkeNodePoolStatus> {
        self.status.as_ref()
    }

    fn from_parts(name: &str, resource: ResourceSpec, parameters: LkeNodePoolParameters) -> Self {
        LkeNodePool::new(
            name,
            LkeNodePoolSpec {
                resource,
                for_provider: parameters,
            },
        )
    }

    fn drift(
        desired: &LkeNodePoolParameters,
        observed: &LkeNodePoolObservation,
    ) -> Vec<LkeNodePoolDrift> {
        if desired.count != observed.count {
            vec![LkeNodePoolDrift::Count(desired.count)]
        } else {
            Vec::new()
        }
    }

    fn lifecycle(observed: &LkeNodePoolObservation) -> Lifecycle {
        let settled = observed.nodes.len() == observed.count as usize
            && observed.nodes.iter().all(|n| n.status == "ready");
        if settled {
            Lifecycle::Available
        } else {
            Lifecycle::Creating
        }
    }

    fn validate(&self) -> crate::Result<()> {
        let params = &self.spec.for_provider;
        match (&params.cluster_id, &params.cluster_ref) {
            (None, None) => Err(Error::validation_for(
                self.name_any(),
                "one of clusterId or clusterRef is required",
            )),
            _ if params.count == 0 => Err(Error::validation_for(
                self.name_any(),
                "count must be at least 1",
            )),
            _ => Ok(()),
        }
    }
}
