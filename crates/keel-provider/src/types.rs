//! Linode API v4 request and response bodies, limited to the fields Keel uses

use serde::{Deserialize, Serialize};

/// A compute instance
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Instance {
    /// Instance id
    pub id: u64,
    /// Display label
    pub label: String,
    /// Region id
    pub region: String,
    /// Plan type (null while some migrations run)
    #[serde(rename = "type", default)]
    pub instance_type: Option<String>,
    /// Deployed image
    #[serde(default)]
    pub image: Option<String>,
    /// Lifecycle label
    pub status: String,
    /// IPv4 addresses
    #[serde(default)]
    pub ipv4: Vec<String>,
    /// SLAAC IPv6 address
    #[serde(default)]
    pub ipv6: Option<String>,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation timestamp
    #[serde(default)]
    pub created: Option<String>,
    /// Last update timestamp
    #[serde(default)]
    pub updated: Option<String>,
}

/// Body of `POST /linode/instances`
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct CreateInstanceRequest {
    /// Region id
    pub region: String,
    /// Plan type
    #[serde(rename = "type")]
    pub instance_type: String,
    /// Display label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Image to deploy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Root password for the deployed image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_pass: Option<String>,
    /// Users whose SSH keys are installed for root
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authorized_users: Vec<String>,
    /// Tags
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Whether to boot after creation
    pub booted: bool,
}

/// Body of `PUT /linode/instances/{id}`
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct UpdateInstanceRequest {
    /// New label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Replacement tag list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl UpdateInstanceRequest {
    /// Whether the request would change nothing
    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.tags.is_none()
    }
}

/// Body of `POST /linode/instances/{id}/resize`
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ResizeInstanceRequest {
    /// Target plan type
    #[serde(rename = "type")]
    pub instance_type: String,
    /// Grow the primary disk into the new plan's storage
    pub allow_auto_disk_resize: bool,
}

/// An LKE cluster
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LkeCluster {
    /// Cluster id
    pub id: u64,
    /// Display label
    pub label: String,
    /// Region id
    pub region: String,
    /// Kubernetes minor version
    pub k8s_version: String,
    /// Lifecycle label
    pub status: String,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation timestamp
    #[serde(default)]
    pub created: Option<String>,
    /// Last update timestamp
    #[serde(default)]
    pub updated: Option<String>,
}

/// Pool definition embedded in a cluster create request, or a pool create request
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct LkePoolRequest {
    /// Plan type of every node
    #[serde(rename = "type")]
    pub pool_type: String,
    /// Number of nodes
    pub count: u32,
}

/// Body of `POST /lke/clusters`
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct CreateLkeClusterRequest {
    /// Display label
    pub label: String,
    /// Region id
    pub region: String,
    /// Kubernetes minor version
    pub k8s_version: String,
    /// Tags
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Initial pools
    pub node_pools: Vec<LkePoolRequest>,
}

/// Body of `PUT /lke/clusters/{id}`
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct UpdateLkeClusterRequest {
    /// New label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Replacement tag list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Target Kubernetes version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k8s_version: Option<String>,
}

/// A node pool of an LKE cluster
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LkeNodePool {
    /// Pool id
    pub id: u64,
    /// Plan type
    #[serde(rename = "type")]
    pub pool_type: String,
    /// Node count
    pub count: u32,
    /// Members
    #[serde(default)]
    pub nodes: Vec<LkeNode>,
}

/// One node of a pool
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LkeNode {
    /// Node id
    pub id: String,
    /// Backing instance id
    #[serde(default)]
    pub instance_id: Option<u64>,
    /// Lifecycle label
    pub status: String,
}

/// Body of `PUT /lke/clusters/{cluster_id}/pools/{pool_id}`
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct UpdateLkePoolRequest {
    /// New node count
    pub count: u32,
}

/// Error body returned by the API
#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    pub reason: String,
    #[serde(default)]
    pub field: Option<String>,
}
