//! Custom Resource Definitions for Keel
//!
//! Every managed kind shares [`ResourceSpec`] in its spec and
//! [`ManagedStatus`] in its status; only the provider parameters and the
//! observation differ.

mod instance;
mod lke_cluster;
mod node_pool;
mod provider_config;
mod types;

pub use instance::{
    Instance, InstanceDrift, InstanceObservation, InstanceParameters, InstanceSpec,
    InstanceStatus, PowerState,
};
pub use lke_cluster::{
    LkeCluster, LkeClusterDrift, LkeClusterObservation, LkeClusterParameters, LkeClusterSpec,
    LkeClusterStatus, NodePoolTemplate,
};
pub use node_pool::{
    parse_pool_external_name, pool_external_name, LkeNodePool, LkeNodePoolDrift,
    LkeNodePoolObservation, LkeNodePoolParameters, LkeNodePoolSpec, LkeNodePoolStatus,
    NodeObservation,
};
pub use provider_config::{ProviderConfig, ProviderConfigSpec};
pub use types::{
    condition_reasons, Condition, ConditionSet, ConditionStatus, LocalReference, ManagedStatus,
    ProviderConfigReference, ReclaimPolicy, ReconcilePhase, ResourceSpec, SecretKeySelector,
    SecretReference, CONDITION_CONNECTION_PUBLISHED, CONDITION_READY, CONDITION_SYNCED,
};
