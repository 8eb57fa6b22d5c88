//! Linode adapters for each managed kind

pub mod instance;
pub mod lke_cluster;
pub mod node_pool;

pub use instance::InstanceExternal;
pub use lke_cluster::LkeClusterExternal;
pub use node_pool::LkeNodePoolExternal;
