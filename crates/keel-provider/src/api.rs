//! Capability trait over the Linode API

use async_trait::async_trait;
use keel_common::ProviderError;

use crate::types::{
    CreateInstanceRequest, CreateLkeClusterRequest, Instance, LkeCluster, LkeNodePool,
    LkePoolRequest, ResizeInstanceRequest, UpdateInstanceRequest, UpdateLkeClusterRequest,
    UpdateLkePoolRequest,
};

/// The Linode API calls Keel's adapters make.
///
/// Every call returns a classified [`ProviderError`] so adapters can tell
/// not-found apart from transient and fatal failures.
#[async_trait]
pub trait LinodeApi: Send + Sync {
    /// `GET /linode/instances/{id}`
    async fn get_instance(&self, id: u64) -> Result<Instance, ProviderError>;

    /// `POST /linode/instances`
    async fn create_instance(&self, request: &CreateInstanceRequest)
        -> Result<Instance, ProviderError>;

    /// `PUT /linode/instances/{id}`
    async fn update_instance(
        &self,
        id: u64,
        request: &UpdateInstanceRequest,
    ) -> Result<Instance, ProviderError>;

    /// `POST /linode/instances/{id}/boot`
    async fn boot_instance(&self, id: u64) -> Result<(), ProviderError>;

    /// `POST /linode/instances/{id}/shutdown`
    async fn shutdown_instance(&self, id: u64) -> Result<(), ProviderError>;

    /// `POST /linode/instances/{id}/resize`
    async fn resize_instance(
        &self,
        id: u64,
        request: &ResizeInstanceRequest,
    ) -> Result<(), ProviderError>;

    /// `DELETE /linode/instances/{id}`
    async fn delete_instance(&self, id: u64) -> Result<(), ProviderError>;

    /// `GET /lke/clusters/{id}`
    async fn get_lke_cluster(&self, id: u64) -> Result<LkeCluster, ProviderError>;

    /// `POST /lke/clusters`
    async fn create_lke_cluster(
        &self,
        request: &CreateLkeClusterRequest,
    ) -> Result<LkeCluster, ProviderError>;

    /// `PUT /lke/clusters/{id}`
    async fn update_lke_cluster(
        &self,
        id: u64,
        request: &UpdateLkeClusterRequest,
    ) -> Result<LkeCluster, ProviderError>;

    /// `DELETE /lke/clusters/{id}`
    async fn delete_lke_cluster(&self, id: u64) -> Result<(), ProviderError>;

    /// `GET /lke/clusters/{cluster_id}/pools/{pool_id}`
    async fn get_lke_pool(&self, cluster_id: u64, pool_id: u64)
        -> Result<LkeNodePool, ProviderError>;

    /// `POST /lke/clusters/{cluster_id}/pools`
    async fn create_lke_pool(
        &self,
        cluster_id: u64,
        request: &LkePoolRequest,
    ) -> Result<LkeNodePool, ProviderError>;

    /// `PUT /lke/clusters/{cluster_id}/pools/{pool_id}`
    async fn update_lke_pool(
        &self,
        cluster_id: u64,
        pool_id: u64,
        request: &UpdateLkePoolRequest,
    ) -> Result<LkeNodePool, ProviderError>;

    /// `DELETE /lke/clusters/{cluster_id}/pools/{pool_id}`
    async fn delete_lke_pool(&self, cluster_id: u64, pool_id: u64) -> Result<(), ProviderError>;
}
