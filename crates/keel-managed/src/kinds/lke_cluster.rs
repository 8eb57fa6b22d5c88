//! LKE cluster adapter

use std::sync::Arc;

use async_trait::async_trait;
use keel_common::crd::{LkeCluster, LkeClusterDrift, LkeClusterObservation, LkeClusterParameters};
use keel_common::Error;
use keel_provider::types::{self, CreateLkeClusterRequest, LkePoolRequest, UpdateLkeClusterRequest};
use keel_provider::LinodeApi;
use kube::ResourceExt;
use tracing::info;

use crate::external::{ConnectionDetails, Creation, ExternalClient, UpdateOutcome};
use crate::kind::ManagedKind;

/// Connection detail key holding the cluster id
pub const CLUSTER_ID_KEY: &str = "clusterId";
/// Connection detail key holding the region
pub const REGION_KEY: &str = "region";

impl ManagedKind for LkeCluster {
    type External = LkeClusterExternal;

    fn connect(api: Arc<dyn LinodeApi>) -> LkeClusterExternal {
        LkeClusterExternal { api }
    }
}

/// LKE cluster calls over the Linode API
pub struct LkeClusterExternal {
    api: Arc<dyn LinodeApi>,
}

fn parse_id(external_name: &str) -> Result<u64, Error> {
    external_name
        .parse()
        .map_err(|_| Error::identity_mismatch("LKECluster", external_name, "id is not a number"))
}

fn observation(cluster: types::LkeCluster) -> LkeClusterObservation {
    LkeClusterObservation {
        id: cluster.id,
        status: cluster.status,
        label: cluster.label,
        region: cluster.region,
        k8s_version: cluster.k8s_version,
        tags: cluster.tags,
        created: cluster.created,
        updated: cluster.updated,
    }
}

#[async_trait]
impl ExternalClient<LkeCluster> for LkeClusterExternal {
    async fn read(&self, external_name: &str) -> Result<LkeClusterObservation, Error> {
        let id = parse_id(external_name)?;
        let cluster = self
            .api
            .get_lke_cluster(id)
            .await
            .map_err(|e| Error::provider("get lke cluster", external_name, e))?;
        Ok(observation(cluster))
    }

    async fn create(
        &self,
        record: &LkeCluster,
        parameters: &LkeClusterParameters,
    ) -> Result<Creation<LkeClusterObservation>, Error> {
        let request = CreateLkeClusterRequest {
            label: parameters.label.clone(),
            region: parameters.region.clone(),
            k8s_version: parameters.k8s_version.clone(),
            tags: parameters.tags.clone(),
            node_pools: parameters
                .node_pools
                .iter()
                .map(|p| LkePoolRequest {
                    pool_type: p.pool_type.clone(),
                    count: p.count,
                })
                .collect(),
        };
        let cluster = self
            .api
            .create_lke_cluster(&request)
            .await
            .map_err(|e| Error::provider("create lke cluster", record.name_any(), e))?;

        info!(record = %record.name_any(), id = cluster.id, "created lke cluster");

        let connection_details = ConnectionDetails::from([
            (CLUSTER_ID_KEY.to_string(), cluster.id.to_string().into_bytes()),
            (REGION_KEY.to_string(), cluster.region.clone().into_bytes()),
        ]);
        Ok(Creation {
            external_name: cluster.id.to_string(),
            observation: observation(cluster),
            connection_details,
        })
    }

    async fn update(
        &self,
        external_name: &str,
        _desired: &LkeClusterParameters,
        _observed: &LkeClusterObservation,
        drift: &[LkeClusterDrift],
    ) -> Result<UpdateOutcome, Error> {
        let id = parse_id(external_name)?;
        let mut request = UpdateLkeClusterRequest::default();
        let mut outcome = UpdateOutcome::default();
        for d in drift {
            match d {
                LkeClusterDrift::Label(label) => request.label = Some(label.clone()),
                LkeClusterDrift::Tags(tags) => request.tags = Some(tags.clone()),
                LkeClusterDrift::K8sVersion(v) => request.k8s_version = Some(v.clone()),
            }
            outcome.applied(d.to_string());
        }
        if outcome.applied.is_empty() {
            return Ok(outcome);
        }

        self.api
            .update_lke_cluster(id, &request)
            .await
            .map_err(|e| Error::provider("update lke cluster", external_name, e))?;
        Ok(outcome)
    }

    async fn delete(&self, external_name: &str) -> Result<(), Error> {
        let id = parse_id(external_name)?;
        self.api
            .delete_lke_cluster(id)
            .await
            .map_err(|e| Error::provider("delete lke cluster", external_name, e))
    }
}
