//! LKE node pool adapter
//!
//! A pool is addressed by its cluster and pool ids together, so its external
//! name is `<clusterId>/<poolId>`.

use std::sync::Arc;

use async_trait::async_trait;
use keel_common::crd::{
    parse_pool_external_name, pool_external_name, LkeNodePool, LkeNodePoolDrift,
    LkeNodePoolObservation, LkeNodePoolParameters, NodeObservation,
};
use keel_common::{Error, ManagedResource};
use keel_provider::types::{self, LkePoolRequest, UpdateLkePoolRequest};
use keel_provider::LinodeApi;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::external::{ConnectionDetails, Creation, ExternalClient, UpdateOutcome};
use crate::kind::ManagedKind;
use crate::references::ReferenceLookup;

#[async_trait]
impl ManagedKind for LkeNodePool {
    type External = LkeNodePoolExternal;

    fn connect(api: Arc<dyn LinodeApi>) -> LkeNodePoolExternal {
        LkeNodePoolExternal { api }
    }

    async fn resolve_references(
        &self,
        lookup: &dyn ReferenceLookup,
    ) -> Result<LkeNodePoolParameters, Error> {
        let mut parameters = self.parameters().clone();
        if parameters.cluster_id.is_some() {
            return Ok(parameters);
        }
        let Some(cluster_ref) = &parameters.cluster_ref else {
            return Err(Error::validation_for(
                self.name_any(),
                "one of clusterId or clusterRef is required",
            ));
        };

        let namespace = self.namespace().unwrap_or_default();
        let unresolved =
            |msg: &str| Error::reference_not_resolved("LKECluster", &cluster_ref.name, msg);
        let external_name = lookup
            .lke_cluster_external_name(&namespace, &cluster_ref.name)
            .await?
            .ok_or_else(|| unresolved("cluster has not been created yet"))?;
        let cluster_id = external_name
            .parse()
            .map_err(|_| unresolved("cluster external name is not a numeric id"))?;

        debug!(record = %self.record_key(), cluster_id, "resolved cluster reference");
        parameters.cluster_id = Some(cluster_id);
        Ok(parameters)
    }
}

/// LKE node pool calls over the Linode API
pub struct LkeNodePoolExternal {
    api: Arc<dyn LinodeApi>,
}

fn observation(cluster_id: u64, pool: types::LkeNodePool) -> LkeNodePoolObservation {
    LkeNodePoolObservation {
        id: pool.id,
        cluster_id,
        pool_type: pool.pool_type,
        count: pool.count,
        nodes: pool
            .nodes
            .into_iter()
            .map(|n| NodeObservation {
                id: n.id,
                instance_id: n.instance_id,
                status: n.status,
            })
            .collect(),
    }
}

#[async_trait]
impl ExternalClient<LkeNodePool> for LkeNodePoolExternal {
    async fn read(&self, external_name: &str) -> Result<LkeNodePoolObservation, Error> {
        let (cluster_id, pool_id) = parse_pool_external_name(external_name)?;
        let pool = self
            .api
            .get_lke_pool(cluster_id, pool_id)
            .await
            .map_err(|e| Error::provider("get lke node pool", external_name, e))?;
        Ok(observation(cluster_id, pool))
    }

    async fn create(
        &self,
        record: &LkeNodePool,
        parameters: &LkeNodePoolParameters,
    ) -> Result<Creation<LkeNodePoolObservation>, Error> {
        let cluster_id = parameters.cluster_id.ok_or_else(|| {
            Error::reference_not_resolved(
                "LKECluster",
                parameters
                    .cluster_ref
                    .as_ref()
                    .map(|r| r.name.as_str())
                    .unwrap_or_default(),
                "cluster id was not resolved before create",
            )
        })?;
        let request = LkePoolRequest {
            pool_type: parameters.pool_type.clone(),
            count: parameters.count,
        };
        let pool = self
            .api
            .create_lke_pool(cluster_id, &request)
            .await
            .map_err(|e| Error::provider("create lke node pool", record.name_any(), e))?;

        info!(record = %record.name_any(), cluster_id, pool_id = pool.id, "created lke node pool");

        Ok(Creation {
            external_name: pool_external_name(cluster_id, pool.id),
            observation: observation(cluster_id, pool),
            connection_details: ConnectionDetails::new(),
        })
    }

    async fn update(
        &self,
        external_name: &str,
        _desired: &LkeNodePoolParameters,
        _observed: &LkeNodePoolObservation,
        drift: &[LkeNodePoolDrift],
    ) -> Result<UpdateOutcome, Error> {
        let (cluster_id, pool_id) = parse_pool_external_name(external_name)?;
        let mut outcome = UpdateOutcome::default();
        for d in drift {
            let LkeNodePoolDrift::Count(count) = d;
            self.api
                .update_lke_pool(cluster_id, pool_id, &UpdateLkePoolRequest { count: *count })
                .await
                .map_err(|e| Error::provider("update lke node pool", external_name, e))?;
            outcome.applied(d.to_string());
        }
        Ok(outcome)
    }

    async fn delete(&self, external_name: &str) -> Result<(), Error> {
        let (cluster_id, pool_id) = parse_pool_external_name(external_name)?;
        self.api
            .delete_lke_pool(cluster_id, pool_id)
            .await
            .map_err(|e| Error::provider("delete lke node pool", external_name, e))
    }
}
