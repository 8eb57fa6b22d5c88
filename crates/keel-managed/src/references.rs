//! Lookups of other records by key, resolved on demand before creation

use async_trait::async_trait;
use keel_common::crd::LkeCluster;
use keel_common::{Error, ManagedResource};
use kube::{Api, Client};

#[cfg(test)]
use mockall::automock;

/// Resolves references between records.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    /// External name of the LKECluster record `namespace/name`.
    ///
    /// `Ok(None)` when the record exists but has not been bound yet.
    /// A missing record is an unresolved reference error.
    async fn lke_cluster_external_name(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<String>, Error>;
}

/// Reference lookup backed by the Kubernetes API
pub struct KubeReferenceLookup {
    client: Client,
}

impl KubeReferenceLookup {
    /// Create a lookup using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReferenceLookup for KubeReferenceLookup {
    async fn lke_cluster_external_name(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<String>, Error> {
        let api: Api<LkeCluster> = Api::namespaced(self.client.clone(), namespace);
        match api.get_opt(name).await? {
            Some(cluster) => Ok(cluster.external_name().map(str::to_string)),
            None => Err(Error::reference_not_resolved(
                "LKECluster",
                format!("{namespace}/{name}"),
                "record does not exist",
            )),
        }
    }
}
