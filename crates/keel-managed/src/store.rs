//! Writes the controller makes to managed resource records

use std::marker::PhantomData;

use async_trait::async_trait;
use keel_common::crd::ManagedStatus;
use keel_common::{Error, ManagedResource, EXTERNAL_NAME_ANNOTATION, FIELD_MANAGER};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tracing::debug;

/// Record mutations performed during reconciliation.
///
/// Abstracted so the convergence loop can be exercised without an apiserver.
#[async_trait]
pub trait RecordStore<K: ManagedResource>: Send + Sync {
    /// Add `finalizer` to the record if it is not present
    async fn add_finalizer(&self, record: &K, finalizer: &str) -> Result<(), Error>;

    /// Remove `finalizer`; a record that no longer exists is not an error
    async fn remove_finalizer(&self, record: &K, finalizer: &str) -> Result<(), Error>;

    /// Bind the record to a provider identifier
    async fn set_external_name(&self, record: &K, external_name: &str) -> Result<(), Error>;

    /// Replace the record's status
    async fn patch_status(
        &self,
        record: &K,
        status: &ManagedStatus<K::Observation>,
    ) -> Result<(), Error>;
}

/// Record store backed by the Kubernetes API
pub struct KubeRecordStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeRecordStore<K> {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K: ManagedResource> KubeRecordStore<K> {
    fn api(&self, record: &K) -> Api<K> {
        Api::namespaced(self.client.clone(), &record.namespace().unwrap_or_default())
    }

    async fn patch_metadata(&self, record: &K, patch: serde_json::Value) -> Result<(), Error> {
        self.api(record)
            .patch(
                &record.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }
}

/// Merge patch replacing the finalizer list of an object last read at
/// `resource_version`.
///
/// The apiserver answers 409 when the object changed since that read, so a
/// concurrent finalizer edit is retried from a fresh read instead of lost.
fn finalizers_patch<S: AsRef<str>>(finalizers: &[S], resource_version: Option<&str>) -> serde_json::Value {
    let finalizers: Vec<&str> = finalizers.iter().map(AsRef::as_ref).collect();
    match resource_version {
        Some(rv) => serde_json::json!({
            "metadata": { "finalizers": finalizers, "resourceVersion": rv }
        }),
        None => serde_json::json!({ "metadata": { "finalizers": finalizers } }),
    }
}

#[async_trait]
impl<K: ManagedResource> RecordStore<K> for KubeRecordStore<K> {
    async fn add_finalizer(&self, record: &K, finalizer: &str) -> Result<(), Error> {
        // Read the live object so finalizers added by others are kept
        let current = self.api(record).get(&record.name_any()).await?;
        let mut finalizers = current.finalizers().to_vec();
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());

        self.patch_metadata(
            record,
            finalizers_patch(&finalizers, current.resource_version().as_deref()),
        )
        .await
    }

    async fn remove_finalizer(&self, record: &K, finalizer: &str) -> Result<(), Error> {
        let current = match self.api(record).get(&record.name_any()).await {
            Ok(current) => current,
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(record = %record.record_key(), "record already gone");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if !current.finalizers().iter().any(|f| f == finalizer) {
            return Ok(());
        }
        let finalizers: Vec<&String> = current
            .finalizers()
            .iter()
            .filter(|f| *f != finalizer)
            .collect();

        match self
            .patch_metadata(
                record,
                finalizers_patch(&finalizers, current.resource_version().as_deref()),
            )
            .await
        {
            Err(Error::Kube {
                source: kube::Error::Api(ae),
            }) if ae.code == 404 => Ok(()),
            other => other,
        }
    }

    async fn set_external_name(&self, record: &K, external_name: &str) -> Result<(), Error> {
        self.patch_metadata(
            record,
            serde_json::json!({
                "metadata": { "annotations": { EXTERNAL_NAME_ANNOTATION: external_name } }
            }),
        )
        .await
    }

    async fn patch_status(
        &self,
        record: &K,
        status: &ManagedStatus<K::Observation>,
    ) -> Result<(), Error> {
        let patch = serde_json::json!({ "status": status });
        self.api(record)
            .patch_status(
                &record.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }
}
