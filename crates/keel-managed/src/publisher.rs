//! Connection detail publishing into Kubernetes Secrets

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::ByteString;
use keel_common::{Error, ManagedResource, FIELD_MANAGER};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use tracing::info;

use crate::external::ConnectionDetails;

#[cfg(test)]
use mockall::automock;

/// Where a record's connection details are written
#[derive(Clone, Debug, PartialEq)]
pub struct SecretTarget {
    /// Namespace of the Secret
    pub namespace: String,
    /// Name of the Secret
    pub name: String,
    /// Owner set on the Secret so it is collected with the record
    pub owner: Option<OwnerReference>,
}

impl SecretTarget {
    /// Target named by `record`'s `writeConnectionSecretToRef`, if it has one.
    ///
    /// The record only owns the Secret when both live in the same namespace;
    /// owner references cannot cross namespaces.
    pub fn for_record<K: ManagedResource>(record: &K) -> Option<Self> {
        let target = record.resource_spec().write_connection_secret_to_ref.as_ref()?;
        let record_namespace = record.namespace().unwrap_or_default();
        let namespace = target
            .namespace
            .clone()
            .unwrap_or_else(|| record_namespace.clone());
        let owner = if namespace == record_namespace {
            record.controller_owner_ref(&())
        } else {
            None
        };
        Some(Self {
            namespace,
            name: target.name.clone(),
            owner,
        })
    }
}

/// Writes connection details somewhere consumers can read them
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConnectionPublisher: Send + Sync {
    /// Write `details` to `target`, replacing what the controller wrote before
    async fn publish(&self, target: &SecretTarget, details: &ConnectionDetails)
        -> Result<(), Error>;
}

/// Publisher writing Opaque Secrets through server-side apply
pub struct KubeSecretPublisher {
    client: Client,
}

impl KubeSecretPublisher {
    /// Create a publisher using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConnectionPublisher for KubeSecretPublisher {
    async fn publish(
        &self,
        target: &SecretTarget,
        details: &ConnectionDetails,
    ) -> Result<(), Error> {
        let secret = connection_secret(target, details);
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &target.namespace);
        api.patch(
            &target.name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&secret),
        )
        .await?;

        info!(
            secret = %format!("{}/{}", target.namespace, target.name),
            keys = details.len(),
            "published connection details"
        );
        Ok(())
    }
}

fn connection_secret(target: &SecretTarget, details: &ConnectionDetails) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(target.name.clone()),
            namespace: Some(target.namespace.clone()),
            owner_references: target.owner.clone().map(|o| vec![o]),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(
            details
                .iter()
                .map(|(k, v)| (k.clone(), ByteString(v.clone())))
                .collect(),
        ),
        ..Default::default()
    }
}
