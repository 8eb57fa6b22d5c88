//! Resource classes and claim materialization.
//!
//! A class is a reusable template of provider parameters and policies. A
//! claim asks for one resource of that class. [`materialize`] turns the pair
//! into a ready-to-apply managed record once, before the record is ever
//! reconciled; the convergence loop never looks at classes or claims.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crd::{ProviderConfigReference, ReclaimPolicy, ResourceSpec, SecretReference};
use crate::managed::ManagedResource;
use crate::{CLAIM_NAMESPACE_LABEL, CLAIM_NAME_LABEL};

/// A named template for one managed kind
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceClass<P> {
    /// Class name
    pub name: String,

    /// Template copied into every materialized record
    pub spec_template: ClassSpecTemplate<P>,
}

/// Spec fields a class fixes for its records
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassSpecTemplate<P> {
    /// ProviderConfig used by materialized records
    pub provider_config_ref: ProviderConfigReference,

    /// Reclaim policy of materialized records
    #[serde(default)]
    pub reclaim_policy: ReclaimPolicy,

    /// Namespace receiving connection secrets (defaults to the claim's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secrets_to_namespace: Option<String>,

    /// Provider parameters
    pub for_provider: P,
}

/// A request for one resource of a class
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    /// Claim name, reused as the record name
    pub name: String,

    /// Claim namespace, reused as the record namespace
    pub namespace: String,

    /// Claim UID; names the connection secret when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Labels propagated to the record
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Build the managed record a claim of `class` stands for.
///
/// The connection secret is named after the claim UID (or the claim name when
/// the UID is unknown) so that two claims never share a secret.
pub fn materialize<K: ManagedResource>(class: &ResourceClass<K::Parameters>, claim: &Claim) -> K {
    let template = &class.spec_template;
    let secret_namespace = template
        .write_connection_secrets_to_namespace
        .clone()
        .unwrap_or_else(|| claim.namespace.clone());

    let resource = ResourceSpec {
        provider_config_ref: template.provider_config_ref.clone(),
        reclaim_policy: template.reclaim_policy,
        write_connection_secret_to_ref: Some(SecretReference {
            name: claim.uid.clone().unwrap_or_else(|| claim.name.clone()),
            namespace: Some(secret_namespace),
        }),
    };

    let mut record = K::from_parts(&claim.name, resource, template.for_provider.clone());
    let meta = record.meta_mut();
    meta.namespace = Some(claim.namespace.clone());

    let mut labels = claim.labels.clone();
    labels.insert(CLAIM_NAME_LABEL.to_string(), claim.name.clone());
    labels.insert(CLAIM_NAMESPACE_LABEL.to_string(), claim.namespace.clone());
    meta.labels = Some(labels);

    record
}
