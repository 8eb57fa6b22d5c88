//! ProviderConfig CRD holding the credentials managed resources connect with

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::SecretKeySelector;

/// ProviderConfig names the Secret key holding a Linode API token.
///
/// Example:
/// ```yaml
/// apiVersion: keel.dev/v1alpha1
/// kind: ProviderConfig
/// metadata:
///   name: default
/// spec:
///   credentialsSecretRef:
///     name: linode-credentials
///     key: token
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "keel.dev",
    version = "v1alpha1",
    kind = "ProviderConfig",
    namespaced,
    printcolumn = r#"{"name":"Secret","type":"string","jsonPath":".spec.credentialsSecretRef.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigSpec {
    /// Secret key containing the API token
    pub credentials_secret_ref: SecretKeySelector,

    /// API base URL override (defaults to the public Linode API)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl ProviderConfig {
    /// Namespace of the credentials Secret, defaulting to this object's namespace
    pub fn secret_namespace(&self) -> String {
        self.spec
            .credentials_secret_ref
            .namespace
            .clone()
            .or_else(|| self.namespace())
            .unwrap_or_default()
    }
}
