//! Connection resolution: record → ProviderConfig → Secret → API client
//!
//! Each hop is a lookup by key, resolved fresh on every pass. Nothing is
//! cached, so rotating the token in the Secret takes effect on the next pass.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use keel_common::crd::ProviderConfig;
use keel_common::{Error, ManagedResource};
use keel_provider::{LinodeApi, LinodeClient, LinodeClientConfig};
use kube::{Api, Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Read-only access to ProviderConfigs and Secrets
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Get a ProviderConfig, `None` if it does not exist
    async fn get_provider_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ProviderConfig>, Error>;

    /// Get a Secret, `None` if it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;
}

/// Credential store backed by the Kubernetes API
pub struct KubeCredentialStore {
    client: Client,
}

impl KubeCredentialStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialStore for KubeCredentialStore {
    async fn get_provider_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ProviderConfig>, Error> {
        let api: Api<ProviderConfig> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

/// Inputs for constructing an API client
#[derive(Clone, Debug, PartialEq)]
pub struct ClientSettings {
    /// API token read from the credentials secret
    pub token: String,
    /// Optional API URL override from the ProviderConfig
    pub api_url: Option<String>,
}

/// Builds API clients from resolved credentials
#[cfg_attr(test, automock)]
pub trait ClientFactory: Send + Sync {
    /// Build a client, failing with `ClientConstruction` on malformed settings
    fn build(&self, settings: ClientSettings) -> Result<Arc<dyn LinodeApi>, Error>;
}

/// Factory producing HTTP [`LinodeClient`]s
pub struct LinodeClientFactory {
    timeout: Duration,
}

impl LinodeClientFactory {
    /// Factory whose clients time out requests after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for LinodeClientFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ClientFactory for LinodeClientFactory {
    fn build(&self, settings: ClientSettings) -> Result<Arc<dyn LinodeApi>, Error> {
        let client = LinodeClient::new(LinodeClientConfig {
            token: settings.token,
            api_url: settings.api_url,
            timeout: self.timeout,
        })?;
        Ok(Arc::new(client))
    }
}

/// Resolves the API client a record should use
pub struct ConnectionResolver {
    store: Arc<dyn CredentialStore>,
    factory: Arc<dyn ClientFactory>,
}

impl ConnectionResolver {
    /// Create a resolver over the given store and factory
    pub fn new(store: Arc<dyn CredentialStore>, factory: Arc<dyn ClientFactory>) -> Self {
        Self { store, factory }
    }

    /// Resolve `record`'s ProviderConfig and token into a client.
    ///
    /// Fails with `ConfigNotFound`, `SecretNotFound` or `ClientConstruction`.
    pub async fn resolve<K: ManagedResource>(&self, record: &K) -> Result<Arc<dyn LinodeApi>, Error> {
        let namespace = record.namespace().unwrap_or_default();
        let config_name = &record.resource_spec().provider_config_ref.name;

        let config = self
            .store
            .get_provider_config(&namespace, config_name)
            .await?
            .ok_or_else(|| Error::config_not_found(&namespace, config_name))?;

        let selector = &config.spec.credentials_secret_ref;
        let secret_namespace = config.secret_namespace();
        let missing = || Error::secret_not_found(&secret_namespace, &selector.name, &selector.key);

        let secret = self
            .store
            .get_secret(&secret_namespace, &selector.name)
            .await?
            .ok_or_else(missing)?;
        let payload = secret
            .data
            .as_ref()
            .and_then(|data| data.get(&selector.key))
            .ok_or_else(missing)?;
        let token = String::from_utf8(payload.0.clone())
            .map_err(|_| Error::client_construction("API token is not valid UTF-8"))?;

        debug!(
            provider_config = %config.name_any(),
            secret = %format!("{secret_namespace}/{}", selector.name),
            "resolved provider credentials"
        );

        self.factory.build(ClientSettings {
            token,
            api_url: config.spec.api_url.clone(),
        })
    }
}
