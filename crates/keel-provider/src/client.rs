//! HTTP implementation of [`LinodeApi`]

use std::time::Duration;

use async_trait::async_trait;
use keel_common::{Error, ProviderError, ProviderErrorKind};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::api::LinodeApi;
use crate::types::{
    CreateInstanceRequest, CreateLkeClusterRequest, ErrorResponse, Instance, LkeCluster,
    LkeNodePool, LkePoolRequest, ResizeInstanceRequest, UpdateInstanceRequest,
    UpdateLkeClusterRequest, UpdateLkePoolRequest,
};

/// Public Linode API base URL
pub const DEFAULT_API_URL: &str = "https://api.linode.com/v4";

/// Settings for building a [`LinodeClient`]
#[derive(Clone, Debug)]
pub struct LinodeClientConfig {
    /// Personal access token
    pub token: String,
    /// Base URL; [`DEFAULT_API_URL`] when unset
    pub api_url: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl LinodeClientConfig {
    /// Config for the public API with the default timeout
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Linode API v4 client
pub struct LinodeClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl LinodeClient {
    /// Build a client, rejecting malformed tokens and URLs up front
    pub fn new(config: LinodeClientConfig) -> Result<Self, Error> {
        let token = config.token.trim();
        if token.is_empty() {
            return Err(Error::client_construction("API token is empty"));
        }
        if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::client_construction(
                "API token contains whitespace or control characters",
            ));
        }

        let raw_url = config.api_url.as_deref().unwrap_or(DEFAULT_API_URL);
        let mut base_url = Url::parse(raw_url)
            .map_err(|e| Error::client_construction(format!("invalid API URL {raw_url:?}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::client_construction(format!(
                "API URL {raw_url:?} must use http or https"
            )));
        }
        // Url::join replaces the last segment unless the path ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("keel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::client_construction(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            token: token.to_string(),
        })
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ProviderError::new(ProviderErrorKind::Transport, e.to_string()))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ProviderError> {
        let url = self.endpoint(path)?;
        debug!(%method, %url, "linode request");
        Ok(self.http.request(method, url).bearer_auth(&self.token))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ProviderError> {
        let response = check(builder.send().await.map_err(transport)?).await?;
        response.json::<T>().await.map_err(|e| {
            ProviderError::new(ProviderErrorKind::Decode, format!("response body: {e}"))
        })
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), ProviderError> {
        check(builder.send().await.map_err(transport)?).await?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        self.send(self.request(Method::GET, path)?).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        self.send(self.request(Method::POST, path)?.json(body)).await
    }

    async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        self.send(self.request(Method::PUT, path)?.json(body)).await
    }

    async fn action<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ProviderError> {
        self.send_empty(self.request(Method::POST, path)?.json(body))
            .await
    }

    async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        self.send_empty(self.request(Method::DELETE, path)?).await
    }
}

fn transport(e: reqwest::Error) -> ProviderError {
    let kind = if e.is_decode() {
        ProviderErrorKind::Decode
    } else {
        ProviderErrorKind::Transport
    };
    ProviderError::new(kind, e.to_string())
}

async fn check(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let fallback = status.canonical_reason().unwrap_or("request failed");
    Err(ProviderError::from_status(
        status.as_u16(),
        error_message(&body, fallback),
    ))
}

/// Flatten the API's `{"errors": [{"reason", "field"}]}` body into one line
fn error_message(body: &str, fallback: &str) -> String {
    let parsed: ErrorResponse = serde_json::from_str(body).unwrap_or_default();
    if parsed.errors.is_empty() {
        return if body.trim().is_empty() {
            fallback.to_string()
        } else {
            body.trim().to_string()
        };
    }
    parsed
        .errors
        .iter()
        .map(|e| match &e.field {
            Some(field) => format!("{field}: {}", e.reason),
            None => e.reason.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[async_trait]
impl LinodeApi for LinodeClient {
    async fn get_instance(&self, id: u64) -> Result<Instance, ProviderError> {
        self.get(&format!("linode/instances/{id}")).await
    }

    async fn create_instance(
        &self,
        request: &CreateInstanceRequest,
    ) -> Result<Instance, ProviderError> {
        self.post("linode/instances", request).await
    }

    async fn update_instance(
        &self,
        id: u64,
        request: &UpdateInstanceRequest,
    ) -> Result<Instance, ProviderError> {
        self.put(&format!("linode/instances/{id}"), request).await
    }

    async fn boot_instance(&self, id: u64) -> Result<(), ProviderError> {
        self.action(&format!("linode/instances/{id}/boot"), &serde_json::json!({}))
            .await
    }

    async fn shutdown_instance(&self, id: u64) -> Result<(), ProviderError> {
        self.action(
            &format!("linode/instances/{id}/shutdown"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn resize_instance(
        &self,
        id: u64,
        request: &ResizeInstanceRequest,
    ) -> Result<(), ProviderError> {
        self.action(&format!("linode/instances/{id}/resize"), request)
            .await
    }

    async fn delete_instance(&self, id: u64) -> Result<(), ProviderError> {
        self.delete(&format!("linode/instances/{id}")).await
    }

    async fn get_lke_cluster(&self, id: u64) -> Result<LkeCluster, ProviderError> {
        self.get(&format!("lke/clusters/{id}")).await
    }

    async fn create_lke_cluster(
        &self,
        request: &CreateLkeClusterRequest,
    ) -> Result<LkeCluster, ProviderError> {
        self.post("lke/clusters", request).await
    }

    async fn update_lke_cluster(
        &self,
        id: u64,
        request: &UpdateLkeClusterRequest,
    ) -> Result<LkeCluster, ProviderError> {
        self.put(&format!("lke/clusters/{id}"), request).await
    }

    async fn delete_lke_cluster(&self, id: u64) -> Result<(), ProviderError> {
        self.delete(&format!("lke/clusters/{id}")).await
    }

    async fn get_lke_pool(
        &self,
        cluster_id: u64,
        pool_id: u64,
    ) -> Result<LkeNodePool, ProviderError> {
        self.get(&format!("lke/clusters/{cluster_id}/pools/{pool_id}"))
            .await
    }

    async fn create_lke_pool(
        &self,
        cluster_id: u64,
        request: &LkePoolRequest,
    ) -> Result<LkeNodePool, ProviderError> {
        self.post(&format!("lke/clusters/{cluster_id}/pools"), request)
            .await
    }

    async fn update_lke_pool(
        &self,
        cluster_id: u64,
        pool_id: u64,
        request: &UpdateLkePoolRequest,
    ) -> Result<LkeNodePool, ProviderError> {
        self.put(
            &format!("lke/clusters/{cluster_id}/pools/{pool_id}"),
            request,
        )
        .await
    }

    async fn delete_lke_pool(&self, cluster_id: u64, pool_id: u64) -> Result<(), ProviderError> {
        self.delete(&format!("lke/clusters/{cluster_id}/pools/{pool_id}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_or_blank_token_is_rejected() {
        for token in ["", "   "] {
            let err = LinodeClient::new(LinodeClientConfig::new(token)).err().unwrap();
            assert!(matches!(err, Error::ClientConstruction { .. }));
        }
    }

    #[test]
    fn token_with_embedded_newline_is_rejected() {
        let err = LinodeClient::new(LinodeClientConfig::new("abc\ndef"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("whitespace"));
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert!(LinodeClient::new(LinodeClientConfig::new("  secret-token\n")).is_ok());
    }

    #[test]
    fn invalid_api_url_is_rejected() {
        let mut config = LinodeClientConfig::new("t");
        config.api_url = Some("not a url".to_string());
        assert!(matches!(
            LinodeClient::new(config),
            Err(Error::ClientConstruction { .. })
        ));

        let mut config = LinodeClientConfig::new("t");
        config.api_url = Some("ftp://api.linode.com/v4".to_string());
        assert!(LinodeClient::new(config).is_err());
    }

    #[test]
    fn endpoints_keep_the_version_prefix() {
        let client = LinodeClient::new(LinodeClientConfig::new("t")).unwrap();
        assert_eq!(
            client.endpoint("linode/instances/42").unwrap().as_str(),
            "https://api.linode.com/v4/linode/instances/42"
        );

        let mut config = LinodeClientConfig::new("t");
        config.api_url = Some("http://localhost:8080/v4beta/".to_string());
        let client = LinodeClient::new(config).unwrap();
        assert_eq!(
            client.endpoint("/lke/clusters").unwrap().as_str(),
            "http://localhost:8080/v4beta/lke/clusters"
        );
    }

    #[test]
    fn error_body_is_flattened() {
        let body = r#"{"errors":[{"reason":"Invalid region","field":"region"},{"reason":"Too many"}]}"#;
        assert_eq!(
            error_message(body, "Bad Request"),
            "region: Invalid region; Too many"
        );
        assert_eq!(error_message("", "Not Found"), "Not Found");
        assert_eq!(error_message("gateway timeout\n", "x"), "gateway timeout");
    }
}
