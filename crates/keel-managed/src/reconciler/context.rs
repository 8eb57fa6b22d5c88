//! Shared state handed to every reconciliation pass

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use k8s_openapi::api::core::v1::ObjectReference;
use keel_common::events::{EventPublisher, KubeEventPublisher};
use keel_common::retry::{BackoffPolicy, RetryConfig};
use keel_common::{Error, ManagedResource};
use kube::runtime::events::EventType;
use kube::{Client, Resource};
use tokio_util::sync::CancellationToken;

use crate::connection::{ConnectionResolver, KubeCredentialStore, LinodeClientFactory};
use crate::publisher::{ConnectionPublisher, KubeSecretPublisher};
use crate::references::{KubeReferenceLookup, ReferenceLookup};
use crate::store::{KubeRecordStore, RecordStore};

/// Controller name reported on Events
pub const CONTROLLER_NAME: &str = "keel-controller";

/// Timing knobs of the convergence loop
#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// Resync interval for converged, available resources
    pub poll_interval: Duration,
    /// Requeue interval while a resource is provisioning or settling
    pub creating_poll_interval: Duration,
    /// Requeue interval after corrective calls were issued
    pub drift_poll_interval: Duration,
    /// Deadline for the non-mutating calls of one pass
    pub pass_timeout: Duration,
    /// Requeue backoff after failed passes
    pub backoff: BackoffPolicy,
    /// Fixed requeue interval for failures that need a user to fix something
    pub configuration_retry_interval: Duration,
    /// Retries for record writes that must not be lost, like a new external name
    pub persist_retry: RetryConfig,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            creating_poll_interval: Duration::from_secs(15),
            drift_poll_interval: Duration::from_secs(5),
            pass_timeout: Duration::from_secs(120),
            backoff: BackoffPolicy {
                initial_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(300),
                multiplier: 2.0,
            },
            configuration_retry_interval: Duration::from_secs(300),
            persist_retry: RetryConfig::with_max_attempts(10),
        }
    }
}

/// Controller context for one managed kind
pub struct Context<K: ManagedResource> {
    /// Record writes (finalizers, external name, status)
    pub records: Arc<dyn RecordStore<K>>,
    /// Resolves API clients from ProviderConfigs
    pub connections: ConnectionResolver,
    /// Connection detail sink
    pub publisher: Arc<dyn ConnectionPublisher>,
    /// Lookups of referenced records
    pub references: Arc<dyn ReferenceLookup>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Timing knobs
    pub config: ReconcilerConfig,
    /// Operator-wide shutdown; every pass runs under a child of it
    pub shutdown: CancellationToken,
    /// Consecutive failed passes per record key
    pub(crate) failures: DashMap<String, u32>,
}

impl<K: ManagedResource> Context<K> {
    /// Create a builder for a context backed by the Kubernetes API
    pub fn builder(client: Client) -> ContextBuilder<K> {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with in-memory collaborators
    #[cfg(test)]
    pub fn for_testing(
        records: Arc<dyn RecordStore<K>>,
        connections: ConnectionResolver,
        publisher: Arc<dyn ConnectionPublisher>,
        references: Arc<dyn ReferenceLookup>,
    ) -> Self {
        Self {
            records,
            connections,
            publisher,
            references,
            events: Arc::new(keel_common::events::NoopEventPublisher),
            config: ReconcilerConfig::default(),
            shutdown: CancellationToken::new(),
            failures: DashMap::new(),
        }
    }

    /// Record one more failed pass for `key`, returning the new count
    pub(crate) fn record_failure(&self, key: &str) -> u32 {
        let mut count = self.failures.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Forget the failure history of `key`
    pub(crate) fn clear_failures(&self, key: &str) {
        self.failures.remove(key);
    }

    /// Publish a Normal event about `record`
    pub(crate) async fn normal(&self, record: &K, reason: &str, action: &str, note: String) {
        self.events
            .publish(&object_ref(record), EventType::Normal, reason, action, Some(note))
            .await;
    }

    /// Publish a Warning event for `error` and hand the error back.
    ///
    /// Aborted passes are not reported; nothing went wrong with the resource.
    pub(crate) async fn warn(&self, record: &K, reason: &str, action: &str, error: Error) -> Error {
        if !error.is_aborted() {
            self.events
                .publish(
                    &object_ref(record),
                    EventType::Warning,
                    reason,
                    action,
                    Some(error.to_string()),
                )
                .await;
        }
        error
    }
}

fn object_ref<K: ManagedResource>(record: &K) -> ObjectReference {
    record.object_ref(&())
}

/// Builder for [`Context`]
pub struct ContextBuilder<K: ManagedResource> {
    client: Client,
    records: Option<Arc<dyn RecordStore<K>>>,
    publisher: Option<Arc<dyn ConnectionPublisher>>,
    config: ReconcilerConfig,
    shutdown: CancellationToken,
}

impl<K: ManagedResource> ContextBuilder<K> {
    fn new(client: Client) -> Self {
        Self {
            client,
            records: None,
            publisher: None,
            config: ReconcilerConfig::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Override the timing knobs
    pub fn config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run passes under this shutdown token
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Override the record store
    pub fn records(mut self, records: Arc<dyn RecordStore<K>>) -> Self {
        self.records = Some(records);
        self
    }

    /// Override the connection publisher
    pub fn publisher(mut self, publisher: Arc<dyn ConnectionPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context<K> {
        let client = self.client;
        Context {
            records: self
                .records
                .unwrap_or_else(|| Arc::new(KubeRecordStore::new(client.clone()))),
            connections: ConnectionResolver::new(
                Arc::new(KubeCredentialStore::new(client.clone())),
                Arc::new(LinodeClientFactory::default()),
            ),
            publisher: self
                .publisher
                .unwrap_or_else(|| Arc::new(KubeSecretPublisher::new(client.clone()))),
            references: Arc::new(KubeReferenceLookup::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME)),
            config: self.config,
            shutdown: self.shutdown,
            failures: DashMap::new(),
        }
    }
}
