//! In-memory stand-ins for the provider, the apiserver and the secret sink

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::chrono::Utc;
use k8s_openapi::ByteString;
use keel_common::crd::{
    Instance, InstanceParameters, LkeCluster, LkeClusterParameters, LkeNodePool,
    LkeNodePoolParameters, ManagedStatus, NodePoolTemplate, PowerState, ProviderConfig,
    ProviderConfigSpec, ReclaimPolicy, ResourceSpec, SecretKeySelector, SecretReference,
};
use keel_common::{Error, ManagedResource, ProviderError, EXTERNAL_NAME_ANNOTATION, MANAGED_FINALIZER};
use keel_provider::types::{
    self, CreateInstanceRequest, CreateLkeClusterRequest, LkeNode, LkePoolRequest,
    ResizeInstanceRequest, UpdateInstanceRequest, UpdateLkeClusterRequest, UpdateLkePoolRequest,
};
use keel_provider::LinodeApi;
use kube::Resource;

use crate::connection::{ClientFactory, ClientSettings, ConnectionResolver, CredentialStore};
use crate::external::ConnectionDetails;
use crate::publisher::{ConnectionPublisher, SecretTarget};
use crate::reconciler::Context;
use crate::references::ReferenceLookup;
use crate::store::RecordStore;

pub const NAMESPACE: &str = "team-a";
pub const PROVIDER_CONFIG: &str = "default";
pub const TOKEN: &str = "test-token";

// =============================================================================
// Records
// =============================================================================

fn resource_spec(connection_secret: Option<&str>) -> ResourceSpec {
    let mut spec = ResourceSpec::with_provider_config(PROVIDER_CONFIG);
    spec.reclaim_policy = ReclaimPolicy::Delete;
    spec.write_connection_secret_to_ref = connection_secret.map(|name| SecretReference {
        name: name.to_string(),
        namespace: None,
    });
    spec
}

fn placed<K: ManagedResource>(mut record: K, name: &str) -> K {
    let meta = record.meta_mut();
    meta.namespace = Some(NAMESPACE.to_string());
    meta.uid = Some(format!("uid-{name}"));
    meta.generation = Some(1);
    record
}

/// Running debian instance in us-east writing its connection secret to `<name>-conn`
pub fn instance_record(name: &str) -> Instance {
    placed(
        Instance::from_parts(
            name,
            resource_spec(Some(&format!("{name}-conn"))),
            InstanceParameters {
                label: Some(name.to_string()),
                region: "us-east".to_string(),
                instance_type: "g6-nanode-1".to_string(),
                image: Some("linode/debian12".to_string()),
                authorized_users: vec![],
                tags: vec![],
                status: PowerState::Running,
            },
        ),
        name,
    )
}

/// Cluster on 1.31 with one pool of three nodes
pub fn cluster_record(name: &str) -> LkeCluster {
    placed(
        LkeCluster::from_parts(
            name,
            resource_spec(None),
            LkeClusterParameters {
                label: name.to_string(),
                region: "us-east".to_string(),
                k8s_version: "1.31".to_string(),
                tags: vec![],
                node_pools: vec![NodePoolTemplate {
                    pool_type: "g6-standard-2".to_string(),
                    count: 3,
                }],
            },
        ),
        name,
    )
}

/// Pool of three nodes, bound to `cluster_id` when given
pub fn pool_record(name: &str, cluster_id: Option<u64>) -> LkeNodePool {
    placed(
        LkeNodePool::from_parts(
            name,
            resource_spec(None),
            LkeNodePoolParameters {
                cluster_id,
                cluster_ref: None,
                pool_type: "g6-standard-2".to_string(),
                count: 3,
            },
        ),
        name,
    )
}

/// Metadata shortcuts for records under test
pub trait Bind {
    /// Set the external-name annotation
    fn bind(&mut self, external_name: &str);
    /// Add the managed finalizer
    fn finalized(&mut self);
    /// Mark for deletion, keeping the finalizer
    fn mark_deleting(&mut self);
}

impl<K: ManagedResource> Bind for K {
    fn bind(&mut self, external_name: &str) {
        self.meta_mut()
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(EXTERNAL_NAME_ANNOTATION.to_string(), external_name.to_string());
    }

    fn finalized(&mut self) {
        let finalizers = self.meta_mut().finalizers.get_or_insert_with(Vec::new);
        if !finalizers.iter().any(|f| f == MANAGED_FINALIZER) {
            finalizers.push(MANAGED_FINALIZER.to_string());
        }
    }

    fn mark_deleting(&mut self) {
        self.finalized();
        self.meta_mut().deletion_timestamp = Some(Time(Utc::now()));
    }
}

// =============================================================================
// Linode
// =============================================================================

#[derive(Default)]
struct FakeState {
    allocated: u64,
    instances: BTreeMap<u64, types::Instance>,
    /// Stable state an instance is heading to
    targets: BTreeMap<u64, String>,
    clusters: BTreeMap<u64, types::LkeCluster>,
    pools: BTreeMap<(u64, u64), types::LkeNodePool>,
    calls: Vec<String>,
    failures: HashMap<String, VecDeque<ProviderError>>,
    instance_requests: Vec<CreateInstanceRequest>,
    cluster_updates: Vec<UpdateLkeClusterRequest>,
}

impl FakeState {
    fn allocate(&mut self) -> u64 {
        self.allocated += 1;
        12344 + self.allocated
    }

    /// Log the call and return an injected failure, if one is queued
    fn enter(&mut self, op: &str, target: Option<String>) -> Result<(), ProviderError> {
        self.calls.push(match target {
            Some(t) => format!("{op} {t}"),
            None => op.to_string(),
        });
        match self.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn instance_mut(&mut self, id: u64) -> Result<&mut types::Instance, ProviderError> {
        self.instances
            .get_mut(&id)
            .ok_or_else(|| ProviderError::from_status(404, "Not found"))
    }
}

fn nodes(pool_id: u64, count: u32, status: &str) -> Vec<LkeNode> {
    (0..count)
        .map(|i| LkeNode {
            id: format!("{pool_id}-{i}"),
            instance_id: Some(pool_id * 100 + u64::from(i)),
            status: status.to_string(),
        })
        .collect()
}

/// Stateful Linode double.
///
/// Power and provisioning changes enter a transitional state and only reach
/// their target on [`FakeLinode::settle`], like the real API.
#[derive(Default)]
pub struct FakeLinode {
    state: Mutex<FakeState>,
}

impl FakeLinode {
    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Every call made, as `"<op> <target>"`
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Number of calls of `op`
    pub fn count(&self, op: &str) -> usize {
        let prefix = format!("{op} ");
        self.state()
            .calls
            .iter()
            .filter(|c| *c == op || c.starts_with(&prefix))
            .count()
    }

    /// Fail the next call of `op` with `err`
    pub fn fail_next(&self, op: &str, err: ProviderError) {
        self.state()
            .failures
            .entry(op.to_string())
            .or_default()
            .push_back(err);
    }

    /// Complete every pending transition
    pub fn settle(&self) {
        let mut state = self.state();
        let targets = std::mem::take(&mut state.targets);
        for (id, target) in targets {
            if let Some(instance) = state.instances.get_mut(&id) {
                instance.status = target;
            }
        }
        for cluster in state.clusters.values_mut() {
            cluster.status = "ready".to_string();
        }
        for pool in state.pools.values_mut() {
            pool.nodes = nodes(pool.id, pool.count, "ready");
        }
    }

    /// Add a debian nanode matching [`instance_record`]'s defaults
    pub fn seed_instance(&self, label: &str, status: &str, tags: &[&str]) -> u64 {
        let mut state = self.state();
        let id = state.allocate();
        state.instances.insert(
            id,
            types::Instance {
                id,
                label: label.to_string(),
                region: "us-east".to_string(),
                instance_type: Some("g6-nanode-1".to_string()),
                image: Some("linode/debian12".to_string()),
                status: status.to_string(),
                ipv4: vec!["192.0.2.10".to_string()],
                ipv6: Some("2600:3c03::f03c:91ff:fe24:3a2f/128".to_string()),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                created: None,
                updated: None,
            },
        );
        id
    }

    /// Current state of an instance
    pub fn instance(&self, id: u64) -> Option<types::Instance> {
        self.state().instances.get(&id).cloned()
    }

    /// Delete an instance behind the controller's back
    pub fn remove_instance(&self, id: u64) {
        self.state().instances.remove(&id);
    }

    /// Bodies of every instance create call
    pub fn instance_requests(&self) -> Vec<CreateInstanceRequest> {
        self.state().instance_requests.clone()
    }

    /// Add a ready cluster in us-east
    pub fn seed_cluster(&self, label: &str, k8s_version: &str) -> u64 {
        let mut state = self.state();
        let id = state.allocate();
        state.clusters.insert(
            id,
            types::LkeCluster {
                id,
                label: label.to_string(),
                region: "us-east".to_string(),
                k8s_version: k8s_version.to_string(),
                status: "ready".to_string(),
                tags: vec![],
                created: None,
                updated: None,
            },
        );
        id
    }

    /// Bodies of every cluster update call
    pub fn cluster_updates(&self) -> Vec<UpdateLkeClusterRequest> {
        self.state().cluster_updates.clone()
    }

    /// Number of pools in a cluster
    pub fn pools_of(&self, cluster_id: u64) -> usize {
        self.state()
            .pools
            .keys()
            .filter(|(c, _)| *c == cluster_id)
            .count()
    }

    /// Current state of a pool
    pub fn pool(&self, cluster_id: u64, pool_id: u64) -> Option<types::LkeNodePool> {
        self.state().pools.get(&(cluster_id, pool_id)).cloned()
    }
}

#[async_trait]
impl LinodeApi for FakeLinode {
    async fn get_instance(&self, id: u64) -> Result<types::Instance, ProviderError> {
        let mut state = self.state();
        state.enter("get_instance", Some(id.to_string()))?;
        state.instance_mut(id).map(|i| i.clone())
    }

    async fn create_instance(
        &self,
        request: &CreateInstanceRequest,
    ) -> Result<types::Instance, ProviderError> {
        let mut state = self.state();
        state.enter("create_instance", None)?;
        state.instance_requests.push(request.clone());
        let id = state.allocate();
        let instance = types::Instance {
            id,
            label: request.label.clone().unwrap_or_else(|| format!("linode{id}")),
            region: request.region.clone(),
            instance_type: Some(request.instance_type.clone()),
            image: request.image.clone(),
            status: "provisioning".to_string(),
            ipv4: vec![format!("192.0.2.{}", id % 250)],
            ipv6: Some("2600:3c03::f03c:91ff:fe24:3a2f/128".to_string()),
            tags: request.tags.clone(),
            created: None,
            updated: None,
        };
        let target = if request.booted { "running" } else { "offline" };
        state.targets.insert(id, target.to_string());
        state.instances.insert(id, instance.clone());
        Ok(instance)
    }

    async fn update_instance(
        &self,
        id: u64,
        request: &UpdateInstanceRequest,
    ) -> Result<types::Instance, ProviderError> {
        let mut state = self.state();
        state.enter("update_instance", Some(id.to_string()))?;
        let instance = state.instance_mut(id)?;
        if let Some(label) = &request.label {
            instance.label = label.clone();
        }
        if let Some(tags) = &request.tags {
            instance.tags = tags.clone();
        }
        Ok(instance.clone())
    }

    async fn boot_instance(&self, id: u64) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.enter("boot_instance", Some(id.to_string()))?;
        state.instance_mut(id)?.status = "booting".to_string();
        state.targets.insert(id, "running".to_string());
        Ok(())
    }

    async fn shutdown_instance(&self, id: u64) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.enter("shutdown_instance", Some(id.to_string()))?;
        state.instance_mut(id)?.status = "shutting_down".to_string();
        state.targets.insert(id, "offline".to_string());
        Ok(())
    }

    async fn resize_instance(
        &self,
        id: u64,
        request: &ResizeInstanceRequest,
    ) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.enter("resize_instance", Some(id.to_string()))?;
        let instance = state.instance_mut(id)?;
        instance.status = "resizing".to_string();
        instance.instance_type = Some(request.instance_type.clone());
        state.targets.insert(id, "offline".to_string());
        Ok(())
    }

    async fn delete_instance(&self, id: u64) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.enter("delete_instance", Some(id.to_string()))?;
        state.targets.remove(&id);
        state
            .instances
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ProviderError::from_status(404, "Not found"))
    }

    async fn get_lke_cluster(&self, id: u64) -> Result<types::LkeCluster, ProviderError> {
        let mut state = self.state();
        state.enter("get_lke_cluster", Some(id.to_string()))?;
        state
            .clusters
            .get(&id)
            .cloned()
            .ok_or_else(|| ProviderError::from_status(404, "Not found"))
    }

    async fn create_lke_cluster(
        &self,
        request: &CreateLkeClusterRequest,
    ) -> Result<types::LkeCluster, ProviderError> {
        let mut state = self.state();
        state.enter("create_lke_cluster", None)?;
        let id = state.allocate();
        let cluster = types::LkeCluster {
            id,
            label: request.label.clone(),
            region: request.region.clone(),
            k8s_version: request.k8s_version.clone(),
            status: "not_ready".to_string(),
            tags: request.tags.clone(),
            created: None,
            updated: None,
        };
        for pool in &request.node_pools {
            let pool_id = state.allocate();
            state.pools.insert(
                (id, pool_id),
                types::LkeNodePool {
                    id: pool_id,
                    pool_type: pool.pool_type.clone(),
                    count: pool.count,
                    nodes: nodes(pool_id, pool.count, "not_ready"),
                },
            );
        }
        state.clusters.insert(id, cluster.clone());
        Ok(cluster)
    }

    async fn update_lke_cluster(
        &self,
        id: u64,
        request: &UpdateLkeClusterRequest,
    ) -> Result<types::LkeCluster, ProviderError> {
        let mut state = self.state();
        state.enter("update_lke_cluster", Some(id.to_string()))?;
        state.cluster_updates.push(request.clone());
        let cluster = state
            .clusters
            .get_mut(&id)
            .ok_or_else(|| ProviderError::from_status(404, "Not found"))?;
        if let Some(label) = &request.label {
            cluster.label = label.clone();
        }
        if let Some(tags) = &request.tags {
            cluster.tags = tags.clone();
        }
        if let Some(version) = &request.k8s_version {
            cluster.k8s_version = version.clone();
        }
        Ok(cluster.clone())
    }

    async fn delete_lke_cluster(&self, id: u64) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.enter("delete_lke_cluster", Some(id.to_string()))?;
        state.pools.retain(|(c, _), _| *c != id);
        state
            .clusters
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ProviderError::from_status(404, "Not found"))
    }

    async fn get_lke_pool(
        &self,
        cluster_id: u64,
        pool_id: u64,
    ) -> Result<types::LkeNodePool, ProviderError> {
        let mut state = self.state();
        state.enter("get_lke_pool", Some(format!("{cluster_id}/{pool_id}")))?;
        state
            .pools
            .get(&(cluster_id, pool_id))
            .cloned()
            .ok_or_else(|| ProviderError::from_status(404, "Not found"))
    }

    async fn create_lke_pool(
        &self,
        cluster_id: u64,
        request: &LkePoolRequest,
    ) -> Result<types::LkeNodePool, ProviderError> {
        let mut state = self.state();
        state.enter("create_lke_pool", Some(cluster_id.to_string()))?;
        if !state.clusters.contains_key(&cluster_id) {
            return Err(ProviderError::from_status(404, "Not found"));
        }
        let pool_id = state.allocate();
        let pool = types::LkeNodePool {
            id: pool_id,
            pool_type: request.pool_type.clone(),
            count: request.count,
            nodes: nodes(pool_id, request.count, "not_ready"),
        };
        state.pools.insert((cluster_id, pool_id), pool.clone());
        Ok(pool)
    }

    async fn update_lke_pool(
        &self,
        cluster_id: u64,
        pool_id: u64,
        request: &UpdateLkePoolRequest,
    ) -> Result<types::LkeNodePool, ProviderError> {
        let mut state = self.state();
        state.enter("update_lke_pool", Some(format!("{cluster_id}/{pool_id}")))?;
        let pool = state
            .pools
            .get_mut(&(cluster_id, pool_id))
            .ok_or_else(|| ProviderError::from_status(404, "Not found"))?;
        pool.count = request.count;
        pool.nodes = nodes(pool_id, request.count, "not_ready");
        Ok(pool.clone())
    }

    async fn delete_lke_pool(&self, cluster_id: u64, pool_id: u64) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.enter("delete_lke_pool", Some(format!("{cluster_id}/{pool_id}")))?;
        state
            .pools
            .remove(&(cluster_id, pool_id))
            .map(|_| ())
            .ok_or_else(|| ProviderError::from_status(404, "Not found"))
    }
}

// =============================================================================
// Kubernetes
// =============================================================================

/// Record store keeping a single record in memory
pub struct MemoryRecordStore<K: ManagedResource> {
    record: Mutex<Option<K>>,
    statuses: Mutex<Vec<ManagedStatus<K::Observation>>>,
    removed: AtomicBool,
    external_name_failures: AtomicU32,
}

impl<K: ManagedResource> Default for MemoryRecordStore<K> {
    fn default() -> Self {
        Self {
            record: Mutex::new(None),
            statuses: Mutex::new(Vec::new()),
            removed: AtomicBool::new(false),
            external_name_failures: AtomicU32::new(0),
        }
    }
}

impl<K: ManagedResource> MemoryRecordStore<K> {
    /// Replace the stored record
    pub fn put(&self, record: K) {
        *self.record.lock().unwrap() = Some(record);
    }

    /// The stored record as the apiserver would return it
    pub fn current(&self) -> K {
        self.record.lock().unwrap().clone().unwrap()
    }

    /// Update the stored record in place
    pub fn edit(&self, f: impl FnOnce(&mut K)) {
        f(self.record.lock().unwrap().as_mut().unwrap());
    }

    /// Every status written, oldest first
    pub fn status_writes(&self) -> Vec<ManagedStatus<K::Observation>> {
        self.statuses.lock().unwrap().clone()
    }

    /// Whether the last finalizer of a deleting record was removed
    pub fn removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    /// Fail the next `n` external-name writes
    pub fn fail_external_name_writes(&self, n: u32) {
        self.external_name_failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl<K: ManagedResource> RecordStore<K> for MemoryRecordStore<K> {
    async fn add_finalizer(&self, _record: &K, finalizer: &str) -> Result<(), Error> {
        self.edit(|r| {
            let finalizers = r.meta_mut().finalizers.get_or_insert_with(Vec::new);
            if !finalizers.iter().any(|f| f == finalizer) {
                finalizers.push(finalizer.to_string());
            }
        });
        Ok(())
    }

    async fn remove_finalizer(&self, _record: &K, finalizer: &str) -> Result<(), Error> {
        let mut removed = false;
        self.edit(|r| {
            let meta = r.meta_mut();
            if let Some(finalizers) = meta.finalizers.as_mut() {
                finalizers.retain(|f| f != finalizer);
                removed = finalizers.is_empty() && meta.deletion_timestamp.is_some();
            }
        });
        if removed {
            self.removed.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn set_external_name(&self, _record: &K, external_name: &str) -> Result<(), Error> {
        let remaining = self.external_name_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.external_name_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::internal("conflict writing annotation"));
        }
        self.edit(|r| r.bind(external_name));
        Ok(())
    }

    async fn patch_status(
        &self,
        _record: &K,
        status: &ManagedStatus<K::Observation>,
    ) -> Result<(), Error> {
        self.statuses.lock().unwrap().push(status.clone());
        let mut guard = self.record.lock().unwrap();
        let record = guard.as_ref().unwrap();
        let mut value = serde_json::to_value(record).map_err(|e| Error::serialization(e.to_string()))?;
        value["status"] = serde_json::to_value(status).map_err(|e| Error::serialization(e.to_string()))?;
        *guard = Some(serde_json::from_value(value).map_err(|e| Error::serialization(e.to_string()))?);
        Ok(())
    }
}

/// Credential store holding one ProviderConfig and its token Secret
pub struct StaticCredentials {
    present: AtomicBool,
}

impl Default for StaticCredentials {
    fn default() -> Self {
        Self {
            present: AtomicBool::new(true),
        }
    }
}

impl StaticCredentials {
    /// Make the ProviderConfig disappear
    pub fn remove_config(&self) {
        self.present.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialStore for StaticCredentials {
    async fn get_provider_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ProviderConfig>, Error> {
        if !self.present.load(Ordering::SeqCst) || name != PROVIDER_CONFIG {
            return Ok(None);
        }
        let mut config = ProviderConfig::new(
            name,
            ProviderConfigSpec {
                credentials_secret_ref: SecretKeySelector {
                    name: "linode-token".to_string(),
                    namespace: None,
                    key: "token".to_string(),
                },
                api_url: None,
            },
        );
        config.metadata.namespace = Some(namespace.to_string());
        Ok(Some(config))
    }

    async fn get_secret(&self, _namespace: &str, _name: &str) -> Result<Option<Secret>, Error> {
        Ok(Some(Secret {
            data: Some(BTreeMap::from([(
                "token".to_string(),
                ByteString(TOKEN.as_bytes().to_vec()),
            )])),
            ..Default::default()
        }))
    }
}

/// Client factory handing out the shared fake
pub struct FakeClientFactory(pub Arc<FakeLinode>);

impl ClientFactory for FakeClientFactory {
    fn build(&self, settings: ClientSettings) -> Result<Arc<dyn LinodeApi>, Error> {
        assert_eq!(settings.token, TOKEN);
        Ok(self.0.clone())
    }
}

/// Publisher remembering what it was asked to write
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(SecretTarget, ConnectionDetails)>>,
    failures: AtomicU32,
}

impl RecordingPublisher {
    /// Every publish call, oldest first
    pub fn published(&self) -> Vec<(SecretTarget, ConnectionDetails)> {
        self.published.lock().unwrap().clone()
    }

    /// Fail the next `n` publish calls
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionPublisher for RecordingPublisher {
    async fn publish(
        &self,
        target: &SecretTarget,
        details: &ConnectionDetails,
    ) -> Result<(), Error> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::internal("secret write rejected"));
        }
        self.published
            .lock()
            .unwrap()
            .push((target.clone(), details.clone()));
        Ok(())
    }
}

/// Reference lookup over a fixed table of bound clusters
#[derive(Default)]
pub struct StaticReferences {
    clusters: Mutex<BTreeMap<String, Option<String>>>,
}

impl StaticReferences {
    /// Register cluster record `name`, bound to `external_name` if given
    pub fn cluster(&self, name: &str, external_name: Option<&str>) {
        self.clusters
            .lock()
            .unwrap()
            .insert(name.to_string(), external_name.map(str::to_string));
    }
}

#[async_trait]
impl ReferenceLookup for StaticReferences {
    async fn lke_cluster_external_name(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<String>, Error> {
        self.clusters
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::reference_not_resolved("LKECluster", name, "record does not exist"))
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Everything a reconciliation pass touches, wired to in-memory doubles
pub struct TestHarness<K: ManagedResource> {
    pub linode: Arc<FakeLinode>,
    pub records: Arc<MemoryRecordStore<K>>,
    pub credentials: Arc<StaticCredentials>,
    pub publisher: Arc<RecordingPublisher>,
    pub references: Arc<StaticReferences>,
}

impl<K: ManagedResource> TestHarness<K> {
    pub fn new() -> Self {
        Self {
            linode: Arc::new(FakeLinode::default()),
            records: Arc::new(MemoryRecordStore::default()),
            credentials: Arc::new(StaticCredentials::default()),
            publisher: Arc::new(RecordingPublisher::default()),
            references: Arc::new(StaticReferences::default()),
        }
    }

    /// Harness holding `record`
    pub fn with_record(record: K) -> Self {
        let harness = Self::new();
        harness.records.put(record);
        harness
    }

    /// Context using the recording publisher
    pub fn context(&self) -> Arc<Context<K>> {
        self.context_with(self.publisher.clone())
    }

    /// Context using a caller-supplied publisher
    pub fn context_with(&self, publisher: Arc<dyn ConnectionPublisher>) -> Arc<Context<K>> {
        Arc::new(self.build_context(publisher))
    }

    /// Unshared context, for tests that tweak its config
    pub fn build_context(&self, publisher: Arc<dyn ConnectionPublisher>) -> Context<K> {
        Context::for_testing(
            self.records.clone(),
            ConnectionResolver::new(
                self.credentials.clone(),
                Arc::new(FakeClientFactory(self.linode.clone())),
            ),
            publisher,
            self.references.clone(),
        )
    }

    /// Latest persisted status
    pub fn status(&self) -> ManagedStatus<K::Observation> {
        self.records
            .current()
            .managed_status()
            .cloned()
            .unwrap_or_default()
    }
}
