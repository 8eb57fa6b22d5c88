//! Static registry of the managed kinds this operator serves
//!
//! Adding a kind means one entry in [`ALL_KINDS`]; CRD installation, the
//! `materialize` subcommand and controller startup all iterate it.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use keel_common::class::{materialize, Claim, ResourceClass};
use keel_common::crd::{Instance, LkeCluster, LkeNodePool, ProviderConfig};
use keel_common::ManagedResource;
use kube::{Client, CustomResourceExt};

use crate::controller_runner::{build_controller, ControllerFuture, RunSettings};

/// Everything the binary needs to know about one managed kind
pub struct KindEntry {
    /// Kubernetes kind name
    pub kind: &'static str,
    /// CRD generator
    pub crd: fn() -> CustomResourceDefinition,
    /// Render the record a claim of a class (given as YAML) stands for
    pub materialize: fn(&str, &Claim) -> anyhow::Result<String>,
    /// Controller future for this kind
    pub controller: fn(Client, &RunSettings) -> ControllerFuture,
}

impl std::fmt::Debug for KindEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindEntry").field("kind", &self.kind).finish_non_exhaustive()
    }
}

/// Every managed kind, in startup order
pub static ALL_KINDS: &[KindEntry] = &[
    KindEntry {
        kind: "Instance",
        crd: Instance::crd,
        materialize: materialize_yaml::<Instance>,
        controller: build_controller::<Instance>,
    },
    KindEntry {
        kind: "LKECluster",
        crd: LkeCluster::crd,
        materialize: materialize_yaml::<LkeCluster>,
        controller: build_controller::<LkeCluster>,
    },
    KindEntry {
        kind: "LKENodePool",
        crd: LkeNodePool::crd,
        materialize: materialize_yaml::<LkeNodePool>,
        controller: build_controller::<LkeNodePool>,
    },
];

/// Find a kind by name, ignoring case
pub fn lookup(kind: &str) -> Option<&'static KindEntry> {
    ALL_KINDS.iter().find(|e| e.kind.eq_ignore_ascii_case(kind))
}

/// Resolve a list of kind names, or every kind when the list is empty
pub fn select(kinds: &[String]) -> anyhow::Result<Vec<&'static KindEntry>> {
    if kinds.is_empty() {
        return Ok(ALL_KINDS.iter().collect());
    }
    kinds
        .iter()
        .map(|name| lookup(name).ok_or_else(|| unknown_kind(name)))
        .collect()
}

/// CRDs the operator installs: ProviderConfig plus every managed kind
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    std::iter::once(ProviderConfig::crd())
        .chain(ALL_KINDS.iter().map(|e| (e.crd)()))
        .collect()
}

pub(crate) fn unknown_kind(name: &str) -> anyhow::Error {
    let known: Vec<&str> = ALL_KINDS.iter().map(|e| e.kind).collect();
    anyhow::anyhow!("unknown kind {name:?}, expected one of {}", known.join(", "))
}

fn materialize_yaml<K: ManagedResource>(class_yaml: &str, claim: &Claim) -> anyhow::Result<String> {
    let class: ResourceClass<K::Parameters> = serde_yaml::from_str(class_yaml)
        .map_err(|e| anyhow::anyhow!("invalid {} class: {}", K::kind(&()), e))?;
    let record: K = materialize(&class, claim);
    Ok(serde_yaml::to_string(&record)?)
}
