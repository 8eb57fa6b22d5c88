//! The data side of a managed resource kind.
//!
//! A [`ManagedResource`] is a namespaced CRD whose spec declares the desired
//! provider parameters and whose status mirrors what the provider reported.
//! The kind knows how to compare the two ([`ManagedResource::drift`]) and how
//! to read the provider's lifecycle label ([`ManagedResource::lifecycle`]);
//! talking to the provider lives elsewhere.

use std::fmt::{Debug, Display};

use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crd::{ManagedStatus, ReclaimPolicy, ResourceSpec};
use crate::EXTERNAL_NAME_ANNOTATION;

/// Provider lifecycle of an observed resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Provisioning or otherwise settling
    Creating,
    /// Ready for use
    Available,
    /// Neither ready nor progressing; carries the provider's label
    Unavailable(String),
}

/// A CRD kind whose records are bound to external provider resources
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Desired provider parameters (`spec.forProvider`)
    type Parameters: Clone
        + Debug
        + PartialEq
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// State read back from the provider (`status.atProvider`)
    type Observation: Clone
        + Debug
        + PartialEq
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// One field-level mismatch needing a corrective call
    type Drift: Clone + Debug + Display + PartialEq + Send + Sync + 'static;

    /// Common spec fields
    fn resource_spec(&self) -> &ResourceSpec;

    /// Desired provider parameters
    fn parameters(&self) -> &Self::Parameters;

    /// Current status, if any was ever written
    fn managed_status(&self) -> Option<&ManagedStatus<Self::Observation>>;

    /// Build a record from its parts
    fn from_parts(name: &str, resource: ResourceSpec, parameters: Self::Parameters) -> Self;

    /// Compare every mutable desired field against the observation.
    ///
    /// An empty list means the resource is up to date. Pending provider-side
    /// transitions are reported as drift so no pass declares convergence early.
    fn drift(parameters: &Self::Parameters, observed: &Self::Observation) -> Vec<Self::Drift>;

    /// Classify the provider's lifecycle label
    fn lifecycle(observed: &Self::Observation) -> Lifecycle;

    /// Reject parameters the provider would refuse, before any call is made
    fn validate(&self) -> crate::Result<()> {
        Ok(())
    }

    /// Provider-assigned identifier bound to this record, if any
    fn external_name(&self) -> Option<&str> {
        self.meta()
            .annotations
            .as_ref()
            .and_then(|a| a.get(EXTERNAL_NAME_ANNOTATION))
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Whether the record is marked for deletion
    fn is_deleting(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }

    /// Reclaim policy from the spec
    fn reclaim_policy(&self) -> ReclaimPolicy {
        self.resource_spec().reclaim_policy
    }

    /// `namespace/name` key used in logs and backoff bookkeeping
    fn record_key(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }
}

/// Compare two tag lists as sets
pub fn same_tags(desired: &[String], observed: &[String]) -> bool {
    let mut d: Vec<&String> = desired.iter().collect();
    let mut o: Vec<&String> = observed.iter().collect();
    d.sort();
    d.dedup();
    o.sort();
    o.dedup();
    d == o
}
