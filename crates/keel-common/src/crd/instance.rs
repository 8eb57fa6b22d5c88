//! Instance CRD for Linode compute instances

use std::fmt;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ManagedStatus, ResourceSpec};
use crate::managed::{same_tags, Lifecycle, ManagedResource};
use crate::Error;

/// Instance declares a Linode compute instance.
///
/// Example:
/// ```yaml
/// apiVersion: keel.dev/v1alpha1
/// kind: Instance
/// metadata:
///   name: web-1
/// spec:
///   providerConfigRef:
///     name: default
///   reclaimPolicy: Delete
///   writeConnectionSecretToRef:
///     name: web-1-conn
///   forProvider:
///     label: web-1
///     region: us-east
///     type: g6-nanode-1
///     image: linode/debian12
///     status: running
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "keel.dev",
    version = "v1alpha1",
    kind = "Instance",
    namespaced,
    status = "InstanceStatus",
    shortname = "linode",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".metadata.annotations.keel\\.dev/external-name"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.atProvider.status"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    /// Credentials, reclaim policy and connection secret target
    #[serde(flatten)]
    pub resource: ResourceSpec,

    /// Desired instance parameters
    pub for_provider: InstanceParameters,
}

/// Desired instance parameters
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceParameters {
    /// Display label; generated by the provider when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Region to place the instance in (create-only)
    pub region: String,

    /// Plan type, e.g. g6-standard-2; changing it resizes the instance
    #[serde(rename = "type")]
    pub instance_type: String,

    /// Image to deploy (create-only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Users whose SSH keys are installed for root (create-only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorized_users: Vec<String>,

    /// Tags applied to the instance
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Desired power state
    #[serde(default)]
    pub status: PowerState,
}

/// Desired power state of an instance
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    /// Booted
    #[default]
    Running,
    /// Shut down
    Offline,
}

impl PowerState {
    /// Provider status label for this state
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instance state reported by the provider
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceObservation {
    /// Provider identifier
    pub id: u64,

    /// Provider lifecycle label (running, offline, provisioning, ...)
    pub status: String,

    /// Current label
    pub label: String,

    /// Region
    pub region: String,

    /// Current plan type
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,

    /// Deployed image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Public and private IPv4 addresses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ipv4: Vec<String>,

    /// SLAAC IPv6 address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,

    /// Current tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Creation timestamp reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    /// Last update timestamp reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

/// A correction an instance needs
#[derive(Clone, Debug, PartialEq)]
pub enum InstanceDrift {
    /// Label differs
    Label(String),
    /// Tags differ
    Tags(Vec<String>),
    /// Plan type differs; needs the instance offline first
    Type(String),
    /// Power state differs
    Power(PowerState),
    /// The provider is mid-transition; power and type changes wait for it
    TransitionPending(String),
}

impl fmt::Display for InstanceDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label(label) => write!(f, "label -> {label}"),
            Self::Tags(tags) => write!(f, "tags -> [{}]", tags.join(",")),
            Self::Type(t) => write!(f, "type -> {t}"),
            Self::Power(state) => write!(f, "power -> {state}"),
            Self::TransitionPending(state) => write!(f, "waiting for {state} to settle"),
        }
    }
}

/// Instance status
pub type InstanceStatus = ManagedStatus<InstanceObservation>;

/// Provider labels of an instance that is progressing between stable states
const TRANSITIONAL_STATES: &[&str] = &[
    "provisioning",
    "booting",
    "rebooting",
    "shutting_down",
    "migrating",
    "rebuilding",
    "cloning",
    "restoring",
    "resizing",
];

impl ManagedResource for Instance {
    type Parameters = InstanceParameters;
    type Observation = InstanceObservation;
    type Drift = InstanceDrift;

    fn resource_spec(&self) -> &ResourceSpec {
        &self.spec.resource
    }

    fn parameters(&self) -> &InstanceParameters {
        &self.spec.for_provider
    }

    fn managed_status(&self) -> Option<&InstanceStatus> {
        self.status.as_ref()
    }

    fn from_parts(name: &str, resource: ResourceSpec, parameters: InstanceParameters) -> Self {
        Instance::new(
            name,
            InstanceSpec {
                resource,
                for_provider: parameters,
            },
        )
    }

    fn drift(desired: &InstanceParameters, observed: &InstanceObservation) -> Vec<InstanceDrift> {
        let mut drift = Vec::new();

        if let Some(label) = &desired.label {
            if label != &observed.label {
                drift.push(InstanceDrift::Label(label.clone()));
            }
        }
        if !same_tags(&desired.tags, &observed.tags) {
            drift.push(InstanceDrift::Tags(desired.tags.clone()));
        }

        // Suspended or stopped instances refuse power and size changes until
        // the provider-side condition clears
        if matches!(Self::lifecycle(observed), Lifecycle::Unavailable(_)) {
            return drift;
        }

        if observed
            .instance_type
            .as_deref()
            .is_some_and(|t| t != desired.instance_type)
        {
            drift.push(InstanceDrift::Type(desired.instance_type.clone()));
        }

        match observed.status.as_str() {
            "running" | "offline" => {
                if observed.status != desired.status.as_str() {
                    drift.push(InstanceDrift::Power(desired.status));
                }
            }
            other => drift.push(InstanceDrift::TransitionPending(other.to_string())),
        }

        drift
    }

    fn lifecycle(observed: &InstanceObservation) -> Lifecycle {
        match observed.status.as_str() {
            "running" | "offline" => Lifecycle::Available,
            s if TRANSITIONAL_STATES.contains(&s) => Lifecycle::Creating,
            other => Lifecycle::Unavailable(other.to_string()),
        }
    }

    fn validate(&self) -> crate::Result<()> {
        let params = &self.spec.for_provider;
        if params.region.is_empty() {
            return Err(Error::validation_for(self.name_any(), "region is required"));
        }
        if params.instance_type.is_empty() {
            return Err(Error::validation_for(self.name_any(), "type is required"));
        }
        if let Some(label) = &params.label {
            let valid_chars = label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
            if !(3..=64).contains(&label.len()) || !valid_chars {
                return Err(Error::validation_for(
                    self.name_any(),
                    format!("label {label:?} must be 3-64 characters of letters, digits, '-', '_' or '.'"),
                ));
            }
        }
        Ok(())
    }
}
