//! Supporting types shared by every managed resource CRD

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type tracking the lifecycle of the external resource
pub const CONDITION_READY: &str = "Ready";

/// Condition type tracking the outcome of the last reconciliation pass
pub const CONDITION_SYNCED: &str = "Synced";

/// Condition type recording whether one-time connection details reached their secret.
///
/// Only set for records that name a connection secret; never cleared, since
/// the details cannot be regenerated once lost.
pub const CONDITION_CONNECTION_PUBLISHED: &str = "ConnectionDetailsPublished";

/// Well-known condition reasons
pub mod condition_reasons {
    /// The external resource is being created or is settling
    pub const CREATING: &str = "Creating";
    /// The external resource is ready for use
    pub const AVAILABLE: &str = "Available";
    /// The external resource is being deleted
    pub const DELETING: &str = "Deleting";
    /// The provider reports a state that is neither ready nor progressing
    pub const UNAVAILABLE: &str = "Unavailable";
    /// The bound external resource no longer exists
    pub const EXTERNAL_MISSING: &str = "ExternalResourceMissing";
    /// The last pass completed without error
    pub const RECONCILE_SUCCESS: &str = "ReconcileSuccess";
    /// The last pass failed
    pub const RECONCILE_ERROR: &str = "ReconcileError";
    /// Connection details were written to the connection secret
    pub const PUBLISHED: &str = "Published";
    /// Connection details could not be written and are lost
    pub const PUBLISH_FAILED: &str = "PublishFailed";
}

/// Condition status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Ready, Synced)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition status changed
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// The zero value returned for a condition that was never set
    pub fn unknown(type_: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            status: ConditionStatus::Unknown,
            reason: String::new(),
            message: String::new(),
            last_transition_time: DateTime::<Utc>::default(),
        }
    }

    /// External resource is being created or has not settled yet
    pub fn creating() -> Self {
        Self::new(
            CONDITION_READY,
            ConditionStatus::False,
            condition_reasons::CREATING,
            "",
        )
    }

    /// External resource is ready
    pub fn available() -> Self {
        Self::new(
            CONDITION_READY,
            ConditionStatus::True,
            condition_reasons::AVAILABLE,
            "",
        )
    }

    /// External resource is being deleted
    pub fn deleting() -> Self {
        Self::new(
            CONDITION_READY,
            ConditionStatus::False,
            condition_reasons::DELETING,
            "",
        )
    }

    /// Provider reports an unusable state
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            CONDITION_READY,
            ConditionStatus::False,
            condition_reasons::UNAVAILABLE,
            message,
        )
    }

    /// The bound external resource vanished
    pub fn external_missing(external_name: &str) -> Self {
        Self::new(
            CONDITION_READY,
            ConditionStatus::False,
            condition_reasons::EXTERNAL_MISSING,
            format!("external resource {external_name} was not found"),
        )
    }

    /// The last pass succeeded
    pub fn reconcile_success() -> Self {
        Self::new(
            CONDITION_SYNCED,
            ConditionStatus::True,
            condition_reasons::RECONCILE_SUCCESS,
            "",
        )
    }

    /// The last pass failed with `message`
    pub fn reconcile_error(message: impl Into<String>) -> Self {
        Self::new(
            CONDITION_SYNCED,
            ConditionStatus::False,
            condition_reasons::RECONCILE_ERROR,
            message,
        )
    }

    /// Connection details were written to `secret`
    pub fn connection_published(secret: &str) -> Self {
        Self::new(
            CONDITION_CONNECTION_PUBLISHED,
            ConditionStatus::True,
            condition_reasons::PUBLISHED,
            format!("connection details written to {secret}"),
        )
    }

    /// Connection details never reached their secret
    pub fn connection_publish_failed(message: impl Into<String>) -> Self {
        Self::new(
            CONDITION_CONNECTION_PUBLISHED,
            ConditionStatus::False,
            condition_reasons::PUBLISH_FAILED,
            message,
        )
    }
}

/// Ordered set of conditions holding at most one condition per type
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(transparent)]
pub struct ConditionSet(Vec<Condition>);

impl ConditionSet {
    /// Replace the condition of the same type, or append it.
    ///
    /// The stored transition time is kept when the status is unchanged, so
    /// re-asserting the same condition on every pass leaves the set equal.
    pub fn set(&mut self, mut condition: Condition) {
        match self.0.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
            }
            None => self.0.push(condition),
        }
    }

    /// Get the condition of `type_`, or an `Unknown` zero value
    pub fn get(&self, type_: &str) -> Condition {
        self.find(type_)
            .cloned()
            .unwrap_or_else(|| Condition::unknown(type_))
    }

    /// Borrow the condition of `type_` if present
    pub fn find(&self, type_: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    /// Whether `type_` is present with status True
    pub fn is_true(&self, type_: &str) -> bool {
        self.find(type_)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Whether `type_` is present with the given reason
    pub fn has_reason(&self, type_: &str, reason: &str) -> bool {
        self.find(type_).is_some_and(|c| c.reason == reason)
    }

    /// Iterate conditions in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    /// Number of conditions
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no condition is set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What happens to the external resource when its record is deleted
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ReclaimPolicy {
    /// Leave the external resource in place
    #[default]
    Retain,
    /// Delete the external resource
    Delete,
}

/// Reference to a ProviderConfig in the record's namespace
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ProviderConfigReference {
    /// ProviderConfig name
    pub name: String,
}

/// Reference to another record of a known kind in the same namespace
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct LocalReference {
    /// Record name
    pub name: String,
}

/// Where to write connection details
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SecretReference {
    /// Secret name
    pub name: String,

    /// Secret namespace (defaults to the record's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// A key inside a Secret
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SecretKeySelector {
    /// Secret name
    pub name: String,

    /// Secret namespace (defaults to the referencing object's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Key within the Secret's data
    pub key: String,
}

/// Fields common to every managed resource spec.
///
/// Composed into each CRD's spec via `#[serde(flatten)]`.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// ProviderConfig holding the credentials used for this resource
    pub provider_config_ref: ProviderConfigReference,

    /// What to do with the external resource when this record is deleted
    #[serde(default)]
    pub reclaim_policy: ReclaimPolicy,

    /// Secret that receives connection details once, at creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secret_to_ref: Option<SecretReference>,
}

impl ResourceSpec {
    /// Spec using the given ProviderConfig and default policy
    pub fn with_provider_config(name: impl Into<String>) -> Self {
        Self {
            provider_config_ref: ProviderConfigReference { name: name.into() },
            reclaim_policy: ReclaimPolicy::default(),
            write_connection_secret_to_ref: None,
        }
    }
}

/// Convergence state reached by the last reconciliation pass
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ReconcilePhase {
    /// No external resource is bound yet
    #[default]
    Absent,
    /// Create was issued, waiting for the resource to settle
    Creating,
    /// External state matches the spec
    UpToDate,
    /// Corrections were issued, re-checking on the next pass
    Drifted,
    /// External resource is being deleted
    Deleting,
    /// External resource deleted or released
    Deleted,
    /// The last pass failed and will be retried
    Failed,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "Absent"),
            Self::Creating => write!(f, "Creating"),
            Self::UpToDate => write!(f, "UpToDate"),
            Self::Drifted => write!(f, "Drifted"),
            Self::Deleting => write!(f, "Deleting"),
            Self::Deleted => write!(f, "Deleted"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Status shared by every managed resource, parameterized by its observation type
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedStatus<O> {
    /// Phase reached by the last pass
    #[serde(default)]
    pub phase: ReconcilePhase,

    /// Lifecycle and sync conditions
    #[serde(default, skip_serializing_if = "ConditionSet::is_empty")]
    pub conditions: ConditionSet,

    /// State last read from the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_provider: Option<O>,

    /// Generation of the spec observed by the last pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl<O> Default for ManagedStatus<O> {
    fn default() -> Self {
        Self {
            phase: ReconcilePhase::default(),
            conditions: ConditionSet::default(),
            at_provider: None,
            observed_generation: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod condition_set {
        use super::*;

        #[test]
        fn set_replaces_condition_of_same_type() {
            let mut set = ConditionSet::default();
            set.set(Condition::creating());
            set.set(Condition::reconcile_success());
            set.set(Condition::available());

            assert_eq!(set.len(), 2);
            let ready = set.get(CONDITION_READY);
            assert_eq!(ready.status, ConditionStatus::True);
            assert_eq!(ready.reason, condition_reasons::AVAILABLE);
        }

        #[test]
        fn transition_time_moves_only_when_status_changes() {
            let mut set = ConditionSet::default();
            let mut first = Condition::creating();
            first.last_transition_time = DateTime::<Utc>::default();
            set.set(first.clone());

            // Same status, different reason: time is kept
            set.set(Condition::unavailable("stuck in billing_suspension"));
            let after = set.get(CONDITION_READY);
            assert_eq!(after.reason, condition_reasons::UNAVAILABLE);
            assert_eq!(after.last_transition_time, first.last_transition_time);

            // Status flips: time moves
            set.set(Condition::available());
            assert!(set.get(CONDITION_READY).last_transition_time > first.last_transition_time);
        }

        #[test]
        fn reasserting_same_condition_leaves_set_equal() {
            let mut set = ConditionSet::default();
            set.set(Condition::available());
            let before = set.clone();
            set.set(Condition::available());
            assert_eq!(set, before);
        }

        #[test]
        fn missing_condition_reads_as_unknown_not_false() {
            let set = ConditionSet::default();
            let ready = set.get(CONDITION_READY);
            assert_eq!(ready.type_, CONDITION_READY);
            assert_eq!(ready.status, ConditionStatus::Unknown);
            assert!(ready.reason.is_empty());
            assert!(!set.is_true(CONDITION_READY));
            assert!(set.find(CONDITION_READY).is_none());
        }

        #[test]
        fn serializes_as_plain_list() {
            let mut set = ConditionSet::default();
            set.set(Condition::reconcile_error("boom"));
            let json = serde_json::to_value(&set).unwrap();
            assert!(json.is_array());
            assert_eq!(json[0]["type"], "Synced");
            assert_eq!(json[0]["status"], "False");
            assert_eq!(json[0]["message"], "boom");
            assert!(json[0]["lastTransitionTime"].is_string());
        }
    }

    #[test]
    fn reclaim_policy_defaults_to_retain() {
        let spec: ResourceSpec =
            serde_json::from_value(serde_json::json!({"providerConfigRef": {"name": "default"}}))
                .unwrap();
        assert_eq!(spec.reclaim_policy, ReclaimPolicy::Retain);
        assert!(spec.write_connection_secret_to_ref.is_none());
    }

    #[test]
    fn empty_status_serializes_minimally() {
        let status: ManagedStatus<String> = ManagedStatus::default();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json, serde_json::json!({"phase": "Absent"}));
    }
}
