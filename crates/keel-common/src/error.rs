//! Error types for the Keel operator
//!
//! Errors are structured with fields to aid debugging in production. Every
//! error raised by an external call carries the operation and the resource it
//! targeted, while the provider's own classification (not found, rate limited,
//! unauthorized) stays inspectable through [`Error::is_not_found`] no matter
//! how deeply it has been wrapped.

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

fn also_failed_suffix(also_failed: &[String]) -> String {
    if also_failed.is_empty() {
        String::new()
    } else {
        format!("; also failed: {}", also_failed.join("; "))
    }
}

/// Classification of a failed provider API call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The addressed resource does not exist (HTTP 404)
    NotFound,
    /// Credentials were rejected (HTTP 401/403)
    Unauthorized,
    /// The provider throttled the request (HTTP 429)
    RateLimited,
    /// The request never produced a response (DNS, TLS, connection reset, timeout)
    Transport,
    /// The provider answered with any other error status
    Api,
    /// The response body could not be decoded
    Decode,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::Transport => write!(f, "transport"),
            Self::Api => write!(f, "api"),
            Self::Decode => write!(f, "decode"),
        }
    }
}

/// Error returned by a provider API call
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    /// What went wrong
    pub kind: ProviderErrorKind,
    /// HTTP status code, when a response was received
    pub status: Option<u16>,
    /// Provider-supplied or locally generated description
    pub message: String,
}

impl ProviderError {
    /// Create a provider error of the given kind without an HTTP status
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Classify an HTTP error status returned by the provider
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            404 => ProviderErrorKind::NotFound,
            401 | 403 => ProviderErrorKind::Unauthorized,
            429 => ProviderErrorKind::RateLimited,
            _ => ProviderErrorKind::Api,
        };
        Self {
            kind,
            status: Some(status),
            message: message.into(),
        }
    }

    /// Shorthand for a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::from_status(404, message)
    }

    /// Whether the addressed resource is absent
    pub fn is_not_found(&self) -> bool {
        self.kind == ProviderErrorKind::NotFound
    }

    /// Whether retrying the same call cannot succeed without a user fix
    ///
    /// Rejected credentials, undecodable responses and 4xx answers other than
    /// not-found, conflict and throttling are fatal. Everything else is
    /// considered transient.
    pub fn is_fatal(&self) -> bool {
        match self.kind {
            ProviderErrorKind::Unauthorized | ProviderErrorKind::Decode => true,
            ProviderErrorKind::Api => self
                .status
                .is_some_and(|s| (400..500).contains(&s) && s != 408 && s != 409),
            _ => false,
        }
    }
}

/// Main error type for Keel operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The ProviderConfig referenced by a record does not exist
    #[error("provider config {namespace}/{name} not found")]
    ConfigNotFound {
        /// Namespace searched
        namespace: String,
        /// Name of the missing ProviderConfig
        name: String,
    },

    /// The credentials secret, or the key inside it, does not exist
    #[error("credentials secret {namespace}/{name} has no key {key}")]
    SecretNotFound {
        /// Namespace of the secret
        namespace: String,
        /// Name of the secret
        name: String,
        /// Key expected to hold the token
        key: String,
    },

    /// Credentials were found but a client could not be built from them
    #[error("cannot construct provider client: {message}")]
    ClientConstruction {
        /// Description of what is malformed
        message: String,
    },

    /// A provider API call failed
    #[error("{operation} {resource} failed: {source}")]
    Provider {
        /// Operation that was attempted (e.g. "create instance")
        operation: String,
        /// Resource the operation targeted
        resource: String,
        /// The classified provider failure
        #[source]
        source: ProviderError,
    },

    /// Some corrective calls of an update succeeded before another failed
    #[error("partial update of {resource} ({} corrections applied): {source}{}", .applied.len(), also_failed_suffix(.also_failed))]
    PartialUpdate {
        /// Resource being updated
        resource: String,
        /// Corrections that were applied before the failure
        applied: Vec<String>,
        /// The first failure
        #[source]
        source: Box<Error>,
        /// Messages of the failures after the first
        also_failed: Vec<String>,
    },

    /// Several corrective calls of an update failed and none succeeded
    #[error("update of {resource} failed: {source}{}", also_failed_suffix(.also_failed))]
    UpdateFailed {
        /// Resource being updated
        resource: String,
        /// The first failure
        #[source]
        source: Box<Error>,
        /// Messages of the failures after the first
        also_failed: Vec<String>,
    },

    /// The stored external identifier does not have the shape this kind expects
    #[error("external name {external_name:?} is not a valid {kind} identifier: {message}")]
    IdentityMismatch {
        /// Kind of the record
        kind: String,
        /// The offending identifier
        external_name: String,
        /// What is wrong with it
        message: String,
    },

    /// A record is bound to an identifier the provider no longer knows
    #[error("external resource {external_name} of {resource} no longer exists; clear the external name annotation to recreate it")]
    ExternalResourceMissing {
        /// Record name
        resource: String,
        /// The stale identifier
        external_name: String,
    },

    /// A reference to another record could not be resolved yet
    #[error("reference to {kind} {name} not resolved: {message}")]
    ReferenceNotResolved {
        /// Kind of the referenced record
        kind: String,
        /// Name of the referenced record
        name: String,
        /// Why the reference is unresolved
        message: String,
    },

    /// Validation error for CRD specs or templates
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Name of the resource with invalid configuration
        resource: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// The pass was cancelled before the operation completed
    #[error("{operation} cancelled")]
    Cancelled {
        /// Operation that was in flight
        operation: String,
    },

    /// The pass deadline expired before the operation completed
    #[error("{operation} did not complete within {after:?}")]
    Timeout {
        /// Operation that was in flight
        operation: String,
        /// Deadline that expired
        after: Duration,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "publisher")
        context: String,
    },
}

impl Error {
    /// Create a config-not-found error
    pub fn config_not_found(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ConfigNotFound {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a secret-not-found error
    pub fn secret_not_found(
        namespace: impl Into<String>,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::SecretNotFound {
            namespace: namespace.into(),
            name: name.into(),
            key: key.into(),
        }
    }

    /// Create a client construction error
    pub fn client_construction(msg: impl Into<String>) -> Self {
        Self::ClientConstruction {
            message: msg.into(),
        }
    }

    /// Wrap a provider failure with the operation and resource it belongs to
    pub fn provider(
        operation: impl Into<String>,
        resource: impl Into<String>,
        source: ProviderError,
    ) -> Self {
        Self::Provider {
            operation: operation.into(),
            resource: resource.into(),
            source,
        }
    }

    /// Create a partial update error
    pub fn partial_update(resource: impl Into<String>, applied: Vec<String>, source: Error) -> Self {
        Self::PartialUpdate {
            resource: resource.into(),
            applied,
            source: Box::new(source),
            also_failed: Vec::new(),
        }
    }

    /// Fold the failures of one update into a single error.
    ///
    /// `failures` must not be empty. A lone failure with nothing applied is
    /// returned unchanged; otherwise the first failure is the source and the
    /// rest are kept as messages.
    pub fn update_failures(resource: impl Into<String>, applied: Vec<String>, mut failures: Vec<Error>) -> Self {
        let resource = resource.into();
        if failures.is_empty() {
            return Self::internal_with_context("update", format!("update of {resource} reported no failure"));
        }
        let first = failures.remove(0);
        let also_failed: Vec<String> = failures.iter().map(ToString::to_string).collect();
        match (applied.is_empty(), also_failed.is_empty()) {
            (true, true) => first,
            (true, false) => Self::UpdateFailed {
                resource,
                source: Box::new(first),
                also_failed,
            },
            (false, _) => Self::PartialUpdate {
                resource,
                applied,
                source: Box::new(first),
                also_failed,
            },
        }
    }

    /// Create an identity mismatch error
    pub fn identity_mismatch(
        kind: impl Into<String>,
        external_name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::IdentityMismatch {
            kind: kind.into(),
            external_name: external_name.into(),
            message: msg.into(),
        }
    }

    /// Create an error for a record whose external resource vanished
    pub fn external_resource_missing(
        resource: impl Into<String>,
        external_name: impl Into<String>,
    ) -> Self {
        Self::ExternalResourceMissing {
            resource: resource.into(),
            external_name: external_name.into(),
        }
    }

    /// Create an unresolved reference error
    pub fn reference_not_resolved(
        kind: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::ReferenceNotResolved {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error with resource context
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a deadline error
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether the external resource addressed by the failed call is absent
    ///
    /// Looks through provider and partial-update wrapping.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Provider { source, .. } => source.is_not_found(),
            Error::PartialUpdate { source, .. } | Error::UpdateFailed { source, .. } => {
                source.is_not_found()
            }
            _ => false,
        }
    }

    /// Whether the failure needs a user to fix configuration before a retry can succeed
    ///
    /// These errors are retried on a long fixed interval instead of backoff.
    pub fn is_configuration(&self) -> bool {
        match self {
            Error::ConfigNotFound { .. }
            | Error::SecretNotFound { .. }
            | Error::ClientConstruction { .. }
            | Error::Validation { .. }
            | Error::IdentityMismatch { .. }
            | Error::ExternalResourceMissing { .. }
            | Error::Serialization { .. } => true,
            Error::Provider { source, .. } => source.is_fatal(),
            Error::UpdateFailed { source, .. } => source.is_configuration(),
            _ => false,
        }
    }

    /// Whether the pass was aborted by cancellation or its deadline
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Cancelled { .. } | Error::Timeout { .. })
    }

    /// Check if this error is retryable on a short backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // Don't retry on 4xx errors other than conflicts and throttling
                !matches!(
                    source,
                    kube::Error::Api(ae)
                        if (400..500).contains(&ae.code) && ae.code != 409 && ae.code != 429
                )
            }
            Error::PartialUpdate { source, .. } | Error::UpdateFailed { source, .. } => {
                source.is_retryable()
            }
            other => !other.is_configuration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Propagation Through a Reconciliation Pass
    // ==========================================================================
    //
    // Each error category maps to a different retry treatment: configuration
    // errors wait for a user fix, transient provider errors back off, and
    // not-found is folded into the absent/deleted paths by the caller.

    /// Story: A missing ProviderConfig or secret is a configuration problem
    #[test]
    fn story_missing_credentials_wait_for_user_fix() {
        let err = Error::config_not_found("team-a", "linode-prod");
        assert!(err.to_string().contains("team-a/linode-prod"));
        assert!(err.is_configuration());
        assert!(!err.is_retryable());

        let err = Error::secret_not_found("team-a", "linode-token", "token");
        assert!(err.to_string().contains("no key token"));
        assert!(err.is_configuration());

        let err = Error::client_construction("token is empty");
        assert!(err.is_configuration());
        assert!(!err.is_not_found());
    }

    /// Story: Not-found stays visible after the adapter wraps the provider error
    #[test]
    fn story_not_found_survives_wrapping() {
        let provider = ProviderError::not_found("Not found");
        let err = Error::provider("get instance", "web-1", provider);
        assert!(err.is_not_found());
        assert!(err.to_string().contains("get instance web-1 failed"));

        // Wrapped again as the first failure of a partial update
        let partial = Error::partial_update("web-1", vec!["label".to_string()], err);
        assert!(partial.is_not_found());
        assert!(partial.to_string().contains("1 corrections applied"));

        // Other provider failures are not not-found
        let throttled = Error::provider(
            "get instance",
            "web-1",
            ProviderError::from_status(429, "Too many requests"),
        );
        assert!(!throttled.is_not_found());
    }

    /// Story: Transient provider failures retry on backoff, fatal ones wait
    #[test]
    fn story_provider_failures_are_classified_by_status() {
        let transient = [
            ProviderError::from_status(429, "slow down"),
            ProviderError::from_status(500, "oops"),
            ProviderError::from_status(409, "busy"),
            ProviderError::new(ProviderErrorKind::Transport, "connection reset"),
        ];
        for source in transient {
            let err = Error::provider("update instance", "web-1", source);
            assert!(err.is_retryable(), "{err} should be retryable");
            assert!(!err.is_configuration());
        }

        let fatal = [
            ProviderError::from_status(401, "Invalid Token"),
            ProviderError::from_status(400, "region is not valid"),
            ProviderError::new(ProviderErrorKind::Decode, "missing field id"),
        ];
        for source in fatal {
            let err = Error::provider("create instance", "web-1", source);
            assert!(!err.is_retryable(), "{err} should not be retryable");
            assert!(err.is_configuration());
        }
    }

    /// Story: A malformed identifier is a wiring bug, not a transient failure
    #[test]
    fn story_identity_mismatch_is_not_retried_quickly() {
        let err = Error::identity_mismatch("LKENodePool", "12345", "expected <clusterId>/<poolId>");
        assert!(err.to_string().contains("\"12345\""));
        assert!(err.is_configuration());
        assert!(!err.is_retryable());
    }

    /// Story: A stale identifier tells the operator how to recover
    #[test]
    fn story_stale_identifier_message_names_the_annotation() {
        let err = Error::external_resource_missing("web-1", "12345");
        assert!(err.to_string().contains("clear the external name annotation"));
        assert!(err.is_configuration());
    }

    /// Story: Cancelled and timed-out passes are aborted, not failed
    #[test]
    fn story_aborted_passes_are_distinguished() {
        assert!(Error::cancelled("observe").is_aborted());
        let err = Error::timeout("connect", Duration::from_secs(30));
        assert!(err.is_aborted());
        assert!(err.to_string().contains("30s"));
        assert!(err.is_retryable());
        assert!(!Error::internal("boom").is_aborted());
    }

    #[test]
    fn unresolved_reference_is_retryable() {
        let err = Error::reference_not_resolved("LKECluster", "prod", "no external name yet");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("LKECluster prod"));
    }

    #[test]
    fn validation_defaults_to_unknown_context() {
        match Error::validation("bad") {
            Error::Validation { resource, .. } => assert_eq!(resource, UNKNOWN_CONTEXT),
            _ => panic!("Expected Validation variant"),
        }
        let err = Error::validation_for("web-1", "label too long");
        assert!(err.to_string().contains("web-1"));
    }

    #[test]
    fn internal_error_with_context() {
        let err = Error::internal_with_context("reconciler", "unexpected state");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("[reconciler]"));
    }
}
