//! Kubernetes Event recording for managed resource controllers.
//!
//! Lifecycle transitions of external resources (created, updated, deleted,
//! released) and the failures that block them are published as standard
//! Kubernetes Events, visible via `kubectl describe`.
//!
//! Events are fire-and-forget: a failed publish is logged and never breaks
//! reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event about `resource_ref`
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Publisher that drops every event.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Well-known event reason strings (REASON column of `kubectl get events`).
pub mod reasons {
    /// External resource was created
    pub const CREATED_EXTERNAL: &str = "CreatedExternalResource";
    /// Drift corrections were sent to the provider
    pub const UPDATED_EXTERNAL: &str = "UpdatedExternalResource";
    /// External resource was deleted
    pub const DELETED_EXTERNAL: &str = "DeletedExternalResource";
    /// Record removed while the external resource was retained
    pub const RELEASED_EXTERNAL: &str = "ReleasedExternalResource";
    /// Connection details were written to a secret
    pub const PUBLISHED_CONNECTION: &str = "PublishedConnectionDetails";
    /// Connection details could not be written and are lost
    pub const CANNOT_PUBLISH_CONNECTION: &str = "CannotPublishConnectionDetails";
    /// Credentials could not be resolved into a client
    pub const CANNOT_CONNECT: &str = "CannotConnectToProvider";
    /// Reading the external resource failed
    pub const CANNOT_OBSERVE: &str = "CannotObserveExternalResource";
    /// Creating the external resource failed
    pub const CANNOT_CREATE: &str = "CannotCreateExternalResource";
    /// Correcting drift failed
    pub const CANNOT_UPDATE: &str = "CannotUpdateExternalResource";
    /// Deleting the external resource failed
    pub const CANNOT_DELETE: &str = "CannotDeleteExternalResource";
    /// The bound external resource disappeared
    pub const EXTERNAL_MISSING: &str = "ExternalResourceMissing";
}

/// Well-known event action strings (ACTION column of `kubectl get events`).
pub mod actions {
    /// Resolving credentials
    pub const CONNECT: &str = "Connect";
    /// Reading provider state
    pub const OBSERVE: &str = "Observe";
    /// Creating the external resource
    pub const CREATE: &str = "Create";
    /// Correcting drift
    pub const UPDATE: &str = "Update";
    /// Deleting or releasing the external resource
    pub const DELETE: &str = "Delete";
}
