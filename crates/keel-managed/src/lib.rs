//! Convergence controller for Keel managed resources
//!
//! Each reconciliation pass resolves an API client from the record's
//! ProviderConfig, observes the external resource, and issues at most one
//! corrective action (create, update, or delete) before requeueing.
//!
//! Related crates:
//! - `keel-common`: CRDs, conditions, errors, events, retry
//! - `keel-provider`: Linode API client

pub mod connection;
pub mod external;
pub mod kind;
pub mod kinds;
pub mod observe;
pub mod publisher;
pub mod reconciler;
pub mod references;
pub mod store;

#[cfg(test)]
mod testing;

pub use connection::{ClientFactory, ClientSettings, ConnectionResolver, CredentialStore};
pub use external::{ConnectionDetails, Creation, ExternalClient, UpdateOutcome};
pub use kind::ManagedKind;
pub use observe::{observe, Verdict};
pub use publisher::{ConnectionPublisher, KubeSecretPublisher, SecretTarget};
pub use reconciler::{
    error_policy, reconcile, Context, ContextBuilder, ReconcilerConfig, CONTROLLER_NAME,
};
pub use references::{KubeReferenceLookup, ReferenceLookup};
pub use store::{KubeRecordStore, RecordStore};

// Re-export common error types
pub use keel_common::{Error, Result};
