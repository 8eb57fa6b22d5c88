//! Common types for Keel: CRDs, conditions, errors, and utilities

#![deny(missing_docs)]

pub mod class;
pub mod crd;
pub mod error;
pub mod events;
pub mod managed;
pub mod retry;
pub mod telemetry;

pub use error::{Error, ProviderError, ProviderErrorKind};
pub use managed::{Lifecycle, ManagedResource};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group for all Keel CRDs
pub const KEEL_GROUP: &str = "keel.dev";

/// Annotation holding the provider-assigned identifier of the external resource
pub const EXTERNAL_NAME_ANNOTATION: &str = "keel.dev/external-name";

/// Finalizer that blocks record removal until the external resource is released
pub const MANAGED_FINALIZER: &str = "keel.dev/managed-resource";

/// Field manager used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "keel-controller";

/// Label recording which claim a materialized record came from
pub const CLAIM_NAME_LABEL: &str = "keel.dev/claim-name";

/// Label recording the namespace of the originating claim
pub const CLAIM_NAMESPACE_LABEL: &str = "keel.dev/claim-namespace";
