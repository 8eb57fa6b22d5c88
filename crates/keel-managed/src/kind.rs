//! Behaviour a managed kind plugs into the convergence loop

use std::sync::Arc;

use async_trait::async_trait;
use keel_common::{Error, ManagedResource};
use keel_provider::LinodeApi;

use crate::external::ExternalClient;
use crate::references::ReferenceLookup;

/// A managed resource kind the controller can converge.
///
/// The data model comes from [`ManagedResource`]; this adds the adapter
/// constructor and any reference resolution the kind needs before creation.
#[async_trait]
pub trait ManagedKind: ManagedResource {
    /// Adapter issuing this kind's provider calls
    type External: ExternalClient<Self> + 'static;

    /// Build the adapter over a connected API client
    fn connect(api: Arc<dyn LinodeApi>) -> Self::External;

    /// Parameters with every reference replaced by the identifier it points to.
    ///
    /// Called only right before Create; references are never re-resolved
    /// once the record is bound.
    async fn resolve_references(
        &self,
        _lookup: &dyn ReferenceLookup,
    ) -> Result<Self::Parameters, Error> {
        Ok(self.parameters().clone())
    }
}
