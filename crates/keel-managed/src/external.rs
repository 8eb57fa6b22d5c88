//! Uniform capability interface over provider-specific CRUD calls

use std::collections::BTreeMap;

use async_trait::async_trait;
use keel_common::{Error, ManagedResource};

/// Key to byte-payload mapping handed to the connection publisher
pub type ConnectionDetails = BTreeMap<String, Vec<u8>>;

/// Result of a successful create call
#[derive(Clone, Debug, PartialEq)]
pub struct Creation<O> {
    /// Identifier to bind the record to
    pub external_name: String,
    /// State returned by the create call
    pub observation: O,
    /// One-time connection details (generated credentials, addresses)
    pub connection_details: ConnectionDetails,
}

/// What an update call did
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Corrections sent to the provider
    pub applied: Vec<String>,
    /// Corrections waiting on a precondition, retried on a later pass
    pub deferred: Vec<String>,
}

impl UpdateOutcome {
    /// Record a correction that was sent
    pub fn applied(&mut self, what: impl Into<String>) {
        self.applied.push(what.into());
    }

    /// Record a correction that waits for a precondition
    pub fn defer(&mut self, what: impl Into<String>) {
        self.deferred.push(what.into());
    }

    /// Turn collected failures into the result of the update.
    ///
    /// A lone failure with nothing applied is returned as-is. Any failure
    /// after at least one applied correction becomes a partial update; every
    /// failure after the first is carried in the message.
    pub fn finish(self, resource: &str, failures: Vec<Error>) -> Result<Self, Error> {
        if failures.is_empty() {
            return Ok(self);
        }
        Err(Error::update_failures(resource, self.applied, failures))
    }
}

/// Provider calls for one managed kind.
///
/// Implementations own no state beyond the API handle. Every error leaving an
/// adapter is wrapped with the operation and resource it concerned.
#[async_trait]
pub trait ExternalClient<K: ManagedResource>: Send + Sync {
    /// Read the resource bound to `external_name`
    async fn read(&self, external_name: &str) -> Result<K::Observation, Error>;

    /// Create the resource described by `parameters`
    async fn create(
        &self,
        record: &K,
        parameters: &K::Parameters,
    ) -> Result<Creation<K::Observation>, Error>;

    /// Issue the minimal calls correcting `drift`
    async fn update(
        &self,
        external_name: &str,
        desired: &K::Parameters,
        observed: &K::Observation,
        drift: &[K::Drift],
    ) -> Result<UpdateOutcome, Error>;

    /// Delete the resource bound to `external_name`
    async fn delete(&self, external_name: &str) -> Result<(), Error>;
}
