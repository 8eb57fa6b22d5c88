//! Observation: read the bound external resource and judge it against the spec

use keel_common::crd::{Condition, ManagedStatus};
use keel_common::{Error, Lifecycle, ManagedResource};
use tracing::debug;

use crate::external::ExternalClient;
use crate::kind::ManagedKind;

/// How the external resource compares to the record's desired state
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict<D> {
    /// Nothing exists for the record (or it has never been bound)
    Absent,
    /// External state matches every desired field
    UpToDate,
    /// These corrections are needed
    Drifted(Vec<D>),
}

impl<D> Verdict<D> {
    /// Whether an external resource was found
    pub fn exists(&self) -> bool {
        !matches!(self, Self::Absent)
    }
}

/// Observe the resource bound to `record`.
///
/// A record with no external name is `Absent` without any provider call; a
/// not-found read is `Absent` as well. On a successful read the observation
/// replaces `status.at_provider` and the Ready condition follows the
/// provider's lifecycle label. Any other read failure leaves `status`
/// untouched.
pub async fn observe<K: ManagedKind>(
    external: &K::External,
    record: &K,
    status: &mut ManagedStatus<K::Observation>,
) -> Result<Verdict<K::Drift>, Error> {
    let Some(external_name) = record.external_name() else {
        return Ok(Verdict::Absent);
    };

    let observed = match external.read(external_name).await {
        Ok(observed) => observed,
        Err(e) if e.is_not_found() => {
            debug!(record = %record.record_key(), external_name, "external resource not found");
            return Ok(Verdict::Absent);
        }
        Err(e) => return Err(e),
    };

    status.conditions.set(match K::lifecycle(&observed) {
        Lifecycle::Available => Condition::available(),
        Lifecycle::Creating => Condition::creating(),
        Lifecycle::Unavailable(label) => Condition::unavailable(label),
    });

    let drift = K::drift(record.parameters(), &observed);
    status.at_provider = Some(observed);

    if drift.is_empty() {
        Ok(Verdict::UpToDate)
    } else {
        debug!(
            record = %record.record_key(),
            drift = %drift.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
            "external resource drifted"
        );
        Ok(Verdict::Drifted(drift))
    }
}
