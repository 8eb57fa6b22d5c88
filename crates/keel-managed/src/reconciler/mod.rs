//! Convergence controller
//!
//! One pass of [`reconcile`] moves a record one step toward its desired
//! state: connect, observe, then create, correct, delete or release the
//! external resource as the verdict demands. The pass persists what it
//! learned in the record's status before returning, so observers see
//! progress even when a later step fails.

mod context;

pub use context::{Context, ContextBuilder, ReconcilerConfig, CONTROLLER_NAME};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use keel_common::crd::{
    condition_reasons, Condition, ManagedStatus, ReclaimPolicy, ReconcilePhase, CONDITION_READY,
};
use keel_common::events::{actions, reasons};
use keel_common::retry::retry_with_backoff;
use keel_common::{Error, ManagedResource, MANAGED_FINALIZER};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::external::ExternalClient;
use crate::kind::ManagedKind;
use crate::observe::{observe, Verdict};
use crate::publisher::SecretTarget;

/// Cancellation and deadline scope of one pass.
///
/// Only calls that change nothing are raced against it; a mutating call
/// that has started always runs to completion so its result is recorded.
struct PassGuard {
    token: CancellationToken,
    deadline: Instant,
    budget: Duration,
}

impl PassGuard {
    fn new(shutdown: &CancellationToken, budget: Duration) -> Self {
        Self {
            token: shutdown.child_token(),
            deadline: Instant::now() + budget,
            budget,
        }
    }

    /// Run a non-mutating call, abandoning it on cancellation or deadline
    async fn race<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, Error>>,
    ) -> Result<T, Error> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::cancelled(operation)),
            result = tokio::time::timeout_at(self.deadline, call) => {
                result.unwrap_or_else(|_| Err(Error::timeout(operation, self.budget)))
            }
        }
    }

    /// Refuse to start a mutating call once the pass is cancelled or overdue
    fn ensure_live(&self, operation: &str) -> Result<(), Error> {
        if self.token.is_cancelled() {
            return Err(Error::cancelled(operation));
        }
        if Instant::now() >= self.deadline {
            return Err(Error::timeout(operation, self.budget));
        }
        Ok(())
    }
}

/// Reconcile one managed resource record
#[instrument(skip(record, ctx), fields(kind = %K::kind(&()), record = %record.record_key()))]
pub async fn reconcile<K: ManagedKind>(record: Arc<K>, ctx: Arc<Context<K>>) -> Result<Action, Error> {
    let key = record.record_key();
    let has_finalizer = record.finalizers().iter().any(|f| f == MANAGED_FINALIZER);

    if record.is_deleting() && !has_finalizer {
        debug!("record is being removed and holds no finalizer");
        return Ok(Action::await_change());
    }
    if !has_finalizer {
        info!("adding finalizer");
        ctx.records.add_finalizer(&record, MANAGED_FINALIZER).await?;
    }

    let before = record.managed_status().cloned().unwrap_or_default();
    let mut status = before.clone();
    status.observed_generation = record.meta().generation;

    let guard = PassGuard::new(&ctx.shutdown, ctx.config.pass_timeout);
    match converge(&*record, &ctx, &guard, &mut status).await {
        Ok(ReconcilePhase::Deleted) => {
            ctx.clear_failures(&key);
            info!("record finalized");
            Ok(Action::await_change())
        }
        Ok(phase) => {
            ctx.clear_failures(&key);
            status.phase = phase;
            status.conditions.set(Condition::reconcile_success());
            if status != before {
                ctx.records.patch_status(&record, &status).await?;
            }
            debug!(%phase, "pass complete");
            Ok(requeue_after(phase, &status, &ctx.config))
        }
        Err(e) if e.is_aborted() => {
            warn!(error = %e, "pass aborted, status left unchanged");
            Err(e)
        }
        Err(e) => {
            status.phase = ReconcilePhase::Failed;
            status.conditions.set(Condition::reconcile_error(e.to_string()));
            if status != before {
                if let Err(persist) = ctx.records.patch_status(&record, &status).await {
                    warn!(error = %persist, "failed to record pass failure in status");
                }
            }
            Err(e)
        }
    }
}

/// Requeue after a failed pass.
///
/// Failures a user must fix wait a long fixed interval; everything else
/// backs off exponentially with the record's consecutive failure count.
pub fn error_policy<K: ManagedKind>(record: Arc<K>, error: &Error, ctx: Arc<Context<K>>) -> Action {
    let attempt = ctx.record_failure(&record.record_key());

    if error.is_configuration() {
        error!(
            ?error,
            record = %record.record_key(),
            attempt,
            "reconciliation failed, waiting for configuration change"
        );
        return Action::requeue(ctx.config.configuration_retry_interval);
    }

    let delay = ctx.config.backoff.delay_for(attempt);
    warn!(
        error = %error,
        record = %record.record_key(),
        attempt,
        delay_ms = delay.as_millis(),
        "reconciliation failed"
    );
    Action::requeue(delay)
}

fn requeue_after<O>(phase: ReconcilePhase, status: &ManagedStatus<O>, config: &ReconcilerConfig) -> Action {
    match phase {
        ReconcilePhase::Deleted => Action::await_change(),
        ReconcilePhase::Drifted => Action::requeue(config.drift_poll_interval),
        // Available, or stuck in a provider-side state that polling faster won't clear
        ReconcilePhase::UpToDate
            if !status
                .conditions
                .has_reason(CONDITION_READY, condition_reasons::CREATING) =>
        {
            Action::requeue(config.poll_interval)
        }
        _ => Action::requeue(config.creating_poll_interval),
    }
}

async fn converge<K: ManagedKind>(
    record: &K,
    ctx: &Context<K>,
    guard: &PassGuard,
    status: &mut ManagedStatus<K::Observation>,
) -> Result<ReconcilePhase, Error> {
    if record.is_deleting() {
        let Some(external_name) = record.external_name() else {
            ctx.records.remove_finalizer(record, MANAGED_FINALIZER).await?;
            return Ok(ReconcilePhase::Deleted);
        };
        if record.reclaim_policy() == ReclaimPolicy::Retain {
            ctx.records.remove_finalizer(record, MANAGED_FINALIZER).await?;
            info!(external_name, "released external resource");
            ctx.normal(
                record,
                reasons::RELEASED_EXTERNAL,
                actions::DELETE,
                format!("released {external_name} without deleting it"),
            )
            .await;
            return Ok(ReconcilePhase::Deleted);
        }
    }

    let api = match guard.race("connect", ctx.connections.resolve(record)).await {
        Ok(api) => api,
        Err(e) => return Err(ctx.warn(record, reasons::CANNOT_CONNECT, actions::CONNECT, e).await),
    };
    let external = K::connect(api);

    let verdict = match guard.race("observe", observe::<K>(&external, record, status)).await {
        Ok(verdict) => verdict,
        Err(e) => return Err(ctx.warn(record, reasons::CANNOT_OBSERVE, actions::OBSERVE, e).await),
    };

    if record.is_deleting() {
        return delete(record, ctx, guard, &external, &verdict, status).await;
    }

    match verdict {
        Verdict::Absent => match record.external_name() {
            Some(external_name) => {
                // The bound resource vanished; re-creating would silently swap identities
                status.conditions.set(Condition::external_missing(external_name));
                let e = Error::external_resource_missing(record.record_key(), external_name);
                Err(ctx.warn(record, reasons::EXTERNAL_MISSING, actions::OBSERVE, e).await)
            }
            None => create(record, ctx, guard, &external, status).await,
        },
        Verdict::Drifted(drift) => update(record, ctx, guard, &external, &drift, status).await,
        Verdict::UpToDate => Ok(ReconcilePhase::UpToDate),
    }
}

async fn create<K: ManagedKind>(
    record: &K,
    ctx: &Context<K>,
    guard: &PassGuard,
    external: &K::External,
    status: &mut ManagedStatus<K::Observation>,
) -> Result<ReconcilePhase, Error> {
    if let Err(e) = record.validate() {
        return Err(ctx.warn(record, reasons::CANNOT_CREATE, actions::CREATE, e).await);
    }
    let parameters = match guard
        .race("resolve references", record.resolve_references(ctx.references.as_ref()))
        .await
    {
        Ok(parameters) => parameters,
        Err(e) => return Err(ctx.warn(record, reasons::CANNOT_CREATE, actions::CREATE, e).await),
    };

    guard.ensure_live("create")?;
    let creation = match external.create(record, &parameters).await {
        Ok(creation) => creation,
        Err(e) => return Err(ctx.warn(record, reasons::CANNOT_CREATE, actions::CREATE, e).await),
    };
    let external_name = creation.external_name.as_str();

    // Losing this write would orphan the resource and create a duplicate next pass
    retry_with_backoff(&ctx.config.persist_retry, "record external name", || {
        ctx.records.set_external_name(record, external_name)
    })
    .await
    .inspect_err(|e| {
        error!(
            external_name,
            error = %e,
            "created external resource but could not record its identifier"
        )
    })?;

    info!(external_name, "created external resource");
    ctx.normal(
        record,
        reasons::CREATED_EXTERNAL,
        actions::CREATE,
        format!("created {external_name}"),
    )
    .await;

    status.at_provider = Some(creation.observation.clone());
    status.conditions.set(Condition::creating());

    if let Some(target) = SecretTarget::for_record(record) {
        let details = &creation.connection_details;
        let secret = format!("{}/{}", target.namespace, target.name);
        let published =
            retry_with_backoff(&ctx.config.persist_retry, "publish connection details", || {
                ctx.publisher.publish(&target, details)
            })
            .await;
        if let Err(e) = published {
            // Sticky: later passes keep this, the details are gone for good
            error!(external_name, secret = %secret, error = %e, "connection details lost");
            status
                .conditions
                .set(Condition::connection_publish_failed(format!(
                    "connection details for {external_name} were never written to {secret}: {e}"
                )));
            return Err(ctx
                .warn(record, reasons::CANNOT_PUBLISH_CONNECTION, actions::CREATE, e)
                .await);
        }
        status.conditions.set(Condition::connection_published(&secret));
        ctx.normal(
            record,
            reasons::PUBLISHED_CONNECTION,
            actions::CREATE,
            format!("wrote {} keys to {secret}", details.len()),
        )
        .await;
    }

    Ok(ReconcilePhase::Creating)
}

async fn update<K: ManagedKind>(
    record: &K,
    ctx: &Context<K>,
    guard: &PassGuard,
    external: &K::External,
    drift: &[K::Drift],
    status: &ManagedStatus<K::Observation>,
) -> Result<ReconcilePhase, Error> {
    let (Some(external_name), Some(observed)) = (record.external_name(), status.at_provider.as_ref())
    else {
        return Err(Error::internal("drift reported without a bound observation"));
    };

    guard.ensure_live("update")?;
    let outcome = match external
        .update(external_name, record.parameters(), observed, drift)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => return Err(ctx.warn(record, reasons::CANNOT_UPDATE, actions::UPDATE, e).await),
    };

    if !outcome.applied.is_empty() {
        info!(applied = ?outcome.applied, "corrected drift");
        ctx.normal(
            record,
            reasons::UPDATED_EXTERNAL,
            actions::UPDATE,
            outcome.applied.join(", "),
        )
        .await;
    }
    if !outcome.deferred.is_empty() {
        debug!(deferred = ?outcome.deferred, "corrections waiting on a precondition");
    }
    Ok(ReconcilePhase::Drifted)
}

async fn delete<K: ManagedKind>(
    record: &K,
    ctx: &Context<K>,
    guard: &PassGuard,
    external: &K::External,
    verdict: &Verdict<K::Drift>,
    status: &mut ManagedStatus<K::Observation>,
) -> Result<ReconcilePhase, Error> {
    let external_name = record.external_name().unwrap_or_default();

    if verdict.exists() {
        guard.ensure_live("delete")?;
        status.phase = ReconcilePhase::Deleting;
        status.conditions.set(Condition::deleting());
        ctx.records.patch_status(record, status).await?;

        match external.delete(external_name).await {
            Ok(()) => {
                info!(external_name, "deleted external resource");
                ctx.normal(
                    record,
                    reasons::DELETED_EXTERNAL,
                    actions::DELETE,
                    format!("deleted {external_name}"),
                )
                .await;
            }
            Err(e) if e.is_not_found() => debug!(external_name, "already deleted"),
            Err(e) => return Err(ctx.warn(record, reasons::CANNOT_DELETE, actions::DELETE, e).await),
        }
    } else {
        debug!(external_name, "external resource already absent");
    }

    ctx.records.remove_finalizer(record, MANAGED_FINALIZER).await?;
    Ok(ReconcilePhase::Deleted)
}
