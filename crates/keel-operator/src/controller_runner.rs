//! Controller runner - builds one controller future per managed kind
//!
//! Each kind gets its own [`Context`] and watch; the futures are composed by
//! the caller. This keeps controller construction pure and testable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use keel_managed::{error_policy, reconcile, Context, ManagedKind, ReconcilerConfig};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};
use tokio_util::sync::CancellationToken;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// A running controller
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Settings shared by every controller the operator starts
#[derive(Clone, Debug, Default)]
pub struct RunSettings {
    /// Timing knobs of the convergence loop
    pub config: ReconcilerConfig,
    /// Restrict watches to one namespace; all namespaces when unset
    pub namespace: Option<String>,
    /// Operator-wide shutdown token
    pub shutdown: CancellationToken,
}

impl RunSettings {
    fn api<K: ManagedKind>(&self, client: Client) -> Api<K> {
        match &self.namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }
}

/// Build the controller future for kind `K`
pub fn build_controller<K: ManagedKind>(client: Client, settings: &RunSettings) -> ControllerFuture {
    let ctx = Arc::new(
        Context::<K>::builder(client.clone())
            .config(settings.config.clone())
            .shutdown(settings.shutdown.clone())
            .build(),
    );
    let records = settings.api::<K>(client);
    let kind = K::kind(&()).to_string();

    tracing::info!(
        kind = %kind,
        namespace = settings.namespace.as_deref().unwrap_or("*"),
        "- {} controller",
        kind
    );

    Box::pin(
        Controller::new(records, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .shutdown_on_signal()
            .run(reconcile::<K>, error_policy::<K>, ctx)
            .for_each(log_reconcile_result(kind)),
    )
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    kind: String,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", kind),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", kind),
        }
        std::future::ready(())
    }
}
