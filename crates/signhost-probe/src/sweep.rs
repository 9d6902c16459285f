//! Roster-wide and single-host probe runs against the store

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use signhost_api::Host;
use signhost_api::responses::SweepReport;
use signhost_store::{Store, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::traits::HostProber;

/// Probe every record and persist the results
///
/// Probes run with at most `concurrency` in flight. Results are applied by
/// id to the roster as it is when the sweep commits, inside one store
/// write, so records added, edited or deleted meanwhile are left as they
/// are. The commit runs on the blocking pool. A cancelled sweep persists
/// nothing.
///
/// # Errors
/// Returns a `StoreError` if persisting the results fails.
#[instrument(skip_all)]
pub async fn probe_all(
    store: &Arc<Store>,
    prober: &dyn HostProber,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<SweepReport, StoreError> {
    let hosts = store.get_all();
    let total = hosts.len();

    let sweep = stream::iter(hosts)
        .map(|host| prober.probe(host))
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<Host>>();

    let probed = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            info!(total, "probe sweep cancelled");
            return Ok(SweepReport::default());
        }
        probed = sweep => probed,
    };

    let results: HashMap<String, Host> = probed.into_iter().map(|h| (h.id.clone(), h)).collect();
    let commit = Arc::clone(store);
    let applied = tokio::task::spawn_blocking(move || commit.apply_probe_results(&results))
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;

    info!(probed = applied, total, "probe sweep finished");
    Ok(SweepReport { probed: applied })
}

/// Probe the record at `ip` and persist its probe-owned fields
///
/// # Errors
/// Returns `StoreError::NotFound` if no record has this address (before or
/// after probing) and `Io`/`Sqlite` if persisting fails.
#[instrument(skip(store, prober))]
pub async fn probe_one(
    store: &Store,
    prober: &dyn HostProber,
    ip: &str,
) -> Result<Host, StoreError> {
    let host = store.get_by_ip(ip)?;
    let probed = prober.probe(host).await;
    store.update(ip, |current| current.apply_probe_fields(&probed))
}
