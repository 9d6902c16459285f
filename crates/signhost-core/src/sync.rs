//! Fleet synchronization: gossip push/receive, pull and discovery resolution
//!
//! Peers are autonomous and trust each other fully. A push delivers the
//! whole local roster; the receiver either merges it record by record or,
//! after a backup, replaces its roster with it. Nothing here orders or
//! reconciles concurrent pushes: the fleet converges eventually.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use signhost_api::requests::EditHostRequest;
use signhost_api::responses::{
    BackupCreated, BackupInfo, DiscoveryReport, PushReport, ReceiveReport, SweepReport,
    VersionInfo,
};
use signhost_api::{Host, HostStatus, NetworkPath, validate_ipv4};
use signhost_discovery::Scanner;
use signhost_probe::{HostProber, probe_all, probe_one};
use signhost_store::Store;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{FleetConfig, NodeIdentity};
use crate::error::CoreError;
use crate::transport::PeerTransport;

/// Nickname given to peers that could not describe themselves
pub const PLACEHOLDER_NICKNAME: &str = "Discovered Host";
/// Service version recorded for such peers
pub const PLACEHOLDER_VERSION: &str = "unknown";

/// Collaborators of a [`FleetSync`]
pub struct FleetSyncArgs {
    pub store: Arc<Store>,
    pub prober: Arc<dyn HostProber>,
    pub transport: Arc<dyn PeerTransport>,
    pub scanner: Scanner,
    pub config: FleetConfig,
    pub identity: NodeIdentity,
}

/// Fleet coordinator over one local store
pub struct FleetSync {
    store: Arc<Store>,
    prober: Arc<dyn HostProber>,
    transport: Arc<dyn PeerTransport>,
    scanner: Scanner,
    config: FleetConfig,
    identity: NodeIdentity,
}

fn file_name(path: Option<PathBuf>) -> Option<String> {
    path.and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
}

impl FleetSync {
    #[must_use]
    pub fn new(args: FleetSyncArgs) -> Self {
        Self {
            store: args.store,
            prober: args.prober,
            transport: args.transport,
            scanner: args.scanner,
            config: args.config,
            identity: args.identity,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    #[must_use]
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    // ------------------------------------------------------------------
    // Self
    // ------------------------------------------------------------------

    /// Record this node in its own roster
    ///
    /// Operator fields and probe results of an existing record are kept;
    /// name and addresses come from the identity. Any other record holding
    /// this node's address is evicted.
    ///
    /// # Errors
    /// Returns `InvalidAddress` if the identity's addresses are malformed
    /// and `StoreIo` if persisting fails.
    pub fn register_self(self: &Arc<Self>) -> Result<Host, CoreError> {
        let mut host = self
            .store
            .get_by_id(&self.identity.id)
            .unwrap_or_else(|_| self.identity.to_host());
        host.nickname.clone_from(&self.identity.nickname);
        host.hostname.clone_from(&self.identity.hostname);
        host.ip_address.clone_from(&self.identity.ip_address);
        host.vpn_ip_address.clone_from(&self.identity.vpn_ip_address);

        let stored = self.store.upsert(host)?.host;
        info!(id = %stored.id, ip = %stored.ip_address, "registered local node");
        if stored.address(NetworkPath::Primary).is_some() {
            self.spawn_probe(stored.ip_address.clone());
        }
        Ok(stored)
    }

    /// This node's record as currently stored
    #[must_use]
    pub fn self_record(&self) -> Host {
        self.store
            .get_by_id(&self.identity.id)
            .unwrap_or_else(|_| self.identity.to_host())
    }

    #[must_use]
    pub fn version_info(&self) -> VersionInfo {
        VersionInfo {
            id: Some(self.identity.id.clone()),
            version: env!("CARGO_PKG_VERSION").to_string(),
            hostname: self.identity.hostname.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Roster
    // ------------------------------------------------------------------

    #[must_use]
    pub fn list(&self) -> Vec<Host> {
        self.store.get_all()
    }

    /// # Errors
    /// Returns `NotFound` if no record has this address.
    pub fn get(&self, ip: &str) -> Result<Host, CoreError> {
        Ok(self.store.get_by_ip(ip.trim())?)
    }

    /// Add a record and probe it in the background
    ///
    /// # Errors
    /// Returns `InvalidAddress`, `AddressInUse` or `StoreIo`.
    pub fn add(self: &Arc<Self>, host: Host) -> Result<Host, CoreError> {
        let host = self.store.add(host)?;
        if host.address(NetworkPath::Primary).is_some() {
            self.spawn_probe(host.ip_address.clone());
        }
        Ok(host)
    }

    /// Apply an inline edit; a changed address is re-probed
    ///
    /// # Errors
    /// Returns `NotFound`, `InvalidAddress`, `AddressInUse` or `StoreIo`.
    pub fn edit(self: &Arc<Self>, ip: &str, edit: EditHostRequest) -> Result<Host, CoreError> {
        let ip = ip.trim();
        let host = self.store.update(ip, |host| {
            if let Some(nickname) = edit.nickname {
                host.nickname = nickname;
            }
            if let Some(hostname) = edit.hostname {
                host.hostname = hostname;
            }
            if let Some(notes) = edit.notes {
                host.notes = notes;
            }
            if let Some(addr) = edit.ip_address {
                host.ip_address = addr;
            }
            if let Some(addr) = edit.vpn_ip_address {
                host.vpn_ip_address = addr;
            }
        })?;
        if host.ip_address != ip && host.address(NetworkPath::Primary).is_some() {
            self.spawn_probe(host.ip_address.clone());
        }
        Ok(host)
    }

    /// # Errors
    /// Returns `NotFound` or `StoreIo`.
    pub fn remove(&self, ip: &str) -> Result<Host, CoreError> {
        Ok(self.store.delete(ip.trim())?)
    }

    /// Keep the record at `ip` as the only one with its hostname
    ///
    /// # Errors
    /// Returns `NotFound` or `StoreIo`.
    pub fn set_primary(&self, ip: &str) -> Result<Vec<Host>, CoreError> {
        Ok(self.store.set_primary(ip.trim())?)
    }

    // ------------------------------------------------------------------
    // Probing
    // ------------------------------------------------------------------

    /// # Errors
    /// Returns `NotFound` or `StoreIo`.
    pub async fn probe_host(&self, ip: &str) -> Result<Host, CoreError> {
        Ok(probe_one(&self.store, self.prober.as_ref(), ip.trim()).await?)
    }

    /// Probe `ip` on a detached task, persisting probe-owned fields only
    pub fn spawn_probe(self: &Arc<Self>, ip: String) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            match sync.probe_host(&ip).await {
                Ok(host) => debug!(host = %ip, status = %host.status, "probe stored"),
                Err(e) => warn!(host = %ip, error = %e, "background probe failed"),
            }
        })
    }

    /// # Errors
    /// Returns `StoreIo` if persisting the results fails.
    pub async fn probe_sweep(&self, cancel: &CancellationToken) -> Result<SweepReport, CoreError> {
        Ok(probe_all(
            &self.store,
            self.prober.as_ref(),
            self.config.probe_concurrency,
            cancel,
        )
        .await?)
    }

    // ------------------------------------------------------------------
    // Gossip
    // ------------------------------------------------------------------

    /// Every roster address that is a peer: non-empty, not loopback, not ours
    #[must_use]
    pub fn push_targets(&self) -> Vec<String> {
        self.store
            .get_all()
            .into_iter()
            .map(|h| h.ip_address)
            .filter(|ip| {
                validate_ipv4(ip).is_ok_and(|addr| !addr.is_loopback()) && !self.identity.owns(ip)
            })
            .collect()
    }

    /// Send the full roster, replace mode, to `targets` (all peers if empty)
    ///
    /// Deliveries run concurrently; a failed target is logged and reported
    /// without affecting the others.
    #[instrument(skip_all, fields(targets = targets.len()))]
    pub async fn push(&self, targets: Vec<String>) -> PushReport {
        let targets = if targets.is_empty() {
            self.push_targets()
        } else {
            targets
        };
        let hosts = self.store.get_all();
        let hosts = hosts.as_slice();

        let deliveries = targets.into_iter().map(|target| async move {
            let outcome = match validate_ipv4(&target) {
                Ok(addr) => self
                    .transport
                    .send_roster(&addr.to_string(), hosts, false)
                    .await
                    .map(|_| ()),
                Err(e) => Err(CoreError::from(e)),
            };
            (target, outcome)
        });

        let mut report = PushReport::default();
        for (target, outcome) in join_all(deliveries).await {
            match outcome {
                Ok(()) => {
                    debug!(peer = %target, "roster delivered");
                    report.delivered.push(target);
                }
                Err(e) => {
                    warn!(peer = %target, error = %e, "roster push failed");
                    report.failed.push(target);
                }
            }
        }
        info!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "roster push finished"
        );
        report
    }

    /// Fetch a peer's roster and merge it into ours
    ///
    /// # Errors
    /// Returns `InvalidAddress` for a malformed peer, `PeerUnreachable` if
    /// the fetch fails, and `StoreIo` if persisting fails.
    #[instrument(skip(self))]
    pub async fn pull(&self, peer: &str) -> Result<ReceiveReport, CoreError> {
        let addr = validate_ipv4(peer)?.to_string();
        let hosts = self.transport.fetch_roster(&addr).await?;
        info!(peer = %addr, count = hosts.len(), "pulled peer roster");
        self.receive(hosts, true)
    }

    /// Apply a roster received from a peer
    ///
    /// Merge mode upserts each record and never deletes; records that
    /// cannot be stored are logged and skipped. Replace mode backs up the
    /// store, drops malformed records and installs the rest as the roster.
    ///
    /// # Errors
    /// Returns `StoreIo` if persisting or the backup fails.
    #[instrument(skip(self, hosts), fields(count = hosts.len()))]
    pub fn receive(&self, hosts: Vec<Host>, merge: bool) -> Result<ReceiveReport, CoreError> {
        let mut report = ReceiveReport::default();

        if merge {
            for host in hosts {
                let ip = host.ip_address.clone();
                match self.store.upsert(host) {
                    Ok(_) => report.applied += 1,
                    Err(e) if e.is_io() => return Err(e.into()),
                    Err(e) => {
                        warn!(host = %ip, error = %e, "skipping received record");
                        report.skipped += 1;
                    }
                }
            }
            info!(applied = report.applied, skipped = report.skipped, "merged roster");
            return Ok(report);
        }

        let total = hosts.len();
        let valid: Vec<Host> = hosts
            .into_iter()
            .filter_map(|mut host| {
                host.normalize_addresses();
                match host.validate() {
                    Ok(()) => Some(host),
                    Err(e) => {
                        warn!(host = %host.ip_address, error = %e, "skipping received record");
                        None
                    }
                }
            })
            .collect();

        let (backup, stored) = self
            .store
            .backup_and_replace_all(valid, self.config.max_backups)?;
        report.backup = file_name(backup);
        report.applied = stored.len();
        report.skipped = total - stored.len();
        info!(
            applied = report.applied,
            skipped = report.skipped,
            backup = report.backup.as_deref().unwrap_or("none"),
            "replaced roster"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Scan for peers and fold each one into the roster as it answers
    ///
    /// # Errors
    /// Returns `InvalidAddress` for a malformed override and `Discovery` if
    /// the local interfaces cannot be listed. Per-peer failures are logged.
    #[instrument(skip(self, cancel))]
    pub async fn discover(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        interface_address: Option<&str>,
    ) -> Result<DiscoveryReport, CoreError> {
        let mut candidates =
            self.scanner
                .scan(cancel, self.config.discovery_port, interface_address)?;

        let mut report = DiscoveryReport::default();
        let mut resolving = JoinSet::new();
        while let Some(candidate) = candidates.recv().await {
            let ip = candidate.ip.to_string();
            if self.identity.owns(&ip) {
                debug!(host = %ip, "skipping own address");
                continue;
            }
            report.found.push(ip);
            let sync = Arc::clone(self);
            resolving.spawn(async move { sync.resolve_candidate(candidate.ip).await });
        }

        while let Some(joined) = resolving.join_next().await {
            match joined {
                Ok(Ok(Some(host))) => report.resolved.push(host.ip_address),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => warn!(error = %e, "failed to resolve discovered peer"),
                Err(e) => warn!(error = %e, "resolve task failed"),
            }
        }

        info!(
            found = report.found.len(),
            resolved = report.resolved.len(),
            "discovery finished"
        );
        Ok(report)
    }

    /// Fold one discovered address into the roster
    ///
    /// Returns the stored record when the roster changed.
    ///
    /// # Errors
    /// Returns `StoreIo` if persisting fails.
    #[instrument(skip(self))]
    pub async fn resolve_candidate(
        self: &Arc<Self>,
        addr: Ipv4Addr,
    ) -> Result<Option<Host>, CoreError> {
        let ip = addr.to_string();
        match self.transport.fetch_self(&ip).await {
            Ok(described) => {
                if described.id == self.identity.id {
                    debug!(host = %ip, "peer describes this node, ignoring");
                    return Ok(None);
                }
                let host = self.adopt_described(&ip, described)?;
                self.spawn_mutual_push(ip);
                Ok(Some(host))
            }
            Err(e) => {
                debug!(host = %ip, error = %e, "no self-description, trying identity");
                self.adopt_identified(&ip).await
            }
        }
    }

    /// Store a peer's own record at the address it was found on
    fn adopt_described(self: &Arc<Self>, ip: &str, mut host: Host) -> Result<Host, CoreError> {
        host.ip_address = ip.to_string();
        host.normalize_addresses();
        if let Err(e) = host.validate() {
            warn!(host = %ip, error = %e, "dropping malformed vpn address from peer");
            host.vpn_ip_address.clear();
        }

        let previous = if host.id.is_empty() {
            None
        } else {
            self.store.get_by_id(&host.id).ok()
        };
        let upserted = self.store.upsert(host)?;
        if !upserted.evicted.is_empty() {
            debug!(host = %ip, evicted = upserted.evicted.len(), "stale entries replaced");
        }
        if previous.is_none_or(|p| p.ip_address != ip) {
            self.spawn_probe(ip.to_string());
        }
        Ok(upserted.host)
    }

    /// Fallback for peers that only answer the identification call
    async fn adopt_identified(self: &Arc<Self>, ip: &str) -> Result<Option<Host>, CoreError> {
        let identity = match self.transport.fetch_identity(ip).await {
            Ok(info) => info.id.filter(|id| !id.is_empty()),
            Err(e) => {
                debug!(host = %ip, error = %e, "peer did not identify itself");
                None
            }
        };
        if identity.as_deref() == Some(self.identity.id.as_str()) {
            return Ok(None);
        }

        if let Some(id) = &identity
            && let Ok(mut known) = self.store.get_by_id(id)
        {
            if known.ip_address == ip {
                return Ok(None);
            }
            info!(id = %id, from = %known.ip_address, to = %ip, "known peer moved");
            known.ip_address = ip.to_string();
            known.status = HostStatus::Unreachable;
            let moved = self.store.upsert(known)?.host;
            self.spawn_probe(ip.to_string());
            return Ok(Some(moved));
        }

        if self.store.get_by_ip(ip).is_ok() {
            return Ok(None);
        }
        let placeholder = Host {
            nickname: PLACEHOLDER_NICKNAME.to_string(),
            nsm_version: PLACEHOLDER_VERSION.to_string(),
            id: identity.unwrap_or_default(),
            ..Host::with_address(ip)
        };
        let added = self.store.add(placeholder)?;
        info!(host = %ip, id = %added.id, "added placeholder for discovered peer");
        self.spawn_probe(ip.to_string());
        Ok(Some(added))
    }

    /// Announce this node to a freshly discovered peer, merge mode
    fn spawn_mutual_push(self: &Arc<Self>, ip: String) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            let me = vec![sync.self_record()];
            match sync.transport.send_roster(&ip, &me, true).await {
                Ok(_) => debug!(peer = %ip, "announced self to peer"),
                Err(e) => warn!(peer = %ip, error = %e, "failed to announce self to peer"),
            }
        })
    }

    // ------------------------------------------------------------------
    // Backups
    // ------------------------------------------------------------------

    /// # Errors
    /// Returns `StoreIo` if copying fails.
    pub fn create_backup(&self) -> Result<BackupCreated, CoreError> {
        let backup = file_name(self.store.backup_current(self.config.max_backups)?);
        Ok(BackupCreated { backup })
    }

    /// # Errors
    /// Returns `StoreIo` if the backup directory cannot be read.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, CoreError> {
        Ok(self.store.list_backups()?)
    }

    /// # Errors
    /// Returns `BackupUnavailable`, `InvalidSnapshot` or `StoreIo`.
    pub fn restore_backup(&self, name: &str) -> Result<BackupCreated, CoreError> {
        let backup = file_name(
            self.store
                .restore_backup(name, self.config.import_max_backups)?,
        );
        Ok(BackupCreated { backup })
    }

    /// # Errors
    /// Returns `InvalidSnapshot` if the bytes are not a store, or `StoreIo`.
    pub fn import_snapshot(&self, bytes: &[u8]) -> Result<BackupCreated, CoreError> {
        let backup = file_name(
            self.store
                .import_snapshot(bytes, self.config.import_max_backups)?,
        );
        Ok(BackupCreated { backup })
    }

    /// # Errors
    /// Returns `StoreIo` if the live file cannot be read.
    pub fn snapshot(&self) -> Result<Vec<u8>, CoreError> {
        Ok(self.store.snapshot_bytes()?)
    }
}
