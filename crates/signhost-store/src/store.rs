//! `Store`: the durable, lock-guarded host roster

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use rusqlite::Connection;
use signhost_api::responses::BackupInfo;
use signhost_api::{Host, RosterEvent};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::backup::{self, BACKUP_DIR};
use crate::error::StoreError;
use crate::roster::{Roster, UpsertOutcome, new_host_id};
use crate::schema;

/// Capacity of the change notification channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Result of [`Store::upsert`]
#[derive(Debug, Clone)]
pub struct Upserted {
    /// The record as stored
    pub host: Host,
    pub outcome: UpsertOutcome,
    /// Stale records removed because they held the incoming address
    pub evicted: Vec<Host>,
}

/// Durable host roster
///
/// Reads take the shared roster lock and return copies. Mutations take the
/// exclusive roster lock, persist to SQLite, and only then update the
/// in-memory arena, so a failed write leaves the roster unchanged. Backups
/// and restores go through the same exclusive lock.
pub struct Store {
    path: PathBuf,
    backup_dir: PathBuf,
    roster: RwLock<Roster>,
    conn: Mutex<Connection>,
    events: broadcast::Sender<RosterEvent>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("hosts", &self.roster.read().len())
            .finish_non_exhaustive()
    }
}

/// Open and fully validate a store file
fn probe_file(path: &Path) -> Result<(Connection, Vec<Host>), StoreError> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::Corrupt("store file missing".to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    if metadata.len() == 0 {
        return Err(StoreError::Corrupt("store file empty".to_string()));
    }

    let conn = schema::open_connection(path)?;
    schema::integrity_check(&conn)?;
    schema::ensure_schema(&conn)?;
    let hosts = schema::load_hosts(&conn)?;
    Ok((conn, hosts))
}

/// Validate and de-duplicate an incoming roster before any lock is taken
fn build_roster(hosts: Vec<Host>) -> Result<Roster, StoreError> {
    let mut next = Roster::default();
    for mut host in hosts {
        host.normalize_addresses();
        host.validate()?;
        next.upsert(host);
    }
    Ok(next)
}

/// Persist `next` as the whole roster and swap it in
///
/// Caller must hold the exclusive roster lock and the connection lock.
fn install_locked(
    roster: &mut Roster,
    conn: &mut Connection,
    next: Roster,
) -> Result<Vec<Host>, StoreError> {
    let tx = conn.transaction()?;
    schema::delete_all(&tx)?;
    for host in next.hosts() {
        schema::insert_host(&tx, host)?;
    }
    tx.commit()?;
    let installed = next.hosts().to_vec();
    *roster = next;
    Ok(installed)
}

/// Remove rollback/WAL side files that belong to a file about to be replaced
fn remove_side_files(path: &Path) {
    for suffix in ["-journal", "-wal", "-shm"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        let side = PathBuf::from(side);
        if side.exists()
            && let Err(e) = fs::remove_file(&side)
        {
            warn!(path = %side.display(), error = %e, "failed to remove side file");
        }
    }
}

/// Move an unusable store file aside for inspection
fn quarantine(path: &Path) {
    if !path.exists() {
        return;
    }
    let mut target = path.as_os_str().to_owned();
    target.push(".corrupt");
    let target = PathBuf::from(target);
    match fs::rename(path, &target) {
        Ok(()) => warn!(path = %target.display(), "moved unusable store file aside"),
        Err(e) => warn!(error = %e, "failed to move unusable store file aside"),
    }
    remove_side_files(path);
}

/// Restore from the newest usable backup, or start an empty roster
fn recover(path: &Path, backup_dir: &Path) -> Result<(Connection, Vec<Host>), StoreError> {
    let fresh = !path.exists();
    quarantine(path);

    let candidates = match backup::list(backup_dir, path) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "failed to list backups");
            Vec::new()
        }
    };

    let tried = candidates.len();
    for candidate in candidates {
        if let Err(e) = fs::copy(&candidate.path, path) {
            warn!(backup = %candidate.name, error = %e, "failed to copy backup");
            continue;
        }
        match probe_file(path) {
            Ok((conn, hosts)) => {
                warn!(
                    backup = %candidate.name,
                    hosts = hosts.len(),
                    "restored roster from backup"
                );
                return Ok((conn, hosts));
            }
            Err(e) => {
                warn!(backup = %candidate.name, error = %e, "backup unusable, trying older");
                let _ = fs::remove_file(path);
                remove_side_files(path);
            }
        }
    }

    if fresh && tried == 0 {
        info!(path = %path.display(), "creating new host store");
    } else {
        error!(path = %path.display(), "no usable backup found, starting with an empty roster");
    }
    if path.exists() {
        fs::remove_file(path)?;
    }
    remove_side_files(path);
    let conn = schema::open_connection(path)?;
    schema::ensure_schema(&conn)?;
    Ok((conn, Vec::new()))
}

impl Store {
    /// Open the store at `path`, recovering if necessary
    ///
    /// A missing, empty or corrupt file is replaced by the newest backup that
    /// opens cleanly, or by an empty roster if none does. Only failures to
    /// create a fresh store file are returned.
    ///
    /// # Errors
    /// Returns `StoreError::Io`/`Sqlite` if no store file can be created at all.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        fs::create_dir_all(&parent)?;
        let backup_dir = parent.join(BACKUP_DIR);

        let (conn, hosts) = match probe_file(&path) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "store failed integrity probe, recovering");
                recover(&path, &backup_dir)?
            }
        };

        info!(hosts = hosts.len(), "opened host store");

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            path,
            backup_dir,
            roster: RwLock::new(Roster::from_hosts(hosts)),
            conn: Mutex::new(conn),
            events,
        })
    }

    /// Path of the live store file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding backups
    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Subscribe to change notifications
    ///
    /// Sending never waits for receivers; a receiver that falls behind
    /// loses the oldest events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RosterEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: RosterEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Copy of every record in storage order
    #[must_use]
    pub fn get_all(&self) -> Vec<Host> {
        self.roster.read().hosts().to_vec()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roster.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Errors
    /// Returns `StoreError::NotFound` if no record has this id.
    pub fn get_by_id(&self, id: &str) -> Result<Host, StoreError> {
        self.roster
            .read()
            .by_id(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// # Errors
    /// Returns `StoreError::NotFound` if no record has this address.
    pub fn get_by_ip(&self, ip: &str) -> Result<Host, StoreError> {
        self.roster
            .read()
            .by_ip(ip.trim())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(ip.to_string()))
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Append a new record
    ///
    /// An empty id is replaced by a fresh one.
    ///
    /// # Errors
    /// Returns `InvalidAddress` for malformed addresses, `AddressInUse` or
    /// `DuplicateId` on collisions, and `Io`/`Sqlite` if persisting fails.
    #[instrument(skip_all, fields(host = %host.ip_address))]
    pub fn add(&self, mut host: Host) -> Result<Host, StoreError> {
        host.normalize_addresses();
        host.validate()?;
        if host.id.is_empty() {
            host.id = new_host_id();
        }

        let mut roster = self.roster.write();
        if roster.by_id(&host.id).is_some() {
            return Err(StoreError::DuplicateId(host.id));
        }
        if roster.by_ip(&host.ip_address).is_some() {
            return Err(StoreError::AddressInUse(host.ip_address));
        }

        {
            let conn = self.conn.lock();
            schema::insert_host(&conn, &host)?;
        }
        roster.push(host.clone());
        drop(roster);

        debug!(id = %host.id, "added host");
        self.notify(RosterEvent::HostAdded {
            ip: host.ip_address.clone(),
        });
        Ok(host)
    }

    /// Apply `mutate` to the record currently at `ip` and persist it
    ///
    /// The record keeps its id whatever the mutation does to it.
    ///
    /// # Errors
    /// Returns `NotFound` if no record has this address, `InvalidAddress` or
    /// `AddressInUse` if the mutated addresses are unusable, and
    /// `Io`/`Sqlite` if persisting fails.
    pub fn update<F>(&self, ip: &str, mutate: F) -> Result<Host, StoreError>
    where
        F: FnOnce(&mut Host),
    {
        let mut roster = self.roster.write();
        let current = roster
            .by_ip(ip.trim())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(ip.to_string()))?;

        let mut host = current.clone();
        mutate(&mut host);
        host.id = current.id.clone();
        host.normalize_addresses();
        host.validate()?;
        if let Some(other) = roster.by_ip(&host.ip_address)
            && other.id != host.id
        {
            return Err(StoreError::AddressInUse(host.ip_address));
        }

        {
            let conn = self.conn.lock();
            schema::update_host(&conn, &host)?;
        }
        roster.replace(host.clone());
        drop(roster);

        self.notify(RosterEvent::HostUpdated {
            ip: host.ip_address.clone(),
        });
        Ok(host)
    }

    /// Remove the record at `ip`
    ///
    /// # Errors
    /// Returns `NotFound` if no record has this address and `Io`/`Sqlite` if
    /// persisting fails.
    pub fn delete(&self, ip: &str) -> Result<Host, StoreError> {
        let mut roster = self.roster.write();
        let id = roster
            .by_ip(ip.trim())
            .map(|h| h.id.clone())
            .ok_or_else(|| StoreError::NotFound(ip.to_string()))?;

        {
            let conn = self.conn.lock();
            schema::delete_host(&conn, &id)?;
        }
        let removed = roster
            .remove_by_id(&id)
            .ok_or_else(|| StoreError::NotFound(ip.to_string()))?;
        drop(roster);

        debug!(id = %removed.id, ip = %removed.ip_address, "deleted host");
        self.notify(RosterEvent::HostRemoved {
            ip: removed.ip_address.clone(),
        });
        Ok(removed)
    }

    /// Insert or overwrite a record
    ///
    /// The existing record is matched by id, or by address if the incoming
    /// id is empty. Any other record at the incoming address is evicted as
    /// stale before the write.
    ///
    /// # Errors
    /// Returns `InvalidAddress` for malformed addresses and `Io`/`Sqlite` if
    /// persisting fails.
    #[instrument(skip_all, fields(host = %host.ip_address, id = %host.id))]
    pub fn upsert(&self, mut host: Host) -> Result<Upserted, StoreError> {
        host.normalize_addresses();
        host.validate()?;

        let mut roster = self.roster.write();
        let mut next = roster.clone();
        let plan = next.upsert(host);

        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            for stale in &plan.evicted {
                schema::delete_host(&tx, &stale.id)?;
            }
            match plan.outcome {
                UpsertOutcome::Inserted => schema::insert_host(&tx, &plan.host)?,
                UpsertOutcome::Updated => schema::update_host(&tx, &plan.host)?,
            }
            tx.commit()?;
        }
        *roster = next;
        drop(roster);

        for stale in &plan.evicted {
            info!(
                stale_id = %stale.id,
                ip = %stale.ip_address,
                new_id = %plan.host.id,
                "evicted stale entry"
            );
            self.notify(RosterEvent::HostRemoved {
                ip: stale.ip_address.clone(),
            });
        }
        let ip = plan.host.ip_address.clone();
        self.notify(match plan.outcome {
            UpsertOutcome::Inserted => RosterEvent::HostAdded { ip },
            UpsertOutcome::Updated => RosterEvent::HostUpdated { ip },
        });

        Ok(Upserted {
            host: plan.host,
            outcome: plan.outcome,
            evicted: plan.evicted,
        })
    }

    /// Discard the roster and install `hosts` in one transaction
    ///
    /// Duplicates within `hosts` collapse with the same precedence as
    /// [`Store::upsert`]: later records win.
    ///
    /// # Errors
    /// Returns `InvalidAddress` if any record has a malformed address (the
    /// roster is left untouched) and `Io`/`Sqlite` if persisting fails.
    #[instrument(skip_all, fields(count = hosts.len()))]
    pub fn replace_all(&self, hosts: Vec<Host>) -> Result<Vec<Host>, StoreError> {
        let next = build_roster(hosts)?;

        let mut roster = self.roster.write();
        let mut conn = self.conn.lock();
        let installed = install_locked(&mut roster, &mut conn, next)?;
        drop(conn);
        drop(roster);

        info!(count = installed.len(), "replaced roster");
        self.notify(RosterEvent::RosterReplaced {
            count: installed.len(),
        });
        Ok(installed)
    }

    /// Back up the live file and install `hosts` under one exclusive lock
    ///
    /// No mutation can land between the backup and the replacement, so
    /// every record that is discarded is in the returned backup.
    ///
    /// # Errors
    /// Returns `InvalidAddress` if any record has a malformed address
    /// (nothing is backed up or replaced) and `Io`/`Sqlite` if the backup or
    /// persisting fails.
    #[instrument(skip_all, fields(count = hosts.len()))]
    pub fn backup_and_replace_all(
        &self,
        hosts: Vec<Host>,
        max_backups: usize,
    ) -> Result<(Option<PathBuf>, Vec<Host>), StoreError> {
        let next = build_roster(hosts)?;

        let mut roster = self.roster.write();
        let mut conn = self.conn.lock();
        let backup = self.backup_locked(max_backups)?;
        let installed = install_locked(&mut roster, &mut conn, next)?;
        drop(conn);
        drop(roster);

        info!(count = installed.len(), "replaced roster after backup");
        self.notify(RosterEvent::RosterReplaced {
            count: installed.len(),
        });
        Ok((backup, installed))
    }

    /// Copy probe-owned fields from `results` onto the current records
    ///
    /// Results are matched by id against the roster as it is now, under the
    /// exclusive lock: records added meanwhile are kept, records deleted
    /// meanwhile stay deleted. Returns how many records were updated.
    ///
    /// # Errors
    /// Returns `Io`/`Sqlite` if persisting fails; the roster is unchanged.
    #[instrument(skip_all, fields(results = results.len()))]
    pub fn apply_probe_results(&self, results: &HashMap<String, Host>) -> Result<usize, StoreError> {
        let mut roster = self.roster.write();
        let updated: Vec<Host> = roster
            .hosts()
            .iter()
            .filter_map(|current| {
                results.get(&current.id).map(|result| {
                    let mut host = current.clone();
                    host.apply_probe_fields(result);
                    host
                })
            })
            .collect();
        if updated.is_empty() {
            return Ok(0);
        }

        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            for host in &updated {
                schema::update_host(&tx, host)?;
            }
            tx.commit()?;
        }
        for host in &updated {
            roster.replace(host.clone());
        }
        drop(roster);

        for host in &updated {
            self.notify(RosterEvent::HostUpdated {
                ip: host.ip_address.clone(),
            });
        }
        Ok(updated.len())
    }

    /// Keep the record at `ip` and remove every other record with its hostname
    ///
    /// A primary without a hostname removes nothing.
    ///
    /// # Errors
    /// Returns `NotFound` if no record has this address and `Io`/`Sqlite` if
    /// persisting fails.
    pub fn set_primary(&self, ip: &str) -> Result<Vec<Host>, StoreError> {
        let mut roster = self.roster.write();
        let primary = roster
            .by_ip(ip.trim())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(ip.to_string()))?;
        if primary.hostname.is_empty() {
            return Ok(Vec::new());
        }

        let duplicates: Vec<Host> = roster
            .hosts()
            .iter()
            .filter(|h| h.id != primary.id && h.hostname == primary.hostname)
            .cloned()
            .collect();
        if duplicates.is_empty() {
            return Ok(Vec::new());
        }

        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            for dup in &duplicates {
                schema::delete_host(&tx, &dup.id)?;
            }
            tx.commit()?;
        }
        for dup in &duplicates {
            roster.remove_by_id(&dup.id);
        }
        drop(roster);

        info!(
            primary = %primary.ip_address,
            hostname = %primary.hostname,
            removed = duplicates.len(),
            "deduplicated hostname"
        );
        for dup in &duplicates {
            self.notify(RosterEvent::HostRemoved {
                ip: dup.ip_address.clone(),
            });
        }
        Ok(duplicates)
    }

    // ------------------------------------------------------------------
    // Backups
    // ------------------------------------------------------------------

    /// Copy the live store file into the backup directory
    ///
    /// Returns `None` without creating anything when there is no live file.
    /// Afterwards prunes the oldest backups beyond `max_backups`.
    ///
    /// # Errors
    /// Returns `Io` if copying fails.
    pub fn backup_current(&self, max_backups: usize) -> Result<Option<PathBuf>, StoreError> {
        let _roster = self.roster.write();
        let _conn = self.conn.lock();
        self.backup_locked(max_backups)
    }

    /// Caller must hold the exclusive roster lock and the connection lock
    fn backup_locked(&self, max_backups: usize) -> Result<Option<PathBuf>, StoreError> {
        if !self.path.is_file() {
            debug!("no live store file, skipping backup");
            return Ok(None);
        }
        let target = backup::copy_to_backup(&self.path, &self.backup_dir)?;
        backup::prune(&self.backup_dir, &self.path, max_backups)?;
        info!(backup = %target.display(), "backed up host store");
        Ok(Some(target))
    }

    /// Backups on disk, newest first
    ///
    /// # Errors
    /// Returns `Io` if the backup directory cannot be read.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, StoreError> {
        let _roster = self.roster.write();
        let entries = backup::list(&self.backup_dir, &self.path)?;
        Ok(entries.iter().map(backup::BackupEntry::info).collect())
    }

    /// Install the named backup as the live store
    ///
    /// The current state is backed up first.
    ///
    /// # Errors
    /// Returns `BackupUnavailable` if the backup does not exist or cannot be
    /// read, `Corrupt` if it is not a usable store, and `Io`/`Sqlite` if
    /// installing it fails.
    #[instrument(skip(self))]
    pub fn restore_backup(
        &self,
        name: &str,
        max_backups: usize,
    ) -> Result<Option<PathBuf>, StoreError> {
        let mut roster = self.roster.write();
        let mut conn = self.conn.lock();

        let entry = backup::list(&self.backup_dir, &self.path)?
            .into_iter()
            .find(|e| e.name == name)
            .ok_or_else(|| StoreError::BackupUnavailable(name.to_string()))?;
        let bytes = fs::read(&entry.path)
            .map_err(|e| StoreError::BackupUnavailable(format!("{name}: {e}")))?;

        self.import_locked(&mut roster, &mut conn, &bytes, max_backups)
    }

    /// Install a serialized store file as the live store
    ///
    /// The snapshot is validated before anything is replaced; the current
    /// state is backed up first. Returns the path of that backup.
    ///
    /// # Errors
    /// Returns `Corrupt` if the bytes are not a usable store (the live store
    /// is untouched) and `Io`/`Sqlite` if installing it fails.
    #[instrument(skip_all, fields(bytes = bytes.len()))]
    pub fn import_snapshot(
        &self,
        bytes: &[u8],
        max_backups: usize,
    ) -> Result<Option<PathBuf>, StoreError> {
        let mut roster = self.roster.write();
        let mut conn = self.conn.lock();
        self.import_locked(&mut roster, &mut conn, bytes, max_backups)
    }

    fn import_locked(
        &self,
        roster: &mut Roster,
        conn: &mut Connection,
        bytes: &[u8],
        max_backups: usize,
    ) -> Result<Option<PathBuf>, StoreError> {
        let mut staging = self.path.as_os_str().to_owned();
        staging.push(".import");
        let staging = PathBuf::from(staging);

        fs::write(&staging, bytes)?;
        let hosts = match probe_file(&staging) {
            Ok((staged, hosts)) => {
                drop(staged);
                hosts
            }
            Err(e) => {
                let _ = fs::remove_file(&staging);
                remove_side_files(&staging);
                return Err(StoreError::Corrupt(format!("snapshot rejected: {e}")));
            }
        };

        let backup = self.backup_locked(max_backups)?;

        remove_side_files(&self.path);
        fs::rename(&staging, &self.path)?;
        *conn = schema::open_connection(&self.path)?;
        *roster = Roster::from_hosts(hosts);

        let count = roster.len();
        info!(count, "imported roster snapshot");
        self.notify(RosterEvent::RosterReplaced { count });
        Ok(backup)
    }

    /// Raw bytes of the live store file
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be read.
    pub fn snapshot_bytes(&self) -> Result<Vec<u8>, StoreError> {
        let _conn = self.conn.lock();
        Ok(fs::read(&self.path)?)
    }
}
