//! Backup file naming, listing and rotation

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use signhost_api::responses::BackupInfo;
use tracing::{debug, warn};

/// Name of the backup directory next to the live store file
pub(crate) const BACKUP_DIR: &str = "backups";

/// One backup file on disk
#[derive(Debug, Clone)]
pub(crate) struct BackupEntry {
    pub name: String,
    pub path: PathBuf,
    pub nanos: i64,
    pub size_bytes: u64,
}

impl BackupEntry {
    pub fn info(&self) -> BackupInfo {
        BackupInfo {
            name: self.name.clone(),
            created_at: DateTime::from_timestamp_nanos(self.nanos),
            size_bytes: self.size_bytes,
        }
    }
}

/// Stem and extension of the live file, e.g. `("hosts", "db")`
fn name_parts(live: &Path) -> (String, String) {
    let stem = live
        .file_stem()
        .map_or_else(|| "store".to_string(), |s| s.to_string_lossy().into_owned());
    let ext = live
        .extension()
        .map_or_else(|| "db".to_string(), |s| s.to_string_lossy().into_owned());
    (stem, ext)
}

/// `<stem>-<epoch nanos, 20 digits>.<ext>`
pub(crate) fn backup_name(live: &Path, nanos: i64) -> String {
    let (stem, ext) = name_parts(live);
    format!("{stem}-{nanos:020}.{ext}")
}

/// Timestamp embedded in a backup name, if the name belongs to `live`
pub(crate) fn parse_backup_name(live: &Path, name: &str) -> Option<i64> {
    let (stem, ext) = name_parts(live);
    let rest = name.strip_prefix(&stem)?.strip_prefix('-')?;
    let digits = rest.strip_suffix(&ext)?.strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// All backups of `live` in `dir`, newest first
///
/// A missing directory yields an empty list.
pub(crate) fn list(dir: &Path, live: &Path) -> io::Result<Vec<BackupEntry>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(nanos) = parse_backup_name(live, &name) else {
            continue;
        };
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        entries.push(BackupEntry {
            name,
            path: entry.path(),
            nanos,
            size_bytes: metadata.len(),
        });
    }

    entries.sort_by(|a, b| b.nanos.cmp(&a.nanos).then_with(|| b.name.cmp(&a.name)));
    Ok(entries)
}

/// Copy `live` into `dir` under a fresh timestamped name
pub(crate) fn copy_to_backup(live: &Path, dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let mut nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut target = dir.join(backup_name(live, nanos));
    while target.exists() {
        nanos += 1;
        target = dir.join(backup_name(live, nanos));
    }

    fs::copy(live, &target)?;
    debug!(backup = %target.display(), "wrote backup");
    Ok(target)
}

/// Delete the oldest backups so that at most `keep` remain
///
/// `keep` of zero is treated as one: the backup that was just taken is
/// never discarded.
pub(crate) fn prune(dir: &Path, live: &Path, keep: usize) -> io::Result<usize> {
    let keep = keep.max(1);
    let entries = list(dir, live)?;
    let mut removed = 0;
    for entry in entries.iter().skip(keep) {
        match fs::remove_file(&entry.path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(backup = %entry.name, error = %e, "failed to prune backup"),
        }
    }
    if removed > 0 {
        debug!(removed, keep, "pruned old backups");
    }
    Ok(removed)
}
