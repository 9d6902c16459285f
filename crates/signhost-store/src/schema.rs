//! SQLite schema and row mapping for the `hosts` table

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, named_params};
use signhost_api::{CmsStatus, Host, HostStatus};

use crate::error::StoreError;

pub(crate) const CREATE_HOSTS: &str = "CREATE TABLE IF NOT EXISTS hosts (
    id TEXT PRIMARY KEY NOT NULL,
    position INTEGER NOT NULL,
    nickname TEXT NOT NULL DEFAULT '',
    ip_address TEXT NOT NULL DEFAULT '',
    vpn_ip_address TEXT NOT NULL DEFAULT '',
    hostname TEXT NOT NULL DEFAULT '',
    notes TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'unknown',
    status_vpn TEXT NOT NULL DEFAULT 'unknown',
    nsm_status TEXT NOT NULL DEFAULT '',
    nsm_status_vpn TEXT NOT NULL DEFAULT '',
    nsm_version TEXT NOT NULL DEFAULT '',
    nsm_version_vpn TEXT NOT NULL DEFAULT '',
    anthias_version TEXT NOT NULL DEFAULT '',
    anthias_version_vpn TEXT NOT NULL DEFAULT '',
    anthias_status TEXT NOT NULL DEFAULT '',
    anthias_status_vpn TEXT NOT NULL DEFAULT '',
    cms_status TEXT NOT NULL DEFAULT 'unknown',
    cms_status_vpn TEXT NOT NULL DEFAULT 'unknown',
    asset_count INTEGER NOT NULL DEFAULT 0,
    asset_count_vpn INTEGER NOT NULL DEFAULT 0,
    dashboard_url TEXT NOT NULL DEFAULT '',
    dashboard_url_vpn TEXT NOT NULL DEFAULT '',
    last_checked TEXT,
    last_checked_vpn TEXT
)";

const SELECT_HOSTS: &str = "SELECT * FROM hosts ORDER BY position, rowid";

const INSERT_HOST: &str = "INSERT INTO hosts (
    id, position, nickname, ip_address, vpn_ip_address, hostname, notes,
    status, status_vpn, nsm_status, nsm_status_vpn, nsm_version, nsm_version_vpn,
    anthias_version, anthias_version_vpn, anthias_status, anthias_status_vpn,
    cms_status, cms_status_vpn, asset_count, asset_count_vpn,
    dashboard_url, dashboard_url_vpn, last_checked, last_checked_vpn
) VALUES (
    :id, (SELECT COALESCE(MAX(position), -1) + 1 FROM hosts), :nickname, :ip_address,
    :vpn_ip_address, :hostname, :notes,
    :status, :status_vpn, :nsm_status, :nsm_status_vpn, :nsm_version, :nsm_version_vpn,
    :anthias_version, :anthias_version_vpn, :anthias_status, :anthias_status_vpn,
    :cms_status, :cms_status_vpn, :asset_count, :asset_count_vpn,
    :dashboard_url, :dashboard_url_vpn, :last_checked, :last_checked_vpn
)";

const UPDATE_HOST: &str = "UPDATE hosts SET
    nickname = :nickname, ip_address = :ip_address, vpn_ip_address = :vpn_ip_address,
    hostname = :hostname, notes = :notes,
    status = :status, status_vpn = :status_vpn,
    nsm_status = :nsm_status, nsm_status_vpn = :nsm_status_vpn,
    nsm_version = :nsm_version, nsm_version_vpn = :nsm_version_vpn,
    anthias_version = :anthias_version, anthias_version_vpn = :anthias_version_vpn,
    anthias_status = :anthias_status, anthias_status_vpn = :anthias_status_vpn,
    cms_status = :cms_status, cms_status_vpn = :cms_status_vpn,
    asset_count = :asset_count, asset_count_vpn = :asset_count_vpn,
    dashboard_url = :dashboard_url, dashboard_url_vpn = :dashboard_url_vpn,
    last_checked = :last_checked, last_checked_vpn = :last_checked_vpn
WHERE id = :id";

/// Open a connection and apply the connection-level settings
///
/// The rollback journal is used instead of WAL so that the database file on
/// its own is always a complete copy of the roster.
pub(crate) fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.pragma_update_and_check(None, "journal_mode", "DELETE", |row| {
        row.get::<_, String>(0)
    })?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    Ok(conn)
}

/// Run SQLite's own consistency check
pub(crate) fn integrity_check(conn: &Connection) -> Result<(), StoreError> {
    let verdict: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    if verdict == "ok" {
        Ok(())
    } else {
        Err(StoreError::Corrupt(verdict))
    }
}

pub(crate) fn ensure_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(CREATE_HOSTS, [])?;
    Ok(())
}

pub(crate) fn load_hosts(conn: &Connection) -> Result<Vec<Host>, StoreError> {
    let mut stmt = conn.prepare(SELECT_HOSTS)?;
    let hosts = stmt
        .query_map([], host_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(hosts)
}

pub(crate) fn insert_host(conn: &Connection, host: &Host) -> Result<(), StoreError> {
    write_host(conn, INSERT_HOST, host)
}

pub(crate) fn update_host(conn: &Connection, host: &Host) -> Result<(), StoreError> {
    write_host(conn, UPDATE_HOST, host)
}

pub(crate) fn delete_host(conn: &Connection, id: &str) -> Result<(), StoreError> {
    conn.execute("DELETE FROM hosts WHERE id = ?1", [id])?;
    Ok(())
}

pub(crate) fn delete_all(conn: &Connection) -> Result<(), StoreError> {
    conn.execute("DELETE FROM hosts", [])?;
    Ok(())
}

fn write_host(conn: &Connection, sql: &str, host: &Host) -> Result<(), StoreError> {
    let last_checked = host.last_checked.map(|t| t.to_rfc3339());
    let last_checked_vpn = host.last_checked_vpn.map(|t| t.to_rfc3339());
    let status = host.status.to_string();
    let status_vpn = host.status_vpn.to_string();
    let cms_status = host.cms_status.to_string();
    let cms_status_vpn = host.cms_status_vpn.to_string();

    conn.execute(
        sql,
        named_params! {
            ":id": host.id,
            ":nickname": host.nickname,
            ":ip_address": host.ip_address,
            ":vpn_ip_address": host.vpn_ip_address,
            ":hostname": host.hostname,
            ":notes": host.notes,
            ":status": status,
            ":status_vpn": status_vpn,
            ":nsm_status": host.nsm_status,
            ":nsm_status_vpn": host.nsm_status_vpn,
            ":nsm_version": host.nsm_version,
            ":nsm_version_vpn": host.nsm_version_vpn,
            ":anthias_version": host.anthias_version,
            ":anthias_version_vpn": host.anthias_version_vpn,
            ":anthias_status": host.anthias_status,
            ":anthias_status_vpn": host.anthias_status_vpn,
            ":cms_status": cms_status,
            ":cms_status_vpn": cms_status_vpn,
            ":asset_count": host.asset_count,
            ":asset_count_vpn": host.asset_count_vpn,
            ":dashboard_url": host.dashboard_url,
            ":dashboard_url_vpn": host.dashboard_url_vpn,
            ":last_checked": last_checked,
            ":last_checked_vpn": last_checked_vpn,
        },
    )?;
    Ok(())
}

fn host_from_row(row: &Row<'_>) -> rusqlite::Result<Host> {
    Ok(Host {
        id: row.get("id")?,
        nickname: row.get("nickname")?,
        ip_address: row.get("ip_address")?,
        vpn_ip_address: row.get("vpn_ip_address")?,
        hostname: row.get("hostname")?,
        notes: row.get("notes")?,
        status: HostStatus::parse_lossy(&row.get::<_, String>("status")?),
        status_vpn: HostStatus::parse_lossy(&row.get::<_, String>("status_vpn")?),
        nsm_status: row.get("nsm_status")?,
        nsm_status_vpn: row.get("nsm_status_vpn")?,
        nsm_version: row.get("nsm_version")?,
        nsm_version_vpn: row.get("nsm_version_vpn")?,
        anthias_version: row.get("anthias_version")?,
        anthias_version_vpn: row.get("anthias_version_vpn")?,
        anthias_status: row.get("anthias_status")?,
        anthias_status_vpn: row.get("anthias_status_vpn")?,
        cms_status: CmsStatus::parse_lossy(&row.get::<_, String>("cms_status")?),
        cms_status_vpn: CmsStatus::parse_lossy(&row.get::<_, String>("cms_status_vpn")?),
        asset_count: row.get("asset_count")?,
        asset_count_vpn: row.get("asset_count_vpn")?,
        dashboard_url: row.get("dashboard_url")?,
        dashboard_url_vpn: row.get("dashboard_url_vpn")?,
        last_checked: parse_timestamp(row.get("last_checked")?),
        last_checked_vpn: parse_timestamp(row.get("last_checked_vpn")?),
    })
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}
