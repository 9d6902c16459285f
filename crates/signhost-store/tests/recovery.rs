use std::fs;
use std::path::Path;

use signhost_api::Host;
use signhost_store::Store;

fn host(id: &str, ip: &str) -> Host {
    Host {
        id: id.to_string(),
        ip_address: ip.to_string(),
        ..Host::default()
    }
}

fn ids(store: &Store) -> Vec<String> {
    store.get_all().into_iter().map(|h| h.id).collect()
}

fn corrupt(path: &Path) {
    fs::write(path, b"this file was scribbled over by a failing sd card").unwrap();
}

#[test]
fn test_corrupt_store_restores_newest_backup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts.db");
    {
        let store = Store::open(&path).unwrap();
        store.add(host("a", "10.0.0.1")).unwrap();
        store.backup_current(10).unwrap();
        store.add(host("b", "10.0.0.2")).unwrap();
        store.backup_current(10).unwrap();
        store.add(host("c", "10.0.0.3")).unwrap();
    }
    corrupt(&path);

    let store = Store::open(&path).unwrap();
    assert_eq!(ids(&store), vec!["a", "b"]);
}

#[test]
fn test_corrupt_store_skips_unusable_backups() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts.db");
    {
        let store = Store::open(&path).unwrap();
        store.add(host("a", "10.0.0.1")).unwrap();
        store.backup_current(10).unwrap();
        store.add(host("b", "10.0.0.2")).unwrap();
        let newest = store.backup_current(10).unwrap().unwrap();
        corrupt(&newest);
    }
    corrupt(&path);

    let store = Store::open(&path).unwrap();
    assert_eq!(ids(&store), vec!["a"]);
}

#[test]
fn test_corrupt_store_without_backups_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts.db");
    {
        let store = Store::open(&path).unwrap();
        store.add(host("a", "10.0.0.1")).unwrap();
    }
    corrupt(&path);

    let store = Store::open(&path).unwrap();
    assert!(store.is_empty());
    store.add(host("b", "10.0.0.2")).unwrap();
    assert_eq!(ids(&store), vec!["b"]);
}

#[test]
fn test_empty_file_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts.db");
    {
        let store = Store::open(&path).unwrap();
        store.add(host("a", "10.0.0.1")).unwrap();
        store.backup_current(10).unwrap();
    }
    fs::write(&path, b"").unwrap();

    let store = Store::open(&path).unwrap();
    assert_eq!(ids(&store), vec!["a"]);
}

#[test]
fn test_missing_file_restores_backup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts.db");
    {
        let store = Store::open(&path).unwrap();
        store.add(host("a", "10.0.0.1")).unwrap();
        store.backup_current(10).unwrap();
    }
    fs::remove_file(&path).unwrap();

    let store = Store::open(&path).unwrap();
    assert_eq!(ids(&store), vec!["a"]);
}

#[test]
fn test_fresh_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("data").join("hosts.db");

    let store = Store::open(&path).unwrap();
    assert!(store.is_empty());
    assert!(path.exists());
    assert!(store.backup_current(10).unwrap().is_some());
}

#[test]
fn test_concurrent_writers_serialize() {
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(Store::open(dir.path().join("hosts.db")).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..20 {
                    store
                        .upsert(host(&format!("{t}-{i}"), &format!("10.{t}.0.{}", i + 1)))
                        .unwrap();
                    let _ = store.get_all();
                }
                if t % 2 == 0 {
                    store.backup_current(3).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 160);
    assert!(store.list_backups().unwrap().len() <= 3);

    let path = store.path().to_path_buf();
    drop(store);
    assert_eq!(Store::open(&path).unwrap().len(), 160);
}
