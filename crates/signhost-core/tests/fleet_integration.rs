use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kameo::actor::Spawn;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use signhost_api::responses::{ReceiveReport, VersionInfo};
use signhost_api::{Host, HostStatus, NetworkPath};
use signhost_core::*;
use signhost_discovery::{ScanConfig, Scanner};
use signhost_probe::HostProber;
use signhost_store::Store;

// Mock implementations
struct HealthyProber;

#[async_trait]
impl HostProber for HealthyProber {
    async fn probe(&self, mut host: Host) -> Host {
        let mut state = host.network(NetworkPath::Primary);
        state.status = HostStatus::Healthy;
        host.set_network(NetworkPath::Primary, state);
        host
    }
}

#[derive(Default)]
struct MockTransport {
    selves: HashMap<String, Host>,
    identities: HashMap<String, VersionInfo>,
    rosters: HashMap<String, Vec<Host>>,
    down: HashSet<String>,
    sent: Mutex<Vec<(String, Vec<Host>, bool)>>,
}

impl MockTransport {
    fn unreachable(ip: &str) -> CoreError {
        CoreError::PeerUnreachable {
            peer: ip.to_string(),
            message: "connection refused".to_string(),
        }
    }

    fn sent(&self) -> Vec<(String, Vec<Host>, bool)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn fetch_self(&self, ip: &str) -> Result<Host, CoreError> {
        self.selves.get(ip).cloned().ok_or_else(|| Self::unreachable(ip))
    }

    async fn fetch_identity(&self, ip: &str) -> Result<VersionInfo, CoreError> {
        self.identities
            .get(ip)
            .cloned()
            .ok_or_else(|| Self::unreachable(ip))
    }

    async fn send_roster(
        &self,
        ip: &str,
        hosts: &[Host],
        merge: bool,
    ) -> Result<ReceiveReport, CoreError> {
        if self.down.contains(ip) {
            return Err(Self::unreachable(ip));
        }
        self.sent
            .lock()
            .unwrap()
            .push((ip.to_string(), hosts.to_vec(), merge));
        Ok(ReceiveReport {
            applied: hosts.len(),
            ..ReceiveReport::default()
        })
    }

    async fn fetch_roster(&self, ip: &str) -> Result<Vec<Host>, CoreError> {
        self.rosters.get(ip).cloned().ok_or_else(|| Self::unreachable(ip))
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    sync: Arc<FleetSync>,
    transport: Arc<MockTransport>,
}

fn identity() -> NodeIdentity {
    NodeIdentity {
        id: "self-node".to_string(),
        nickname: "Front desk".to_string(),
        hostname: "signage-01".to_string(),
        ip_address: "10.0.0.1".to_string(),
        vpn_ip_address: String::new(),
    }
}

fn fixture_with(transport: MockTransport, config: FleetConfig, scanner: Scanner) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("hosts.db")).unwrap());
    let transport = Arc::new(transport);
    let sync = Arc::new(FleetSync::new(FleetSyncArgs {
        store,
        prober: Arc::new(HealthyProber),
        transport: transport.clone(),
        scanner,
        config,
        identity: identity(),
    }));
    Fixture {
        _dir: dir,
        sync,
        transport,
    }
}

fn fixture(transport: MockTransport) -> Fixture {
    fixture_with(transport, FleetConfig::default(), Scanner::default())
}

fn host(id: &str, ip: &str) -> Host {
    Host {
        id: id.to_string(),
        ..Host::with_address(ip)
    }
}

fn ids(hosts: &[Host]) -> Vec<&str> {
    hosts.iter().map(|h| h.id.as_str()).collect()
}

/// Wait for a detached task to show its effect
async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

// ----------------------------------------------------------------------
// Receive
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_merge_receive_keeps_unrelated_records() {
    let f = fixture(MockTransport::default());
    f.sync.store().add(host("a", "10.0.0.1")).unwrap();

    let report = f.sync.receive(vec![host("b", "10.0.0.2")], true).unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(report.backup, None);
    assert_eq!(ids(&f.sync.list()), vec!["a", "b"]);
}

#[tokio::test]
async fn test_merge_receive_overwrites_by_id() {
    let f = fixture(MockTransport::default());
    f.sync.store().add(host("a", "10.0.0.1")).unwrap();

    let renamed = Host {
        nickname: "Lobby".to_string(),
        ..host("a", "10.0.0.1")
    };
    f.sync.receive(vec![renamed], true).unwrap();

    let roster = f.sync.list();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].nickname, "Lobby");
}

#[tokio::test]
async fn test_merge_receive_skips_malformed_records() {
    let f = fixture(MockTransport::default());

    let report = f
        .sync
        .receive(vec![host("x", "10.0.0"), host("b", "10.0.0.2")], true)
        .unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(ids(&f.sync.list()), vec!["b"]);
}

#[tokio::test]
async fn test_replace_receive_backs_up_then_replaces() {
    let f = fixture(MockTransport::default());
    f.sync.store().add(host("a", "10.0.0.1")).unwrap();
    f.sync.store().add(host("b", "10.0.0.2")).unwrap();
    let started = chrono::Utc::now() - chrono::Duration::seconds(1);

    let report = f.sync.receive(vec![host("c", "10.0.0.3")], false).unwrap();

    assert_eq!(report.applied, 1);
    assert!(report.backup.is_some());
    assert_eq!(ids(&f.sync.list()), vec!["c"]);

    let backups = f.sync.list_backups().unwrap();
    assert_eq!(Some(&backups[0].name), report.backup.as_ref());
    assert!(backups[0].created_at >= started);
}

#[tokio::test]
async fn test_replace_receive_drops_only_malformed_records() {
    let f = fixture(MockTransport::default());
    f.sync.store().add(host("a", "10.0.0.1")).unwrap();

    let report = f
        .sync
        .receive(vec![host("c", "10.0.0.3"), host("d", "999.0.0.1")], false)
        .unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(ids(&f.sync.list()), vec!["c"]);
}

// ----------------------------------------------------------------------
// Push and pull
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_push_failure_is_isolated_per_target() {
    let f = fixture(MockTransport {
        down: HashSet::from(["10.0.0.3".to_string()]),
        ..MockTransport::default()
    });
    f.sync.store().add(host("a", "10.0.0.2")).unwrap();

    let report = f
        .sync
        .push(vec![
            "10.0.0.2".to_string(),
            "10.0.0.3".to_string(),
            "not-an-ip".to_string(),
        ])
        .await;

    assert_eq!(report.delivered, vec!["10.0.0.2"]);
    assert_eq!(report.failed.len(), 2);
    assert!(report.failed.contains(&"10.0.0.3".to_string()));

    let sent = f.transport.sent();
    assert_eq!(sent.len(), 1);
    let (target, hosts, merge) = &sent[0];
    assert_eq!(target, "10.0.0.2");
    assert_eq!(ids(hosts), vec!["a"]);
    assert!(!merge, "push delivers in replace mode");
}

#[tokio::test]
async fn test_default_push_targets_skip_self_and_loopback() {
    let f = fixture(MockTransport::default());
    let store = f.sync.store();
    store.add(host("self-node", "10.0.0.1")).unwrap();
    store.add(host("lo", "127.0.0.1")).unwrap();
    store.add(host("peer-1", "10.0.0.2")).unwrap();
    store.add(host("peer-2", "10.0.0.3")).unwrap();

    assert_eq!(f.sync.push_targets(), vec!["10.0.0.2", "10.0.0.3"]);

    let report = f.sync.push(Vec::new()).await;
    assert_eq!(report.delivered, vec!["10.0.0.2", "10.0.0.3"]);
}

#[tokio::test]
async fn test_pull_merges_peer_roster() {
    let f = fixture(MockTransport {
        rosters: HashMap::from([(
            "10.0.0.8".to_string(),
            vec![host("p", "10.0.0.8"), host("q", "10.0.0.9")],
        )]),
        ..MockTransport::default()
    });
    f.sync.store().add(host("a", "10.0.0.2")).unwrap();

    let report = f.sync.pull("10.0.0.8").await.unwrap();

    assert_eq!(report.applied, 2);
    assert_eq!(ids(&f.sync.list()), vec!["a", "p", "q"]);
}

#[tokio::test]
async fn test_pull_unreachable_peer() {
    let f = fixture(MockTransport::default());

    let err = f.sync.pull("10.0.0.8").await.unwrap_err();
    assert!(matches!(err, CoreError::PeerUnreachable { .. }));

    let err = f.sync.pull("10.0.0").await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidAddress(_)));
}

// ----------------------------------------------------------------------
// Discovery resolution
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_self_description_evicts_stale_entry() {
    let described = Host {
        nickname: "Cafeteria".to_string(),
        ..host("Y", "192.168.50.50")
    };
    let f = fixture(MockTransport {
        selves: HashMap::from([("10.0.0.9".to_string(), described)]),
        ..MockTransport::default()
    });
    f.sync.store().add(host("X", "10.0.0.9")).unwrap();

    let stored = f
        .sync
        .resolve_candidate(Ipv4Addr::new(10, 0, 0, 9))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stored.id, "Y");
    assert_eq!(stored.ip_address, "10.0.0.9");
    let roster = f.sync.list();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].id, "Y");
    assert_eq!(roster[0].nickname, "Cafeteria");

    // The peer is told about us in merge mode
    eventually(|| !f.transport.sent().is_empty()).await;
    let (target, hosts, merge) = &f.transport.sent()[0];
    assert_eq!(target, "10.0.0.9");
    assert_eq!(ids(hosts), vec!["self-node"]);
    assert!(merge);
}

#[tokio::test]
async fn test_new_peer_is_probed_after_discovery() {
    let f = fixture(MockTransport {
        selves: HashMap::from([("10.0.0.9".to_string(), host("Y", "10.0.0.9"))]),
        ..MockTransport::default()
    });

    f.sync
        .resolve_candidate(Ipv4Addr::new(10, 0, 0, 9))
        .await
        .unwrap();

    let store = f.sync.store().clone();
    eventually(|| {
        store
            .get_by_ip("10.0.0.9")
            .is_ok_and(|h| h.status == HostStatus::Healthy)
    })
    .await;
}

#[tokio::test]
async fn test_identity_fallback_moves_known_peer() {
    let f = fixture(MockTransport {
        identities: HashMap::from([(
            "10.0.0.7".to_string(),
            VersionInfo {
                id: Some("k".to_string()),
                version: "1.2.0".to_string(),
                hostname: "signage-07".to_string(),
            },
        )]),
        ..MockTransport::default()
    });
    let known = Host {
        nickname: "Hallway".to_string(),
        status: HostStatus::Healthy,
        ..host("k", "10.0.0.4")
    };
    f.sync.store().add(known).unwrap();

    let moved = f
        .sync
        .resolve_candidate(Ipv4Addr::new(10, 0, 0, 7))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(moved.id, "k");
    assert_eq!(moved.ip_address, "10.0.0.7");
    assert_eq!(moved.nickname, "Hallway");
    assert_eq!(moved.status, HostStatus::Unreachable);
    assert!(f.sync.get("10.0.0.4").is_err());
    assert_eq!(f.sync.list().len(), 1);
}

#[tokio::test]
async fn test_unidentified_peer_gets_placeholder() {
    let f = fixture(MockTransport::default());

    let added = f
        .sync
        .resolve_candidate(Ipv4Addr::new(10, 0, 0, 12))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(added.nickname, PLACEHOLDER_NICKNAME);
    assert_eq!(added.nsm_version, PLACEHOLDER_VERSION);
    assert_eq!(added.ip_address, "10.0.0.12");
    assert!(!added.id.is_empty());
}

#[tokio::test]
async fn test_placeholder_never_displaces_existing_record() {
    let f = fixture(MockTransport::default());
    f.sync.store().add(host("z", "10.0.0.12")).unwrap();

    let changed = f
        .sync
        .resolve_candidate(Ipv4Addr::new(10, 0, 0, 12))
        .await
        .unwrap();

    assert!(changed.is_none());
    assert_eq!(ids(&f.sync.list()), vec!["z"]);
}

#[tokio::test]
async fn test_discover_streams_into_roster() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });

    let f = fixture_with(
        MockTransport {
            selves: HashMap::from([("127.0.0.1".to_string(), host("peer", "127.0.0.1"))]),
            ..MockTransport::default()
        },
        FleetConfig {
            discovery_port: port,
            ..FleetConfig::default()
        },
        Scanner::new(ScanConfig {
            dial_timeout: Duration::from_millis(300),
            budget: Duration::from_secs(20),
            ..ScanConfig::default()
        }),
    );

    let report = f
        .sync
        .discover(&CancellationToken::new(), Some("127.0.0.2"))
        .await
        .unwrap();

    assert_eq!(report.found, vec!["127.0.0.1"]);
    assert_eq!(report.resolved, vec!["127.0.0.1"]);
    assert_eq!(f.sync.get("127.0.0.1").unwrap().id, "peer");
}

// ----------------------------------------------------------------------
// Self registration
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_register_self_claims_own_address() {
    let f = fixture(MockTransport::default());
    f.sync.store().add(host("old-image", "10.0.0.1")).unwrap();

    let me = f.sync.register_self().unwrap();

    assert_eq!(me.id, "self-node");
    assert_eq!(me.hostname, "signage-01");
    assert_eq!(ids(&f.sync.list()), vec!["self-node"]);
    assert_eq!(f.sync.self_record().nickname, "Front desk");
    assert_eq!(f.sync.version_info().id.as_deref(), Some("self-node"));
}

// ----------------------------------------------------------------------
// Actor
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_fleet_actor_roster_round() {
    let f = fixture(MockTransport::default());
    let fleet = FleetActor::spawn(FleetActorArgs {
        sync: f.sync.clone(),
    });

    let added = fleet
        .ask(AddHost {
            host: Host::with_address("10.0.0.20"),
        })
        .await
        .unwrap();
    assert!(!added.id.is_empty());

    let report = fleet
        .ask(ReceiveRoster {
            hosts: vec![host("b", "10.0.0.21")],
            merge: true,
        })
        .await
        .unwrap();
    assert_eq!(report.applied, 1);

    let roster = fleet.ask(ListRoster).await.unwrap();
    assert_eq!(roster.len(), 2);

    let status = fleet.ask(GetStatus).await.unwrap();
    assert_eq!(status.hosts, 2);

    fleet.stop_gracefully().await.unwrap();
}

#[tokio::test]
async fn test_fleet_actor_backup_replace_restore() {
    let f = fixture(MockTransport::default());
    f.sync.store().add(host("a", "10.0.0.1")).unwrap();
    let fleet = FleetActor::spawn(FleetActorArgs {
        sync: f.sync.clone(),
    });

    let created = fleet.ask(CreateBackup).await.unwrap();
    let name = created.backup.unwrap();

    let report = fleet
        .ask(ReceiveRoster {
            hosts: vec![host("c", "10.0.0.3")],
            merge: false,
        })
        .await
        .unwrap();
    assert_eq!(report.applied, 1);
    assert!(report.backup.is_some());
    assert_eq!(ids(&f.sync.list()), vec!["c"]);

    let restored = fleet.ask(RestoreBackup { name }).await.unwrap();
    assert!(restored.backup.is_some());
    assert_eq!(ids(&f.sync.list()), vec!["a"]);

    fleet.stop_gracefully().await.unwrap();
}

#[tokio::test]
async fn test_fleet_actor_error_taxonomy() {
    let f = fixture(MockTransport::default());
    let fleet = FleetActor::spawn(FleetActorArgs {
        sync: f.sync.clone(),
    });

    let err: CoreError = fleet
        .ask(GetHost {
            ip: "10.0.0.99".to_string(),
        })
        .await
        .unwrap_err()
        .into();
    assert!(matches!(err, CoreError::NotFound(_)));

    let err: CoreError = fleet
        .ask(StartDiscovery {
            interface_address: Some("10.0.0".to_string()),
        })
        .await
        .unwrap_err()
        .into();
    assert!(matches!(err, CoreError::InvalidAddress(_)));

    let err: CoreError = fleet
        .ask(RestoreBackup {
            name: "missing.db".to_string(),
        })
        .await
        .unwrap_err()
        .into();
    assert!(matches!(err, CoreError::BackupUnavailable(_)));

    fleet.stop_gracefully().await.unwrap();
}

#[tokio::test]
async fn test_fleet_actor_detaches_pushes() {
    let f = fixture(MockTransport::default());
    f.sync.store().add(host("a", "10.0.0.2")).unwrap();
    let fleet = FleetActor::spawn(FleetActorArgs {
        sync: f.sync.clone(),
    });

    fleet
        .ask(PushRoster {
            targets: Vec::new(),
        })
        .await
        .unwrap();

    eventually(|| f.transport.sent().len() == 1).await;
    fleet.stop_gracefully().await.unwrap();
}
