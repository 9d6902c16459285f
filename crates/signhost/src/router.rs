//! HTTP router configuration

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api::docs::ApiDoc;
use crate::api::{backups, fleet, hosts, system, ws};
use crate::state::AppState;

/// Largest store file accepted by the import endpoint
const MAX_SNAPSHOT_BYTES: usize = 64 * 1024 * 1024;

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // System endpoints
        .route("/health", get(system::health))
        .route("/api/self", get(system::self_description))
        .route("/api/version", get(system::version))
        // Roster
        .route("/api/hosts", get(hosts::list_hosts).post(hosts::add_host))
        .route(
            "/api/hosts/{ip}",
            get(hosts::get_host)
                .patch(hosts::edit_host)
                .delete(hosts::delete_host),
        )
        .route("/api/hosts/{ip}/primary", post(hosts::set_primary))
        .route("/api/hosts/{ip}/probe", post(hosts::probe_host))
        .route("/api/probe", post(hosts::probe_all))
        // Discovery and gossip
        .route("/api/discovery", post(fleet::start_discovery))
        .route("/api/fleet/push", post(fleet::push))
        .route("/api/fleet/pull", post(fleet::pull))
        .route("/api/fleet/receive", post(fleet::receive))
        // Backups
        .route(
            "/api/backups",
            get(backups::list_backups).post(backups::create_backup),
        )
        .route("/api/backups/snapshot", get(backups::snapshot))
        .route(
            "/api/backups/import",
            post(backups::import_snapshot).layer(DefaultBodyLimit::max(MAX_SNAPSHOT_BYTES)),
        )
        .route("/api/backups/{name}/restore", post(backups::restore_backup))
        // Events
        .route("/ws/events", get(ws::events))
        // API docs
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(Scalar::with_url("/scalar", ApiDoc::openapi()))
        // State
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use kameo::actor::Spawn;
    use signhost_api::requests::EditHostRequest;
    use signhost_api::{Host, RosterEvent};
    use signhost_client::{ClientError, HttpClient, WsClient};
    use signhost_core::{FleetActor, FleetActorArgs};
    use signhost_store::Store;
    use tokio::net::TcpListener;

    use super::*;
    use crate::config::{Config, NodeSection};
    use crate::factory;

    struct Daemon {
        _dir: tempfile::TempDir,
        base: String,
        client: HttpClient,
    }

    async fn spawn_daemon() -> Daemon {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store.path = dir.path().join("hosts.db");
        config.probe.connect_timeout_ms = 200;
        config.probe.request_timeout_ms = 200;
        config.node = NodeSection {
            id: Some("test-node".into()),
            hostname: Some("signage-test".into()),
            ip_address: Some("192.0.2.1".into()),
            ..NodeSection::default()
        };

        let store = Arc::new(Store::open(&config.store.path).unwrap());
        let sync = factory::build_fleet(&config, store.clone()).unwrap();
        let fleet = FleetActor::spawn(FleetActorArgs { sync });
        let state = Arc::new(AppState::new(fleet, store, config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });

        let base = format!("http://{addr}");
        let client = HttpClient::new(&base).unwrap();
        Daemon {
            _dir: dir,
            base,
            client,
        }
    }

    fn api_error(err: ClientError) -> (u16, String) {
        match err {
            ClientError::Api { status, message } => (status, message),
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_identity_endpoints() {
        let d = spawn_daemon().await;

        assert_eq!(d.client.health().await.unwrap().status, "ok");

        let me = d.client.self_description().await.unwrap();
        assert_eq!(me.id, "test-node");
        assert_eq!(me.hostname, "signage-test");

        let version = d.client.version().await.unwrap();
        assert_eq!(version.id.as_deref(), Some("test-node"));
    }

    #[tokio::test]
    async fn test_host_crud_and_error_codes() {
        let d = spawn_daemon().await;

        let added = d
            .client
            .add_host(&Host::with_address("192.0.2.10"))
            .await
            .unwrap();
        assert!(!added.id.is_empty());
        assert_eq!(d.client.list_hosts().await.unwrap().len(), 1);

        let edited = d
            .client
            .edit_host(
                "192.0.2.10",
                &EditHostRequest {
                    nickname: Some("Lobby".into()),
                    ..EditHostRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.nickname, "Lobby");
        assert_eq!(edited.id, added.id);

        let (status, body) = api_error(
            d.client
                .add_host(&Host::with_address("192.0.2.10"))
                .await
                .unwrap_err(),
        );
        assert_eq!(status, 409);
        assert!(body.contains("ADDRESS_IN_USE"));

        let (status, body) = api_error(
            d.client
                .add_host(&Host::with_address("192.0.2"))
                .await
                .unwrap_err(),
        );
        assert_eq!(status, 400);
        assert!(body.contains("INVALID_ADDRESS"));

        let (status, body) = api_error(d.client.get_host("192.0.2.99").await.unwrap_err());
        assert_eq!(status, 404);
        assert!(body.contains("NOT_FOUND"));

        let removed = d.client.delete_host("192.0.2.10").await.unwrap();
        assert_eq!(removed.id, added.id);
        assert!(d.client.list_hosts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_background_triggers_validate_input() {
        let d = spawn_daemon().await;

        let (status, _) = api_error(d.client.probe_host("192.0.2.77").await.unwrap_err());
        assert_eq!(status, 404);

        let (status, _) = api_error(
            d.client
                .start_discovery(Some("192.0.2".into()))
                .await
                .unwrap_err(),
        );
        assert_eq!(status, 400);

        let (status, _) = api_error(d.client.pull("not-a-peer").await.unwrap_err());
        assert_eq!(status, 400);

        assert!(d.client.probe_all().await.is_ok());
        assert!(d.client.push(vec!["192.0.2.44".into()]).await.is_ok());
    }

    #[tokio::test]
    async fn test_receive_and_backups() {
        let d = spawn_daemon().await;
        d.client
            .add_host(&Host::with_address("192.0.2.10"))
            .await
            .unwrap();

        let incoming = vec![Host {
            id: "c".into(),
            ..Host::with_address("192.0.2.30")
        }];
        let report = d.client.receive(&incoming, false).await.unwrap();
        assert_eq!(report.applied, 1);
        let roster = d.client.list_hosts().await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].id, "c");

        let created = d.client.create_backup().await.unwrap();
        let name = created.backup.unwrap();
        let backups = d.client.list_backups().await.unwrap();
        assert!(backups.iter().any(|b| b.name == name));

        d.client
            .receive(&[Host::with_address("192.0.2.31")], true)
            .await
            .unwrap();
        assert_eq!(d.client.list_hosts().await.unwrap().len(), 2);

        d.client.restore_backup(&name).await.unwrap();
        let roster = d.client.list_hosts().await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].id, "c");

        let (status, _) = api_error(d.client.restore_backup("nope.db").await.unwrap_err());
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn test_snapshot_download_and_import() {
        let d = spawn_daemon().await;
        d.client
            .add_host(&Host::with_address("192.0.2.10"))
            .await
            .unwrap();

        let bytes = d.client.snapshot().await.unwrap();
        assert!(!bytes.is_empty());

        d.client.delete_host("192.0.2.10").await.unwrap();
        d.client.import_snapshot(bytes).await.unwrap();
        assert_eq!(d.client.list_hosts().await.unwrap().len(), 1);

        let (status, body) = api_error(
            d.client
                .import_snapshot(b"definitely not sqlite".to_vec())
                .await
                .unwrap_err(),
        );
        assert_eq!(status, 400);
        assert!(body.contains("INVALID_SNAPSHOT"));
    }

    #[tokio::test]
    async fn test_event_stream() {
        let d = spawn_daemon().await;
        let ws_url = format!("{}/ws/events", d.base.replacen("http", "ws", 1));
        let mut events = WsClient::connect(&ws_url).await.unwrap();

        let mut octet = 10;
        let event = loop {
            d.client
                .add_host(&Host::with_address(format!("192.0.2.{octet}")))
                .await
                .unwrap();
            match tokio::time::timeout(Duration::from_millis(500), events.recv()).await {
                Ok(Some(event)) => break event,
                Ok(None) => panic!("event stream closed"),
                Err(_) if octet < 20 => octet += 1,
                Err(_) => panic!("no event received"),
            }
        };

        assert!(matches!(
            event,
            RosterEvent::HostAdded { .. } | RosterEvent::HostUpdated { .. }
        ));
    }
}
