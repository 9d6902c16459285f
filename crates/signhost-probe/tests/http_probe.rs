use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use signhost_api::{CmsStatus, Host, HostStatus};
use signhost_probe::{HostProber, HttpProber, ProbeConfig};
use tokio::net::TcpListener;

async fn serve(router: Router) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    port
}

/// A port on 127.0.0.1 that nothing listens on
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn prober(port: u16) -> HttpProber {
    HttpProber::new(ProbeConfig {
        management_port: port,
        cms_port: port,
        connect_timeout: Duration::from_millis(500),
        request_timeout: Duration::from_millis(1000),
        ..ProbeConfig::default()
    })
    .unwrap()
}

fn signage_node() -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(json!({ "status": "ok", "version": "1.4.0" })) }),
        )
        .route(
            "/api/v2/info",
            get(|| async { Json(json!({ "anthias_version": "0.19.5", "status": "running" })) }),
        )
        .route(
            "/api/v2/assets",
            get(|| async { Json(json!([{ "name": "a" }, { "name": "b" }, { "name": "c" }])) }),
        )
}

#[tokio::test]
async fn test_refused_port_is_connection_refused() {
    let port = closed_port().await;
    let host = prober(port).probe(Host::with_address("127.0.0.1")).await;

    assert_eq!(host.status, HostStatus::ConnectionRefused);
    assert_eq!(host.cms_status, CmsStatus::Offline);
    assert!(host.last_checked.is_some());
}

#[tokio::test]
async fn test_unresolvable_name_is_unreachable() {
    let host = prober(8000)
        .probe(Host::with_address("signage-node.invalid"))
        .await;

    assert_eq!(host.status, HostStatus::Unreachable);
    assert_eq!(host.nsm_status, "unreachable");
}

#[tokio::test]
async fn test_healthy_node() {
    let port = serve(signage_node()).await;
    let mut input = Host::with_address("127.0.0.1");
    input.nickname = "lobby".to_string();
    input.notes = "left of the entrance".to_string();

    let host = prober(port).probe(input).await;

    assert_eq!(host.status, HostStatus::Healthy);
    assert_eq!(host.nsm_status, "ok");
    assert_eq!(host.nsm_version, "1.4.0");
    assert_eq!(host.cms_status, CmsStatus::Online);
    assert_eq!(host.anthias_version, "0.19.5");
    assert_eq!(host.anthias_status, "running");
    assert_eq!(host.asset_count, 3);
    assert_eq!(host.dashboard_url, format!("http://127.0.0.1:{port}/"));
    assert_eq!(host.nickname, "lobby");
    assert_eq!(host.notes, "left of the entrance");
}

#[tokio::test]
async fn test_non_200_health_is_unhealthy() {
    let router = Router::new().route(
        "/health",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "starting") }),
    );
    let port = serve(router).await;

    let host = prober(port).probe(Host::with_address("127.0.0.1")).await;

    assert_eq!(host.status, HostStatus::Unhealthy);
    assert!(host.nsm_status.starts_with("503"));
    // no CMS routes: 404 counts as offline
    assert_eq!(host.cms_status, CmsStatus::Offline);
    assert!(host.dashboard_url.is_empty());
}

#[tokio::test]
async fn test_version_falls_back_to_info_endpoint() {
    let router = Router::new()
        .route("/health", get(|| async { "fine" }))
        .route("/api/version", get(|| async { Json(json!({ "version": "2.0.1" })) }));
    let port = serve(router).await;

    let host = prober(port).probe(Host::with_address("127.0.0.1")).await;

    assert_eq!(host.status, HostStatus::Healthy);
    assert_eq!(host.nsm_status, "ok");
    assert_eq!(host.nsm_version, "2.0.1");
}

#[tokio::test]
async fn test_paths_are_probed_independently() {
    let port = serve(signage_node()).await;
    let mut input = Host::with_address("127.0.0.1");
    input.vpn_ip_address = "127.0.0.1".to_string();

    let host = prober(port).probe(input.clone()).await;
    assert_eq!(host.status, HostStatus::Healthy);
    assert_eq!(host.status_vpn, HostStatus::Healthy);
    assert!(host.last_checked_vpn.is_some());

    input.vpn_ip_address.clear();
    let host = prober(port).probe(input).await;
    assert_eq!(host.status_vpn, HostStatus::Unknown);
    assert!(host.last_checked_vpn.is_none());
}
