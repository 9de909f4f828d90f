//! End-to-end tests driving the gateway router against a scripted upstream.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{Method, Request, StatusCode};
use tower::ServiceExt;

use whazzup_gateway::config::Config;
use whazzup_gateway::error::GatewayError;
use whazzup_gateway::locate::Strategy;
use whazzup_gateway::random::RandomSource;
use whazzup_gateway::retrieval::{HttpClient, RetrievedData};
use whazzup_gateway::server::Gateway;

const UPSTREAM: &str = "http://upstream.test";

struct ScriptedHttp {
    responses: HashMap<String, String>,
}

impl ScriptedHttp {
    fn new(responses: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            responses: responses
                .iter()
                .map(|(url, body)| ((*url).to_owned(), (*body).to_owned()))
                .collect(),
        })
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn get(&self, url: &str) -> Result<RetrievedData, GatewayError> {
        match self.responses.get(url) {
            Some(body) => Ok(RetrievedData {
                status: 200,
                content_type: Some("application/octet-stream".to_owned()),
                body: body.clone().into_bytes(),
            }),
            None => Err(GatewayError::UpstreamStatus(404)),
        }
    }
}

struct AlwaysFirst;

impl RandomSource for AlwaysFirst {
    fn pick_index(&self, _len: usize) -> usize {
        0
    }
}

fn request(method: Method, path: &str, client_ip: &str) -> Request<Body> {
    let address = SocketAddr::new(client_ip.parse().unwrap(), 49152);
    Request::builder()
        .method(method)
        .uri(path)
        .extension(ConnectInfo(address))
        .body(Body::empty())
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    // legacy bodies are ISO-8859-1; byte-to-char decoding covers UTF-8
    // ASCII test content as well
    bytes.iter().map(|&b| b as char).collect()
}

async fn settled_gateway(config: Config, http: Arc<ScriptedHttp>) -> Gateway {
    let gateway = Gateway::new(config, http, Arc::new(AlwaysFirst));
    gateway.start_fetchers();
    tokio::time::sleep(Duration::from_millis(150)).await;
    gateway
}

fn vatspy_dir(tag: &str) -> std::path::PathBuf {
    let directory = std::env::temp_dir().join(format!("gateway-it-{}-{}", std::process::id(), tag));
    std::fs::create_dir_all(&directory).unwrap();
    std::fs::write(
        directory.join("VATSpy.dat"),
        "[Airports]\nEDDT|Berlin Tegel|52.56000|13.29000|TXL|EDWW|0\n",
    )
    .unwrap();
    std::fs::write(directory.join("FIRBoundaries.dat"), "").unwrap();
    directory
}

#[tokio::test]
async fn data_file_is_served_with_injected_station_locations() {
    let http = ScriptedHttp::new(&[
        (
            "http://upstream.test/status.txt",
            "msg0=Hello\r\nurl0=http://upstream.test/whazzup.txt\r\n",
        ),
        (
            "http://upstream.test/status.json",
            r#"{"data":{"v3":["http://upstream.test/v3-a.json","http://upstream.test/v3-b.json"]}}"#,
        ),
        (
            "http://upstream.test/v3-a.json",
            r#"{
                "general": {"update_timestamp": "2024-01-01T12:00:00Z",
                            "connected_clients": 2, "unique_users": 2, "reload": 1},
                "pilots": [{"callsign": "ABC123", "latitude": 10.0, "longitude": 20.0}],
                "controllers": [{"callsign": "EDDT_TWR", "frequency": "124.850", "rating": 4}]
            }"#,
        ),
    ]);

    let directory = vatspy_dir("datafile");
    let mut config = Config::for_testing();
    config.upstream_base_url = UPSTREAM.to_owned();
    config.strategy = Strategy::StaticOnly;
    config.vatspy_data_dir = Some(directory.clone());

    let gateway = settled_gateway(config, http).await;
    let response = gateway
        .router()
        .oneshot(request(Method::GET, "/vatsim-data.txt", "127.0.0.1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();
    assert!(content_type.contains("iso-8859-1"), "got {content_type}");

    let body = body_text(response).await;
    assert!(body.starts_with("; YOU ARE ACCESSING"));
    assert!(body.contains("!GENERAL:"));
    assert!(body.contains("UPDATE = 20240101120000"));
    assert!(body.contains("ABC123"));

    let tower_line = body
        .lines()
        .find(|line| line.starts_with("EDDT_TWR"))
        .expect("controller record present");
    assert!(
        tower_line.contains(":52.56000:13.29000:"),
        "coordinates should be injected: {tower_line}"
    );

    gateway.stop();
    std::fs::remove_dir_all(&directory).unwrap();
}

#[tokio::test]
async fn network_information_is_merged_and_points_at_the_gateway() {
    let http = ScriptedHttp::new(&[
        (
            "http://upstream.test/status.txt",
            "msg0=Hello from upstream\r\nurl0=http://upstream.test/whazzup.txt\r\njson3=http://upstream.test/v3-legacy.json\r\n",
        ),
        (
            "http://upstream.test/status.json",
            r#"{"data":{"v3":["http://upstream.test/v3-modern.json"],
                        "transceivers":["http://upstream.test/transceivers.json"]}}"#,
        ),
    ]);

    let mut config = Config::for_testing();
    config.upstream_base_url = UPSTREAM.to_owned();

    let gateway = settled_gateway(config, http).await;
    let response = gateway
        .router()
        .oneshot(request(Method::GET, "/status.txt", "127.0.0.1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;

    assert!(body.starts_with("; YOU ARE ACCESSING"));
    assert!(body.contains("msg0=Hello from upstream\r\n"));
    assert!(
        body.contains("url0=http://localhost:8080/vatsim-data.txt\r\n"),
        "legacy data URL must point back at the gateway"
    );
    assert!(
        !body.contains("url0=http://upstream.test/whazzup.txt"),
        "upstream legacy data URL must not leak through"
    );
    assert!(body.contains("json3=http://upstream.test/v3-legacy.json\r\n"));
    assert!(body.contains("json3=http://upstream.test/v3-modern.json\r\n"));

    // the root path serves the same document
    let response = gateway
        .router()
        .oneshot(request(Method::GET, "/", "127.0.0.1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    gateway.stop();
}

#[tokio::test]
async fn network_information_is_unavailable_without_legacy_upstream() {
    // modern upstream works fine, but the legacy document never loaded
    let http = ScriptedHttp::new(&[(
        "http://upstream.test/status.json",
        r#"{"data":{"v3":["http://upstream.test/v3.json"]}}"#,
    )]);

    let mut config = Config::for_testing();
    config.upstream_base_url = UPSTREAM.to_owned();

    let gateway = settled_gateway(config, http).await;
    let response = gateway
        .router()
        .oneshot(request(Method::GET, "/status.txt", "127.0.0.1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_text(response).await;
    assert!(body.contains("unavailable"));

    gateway.stop();
}

#[tokio::test]
async fn json_passthrough_forwards_upstream_body() {
    let http = ScriptedHttp::new(&[(
        "http://upstream.test/status.json",
        r#"{"data":{"v3":[]}}"#,
    )]);

    let mut config = Config::for_testing();
    config.upstream_base_url = UPSTREAM.to_owned();

    let gateway = settled_gateway(config, http).await;
    let response = gateway
        .router()
        .oneshot(request(Method::GET, "/status.json", "127.0.0.1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, r#"{"data":{"v3":[]}}"#);

    gateway.stop();
}

#[tokio::test]
async fn json_passthrough_reports_bad_gateway_on_upstream_failure() {
    let mut config = Config::for_testing();
    config.upstream_base_url = UPSTREAM.to_owned();

    let gateway = Gateway::new(config, ScriptedHttp::new(&[]), Arc::new(AlwaysFirst));
    let response = gateway
        .router()
        .oneshot(request(Method::GET, "/status.json", "127.0.0.1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_text(response).await, "request to upstream server failed");
}

#[tokio::test]
async fn unknown_paths_methods_and_addresses_are_rejected() {
    let mut config = Config::for_testing();
    config.upstream_base_url = UPSTREAM.to_owned();

    let gateway = Gateway::new(config, ScriptedHttp::new(&[]), Arc::new(AlwaysFirst));
    let router = gateway.router();

    let response = router
        .clone()
        .oneshot(request(Method::GET, "/metrics", "127.0.0.1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .clone()
        .oneshot(request(Method::POST, "/status.txt", "127.0.0.1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let response = router
        .clone()
        .oneshot(request(Method::GET, "/status.txt", "203.0.113.7"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "forbidden");

    // the filter runs before routing, unknown paths included
    let response = router
        .clone()
        .oneshot(request(Method::GET, "/metrics", "203.0.113.7"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn data_file_survives_out_of_range_reload_interval() {
    let http = ScriptedHttp::new(&[
        (
            "http://upstream.test/status.json",
            r#"{"data":{"v3":["http://upstream.test/v3.json"]}}"#,
        ),
        (
            "http://upstream.test/v3.json",
            r#"{
                "general": {"reload": 1e300},
                "pilots": [{"callsign": "ABC123", "latitude": 1.0, "longitude": 2.0}]
            }"#,
        ),
    ]);

    let mut config = Config::for_testing();
    config.upstream_base_url = UPSTREAM.to_owned();

    let gateway = settled_gateway(config, http).await;
    let response = gateway
        .router()
        .oneshot(request(Method::GET, "/vatsim-data.txt", "127.0.0.1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("ABC123"));

    gateway.stop();
}

#[tokio::test]
async fn data_file_charset_quirk_switches_to_utf8() {
    let http = ScriptedHttp::new(&[
        (
            "http://upstream.test/status.json",
            r#"{"data":{"v3":["http://upstream.test/v3.json"]}}"#,
        ),
        (
            "http://upstream.test/v3.json",
            r#"{"pilots": [{"callsign": "ABC123", "latitude": 1.0, "longitude": 2.0}]}"#,
        ),
    ]);

    let mut config = Config::for_testing();
    config.upstream_base_url = UPSTREAM.to_owned();

    let gateway = settled_gateway(config, http).await;
    gateway
        .quirk_datafile_utf8()
        .store(true, std::sync::atomic::Ordering::Relaxed);

    let response = gateway
        .router()
        .oneshot(request(Method::GET, "/vatsim-data.txt", "127.0.0.1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();
    assert!(content_type.contains("utf-8"), "got {content_type}");

    gateway.stop();
}
