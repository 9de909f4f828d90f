//! HTTP surface: the legacy proxy endpoints, IP filtering and the assembled
//! [`Gateway`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::codec::{json, legacy, ParseLog};
use crate::config::Config;
use crate::fetch::{
    IntervalSupplier, JsonNetworkInformationFetcher, LegacyNetworkInformationFetcher,
    TransceiversFetcher, UrlSupplier,
};
use crate::locate::live::LiveFeedLocator;
use crate::locate::vatspy::StaticReferenceLocator;
use crate::locate::StationLocator;
use crate::model::{data_keys, NetworkInformation};
use crate::random::{pick_random, RandomSource};
use crate::retrieval::{decode_text, string_to_latin1, HttpClient, TextCharset};
use crate::SERVER_DISCLAIMER_HEADER;

/// Paths are part of the legacy client contract and cannot change.
pub const DATA_FILE_PATH: &str = "/vatsim-data.txt";
pub const NETWORK_INFORMATION_PATH: &str = "/status.txt";
pub const JSON_PASSTHROUGH_PATH: &str = "/status.json";

/// Minimum data file retrieval interval assumed until an upstream data file
/// tells us otherwise.
const ASSUMED_MINIMUM_DATA_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Transceiver updates never run more often than this.
const MINIMUM_TRANSCEIVERS_INTERVAL: Duration = Duration::from_secs(60);

pub struct AppState {
    config: Config,
    http: Arc<dyn HttpClient>,
    random: Arc<dyn RandomSource>,
    legacy_fetcher: Arc<LegacyNetworkInformationFetcher>,
    json_fetcher: Arc<JsonNetworkInformationFetcher>,
    locator: StationLocator,
    /// Read per request; flipping it at runtime immediately changes the
    /// served character set.
    quirk_datafile_utf8: Arc<AtomicBool>,
    minimum_data_interval: Arc<Mutex<Duration>>,
}

/// The assembled application: fetchers, locators and the HTTP router.
pub struct Gateway {
    state: Arc<AppState>,
    transceivers_fetcher: Arc<TransceiversFetcher>,
    router: Router,
}

impl Gateway {
    pub fn new(config: Config, http: Arc<dyn HttpClient>, random: Arc<dyn RandomSource>) -> Self {
        let legacy_fetcher = Arc::new(LegacyNetworkInformationFetcher::new(
            Arc::clone(&http),
            Arc::clone(&random),
            format!("{}{}", config.upstream_base_url, NETWORK_INFORMATION_PATH),
            config.parser_log_enabled,
        ));
        let json_fetcher = Arc::new(JsonNetworkInformationFetcher::new(
            Arc::clone(&http),
            format!("{}{}", config.upstream_base_url, JSON_PASSTHROUGH_PATH),
            config.parser_log_enabled,
        ));

        let minimum_data_interval = Arc::new(Mutex::new(ASSUMED_MINIMUM_DATA_INTERVAL));

        let url_supplier: UrlSupplier = {
            let json_fetcher = Arc::clone(&json_fetcher);
            let random = Arc::clone(&random);
            let override_url = config.transceivers_url_override.clone();
            Arc::new(move || {
                if let Some(url) = &override_url {
                    return Some(url.clone());
                }
                let info = json_fetcher.latest()?;
                pick_random(random.as_ref(), info.data_urls_for(data_keys::TRANSCEIVERS)).cloned()
            })
        };
        let interval_supplier: IntervalSupplier = {
            let minimum_data_interval = Arc::clone(&minimum_data_interval);
            Arc::new(move || {
                (*minimum_data_interval.lock().unwrap()).max(MINIMUM_TRANSCEIVERS_INTERVAL)
            })
        };
        let transceivers_fetcher = Arc::new(TransceiversFetcher::new(
            Arc::clone(&http),
            url_supplier,
            interval_supplier,
            config.parser_log_enabled,
        ));

        let static_locator = build_static_locator(&config);
        let live_locator = config
            .strategy
            .uses_live()
            .then(|| Arc::new(LiveFeedLocator::new(Arc::clone(&transceivers_fetcher))));
        let locator = StationLocator::new(
            config.strategy,
            config.locator_options,
            static_locator,
            live_locator,
        );

        let quirk_datafile_utf8 = Arc::new(AtomicBool::new(config.quirk_datafile_utf8));

        let state = Arc::new(AppState {
            config,
            http,
            random,
            legacy_fetcher,
            json_fetcher,
            locator,
            quirk_datafile_utf8,
            minimum_data_interval,
        });

        let router = router(Arc::clone(&state));

        Self {
            state,
            transceivers_fetcher,
            router,
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Runtime handle for the data file character set quirk.
    pub fn quirk_datafile_utf8(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.state.quirk_datafile_utf8)
    }

    pub fn start_fetchers(&self) {
        self.state.legacy_fetcher.start();
        self.state.json_fetcher.start();
        // the transceivers fetcher starts itself on first demand
    }

    pub fn stop(&self) {
        self.state.legacy_fetcher.stop();
        self.state.json_fetcher.stop();
        self.transceivers_fetcher.stop();
    }

    /// Serves until interrupted, then shuts the fetchers down.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.state.config.bind_address).await?;
        info!(address = %listener.local_addr()?, "listening");

        self.start_fetchers();

        axum::serve(
            listener,
            self.router
                .clone()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        self.stop();
        Ok(())
    }
}

fn build_static_locator(config: &Config) -> Option<Arc<StaticReferenceLocator>> {
    if !config.strategy.uses_static() {
        return None;
    }

    let Some(directory) = &config.vatspy_data_dir else {
        warn!("no static dataset directory configured, static station lookup is disabled");
        return None;
    };

    match StaticReferenceLocator::from_dir(
        directory,
        config.alias_us_stations,
        config.parser_log_enabled,
    ) {
        Ok(locator) => Some(Arc::new(locator)),
        Err(err) => {
            error!(
                directory = %directory.display(),
                error = %err,
                "failed to load static dataset, static station lookup is disabled"
            );
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutting down");
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(network_information).fallback(method_not_allowed))
        .route(
            NETWORK_INFORMATION_PATH,
            get(network_information).fallback(method_not_allowed),
        )
        .route(
            DATA_FILE_PATH,
            get(data_file).fallback(method_not_allowed),
        )
        .route(
            JSON_PASSTHROUGH_PATH,
            get(json_passthrough).fallback(method_not_allowed),
        )
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            ip_filter,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ip_filter(
    State(state): State<Arc<AppState>>,
    ConnectInfo(address): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.allowed_ips.contains(&address.ip()) {
        warn!(client = %address.ip(), "rejecting request from disallowed address");
        return (StatusCode::FORBIDDEN, "forbidden").into_response();
    }
    next.run(request).await
}

/// Serves the merged network information document in the legacy text format,
/// pointing legacy clients at this gateway's own data file endpoint.
async fn network_information(State(state): State<Arc<AppState>>) -> Response {
    let Some(upstream_legacy) = state.legacy_fetcher.latest() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "upstream legacy network information is unavailable",
        )
            .into_response();
    };

    let upstream_json = state.json_fetcher.latest().unwrap_or_else(|| {
        warn!("JSON network information is unavailable, merging empty document");
        Arc::new(NetworkInformation::default())
    });

    let mut merged = upstream_legacy.merge(&upstream_json);
    merged.startup_messages = state.legacy_fetcher.aggregated_startup_messages();
    merged.moved_to_urls.clear();

    // legacy clients must fetch the data file through this gateway, not
    // directly from upstream
    merged.data_urls.remove(data_keys::LEGACY);
    merged.add_data_url(
        data_keys::LEGACY,
        format!("{}{}", state.config.local_base_url, DATA_FILE_PATH),
    );

    let mut body = legacy::comment_block(SERVER_DISCLAIMER_HEADER);
    body.push_str("\r\n");
    body.push_str(&legacy::write_network_information(&merged));

    legacy_text_response(&body, false)
}

/// Serves the current network state as a legacy data file: fetched from a
/// modern v3 URL, converted, enriched with station locations.
async fn data_file(State(state): State<Arc<AppState>>) -> Response {
    let Some(info) = state.json_fetcher.latest() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "no matching upstream JSON URLs known",
        )
            .into_response();
    };

    let urls = info.data_urls_for(data_keys::V3);
    let Some(url) = pick_random(state.random.as_ref(), urls) else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "no matching upstream JSON URLs known",
        )
            .into_response();
    };

    let retrieved = match state.http.get(url).await {
        Ok(retrieved) => retrieved,
        Err(err) => {
            warn!(url = %url, error = %err, "failed to retrieve upstream data file");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                "unable to retrieve upstream data file",
            )
                .into_response();
        }
    };

    let text = decode_text(&retrieved, TextCharset::Utf8);
    let mut log = ParseLog::new();
    let mut file = match json::parse_data_file(&text, &mut log) {
        Ok(file) => file,
        Err(err) => {
            warn!(url = %url, error = %err, "failed to decode upstream data file");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                "unable to retrieve upstream data file",
            )
                .into_response();
        }
    };
    if state.config.parser_log_enabled {
        log.log_all(url);
    }

    if let Some(reload_minutes) = file.general.reload_minutes {
        // upstream-controlled value; out-of-range input must not take the
        // request down
        match Duration::try_from_secs_f64(reload_minutes.max(0.0) * 60.0) {
            Ok(interval) => *state.minimum_data_interval.lock().unwrap() = interval,
            Err(_) => warn!(reload_minutes, "ignoring out-of-range reload interval"),
        }
    }

    state.locator.inject_into(&mut file).await;

    let body = legacy::write_data_file(&file, SERVER_DISCLAIMER_HEADER);
    legacy_text_response(&body, state.quirk_datafile_utf8.load(Ordering::Relaxed))
}

/// Passes the modern JSON network information through unmodified.
async fn json_passthrough(State(state): State<Arc<AppState>>) -> Response {
    let url = format!(
        "{}{}",
        state.config.upstream_base_url, JSON_PASSTHROUGH_PATH
    );

    match state.http.get(&url).await {
        Ok(retrieved) => {
            let content_type = retrieved
                .content_type
                .unwrap_or_else(|| "application/json".to_owned());
            ([(header::CONTENT_TYPE, content_type)], retrieved.body).into_response()
        }
        Err(err) => {
            warn!(url = %url, error = %err, "passthrough request failed");
            (StatusCode::BAD_GATEWAY, "request to upstream server failed").into_response()
        }
    }
}

async fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, "method not allowed").into_response()
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}

fn legacy_text_response(body: &str, utf8: bool) -> Response {
    if utf8 {
        (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body.as_bytes().to_vec(),
        )
            .into_response()
    } else {
        (
            [(header::CONTENT_TYPE, "text/plain; charset=iso-8859-1")],
            string_to_latin1(body),
        )
            .into_response()
    }
}
