//! Background fetchers keeping the upstream documents available in memory.
//!
//! Each fetcher owns a [`PeriodicTask`] and publishes its most recent result
//! through an internally locked slot. A failed cycle never unpublishes data;
//! consumers keep seeing the previous document until a newer one arrives.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::codec::{json, legacy, ParseLog};
use crate::error::GatewayError;
use crate::model::{NetworkInformation, TransceiversFile};
use crate::periodic::{PeriodicTask, TaskOutcome, TaskResult, DEFAULT_MINIMUM_SLEEP};
use crate::random::{pick_random, RandomSource};
use crate::retrieval::{decode_text, HttpClient, TextCharset};

/// How often network information is refreshed when the last attempt worked.
pub const NETWORK_INFORMATION_UPDATE_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
/// Retry interval after a failed network information update.
pub const NETWORK_INFORMATION_RETRY_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Redirect chains longer than this abort the update cycle.
const MAX_REDIRECTS: usize = 10;

const TRANSCEIVERS_RETRY_INTERVAL: Duration = Duration::from_secs(60);
/// The transceivers fetcher suspends itself when nobody asked for its data
/// for this long.
const TRANSCEIVERS_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const TRANSCEIVERS_WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fetches the legacy network information document, following "moved to"
/// redirects up to [`MAX_REDIRECTS`] hops. Startup messages encountered along
/// the whole chain are aggregated and published separately from the final
/// document.
pub struct LegacyNetworkInformationFetcher {
    inner: Arc<LegacyInner>,
    task: PeriodicTask,
}

struct LegacyInner {
    http: Arc<dyn HttpClient>,
    random: Arc<dyn RandomSource>,
    initial_url: String,
    parser_log_enabled: bool,
    latest: Mutex<Option<Arc<NetworkInformation>>>,
    startup_messages: Mutex<Vec<String>>,
}

impl LegacyNetworkInformationFetcher {
    pub fn new(
        http: Arc<dyn HttpClient>,
        random: Arc<dyn RandomSource>,
        initial_url: impl Into<String>,
        parser_log_enabled: bool,
    ) -> Self {
        let inner = Arc::new(LegacyInner {
            http,
            random,
            initial_url: initial_url.into(),
            parser_log_enabled,
            latest: Mutex::new(None),
            startup_messages: Mutex::new(Vec::new()),
        });

        let work_inner = Arc::clone(&inner);
        let task = PeriodicTask::with_intervals(
            "legacy-network-information",
            DEFAULT_MINIMUM_SLEEP,
            NETWORK_INFORMATION_RETRY_INTERVAL,
            move || {
                let inner = Arc::clone(&work_inner);
                async move { inner.update().await }
            },
        );

        Self { inner, task }
    }

    pub fn start(&self) {
        self.task.start();
    }

    pub fn stop(&self) {
        self.task.stop();
    }

    /// Most recently published document, if any update succeeded yet.
    pub fn latest(&self) -> Option<Arc<NetworkInformation>> {
        self.inner.latest.lock().unwrap().clone()
    }

    /// Startup messages aggregated over the full redirect chain of the last
    /// successful update.
    pub fn aggregated_startup_messages(&self) -> Vec<String> {
        self.inner.startup_messages.lock().unwrap().clone()
    }
}

impl LegacyInner {
    async fn update(&self) -> TaskResult {
        let mut url = self.initial_url.clone();
        let mut aggregated_messages: Vec<String> = Vec::new();

        for _ in 0..=MAX_REDIRECTS {
            let retrieved = self
                .http
                .get(&url)
                .await
                .map_err(|err| anyhow::anyhow!("retrieving {url}: {err}"))?;
            let text = decode_text(&retrieved, TextCharset::Latin1);

            let mut log = ParseLog::new();
            let info = legacy::parse_network_information(&text, &mut log);
            if self.parser_log_enabled {
                log.log_all(&url);
            }

            aggregated_messages.extend(info.startup_messages.iter().cloned());

            if info.moved_to_urls.is_empty() {
                debug!(url = %url, "legacy network information updated");
                // mirrors serving the same banner at each hop stay visible,
                // so no dedup across the chain
                *self.startup_messages.lock().unwrap() = aggregated_messages;
                *self.latest.lock().unwrap() = Some(Arc::new(info));
                return Ok(TaskOutcome::RunAfter(NETWORK_INFORMATION_UPDATE_INTERVAL));
            }

            let next = pick_random(self.random.as_ref(), &info.moved_to_urls)
                .cloned()
                .unwrap();
            warn!(from = %url, to = %next, "legacy network information has moved, following");
            url = next;
        }

        error!(
            initial_url = %self.initial_url,
            max_redirects = MAX_REDIRECTS,
            "giving up on legacy network information, too many redirects"
        );
        Err(GatewayError::TooManyRedirects.into())
    }
}

/// Fetches the modern JSON network information document.
pub struct JsonNetworkInformationFetcher {
    inner: Arc<JsonInner>,
    task: PeriodicTask,
}

struct JsonInner {
    http: Arc<dyn HttpClient>,
    url: String,
    parser_log_enabled: bool,
    latest: Mutex<Option<Arc<NetworkInformation>>>,
}

impl JsonNetworkInformationFetcher {
    pub fn new(
        http: Arc<dyn HttpClient>,
        url: impl Into<String>,
        parser_log_enabled: bool,
    ) -> Self {
        let inner = Arc::new(JsonInner {
            http,
            url: url.into(),
            parser_log_enabled,
            latest: Mutex::new(None),
        });

        let work_inner = Arc::clone(&inner);
        let task = PeriodicTask::with_intervals(
            "json-network-information",
            DEFAULT_MINIMUM_SLEEP,
            NETWORK_INFORMATION_RETRY_INTERVAL,
            move || {
                let inner = Arc::clone(&work_inner);
                async move { inner.update().await }
            },
        );

        Self { inner, task }
    }

    pub fn start(&self) {
        self.task.start();
    }

    pub fn stop(&self) {
        self.task.stop();
    }

    pub fn latest(&self) -> Option<Arc<NetworkInformation>> {
        self.inner.latest.lock().unwrap().clone()
    }
}

impl JsonInner {
    async fn update(&self) -> TaskResult {
        let retrieved = self
            .http
            .get(&self.url)
            .await
            .map_err(|err| anyhow::anyhow!("retrieving {}: {err}", self.url))?;
        let text = decode_text(&retrieved, TextCharset::Utf8);

        let mut log = ParseLog::new();
        let info = json::parse_network_information(&text, &mut log)
            .map_err(|err| anyhow::anyhow!("decoding {}: {err}", self.url))?;
        if self.parser_log_enabled {
            log.log_all(&self.url);
        }

        debug!(url = %self.url, "JSON network information updated");
        *self.latest.lock().unwrap() = Some(Arc::new(info));
        Ok(TaskOutcome::RunAfter(NETWORK_INFORMATION_UPDATE_INTERVAL))
    }
}

/// Provides the current transceivers feed URL; `None` while unknown.
pub type UrlSupplier = Arc<dyn Fn() -> Option<String> + Send + Sync>;
/// Provides the delay until the next transceivers update.
pub type IntervalSupplier = Arc<dyn Fn() -> Duration + Send + Sync>;

/// On-demand fetcher for the live transceivers feed.
///
/// The feed is only needed while locators actually resolve stations from it,
/// so the fetcher records the time of the last request and suspends its own
/// background task after sitting idle for a while.
/// [`wait_for_latest`](Self::wait_for_latest) restarts it transparently.
pub struct TransceiversFetcher {
    inner: Arc<TransceiversInner>,
    task: PeriodicTask,
}

struct TransceiversInner {
    http: Arc<dyn HttpClient>,
    url_supplier: UrlSupplier,
    interval_supplier: IntervalSupplier,
    parser_log_enabled: bool,
    latest: Mutex<Option<Arc<TransceiversFile>>>,
    last_accessed: Mutex<Instant>,
}

impl TransceiversFetcher {
    pub fn new(
        http: Arc<dyn HttpClient>,
        url_supplier: UrlSupplier,
        interval_supplier: IntervalSupplier,
        parser_log_enabled: bool,
    ) -> Self {
        let inner = Arc::new(TransceiversInner {
            http,
            url_supplier,
            interval_supplier,
            parser_log_enabled,
            latest: Mutex::new(None),
            last_accessed: Mutex::new(Instant::now()),
        });

        let work_inner = Arc::clone(&inner);
        let task = PeriodicTask::with_intervals(
            "transceivers",
            DEFAULT_MINIMUM_SLEEP,
            TRANSCEIVERS_RETRY_INTERVAL,
            move || {
                let inner = Arc::clone(&work_inner);
                async move { inner.update().await }
            },
        );

        Self { inner, task }
    }

    pub fn stop(&self) {
        self.task.stop();
    }

    pub fn latest(&self) -> Option<Arc<TransceiversFile>> {
        self.inner.latest.lock().unwrap().clone()
    }

    /// Returns the current feed, starting or restarting the background task
    /// if necessary and waiting up to `timeout` for the first data to
    /// arrive. Restarting clears the previously published document so stale
    /// data from before the suspension is never served.
    pub async fn wait_for_latest(&self, timeout: Duration) -> Option<Arc<TransceiversFile>> {
        *self.inner.last_accessed.lock().unwrap() = Instant::now();

        if !self.task.is_alive() {
            debug!("transceivers fetcher is not running, starting");
            *self.inner.latest.lock().unwrap() = None;
            self.task.start();
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(latest) = self.latest() {
                return Some(latest);
            }
            if Instant::now() >= deadline {
                warn!(timeout = ?timeout, "timed out waiting for transceivers data");
                return None;
            }
            tokio::time::sleep(TRANSCEIVERS_WAIT_POLL_INTERVAL).await;
        }
    }
}

impl TransceiversInner {
    async fn update(&self) -> TaskResult {
        let idle_for = self.last_accessed.lock().unwrap().elapsed();
        if idle_for > TRANSCEIVERS_IDLE_TIMEOUT {
            debug!(idle = ?idle_for, "transceivers data is no longer being used, suspending");
            self.latest.lock().unwrap().take();
            return Ok(TaskOutcome::Stop);
        }

        let Some(url) = (self.url_supplier)() else {
            return Err(anyhow::anyhow!("no transceivers URL known yet"));
        };

        let retrieved = self
            .http
            .get(&url)
            .await
            .map_err(|err| anyhow::anyhow!("retrieving {url}: {err}"))?;
        let text = decode_text(&retrieved, TextCharset::Utf8);

        let mut log = ParseLog::new();
        let file = json::parse_transceivers(&text, &mut log)
            .map_err(|err| anyhow::anyhow!("decoding {url}: {err}"))?;
        if self.parser_log_enabled {
            log.log_all(&url);
        }

        debug!(url = %url, stations = file.stations.len(), "transceivers updated");
        *self.latest.lock().unwrap() = Some(Arc::new(file));
        Ok(TaskOutcome::RunAfter((self.interval_supplier)()))
    }
}
