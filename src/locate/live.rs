//! Station location from the live transceivers feed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::fetch::TransceiversFetcher;
use crate::geo::{self, GeoPoint};
use crate::model::{Source, Station, TransceiversFile};

/// How long a fetched feed keeps being reused before asking the fetcher
/// again. Lookups come in bursts while a data file is being assembled; one
/// feed snapshot serves the whole burst.
const FEED_CACHE_LIFETIME: Duration = Duration::from_secs(5);

/// Maximum time to wait for the fetcher to deliver a first feed.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct LiveFeedLocator {
    fetcher: Arc<TransceiversFetcher>,
    cached_feed: tokio::sync::Mutex<Option<CachedFeed>>,
}

struct CachedFeed {
    retrieved_at: Instant,
    file: Arc<TransceiversFile>,
}

impl LiveFeedLocator {
    pub fn new(fetcher: Arc<TransceiversFetcher>) -> Self {
        Self {
            fetcher,
            cached_feed: tokio::sync::Mutex::new(None),
        }
    }

    /// Locates a station by averaging the positions of its transceivers.
    ///
    /// The same callsign may appear in multiple feed records; each record is
    /// averaged on its own first, then the per-record centers are averaged.
    pub async fn locate(&self, callsign: &str) -> Option<Station> {
        let file = self.current_feed().await?;

        let mut record_centers: Vec<GeoPoint> = Vec::new();
        for station in &file.stations {
            if !station.callsign.eq_ignore_ascii_case(callsign) {
                continue;
            }

            let points: Vec<GeoPoint> = station
                .transceivers
                .iter()
                .map(|t| GeoPoint::new(t.latitude, t.longitude))
                .collect();
            if points.is_empty() {
                continue;
            }

            match geo::average(&points) {
                Ok(center) => record_centers.push(center),
                Err(err) => {
                    warn!(callsign, error = %err, "unusable transceiver positions");
                    return None;
                }
            }
        }

        if record_centers.is_empty() {
            return None;
        }

        match geo::average(&record_centers) {
            Ok(center) => Some(Station {
                callsign: callsign.to_owned(),
                latitude: center.latitude,
                longitude: center.longitude,
                source: Source::LiveFeed,
            }),
            Err(err) => {
                warn!(callsign, error = %err, "unusable station centers");
                None
            }
        }
    }

    async fn current_feed(&self) -> Option<Arc<TransceiversFile>> {
        let mut cached = self.cached_feed.lock().await;

        if let Some(feed) = cached.as_ref() {
            if feed.retrieved_at.elapsed() < FEED_CACHE_LIFETIME {
                return Some(Arc::clone(&feed.file));
            }
        }

        let file = self.fetcher.wait_for_latest(FETCH_TIMEOUT).await?;
        *cached = Some(CachedFeed {
            retrieved_at: Instant::now(),
            file: Arc::clone(&file),
        });
        Some(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::retrieval::{HttpClient, RetrievedData};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHttp {
        body: String,
        requests: AtomicUsize,
    }

    #[async_trait]
    impl HttpClient for CountingHttp {
        async fn get(&self, _url: &str) -> Result<RetrievedData, GatewayError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(RetrievedData {
                status: 200,
                content_type: None,
                body: self.body.clone().into_bytes(),
            })
        }
    }

    fn locator_with_feed(body: &str) -> (LiveFeedLocator, Arc<CountingHttp>) {
        let http = Arc::new(CountingHttp {
            body: body.to_owned(),
            requests: AtomicUsize::new(0),
        });
        let fetcher = Arc::new(TransceiversFetcher::new(
            Arc::clone(&http) as Arc<dyn HttpClient>,
            Arc::new(|| Some("http://example.com/transceivers.json".to_owned())),
            Arc::new(|| Duration::from_secs(60)),
            false,
        ));
        (LiveFeedLocator::new(fetcher), http)
    }

    #[tokio::test]
    async fn station_position_is_averaged_per_record_then_across_records() {
        // one record at (10, 10), one averaging to (20, 20): station center
        // lands at (15, 15) even though the second record has more points
        let (locator, _http) = locator_with_feed(
            r#"[
                {"callsign": "EDDT_TWR", "transceivers": [
                    {"latDeg": 10.0, "lonDeg": 10.0}
                ]},
                {"callsign": "EDDT_TWR", "transceivers": [
                    {"latDeg": 19.0, "lonDeg": 20.0},
                    {"latDeg": 20.0, "lonDeg": 20.0},
                    {"latDeg": 21.0, "lonDeg": 20.0}
                ]}
            ]"#,
        );

        let station = locator.locate("EDDT_TWR").await.expect("should resolve");
        assert!((station.latitude - 15.0).abs() < 1e-9);
        assert!((station.longitude - 15.0).abs() < 1e-6);
        assert_eq!(station.source, Source::LiveFeed);
    }

    #[tokio::test]
    async fn unknown_callsign_and_empty_records_yield_none() {
        let (locator, _http) = locator_with_feed(
            r#"[{"callsign": "NO_TRX", "transceivers": []}]"#,
        );

        assert!(locator.locate("EDDT_TWR").await.is_none());
        assert!(locator.locate("NO_TRX").await.is_none());
    }

    #[tokio::test]
    async fn feed_is_reused_within_the_cache_lifetime() {
        let (locator, http) = locator_with_feed(
            r#"[{"callsign": "EDDT_TWR", "transceivers": [{"latDeg": 1.0, "lonDeg": 2.0}]}]"#,
        );

        assert!(locator.locate("EDDT_TWR").await.is_some());
        let after_first = http.requests.load(Ordering::SeqCst);

        assert!(locator.locate("EDDT_TWR").await.is_some());
        assert_eq!(http.requests.load(Ordering::SeqCst), after_first);
    }
}
