//! Resolves station locations and injects them into data files.
//!
//! ATC and ATIS stations on the modern feed carry no coordinates, which
//! leaves legacy map clients blind. The locator estimates positions from the
//! static reference dataset and, depending on the configured strategy, the
//! live transceivers feed.

pub mod live;
pub mod vatspy;

use std::sync::Arc;
use std::time::Duration;

use tracing::{trace, warn};

use crate::cache::ExpiringCache;
use crate::model::{Client, ClientType, DataFile, Source, Station};

use self::live::LiveFeedLocator;
use self::vatspy::StaticReferenceLocator;

const CACHE_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(5 * 60);
const CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Which lookup sources to use, in which order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Disabled,
    StaticOnly,
    StaticThenLive,
    LiveOnly,
}

impl Strategy {
    pub fn parse(name: &str) -> Option<Strategy> {
        match name {
            "disabled" => Some(Strategy::Disabled),
            "static-only" => Some(Strategy::StaticOnly),
            "static-then-live" => Some(Strategy::StaticThenLive),
            "live-only" => Some(Strategy::LiveOnly),
            _ => None,
        }
    }

    pub fn uses_static(&self) -> bool {
        matches!(self, Strategy::StaticOnly | Strategy::StaticThenLive)
    }

    pub fn uses_live(&self) -> bool {
        matches!(self, Strategy::StaticThenLive | Strategy::LiveOnly)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LocatorOptions {
    pub locate_observer_by_static: bool,
    pub locate_observer_by_live: bool,
    pub assume_observer_by_callsign: bool,
    pub ignore_placeholder_frequency: bool,
    pub warn_unlocatable_atc: bool,
    pub warn_unlocatable_observer: bool,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            locate_observer_by_static: true,
            locate_observer_by_live: false,
            assume_observer_by_callsign: true,
            ignore_placeholder_frequency: true,
            warn_unlocatable_atc: false,
            warn_unlocatable_observer: false,
        }
    }
}

/// Front door to station location: dispatches to the configured sources and
/// caches positive results. Misses are never cached, a station may log in
/// with locatable data at any moment.
pub struct StationLocator {
    strategy: Strategy,
    options: LocatorOptions,
    static_locator: Option<Arc<StaticReferenceLocator>>,
    live_locator: Option<Arc<LiveFeedLocator>>,
    cache: ExpiringCache<String, Station, Source>,
}

impl StationLocator {
    pub fn new(
        strategy: Strategy,
        options: LocatorOptions,
        static_locator: Option<Arc<StaticReferenceLocator>>,
        live_locator: Option<Arc<LiveFeedLocator>>,
    ) -> Self {
        if strategy.uses_static() && static_locator.is_none() {
            warn!("static station location is configured but no dataset is loaded");
        }

        Self {
            strategy,
            options,
            static_locator,
            live_locator,
            cache: ExpiringCache::new(CACHE_MAINTENANCE_INTERVAL),
        }
    }

    pub async fn locate(&self, callsign: &str, is_observer: bool) -> Option<Station> {
        let key = callsign.to_owned();
        if let Some(entry) = self.cache.get(&key) {
            trace!(callsign, source = ?entry.meta(), "station location cache hit");
            return Some(entry.value().clone());
        }

        if self.strategy.uses_static()
            && (!is_observer || self.options.locate_observer_by_static)
        {
            if let Some(locator) = &self.static_locator {
                if let Some(station) = locator.locate(callsign) {
                    self.cache
                        .add(key, station.clone(), Source::StaticData, CACHE_TTL);
                    return Some(station);
                }
            }
        }

        if self.strategy.uses_live() && (!is_observer || self.options.locate_observer_by_live) {
            if let Some(locator) = &self.live_locator {
                if let Some(station) = locator.locate(callsign).await {
                    self.cache
                        .add(key, station.clone(), Source::LiveFeed, CACHE_TTL);
                    return Some(station);
                }
            }
        }

        None
    }

    /// Fills in coordinates for all locatable clients that are missing them.
    pub async fn inject_into(&self, file: &mut DataFile) {
        if self.strategy == Strategy::Disabled {
            return;
        }

        for client in &mut file.clients {
            if !is_eligible(client, &self.options) {
                continue;
            }

            let is_observer = client.has_observer_rating()
                || (self.options.assume_observer_by_callsign && client.has_observer_callsign());

            match self.locate(&client.callsign, is_observer).await {
                Some(station) => {
                    trace!(
                        callsign = %client.callsign,
                        source = ?station.source,
                        "injecting station location"
                    );
                    client.latitude = Some(station.latitude);
                    client.longitude = Some(station.longitude);
                }
                None => {
                    if is_observer {
                        if self.options.warn_unlocatable_observer {
                            warn!(callsign = %client.callsign, "unable to locate observer");
                        }
                    } else if self.options.warn_unlocatable_atc {
                        warn!(callsign = %client.callsign, "unable to locate ATC station");
                    }
                }
            }
        }
    }
}

fn is_eligible(client: &Client, options: &LocatorOptions) -> bool {
    if client.client_type == ClientType::Pilot {
        return false;
    }
    if client.has_position() {
        return false;
    }
    if options.ignore_placeholder_frequency && client.is_on_placeholder_frequency() {
        return false;
    }
    true
}
