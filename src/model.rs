//! Neutral data model shared by codecs, fetchers, locators and proxies.

use std::collections::BTreeMap;

use itertools::Itertools;

/// Frequency some clients place ATC stations on while not actively providing
/// service on a real frequency.
pub const PLACEHOLDER_FREQUENCY: &str = "199.998";

/// Permission rating identifying observers.
pub const OBSERVER_RATING: i64 = 1;

/// Callsign suffix conventionally used by observers.
pub const OBSERVER_CALLSIGN_SUFFIX: &str = "_OBS";

/// Well-known categories of data file URLs advertised by the network
/// information documents.
pub mod data_keys {
    pub const LEGACY: &str = "legacy";
    pub const V3: &str = "v3";
    pub const TRANSCEIVERS: &str = "transceivers";
    pub const SERVERS: &str = "servers";
}

/// Network meta information ("status document"): where to find the actual
/// data files, plus startup messages to show to users.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkInformation {
    pub whazzup_string: Option<String>,
    pub startup_messages: Vec<String>,
    pub moved_to_urls: Vec<String>,
    /// Data file URLs grouped by category, see [`data_keys`].
    pub data_urls: BTreeMap<String, Vec<String>>,
    pub metar_urls: Vec<String>,
    pub servers_file_urls: Vec<String>,
    pub user_statistics_urls: Vec<String>,
}

impl NetworkInformation {
    /// URLs for the given data category, empty when unknown.
    pub fn data_urls_for(&self, key: &str) -> &[String] {
        self.data_urls.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add_data_url(&mut self, key: impl Into<String>, url: impl Into<String>) {
        self.data_urls.entry(key.into()).or_default().push(url.into());
    }

    /// Combines two documents into one. `self` takes precedence: its URLs
    /// come first in every list and its scalar fields win when both sides
    /// carry a value. Duplicate URLs are removed while preserving order.
    pub fn merge(&self, other: &NetworkInformation) -> NetworkInformation {
        let mut data_urls = BTreeMap::new();
        for key in self.data_urls.keys().chain(other.data_urls.keys()) {
            if data_urls.contains_key(key) {
                continue;
            }
            data_urls.insert(
                key.clone(),
                merge_url_lists(self.data_urls_for(key), other.data_urls_for(key)),
            );
        }

        NetworkInformation {
            whazzup_string: self
                .whazzup_string
                .clone()
                .or_else(|| other.whazzup_string.clone()),
            startup_messages: merge_url_lists(&self.startup_messages, &other.startup_messages),
            moved_to_urls: merge_url_lists(&self.moved_to_urls, &other.moved_to_urls),
            data_urls,
            metar_urls: merge_url_lists(&self.metar_urls, &other.metar_urls),
            servers_file_urls: merge_url_lists(&self.servers_file_urls, &other.servers_file_urls),
            user_statistics_urls: merge_url_lists(
                &self.user_statistics_urls,
                &other.user_statistics_urls,
            ),
        }
    }
}

fn merge_url_lists(first: &[String], second: &[String]) -> Vec<String> {
    first
        .iter()
        .chain(second.iter())
        .unique()
        .cloned()
        .collect()
}

/// A decoded data file holding the current network state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFile {
    pub general: GeneralSection,
    pub clients: Vec<Client>,
    pub servers: Vec<ServerEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneralSection {
    pub version: u8,
    /// Timestamp of the upstream snapshot, already formatted as
    /// `yyyyMMddHHmmss` UTC for the legacy output.
    pub update_timestamp: Option<String>,
    pub connected_clients: Option<u64>,
    pub unique_users: Option<u64>,
    /// Minimum number of minutes clients are asked to wait between
    /// retrievals.
    pub reload_minutes: Option<f64>,
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            version: 8,
            update_timestamp: None,
            connected_clients: None,
            unique_users: None,
            reload_minutes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    Pilot,
    Atc,
    Atis,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub callsign: String,
    pub cid: Option<u64>,
    pub real_name: String,
    pub client_type: ClientType,
    pub frequency: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<i64>,
    pub groundspeed: Option<i64>,
    pub server: Option<String>,
    pub rating: Option<i64>,
    pub visual_range: Option<i64>,
    pub atis_message: Option<String>,
    pub logon_time: Option<String>,
    pub heading: Option<i64>,
}

impl Client {
    pub fn new(callsign: impl Into<String>, client_type: ClientType) -> Self {
        Self {
            callsign: callsign.into(),
            cid: None,
            real_name: String::new(),
            client_type,
            frequency: None,
            latitude: None,
            longitude: None,
            altitude: None,
            groundspeed: None,
            server: None,
            rating: None,
            visual_range: None,
            atis_message: None,
            logon_time: None,
            heading: None,
        }
    }

    pub fn has_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    pub fn is_on_placeholder_frequency(&self) -> bool {
        self.frequency.as_deref() == Some(PLACEHOLDER_FREQUENCY)
    }

    pub fn has_observer_rating(&self) -> bool {
        self.rating == Some(OBSERVER_RATING)
    }

    pub fn has_observer_callsign(&self) -> bool {
        self.callsign
            .to_ascii_uppercase()
            .ends_with(OBSERVER_CALLSIGN_SUFFIX)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerEntry {
    pub ident: String,
    pub hostname: String,
    pub location: String,
    pub name: String,
    pub clients_connection_allowed: bool,
}

/// The live transceivers feed: one record per logged-in station, each with
/// the positions of its active transmitters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransceiversFile {
    pub stations: Vec<TransceiverStation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransceiverStation {
    pub callsign: String,
    pub transceivers: Vec<Transceiver>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transceiver {
    pub latitude: f64,
    pub longitude: f64,
}

/// Where a resolved station location came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    StaticData,
    LiveFeed,
}

/// A station with a resolved location.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub callsign: String,
    pub latitude: f64,
    pub longitude: f64,
    pub source: Source,
}
