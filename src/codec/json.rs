//! Decoders for the modern JSON documents: the network information
//! ("status") document, the v3 data feed and the transceivers feed.
//!
//! Documents are first read into a generic [`serde_json::Value`] and then
//! converted record by record so that a single malformed record is rejected
//! onto the [`ParseLog`] instead of failing the whole feed.

use serde::Deserialize;
use serde_json::Value;

use crate::error::GatewayError;
use crate::model::{
    data_keys, Client, ClientType, DataFile, GeneralSection, NetworkInformation, ServerEntry,
    Transceiver, TransceiverStation, TransceiversFile,
};

use super::ParseLog;

/// Parses the modern network information document.
pub fn parse_network_information(
    text: &str,
    log: &mut ParseLog,
) -> Result<NetworkInformation, GatewayError> {
    let root: Value = serde_json::from_str(text)?;
    let mut info = NetworkInformation::default();

    if let Some(data) = root.get("data").and_then(Value::as_object) {
        for (key, value) in data {
            let category = match key.as_str() {
                "v3" => data_keys::V3,
                "transceivers" => data_keys::TRANSCEIVERS,
                "servers" => data_keys::SERVERS,
                other => other,
            };
            for url in string_array(value, &format!("data.{key}"), log) {
                info.add_data_url(category, url);
            }
        }
    }

    info.metar_urls = string_array(root.get("metar").unwrap_or(&Value::Null), "metar", log);
    info.user_statistics_urls = string_array(root.get("user").unwrap_or(&Value::Null), "user", log);

    Ok(info)
}

fn string_array(value: &Value, section: &str, log: &mut ParseLog) -> Vec<String> {
    let Some(items) = value.as_array() else {
        if !value.is_null() {
            log.reject(section, value.to_string(), "expected an array of URLs");
        }
        return Vec::new();
    };

    let mut urls = Vec::new();
    for item in items {
        match item.as_str() {
            Some(url) => urls.push(url.to_owned()),
            None => log.reject(section, item.to_string(), "expected a URL string"),
        }
    }
    urls
}

#[derive(Debug, Deserialize)]
struct JsonGeneral {
    update_timestamp: Option<String>,
    connected_clients: Option<u64>,
    unique_users: Option<u64>,
    reload: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct JsonPilot {
    callsign: String,
    cid: Option<u64>,
    #[serde(default)]
    name: String,
    server: Option<String>,
    latitude: f64,
    longitude: f64,
    altitude: Option<i64>,
    groundspeed: Option<i64>,
    heading: Option<i64>,
    logon_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonController {
    callsign: String,
    cid: Option<u64>,
    #[serde(default)]
    name: String,
    server: Option<String>,
    frequency: Option<String>,
    rating: Option<i64>,
    visual_range: Option<i64>,
    text_atis: Option<Vec<String>>,
    logon_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonServer {
    ident: String,
    hostname_or_ip: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    client_connections_allowed: bool,
}

/// Parses the v3 data feed into the neutral model. The v3 feed does not
/// publish coordinates for controllers and ATIS stations; those fields stay
/// empty for later injection.
pub fn parse_data_file(text: &str, log: &mut ParseLog) -> Result<DataFile, GatewayError> {
    let root: Value = serde_json::from_str(text)?;
    let mut file = DataFile::default();

    if let Some(general) = root.get("general") {
        match serde_json::from_value::<JsonGeneral>(general.clone()) {
            Ok(general) => file.general = convert_general(general),
            Err(err) => log.reject("general", general.to_string(), err.to_string()),
        }
    }

    for value in array(&root, "pilots") {
        match serde_json::from_value::<JsonPilot>(value.clone()) {
            Ok(pilot) => file.clients.push(convert_pilot(pilot)),
            Err(err) => log.reject("pilots", value.to_string(), err.to_string()),
        }
    }

    for value in array(&root, "controllers") {
        match serde_json::from_value::<JsonController>(value.clone()) {
            Ok(controller) => file.clients.push(convert_controller(controller, ClientType::Atc)),
            Err(err) => log.reject("controllers", value.to_string(), err.to_string()),
        }
    }

    for value in array(&root, "atis") {
        match serde_json::from_value::<JsonController>(value.clone()) {
            Ok(atis) => file.clients.push(convert_controller(atis, ClientType::Atis)),
            Err(err) => log.reject("atis", value.to_string(), err.to_string()),
        }
    }

    for value in array(&root, "servers") {
        match serde_json::from_value::<JsonServer>(value.clone()) {
            Ok(server) => file.servers.push(ServerEntry {
                ident: server.ident,
                hostname: server.hostname_or_ip,
                location: server.location,
                name: server.name,
                clients_connection_allowed: server.client_connections_allowed,
            }),
            Err(err) => log.reject("servers", value.to_string(), err.to_string()),
        }
    }

    Ok(file)
}

fn array<'a>(root: &'a Value, key: &str) -> std::slice::Iter<'a, Value> {
    root.get(key)
        .and_then(Value::as_array)
        .map(|v| v.iter())
        .unwrap_or_default()
}

fn convert_general(general: JsonGeneral) -> GeneralSection {
    GeneralSection {
        update_timestamp: general.update_timestamp.as_deref().map(to_legacy_timestamp),
        connected_clients: general.connected_clients,
        unique_users: general.unique_users,
        reload_minutes: general.reload,
        ..GeneralSection::default()
    }
}

fn convert_pilot(pilot: JsonPilot) -> Client {
    let mut client = Client::new(pilot.callsign, ClientType::Pilot);
    client.cid = pilot.cid;
    client.real_name = pilot.name;
    client.server = pilot.server;
    client.latitude = Some(pilot.latitude);
    client.longitude = Some(pilot.longitude);
    client.altitude = pilot.altitude;
    client.groundspeed = pilot.groundspeed;
    client.heading = pilot.heading;
    client.logon_time = pilot.logon_time.as_deref().map(to_legacy_timestamp);
    client
}

fn convert_controller(controller: JsonController, client_type: ClientType) -> Client {
    let mut client = Client::new(controller.callsign, client_type);
    client.cid = controller.cid;
    client.real_name = controller.name;
    client.server = controller.server;
    client.frequency = controller.frequency;
    client.rating = controller.rating;
    client.visual_range = controller.visual_range;
    client.atis_message = controller
        .text_atis
        .filter(|lines| !lines.is_empty())
        .map(|lines| lines.join("\n"));
    client.logon_time = controller.logon_time.as_deref().map(to_legacy_timestamp);
    client
}

// ISO-8601 timestamps become the 14-digit yyyyMMddHHmmss form used by the
// legacy format
fn to_legacy_timestamp(iso: &str) -> String {
    iso.chars().filter(char::is_ascii_digit).take(14).collect()
}

#[derive(Debug, Deserialize)]
struct JsonTransceiverStation {
    callsign: String,
    transceivers: Vec<JsonTransceiver>,
}

#[derive(Debug, Deserialize)]
struct JsonTransceiver {
    #[serde(rename = "latDeg")]
    latitude: f64,
    #[serde(rename = "lonDeg")]
    longitude: f64,
}

/// Parses the live transceivers feed.
pub fn parse_transceivers(text: &str, log: &mut ParseLog) -> Result<TransceiversFile, GatewayError> {
    let root: Value = serde_json::from_str(text)?;
    let mut file = TransceiversFile::default();

    let Some(records) = root.as_array() else {
        return Err(GatewayError::Decode(
            "transceivers document is not an array".to_owned(),
        ));
    };

    for value in records {
        match serde_json::from_value::<JsonTransceiverStation>(value.clone()) {
            Ok(station) => file.stations.push(TransceiverStation {
                callsign: station.callsign,
                transceivers: station
                    .transceivers
                    .into_iter()
                    .map(|t| Transceiver {
                        latitude: t.latitude,
                        longitude: t.longitude,
                    })
                    .collect(),
            }),
            Err(err) => log.reject("transceivers", value.to_string(), err.to_string()),
        }
    }

    Ok(file)
}
