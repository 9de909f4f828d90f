//! Legacy plain-text formats: the `key=value` network information document
//! and the colon-separated "whazzup" data file (writer only, the gateway
//! never consumes legacy data files).

use crate::model::{
    data_keys, Client, ClientType, DataFile, NetworkInformation, ServerEntry,
};

use super::ParseLog;

const KEY_WHAZZUP: &str = "whazzup0";
const KEY_STARTUP_MESSAGE: &str = "msg0";
const KEY_DATA_URL_LEGACY: &str = "url0";
const KEY_DATA_URL_JSON3: &str = "json3";
const KEY_SERVERS_FILE_URL: &str = "url1";
const KEY_METAR_URL: &str = "metar0";
const KEY_USER_STATISTICS_URL: &str = "user0";
const KEY_MOVED_TO_URL: &str = "moveto0";

const COMMENT_PREFIX: char = ';';
const SECTION_NAME: &str = "network information";

/// Parses a legacy network information document. Unknown keys and malformed
/// lines are recorded on the log and skipped.
pub fn parse_network_information(text: &str, log: &mut ParseLog) -> NetworkInformation {
    let mut info = NetworkInformation::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT_PREFIX) {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            log.reject(SECTION_NAME, line, "line is neither comment nor key=value");
            continue;
        };

        let key = key.trim();
        let value = value.trim().to_owned();
        if value.is_empty() {
            log.reject(SECTION_NAME, line, "empty value");
            continue;
        }

        match key {
            KEY_WHAZZUP => info.whazzup_string = Some(value),
            KEY_STARTUP_MESSAGE => info.startup_messages.push(value),
            KEY_DATA_URL_LEGACY => info.add_data_url(data_keys::LEGACY, value),
            KEY_DATA_URL_JSON3 => info.add_data_url(data_keys::V3, value),
            KEY_SERVERS_FILE_URL => info.servers_file_urls.push(value),
            KEY_METAR_URL => info.metar_urls.push(value),
            KEY_USER_STATISTICS_URL => info.user_statistics_urls.push(value),
            KEY_MOVED_TO_URL => info.moved_to_urls.push(value),
            _ => log.note(SECTION_NAME, line, format!("unknown key \"{key}\"")),
        }
    }

    info
}

/// Serializes a network information document in the legacy key order.
pub fn write_network_information(info: &NetworkInformation) -> String {
    let mut out = String::new();

    for message in &info.startup_messages {
        push_key_value(&mut out, KEY_STARTUP_MESSAGE, message);
    }
    for url in info.data_urls_for(data_keys::LEGACY) {
        push_key_value(&mut out, KEY_DATA_URL_LEGACY, url);
    }
    for url in info.data_urls_for(data_keys::V3) {
        push_key_value(&mut out, KEY_DATA_URL_JSON3, url);
    }
    for url in &info.servers_file_urls {
        push_key_value(&mut out, KEY_SERVERS_FILE_URL, url);
    }
    for url in &info.metar_urls {
        push_key_value(&mut out, KEY_METAR_URL, url);
    }
    for url in &info.user_statistics_urls {
        push_key_value(&mut out, KEY_USER_STATISTICS_URL, url);
    }
    for url in &info.moved_to_urls {
        push_key_value(&mut out, KEY_MOVED_TO_URL, url);
    }
    if let Some(whazzup) = &info.whazzup_string {
        push_key_value(&mut out, KEY_WHAZZUP, whazzup);
    }

    out
}

fn push_key_value(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push('=');
    out.push_str(value);
    out.push_str("\r\n");
}

/// Turns free text into legacy comment lines.
pub fn comment_block(text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        out.push(COMMENT_PREFIX);
        if !line.is_empty() {
            out.push(' ');
            out.push_str(line);
        }
        out.push_str("\r\n");
    }
    out
}

/// Serializes a data file in the legacy whazzup layout, preceded by the given
/// header text as a comment block.
pub fn write_data_file(file: &DataFile, header: &str) -> String {
    let mut out = comment_block(header);
    out.push_str("\r\n");

    out.push_str("!GENERAL:\r\n");
    push_general(&mut out, file);

    out.push_str("!CLIENTS:\r\n");
    for client in &file.clients {
        push_client(&mut out, client);
    }

    out.push_str("!SERVERS:\r\n");
    for server in &file.servers {
        push_server(&mut out, server);
    }

    out
}

fn push_general(out: &mut String, file: &DataFile) {
    let general = &file.general;
    out.push_str(&format!("VERSION = {}\r\n", general.version));
    if let Some(reload) = general.reload_minutes {
        // legacy clients expect an integer number of minutes
        out.push_str(&format!("RELOAD = {}\r\n", reload.ceil().max(1.0) as u64));
    }
    if let Some(update) = &general.update_timestamp {
        out.push_str(&format!("UPDATE = {update}\r\n"));
    }
    if let Some(connected) = general.connected_clients {
        out.push_str(&format!("CONNECTED CLIENTS = {connected}\r\n"));
    }
    if let Some(unique) = general.unique_users {
        out.push_str(&format!("UNIQUE USERS = {unique}\r\n"));
    }
}

// column layout of a legacy client record; unavailable fields stay empty but
// the column count must be kept for clients indexing by position
fn push_client(out: &mut String, client: &Client) {
    let mut fields: Vec<String> = vec![String::new(); 41];

    fields[0] = sanitize(&client.callsign);
    fields[1] = client.cid.map(|v| v.to_string()).unwrap_or_default();
    fields[2] = sanitize(&client.real_name);
    fields[3] = match client.client_type {
        ClientType::Pilot => "PILOT".to_owned(),
        // ATIS stations appear as regular ATC in the legacy format
        ClientType::Atc | ClientType::Atis => "ATC".to_owned(),
    };
    fields[4] = client.frequency.clone().unwrap_or_default();
    fields[5] = client
        .latitude
        .map(format_coordinate)
        .unwrap_or_default();
    fields[6] = client
        .longitude
        .map(format_coordinate)
        .unwrap_or_default();
    fields[7] = client.altitude.map(|v| v.to_string()).unwrap_or_default();
    fields[8] = client
        .groundspeed
        .map(|v| v.to_string())
        .unwrap_or_default();
    fields[14] = client.server.clone().unwrap_or_default();
    fields[16] = client.rating.map(|v| v.to_string()).unwrap_or_default();
    fields[19] = client
        .visual_range
        .map(|v| v.to_string())
        .unwrap_or_default();
    fields[35] = client
        .atis_message
        .as_deref()
        .map(encode_atis_message)
        .unwrap_or_default();
    fields[37] = client.logon_time.clone().unwrap_or_default();
    fields[38] = client.heading.map(|v| v.to_string()).unwrap_or_default();

    out.push_str(&fields.join(":"));
    out.push_str(":\r\n");
}

fn push_server(out: &mut String, server: &ServerEntry) {
    out.push_str(&format!(
        "{}:{}:{}:{}:{}:\r\n",
        sanitize(&server.ident),
        sanitize(&server.hostname),
        sanitize(&server.location),
        sanitize(&server.name),
        if server.clients_connection_allowed {
            1
        } else {
            0
        },
    ));
}

fn format_coordinate(value: f64) -> String {
    format!("{value:.5}")
}

// colons are the field separator and must never leak into field content
fn sanitize(text: &str) -> String {
    text.replace(':', " ")
}

// legacy clients render "^§" as a line break inside ATIS text
fn encode_atis_message(text: &str) -> String {
    sanitize(&text.replace("\r\n", "\n").replace('\n', "^\u{a7}"))
}
