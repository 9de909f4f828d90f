//! Parsers for the static reference dataset: the station database
//! (`VATSpy.dat`, an INI-like file with pipe-separated records) and the FIR
//! boundary file (`FIRBoundaries.dat`).

use crate::geo::GeoPoint;

use super::ParseLog;

const COMMENT_PREFIX: char = ';';

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VatSpyData {
    pub airports: Vec<VatSpyAirport>,
    pub firs: Vec<VatSpyFir>,
    pub uirs: Vec<VatSpyUir>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VatSpyAirport {
    pub icao: String,
    pub location: GeoPoint,
    /// IATA or local code some stations use instead of the ICAO code.
    pub alternative_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VatSpyFir {
    pub id: String,
    pub callsign_prefix: Option<String>,
    /// Refers into the boundary file; the FIR id is used when absent.
    pub boundary_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VatSpyUir {
    pub id: String,
    pub fir_ids: Vec<String>,
}

/// Parses the station database. Only the sections needed for station
/// location are read; all others are skipped silently.
pub fn parse_vatspy(text: &str, log: &mut ParseLog) -> VatSpyData {
    let mut data = VatSpyData::default();
    let mut section = String::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT_PREFIX) {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.to_owned();
            continue;
        }

        match section.as_str() {
            "Airports" => parse_airport(line, &mut data, log),
            "FIRs" => parse_fir(line, &mut data, log),
            "UIRs" => parse_uir(line, &mut data, log),
            _ => {}
        }
    }

    data
}

// ICAO|Name|Latitude|Longitude|IATA/LID|FIR|IsPseudo
fn parse_airport(line: &str, data: &mut VatSpyData, log: &mut ParseLog) {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() < 4 {
        log.reject("Airports", line, "expected at least 4 fields");
        return;
    }

    let (latitude, longitude) = match (fields[2].parse(), fields[3].parse()) {
        (Ok(latitude), Ok(longitude)) => (latitude, longitude),
        _ => {
            log.reject("Airports", line, "unparseable coordinates");
            return;
        }
    };

    data.airports.push(VatSpyAirport {
        icao: fields[0].to_owned(),
        location: GeoPoint::new(latitude, longitude),
        alternative_code: fields
            .get(4)
            .filter(|code| !code.is_empty())
            .map(|code| (*code).to_owned()),
    });
}

// ICAO|Name|CallsignPrefix|BoundaryId
fn parse_fir(line: &str, data: &mut VatSpyData, log: &mut ParseLog) {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() < 2 {
        log.reject("FIRs", line, "expected at least 2 fields");
        return;
    }

    data.firs.push(VatSpyFir {
        id: fields[0].to_owned(),
        callsign_prefix: fields
            .get(2)
            .filter(|prefix| !prefix.is_empty())
            .map(|prefix| (*prefix).to_owned()),
        boundary_id: fields
            .get(3)
            .filter(|id| !id.is_empty())
            .map(|id| (*id).to_owned()),
    });
}

// Prefix|Name|FIR,FIR,...
fn parse_uir(line: &str, data: &mut VatSpyData, log: &mut ParseLog) {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() < 3 {
        log.reject("UIRs", line, "expected 3 fields");
        return;
    }

    data.uirs.push(VatSpyUir {
        id: fields[0].to_owned(),
        fir_ids: fields[2]
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .collect(),
    });
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FirBoundaryData {
    pub boundaries: Vec<FirBoundary>,
}

/// One boundary header. The same id may occur multiple times when a region
/// consists of several polygons.
#[derive(Debug, Clone, PartialEq)]
pub struct FirBoundary {
    pub id: String,
    pub center: GeoPoint,
}

/// Parses the boundary file. Each header line announces the number of
/// polygon points that follow; only the pre-computed center coordinates are
/// kept, the polygon itself is skipped.
pub fn parse_fir_boundaries(text: &str, log: &mut ParseLog) -> FirBoundaryData {
    let mut data = FirBoundaryData::default();
    let mut remaining_points = 0usize;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if remaining_points > 0 {
            remaining_points -= 1;
            continue;
        }

        // id|isOceanic|isExtension|points|minLat|minLon|maxLat|maxLon|centerLat|centerLon
        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() < 10 {
            log.reject("boundaries", line, "expected a 10 field header line");
            continue;
        }

        let Ok(point_count) = fields[3].parse::<usize>() else {
            log.reject("boundaries", line, "unparseable point count");
            continue;
        };
        remaining_points = point_count;

        let (center_latitude, center_longitude) = match (fields[8].parse(), fields[9].parse()) {
            (Ok(latitude), Ok(longitude)) => (latitude, longitude),
            _ => {
                log.reject("boundaries", line, "unparseable center coordinates");
                continue;
            }
        };

        data.boundaries.push(FirBoundary {
            id: fields[0].to_owned(),
            center: GeoPoint::new(center_latitude, center_longitude),
        });
    }

    data
}
