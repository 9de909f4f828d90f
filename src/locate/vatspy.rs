//! Station location from the static reference dataset.
//!
//! Builds a single callsign-prefix index out of the parsed station database
//! and boundary file. FIR and UIR centers take precedence over airports;
//! airports only fill prefixes that are still free.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{trace, warn};

use crate::codec::vatspy::{
    parse_fir_boundaries, parse_vatspy, FirBoundaryData, VatSpyData,
};
use crate::codec::ParseLog;
use crate::geo::{self, GeoPoint};
use crate::model::{Source, Station};

const VATSPY_FILE_NAME: &str = "VATSpy.dat";
const FIR_BOUNDARIES_FILE_NAME: &str = "FIRBoundaries.dat";

const CALLSIGN_DELIMITER: &str = "_";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("{file_name} could not be found in {directory}")]
    MissingFile {
        file_name: &'static str,
        directory: PathBuf,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct StaticReferenceLocator {
    center_points_by_prefix: HashMap<String, GeoPoint>,
}

impl StaticReferenceLocator {
    /// Loads `VATSpy.dat` and `FIRBoundaries.dat` from the given directory.
    /// File names are matched case-insensitively.
    pub fn from_dir(
        directory: &Path,
        alias_us_stations: bool,
        parser_log_enabled: bool,
    ) -> Result<Self, LoadError> {
        if !directory.is_dir() {
            return Err(LoadError::NotADirectory(directory.to_owned()));
        }

        let vatspy_text = fs::read_to_string(find_file(directory, VATSPY_FILE_NAME)?)?;
        let boundaries_text = fs::read_to_string(find_file(directory, FIR_BOUNDARIES_FILE_NAME)?)?;

        let mut log = ParseLog::new();
        let data = parse_vatspy(&vatspy_text, &mut log);
        if parser_log_enabled {
            log.log_all(VATSPY_FILE_NAME);
        }

        let mut log = ParseLog::new();
        let boundaries = parse_fir_boundaries(&boundaries_text, &mut log);
        if parser_log_enabled {
            log.log_all(FIR_BOUNDARIES_FILE_NAME);
        }

        Ok(Self::from_data(&data, &boundaries, alias_us_stations))
    }

    pub fn from_data(
        data: &VatSpyData,
        boundaries: &FirBoundaryData,
        alias_us_stations: bool,
    ) -> Self {
        let centers_by_boundary_id = index_boundary_centers(boundaries);

        let mut index: HashMap<String, GeoPoint> = HashMap::new();
        let mut centers_by_fir_id: HashMap<String, Vec<GeoPoint>> = HashMap::new();

        for fir in &data.firs {
            let boundary_id = fir.boundary_id.as_deref().unwrap_or(&fir.id);
            let Some(&center) = centers_by_boundary_id.get(boundary_id) else {
                warn!(
                    fir = %fir.id,
                    boundary = %boundary_id,
                    "missing center point for FIR"
                );
                continue;
            };

            centers_by_fir_id
                .entry(fir.id.clone())
                .or_default()
                .push(center);

            // stations log in with either the declared prefix or the raw
            // FIR id, so both are indexed
            let prefix = fir.callsign_prefix.as_deref().map(unify_callsign);
            if let Some(prefix) = &prefix {
                insert_overwriting(&mut index, prefix.clone(), center);
            }

            let id_as_prefix = unify_callsign(&fir.id);
            if prefix.as_deref() != Some(&id_as_prefix) {
                insert_overwriting(&mut index, id_as_prefix, center);
            }
        }

        for uir in &data.uirs {
            let mut centers = Vec::new();
            for fir_id in &uir.fir_ids {
                match centers_by_fir_id.get(fir_id) {
                    Some(fir_centers) => centers.extend_from_slice(fir_centers),
                    None => warn!(
                        fir = %fir_id,
                        uir = %uir.id,
                        "missing center points for FIR referenced by UIR"
                    ),
                }
            }

            if centers.is_empty() {
                warn!(uir = %uir.id, "missing center points for UIR");
                continue;
            }

            match geo::average(&centers) {
                Ok(center) => {
                    trace!(uir = %uir.id, ?center, "calculated UIR center point");
                    insert_overwriting(&mut index, unify_callsign(&uir.id), center);
                }
                Err(err) => warn!(uir = %uir.id, error = %err, "unusable UIR center points"),
            }
        }

        for airport in &data.airports {
            insert_if_free(&mut index, unify_callsign(&airport.icao), airport.location);

            if let Some(alternative) = &airport.alternative_code {
                let alternative = unify_callsign(alternative);
                if alternative != unify_callsign(&airport.icao) {
                    insert_if_free(&mut index, alternative, airport.location);
                }
            }
        }

        if alias_us_stations {
            let aliases = alias_us_station_prefixes(&index);
            index.extend(aliases);
        }

        Self {
            center_points_by_prefix: index,
        }
    }

    /// Resolves a callsign by its longest known prefix: segments are dropped
    /// from the end one at a time until a match is found.
    pub fn locate(&self, callsign: &str) -> Option<Station> {
        trace!(callsign, "locating station from static data");

        let segments = split_callsign_uppercased(callsign);
        for used_segments in (1..=segments.len()).rev() {
            let prefix = segments[..used_segments].join(CALLSIGN_DELIMITER);
            if let Some(center) = self.center_points_by_prefix.get(&prefix) {
                trace!(prefix = %prefix, "callsign prefix matched");
                return Some(Station {
                    callsign: prefix,
                    latitude: center.latitude,
                    longitude: center.longitude,
                    source: Source::StaticData,
                });
            }
        }

        None
    }
}

fn find_file(directory: &Path, file_name: &'static str) -> Result<PathBuf, LoadError> {
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.eq_ignore_ascii_case(file_name));
        if matches && entry.path().is_file() {
            return Ok(entry.path());
        }
    }

    Err(LoadError::MissingFile {
        file_name,
        directory: directory.to_owned(),
    })
}

fn index_boundary_centers(boundaries: &FirBoundaryData) -> HashMap<String, GeoPoint> {
    let mut points_by_id: HashMap<String, Vec<GeoPoint>> = HashMap::new();
    for boundary in &boundaries.boundaries {
        points_by_id
            .entry(boundary.id.clone())
            .or_default()
            .push(boundary.center);
    }

    let mut centers = HashMap::new();
    for (id, points) in points_by_id {
        if let [single] = points.as_slice() {
            centers.insert(id, *single);
            continue;
        }

        match geo::average(&points) {
            Ok(center) => {
                trace!(
                    boundary = %id,
                    boundaries = points.len(),
                    ?center,
                    "calculated center point over multiple boundaries"
                );
                centers.insert(id, center);
            }
            Err(err) => warn!(boundary = %id, error = %err, "unusable boundary center points"),
        }
    }

    centers
}

fn insert_overwriting(index: &mut HashMap<String, GeoPoint>, prefix: String, center: GeoPoint) {
    if let Some(previous) = index.insert(prefix.clone(), center) {
        warn!(
            prefix = %prefix,
            ?previous,
            ?center,
            "multiple center points for callsign prefix"
        );
    }
}

fn insert_if_free(index: &mut HashMap<String, GeoPoint>, prefix: String, center: GeoPoint) {
    if index.contains_key(&prefix) {
        warn!(
            prefix = %prefix,
            "center point for callsign prefix is already set, not adding airport location"
        );
        return;
    }
    index.insert(prefix, center);
}

/// US stations often log in without the ICAO `K` prefix. Aliasing them to
/// the shortened form raises the chance of a match; aliases are only added
/// where no other prefix collides.
fn alias_us_station_prefixes(index: &HashMap<String, GeoPoint>) -> HashMap<String, GeoPoint> {
    let mut aliases = HashMap::new();
    for (prefix, &center) in index {
        if !prefix.starts_with('K') || !is_us_icao_callsign(prefix) {
            continue;
        }

        let alias = prefix[1..].to_owned();
        if index.contains_key(&alias) {
            continue;
        }

        trace!(original = %prefix, alias = %alias, "aliasing US station");
        aliases.insert(alias, center);
    }
    aliases
}

/// Checks for a 4-character ICAO code starting with `K`, optionally followed
/// by a suffix after a separator.
pub fn is_us_icao_callsign(callsign: &str) -> bool {
    let upper = callsign.to_ascii_uppercase();
    let bytes = upper.as_bytes();

    if bytes.len() < 4 || bytes[0] != b'K' {
        return false;
    }
    if !bytes[1..4]
        .iter()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    {
        return false;
    }
    match bytes.get(4) {
        None => true,
        Some(b) => !(b.is_ascii_uppercase() || b.is_ascii_digit()),
    }
}

fn split_callsign_uppercased(callsign: &str) -> Vec<String> {
    callsign
        .to_ascii_uppercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .map(str::to_owned)
        .collect()
}

fn unify_callsign(callsign: &str) -> String {
    split_callsign_uppercased(callsign).join(CALLSIGN_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::vatspy::{FirBoundary, VatSpyAirport, VatSpyFir, VatSpyUir};

    fn airport(icao: &str, latitude: f64, longitude: f64) -> VatSpyAirport {
        VatSpyAirport {
            icao: icao.to_owned(),
            location: GeoPoint::new(latitude, longitude),
            alternative_code: None,
        }
    }

    fn fir(id: &str, prefix: Option<&str>, boundary_id: Option<&str>) -> VatSpyFir {
        VatSpyFir {
            id: id.to_owned(),
            callsign_prefix: prefix.map(str::to_owned),
            boundary_id: boundary_id.map(str::to_owned),
        }
    }

    fn boundary(id: &str, latitude: f64, longitude: f64) -> FirBoundary {
        FirBoundary {
            id: id.to_owned(),
            center: GeoPoint::new(latitude, longitude),
        }
    }

    fn locate_latitude(locator: &StaticReferenceLocator, callsign: &str) -> Option<f64> {
        locator.locate(callsign).map(|s| s.latitude)
    }

    #[test]
    fn airports_resolve_by_icao_prefix() {
        let data = VatSpyData {
            airports: vec![airport("EDDT", 52.56, 13.29)],
            ..VatSpyData::default()
        };

        let locator = StaticReferenceLocator::from_data(&data, &FirBoundaryData::default(), false);

        let station = locator.locate("EDDT_TWR").expect("should resolve");
        assert_eq!(station.callsign, "EDDT");
        assert_eq!(station.latitude, 52.56);
        assert_eq!(station.source, Source::StaticData);
    }

    #[test]
    fn longest_known_prefix_wins() {
        let data = VatSpyData {
            airports: vec![airport("ABCD", 1.0, 1.0)],
            firs: vec![fir("ABCD_EFG", None, None)],
            ..VatSpyData::default()
        };
        let boundaries = FirBoundaryData {
            boundaries: vec![boundary("ABCD_EFG", 2.0, 2.0)],
        };

        let locator = StaticReferenceLocator::from_data(&data, &boundaries, false);

        assert_eq!(locate_latitude(&locator, "ABCD_EFG_HIJ"), Some(2.0));
        assert_eq!(locate_latitude(&locator, "ABCD_XYZ"), Some(1.0));
        assert_eq!(locate_latitude(&locator, "ABCD"), Some(1.0));
        assert_eq!(locate_latitude(&locator, "WXYZ_APP"), None);
    }

    #[test]
    fn lookup_ignores_case_and_separator_style() {
        let data = VatSpyData {
            airports: vec![airport("EDDT", 52.56, 13.29)],
            ..VatSpyData::default()
        };

        let locator = StaticReferenceLocator::from_data(&data, &FirBoundaryData::default(), false);

        assert!(locator.locate("eddt-twr").is_some());
        assert!(locator.locate("Eddt Ground").is_some());
    }

    #[test]
    fn firs_are_indexed_under_prefix_and_raw_id() {
        let data = VatSpyData {
            firs: vec![fir("KZLA", Some("LAX"), None)],
            ..VatSpyData::default()
        };
        let boundaries = FirBoundaryData {
            boundaries: vec![boundary("KZLA", 34.0, -118.0)],
        };

        let locator = StaticReferenceLocator::from_data(&data, &boundaries, false);

        assert_eq!(locate_latitude(&locator, "LAX_CTR"), Some(34.0));
        assert_eq!(locate_latitude(&locator, "KZLA_CTR"), Some(34.0));
    }

    #[test]
    fn fir_center_takes_precedence_over_airport() {
        let data = VatSpyData {
            airports: vec![airport("EDWW", 1.0, 1.0)],
            firs: vec![fir("EDWW", None, None)],
            ..VatSpyData::default()
        };
        let boundaries = FirBoundaryData {
            boundaries: vec![boundary("EDWW", 53.0, 11.0)],
        };

        let locator = StaticReferenceLocator::from_data(&data, &boundaries, false);

        assert_eq!(locate_latitude(&locator, "EDWW_CTR"), Some(53.0));
    }

    #[test]
    fn split_boundaries_are_averaged() {
        let data = VatSpyData {
            firs: vec![fir("NZZO", None, None)],
            ..VatSpyData::default()
        };
        let boundaries = FirBoundaryData {
            boundaries: vec![boundary("NZZO", -10.0, 10.0), boundary("NZZO", -20.0, 30.0)],
        };

        let locator = StaticReferenceLocator::from_data(&data, &boundaries, false);

        let station = locator.locate("NZZO_CTR").unwrap();
        assert!((station.latitude + 15.0).abs() < 1e-9);
    }

    #[test]
    fn uir_center_is_average_of_member_fir_centers() {
        let data = VatSpyData {
            firs: vec![fir("EDGG", None, None), fir("EDWW", None, None)],
            uirs: vec![VatSpyUir {
                id: "EDUU".to_owned(),
                fir_ids: vec!["EDGG".to_owned(), "EDWW".to_owned()],
            }],
            ..VatSpyData::default()
        };
        let boundaries = FirBoundaryData {
            boundaries: vec![boundary("EDGG", 50.0, 8.0), boundary("EDWW", 54.0, 10.0)],
        };

        let locator = StaticReferenceLocator::from_data(&data, &boundaries, false);

        let station = locator.locate("EDUU_CTR").unwrap();
        assert!((station.latitude - 52.0).abs() < 1e-9);
    }

    #[test]
    fn us_stations_are_aliased_without_icao_prefix() {
        let data = VatSpyData {
            airports: vec![airport("KLAX", 33.94, -118.41), airport("KSFO", 37.62, -122.38)],
            ..VatSpyData::default()
        };

        let aliased = StaticReferenceLocator::from_data(&data, &FirBoundaryData::default(), true);
        assert_eq!(locate_latitude(&aliased, "LAX_TWR"), Some(33.94));
        assert_eq!(locate_latitude(&aliased, "SFO_TWR"), Some(37.62));

        let plain = StaticReferenceLocator::from_data(&data, &FirBoundaryData::default(), false);
        assert_eq!(locate_latitude(&plain, "LAX_TWR"), None);
    }

    #[test]
    fn aliases_never_displace_existing_prefixes() {
        let data = VatSpyData {
            airports: vec![airport("KSAW", 46.35, -87.39), airport("SAW", 40.90, 29.31)],
            ..VatSpyData::default()
        };

        let locator = StaticReferenceLocator::from_data(&data, &FirBoundaryData::default(), true);

        assert_eq!(locate_latitude(&locator, "SAW_TWR"), Some(40.90));
    }

    #[test]
    fn us_icao_callsigns_are_recognized() {
        assert!(is_us_icao_callsign("KLAX"));
        assert!(is_us_icao_callsign("klax"));
        assert!(is_us_icao_callsign("KLAX_TWR"));
        assert!(is_us_icao_callsign("K90M"));

        assert!(!is_us_icao_callsign("K90_TWR"));
        assert!(!is_us_icao_callsign("EDDT"));
        assert!(!is_us_icao_callsign("KLAXX"));
        assert!(!is_us_icao_callsign("KLA"));
        assert!(!is_us_icao_callsign("LAX_TWR"));
    }

    #[test]
    fn files_are_found_case_insensitively() {
        let directory = std::env::temp_dir().join(format!("vatspy-locator-{}", std::process::id()));
        fs::create_dir_all(&directory).unwrap();
        fs::write(
            directory.join("vatspy.DAT"),
            "[Airports]\nEDDT|Berlin Tegel|52.56|13.29|TXL|EDWW|0\n",
        )
        .unwrap();
        fs::write(directory.join("firboundaries.dat"), "").unwrap();

        let locator = StaticReferenceLocator::from_dir(&directory, false, false).unwrap();
        assert!(locator.locate("EDDT_TWR").is_some());

        fs::remove_dir_all(&directory).unwrap();

        assert!(matches!(
            StaticReferenceLocator::from_dir(&directory, false, false),
            Err(LoadError::NotADirectory(_))
        ));
    }
}
