//! Geographic calculations.

use thiserror::Error;

const LATITUDE_MINIMUM: f64 = -90.0;
const LATITUDE_MAXIMUM: f64 = 90.0;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Input errors indicating a corrupt dataset. These are propagated to the
/// caller instead of being swallowed because averaging garbage coordinates
/// would silently produce garbage locations.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("no points given to calculate a center for")]
    EmptyInput,

    #[error("latitude out of range: {0} must be within [-90, 90]")]
    LatitudeOutOfRange(f64),
}

/// Calculates the average center of the given points, using the standard
/// "center of points" construction: latitudes are averaged arithmetically
/// while longitudes are averaged over their sine/cosine components so that
/// points on both sides of the antimeridian wrap correctly instead of
/// producing a naive midpoint on the wrong side of the planet.
///
/// A single point is returned unchanged. Longitudes are not range-checked as
/// they are circular by nature.
pub fn average(points: &[GeoPoint]) -> Result<GeoPoint, GeoError> {
    match points {
        [] => return Err(GeoError::EmptyInput),
        [single] => {
            check_latitude(single.latitude)?;
            return Ok(*single);
        }
        _ => {}
    }

    let mut sum_latitudes = 0.0;
    let mut sum_zeta = 0.0;
    let mut sum_xi = 0.0;

    for point in points {
        check_latitude(point.latitude)?;
        sum_latitudes += point.latitude;

        let longitude_rad = point.longitude.to_radians();
        sum_zeta += longitude_rad.sin();
        sum_xi += longitude_rad.cos();
    }

    let num_points = points.len() as f64;
    let center_latitude = sum_latitudes / num_points;
    let center_longitude = (sum_zeta / num_points)
        .atan2(sum_xi / num_points)
        .to_degrees();

    Ok(GeoPoint::new(center_latitude, center_longitude))
}

fn check_latitude(latitude: f64) -> Result<(), GeoError> {
    if !(LATITUDE_MINIMUM..=LATITUDE_MAXIMUM).contains(&latitude) {
        return Err(GeoError::LatitudeOutOfRange(latitude));
    }
    Ok(())
}
