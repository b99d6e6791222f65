//! Geodetic to local East-North-Up projection.
//!
//! [`EnuProjector`] fixes a tangent-plane origin once and then maps WGS-84
//! `(latitude, longitude, altitude)` fixes to metres east, north and up of
//! that origin, going through Earth-centred Earth-fixed (ECEF) coordinates.

use nalgebra::{Matrix3, Vector3};

/// WGS-84 semi-major axis (m).
const WGS84_A: f64 = 6_378_137.0;
/// WGS-84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// First eccentricity squared.
const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

/// Projects geodetic coordinates into a local ENU frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EnuProjector {
    origin_ecef: Vector3<f64>,
    /// Rotation from ECEF deltas to ENU.
    ecef_to_enu: Matrix3<f64>,
}

impl EnuProjector {
    /// Fix the ENU origin at `(latitude°, longitude°, altitude m)`.
    pub fn new(latitude_deg: f64, longitude_deg: f64, altitude_m: f64) -> Self {
        let lat = latitude_deg.to_radians();
        let lon = longitude_deg.to_radians();
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();

        #[rustfmt::skip]
        let ecef_to_enu = Matrix3::new(
            -sin_lon,            cos_lon,           0.0,
            -sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat,
             cos_lat * cos_lon,  cos_lat * sin_lon, sin_lat,
        );

        Self {
            origin_ecef: geodetic_to_ecef(latitude_deg, longitude_deg, altitude_m),
            ecef_to_enu,
        }
    }

    /// `(east, north, up)` of the given fix relative to the origin, in metres.
    pub fn project(&self, latitude_deg: f64, longitude_deg: f64, altitude_m: f64) -> Vector3<f64> {
        self.ecef_to_enu * (geodetic_to_ecef(latitude_deg, longitude_deg, altitude_m) - self.origin_ecef)
    }
}

/// WGS-84 geodetic coordinates to ECEF metres.
pub fn geodetic_to_ecef(latitude_deg: f64, longitude_deg: f64, altitude_m: f64) -> Vector3<f64> {
    let lat = latitude_deg.to_radians();
    let lon = longitude_deg.to_radians();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    Vector3::new(
        (n + altitude_m) * cos_lat * cos_lon,
        (n + altitude_m) * cos_lat * sin_lon,
        (n * (1.0 - WGS84_E2) + altitude_m) * sin_lat,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const ORIGIN: (f64, f64) = (52.705502, -8.899619);
    const EARTH_RADIUS_M: f64 = 6_378_137.0;

    /// Spherical-earth approximation of moving `east`/`north` metres.
    fn offset(lat: f64, lon: f64, east: f64, north: f64) -> (f64, f64) {
        let dlat = north / EARTH_RADIUS_M;
        let dlon = east / (EARTH_RADIUS_M * lat.to_radians().cos());
        (lat + dlat.to_degrees(), lon + dlon.to_degrees())
    }

    #[test]
    fn origin_projects_to_zero() {
        let enu = EnuProjector::new(ORIGIN.0, ORIGIN.1, 0.0);
        assert_abs_diff_eq!(enu.project(ORIGIN.0, ORIGIN.1, 0.0), Vector3::zeros(), epsilon = 1e-6);
    }

    #[test]
    fn altitude_maps_to_up() {
        let enu = EnuProjector::new(ORIGIN.0, ORIGIN.1, 0.0);
        let p = enu.project(ORIGIN.0, ORIGIN.1, 12.0);
        assert_abs_diff_eq!(p, Vector3::new(0.0, 0.0, 12.0), epsilon = 1e-6);
    }

    #[test]
    fn east_and_north_offsets_are_recovered() {
        let enu = EnuProjector::new(ORIGIN.0, ORIGIN.1, 0.0);

        let (lat, lon) = offset(ORIGIN.0, ORIGIN.1, 5.0, 0.0);
        let east = enu.project(lat, lon, 0.0);
        assert_abs_diff_eq!(east.x, 5.0, epsilon = 0.05);
        assert_abs_diff_eq!(east.y, 0.0, epsilon = 0.05);

        let (lat, lon) = offset(ORIGIN.0, ORIGIN.1, 0.0, 10.0);
        let north = enu.project(lat, lon, 0.0);
        assert_abs_diff_eq!(north.x, 0.0, epsilon = 0.05);
        assert_abs_diff_eq!(north.y, 10.0, epsilon = 0.05);
    }

    #[test]
    fn ecef_of_equator_prime_meridian() {
        assert_abs_diff_eq!(
            geodetic_to_ecef(0.0, 0.0, 0.0),
            Vector3::new(WGS84_A, 0.0, 0.0),
            epsilon = 1e-6
        );
    }
}
