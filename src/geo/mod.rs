use serde::{Deserialize, Serialize};

use crate::error::AppError;

const EARTH_RADIUS_KM: f64 = 6_371.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn validate(&self, field: &str) -> Result<(), AppError> {
        let lat_ok = self.lat.is_finite() && (-90.0..=90.0).contains(&self.lat);
        let lng_ok = self.lng.is_finite() && (-180.0..=180.0).contains(&self.lng);

        if lat_ok && lng_ok {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "{field} coordinates out of range: ({}, {})",
                self.lat, self.lng
            )))
        }
    }
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().atan2((1.0 - haversine).sqrt());

    EARTH_RADIUS_KM * central_angle
}

/// Great-circle distance in kilometres, rounded to two decimal places.
///
/// This is the offline estimate every distance in the system falls back to.
pub fn distance_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    round_km(haversine_km(a, b))
}

pub fn round_km(km: f64) -> f64 {
    (km * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::{distance_km, haversine_km, GeoPoint};

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint::new(17.3850, 78.4867);
        assert_eq!(distance_km(&p, &p), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let pairs = [
            (GeoPoint::new(17.3850, 78.4867), GeoPoint::new(17.9689, 79.5941)),
            (GeoPoint::new(-33.8688, 151.2093), GeoPoint::new(51.5074, -0.1278)),
            (GeoPoint::new(0.0, 179.9), GeoPoint::new(0.0, -179.9)),
        ];

        for (a, b) in pairs {
            assert_eq!(distance_km(&a, &b), distance_km(&b, &a));
        }
    }

    #[test]
    fn hyderabad_to_warangal_is_around_130_km() {
        let hyderabad = GeoPoint::new(17.3850, 78.4867);
        let warangal = GeoPoint::new(17.9689, 79.5941);
        let distance = distance_km(&hyderabad, &warangal);
        assert!((125.0..=135.0).contains(&distance), "got {distance}");
    }

    #[test]
    fn rounds_to_two_decimals() {
        let a = GeoPoint::new(17.3850, 78.4867);
        let b = GeoPoint::new(17.4000, 78.5000);
        let distance = distance_km(&a, &b);
        assert_eq!(distance, (distance * 100.0).round() / 100.0);
        assert!((distance - haversine_km(&a, &b)).abs() <= 0.005);
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(GeoPoint::new(91.0, 0.0).validate("pickup").is_err());
        assert!(GeoPoint::new(0.0, -181.0).validate("drop").is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).validate("drop").is_err());
        assert!(GeoPoint::new(17.38, 78.48).validate("pickup").is_ok());
    }
}
