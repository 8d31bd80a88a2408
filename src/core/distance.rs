use geo::{HaversineDistance, Point};

/// Great-circle distance between two `(latitude, longitude)` pairs in kilometers
///
/// # Arguments
/// * `from` - Origin coordinates in degrees, if known
/// * `to` - Destination coordinates in degrees, if known
///
/// # Returns
/// `None` when either side has no coordinates
#[inline]
pub fn haversine_distance(from: Option<(f64, f64)>, to: Option<(f64, f64)>) -> Option<f64> {
    let (lat1, lon1) = from?;
    let (lat2, lon2) = to?;

    if !(lat1.is_finite() && lon1.is_finite() && lat2.is_finite() && lon2.is_finite()) {
        return None;
    }

    // geo points are (x = longitude, y = latitude)
    let origin = Point::new(lon1, lat1);
    let destination = Point::new(lon2, lat2);

    Some(origin.haversine_distance(&destination) / 1000.0)
}
