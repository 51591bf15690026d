//! Geographic primitives: a validated WGS-84 point and great-circle distance.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A WGS-84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
  pub lat: f64,
  pub lon: f64,
}

impl GeoPoint {
  /// Build a point, rejecting NaN and out-of-range coordinates.
  pub fn new(lat: f64, lon: f64) -> Result<Self> {
    let point = Self { lat, lon };
    point.validate()?;
    Ok(point)
  }

  pub fn validate(&self) -> Result<()> {
    let lat_ok = self.lat.is_finite() && (-90.0..=90.0).contains(&self.lat);
    let lon_ok = self.lon.is_finite() && (-180.0..=180.0).contains(&self.lon);
    if lat_ok && lon_ok {
      Ok(())
    } else {
      Err(Error::InvalidCoordinates { lat: self.lat, lon: self.lon })
    }
  }

  /// Great-circle distance to `other` in kilometres.
  pub fn distance_km(&self, other: &GeoPoint) -> f64 {
    let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (other.lon - self.lon).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
      + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
  }

  /// A latitude/longitude box that contains every point within `radius_km`.
  ///
  /// Used as an index-friendly prefilter before the exact distance check.
  /// When the circle reaches a pole the longitude span widens to the full
  /// range. When it crosses the antimeridian the longitude bounds wrap, so
  /// `min_lon > max_lon`; see [`BoundingBox::contains_lon`].
  pub fn bounding_box(&self, radius_km: f64) -> BoundingBox {
    let d_lat = (radius_km / EARTH_RADIUS_KM).to_degrees();
    let (min_lat, max_lat) = (self.lat - d_lat, self.lat + d_lat);
    let cos_lat = self.lat.to_radians().cos();

    let full = min_lat <= -90.0 || max_lat >= 90.0 || cos_lat.abs() < 1e-9;
    let d_lon = if full { 180.0 } else { (d_lat / cos_lat).abs() };
    let (min_lon, max_lon) = if d_lon >= 180.0 {
      (-180.0, 180.0)
    } else {
      (wrap_lon(self.lon - d_lon), wrap_lon(self.lon + d_lon))
    };

    BoundingBox {
      min_lat: min_lat.max(-90.0),
      max_lat: max_lat.min(90.0),
      min_lon,
      max_lon,
    }
  }
}

fn wrap_lon(lon: f64) -> f64 {
  if lon < -180.0 {
    lon + 360.0
  } else if lon > 180.0 {
    lon - 360.0
  } else {
    lon
  }
}

/// Inclusive coordinate ranges produced by [`GeoPoint::bounding_box`].
///
/// `min_lon > max_lon` means the box crosses the antimeridian and covers
/// `[min_lon, 180]` plus `[-180, max_lon]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub min_lat: f64,
  pub max_lat: f64,
  pub min_lon: f64,
  pub max_lon: f64,
}

impl BoundingBox {
  pub fn wraps_antimeridian(&self) -> bool { self.min_lon > self.max_lon }

  pub fn contains_lon(&self, lon: f64) -> bool {
    if self.wraps_antimeridian() {
      lon >= self.min_lon || lon <= self.max_lon
    } else {
      (self.min_lon..=self.max_lon).contains(&lon)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_out_of_range_points() {
    assert!(GeoPoint::new(91.0, 0.0).is_err());
    assert!(GeoPoint::new(0.0, -181.0).is_err());
    assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    assert!(GeoPoint::new(48.85, 2.35).is_ok());
  }

  #[test]
  fn paris_to_london_is_about_344_km() {
    let paris = GeoPoint::new(48.8566, 2.3522).unwrap();
    let london = GeoPoint::new(51.5074, -0.1278).unwrap();
    let d = paris.distance_km(&london);
    assert!((d - 343.5).abs() < 2.0, "distance: {d}");
  }

  #[test]
  fn distance_to_self_is_zero() {
    let p = GeoPoint::new(10.0, 10.0).unwrap();
    assert!(p.distance_km(&p) < 1e-9);
  }

  #[test]
  fn bounding_box_contains_points_within_radius() {
    let center = GeoPoint::new(45.0, 5.0).unwrap();
    let bbox = center.bounding_box(10.0);
    let north = GeoPoint::new(45.0 + 0.08, 5.0).unwrap();
    assert!(center.distance_km(&north) < 10.0);
    assert!(north.lat <= bbox.max_lat);
    let east = GeoPoint::new(45.0, 5.12).unwrap();
    assert!(center.distance_km(&east) < 10.0);
    assert!(east.lon <= bbox.max_lon);
  }

  #[test]
  fn bounding_box_wraps_across_the_antimeridian() {
    let fiji = GeoPoint::new(-17.0, 179.99).unwrap();
    let bbox = fiji.bounding_box(10.0);
    assert!(bbox.wraps_antimeridian());
    assert!(bbox.min_lon > 179.8 && bbox.max_lon < -179.8, "{bbox:?}");

    let across = GeoPoint::new(-17.0, -179.99).unwrap();
    assert!(fiji.distance_km(&across) < 10.0);
    assert!(bbox.contains_lon(across.lon));
    assert!(bbox.contains_lon(fiji.lon));
    assert!(!bbox.contains_lon(0.0));
  }

  #[test]
  fn bounding_box_spans_all_longitudes_near_a_pole() {
    let bbox = GeoPoint::new(89.99, 30.0).unwrap().bounding_box(5.0);
    assert_eq!((bbox.min_lon, bbox.max_lon), (-180.0, 180.0));
    assert_eq!(bbox.max_lat, 90.0);
    assert!(bbox.contains_lon(-150.0));
  }
}
