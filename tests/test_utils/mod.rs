#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use roadtrip_core::gps_processor::{Point, RawData};
use std::fs;
use tempdir::TempDir;

pub const START_LAT: f64 = 45.0355;
pub const START_LNG: f64 = 38.9753;

// must match the radius used by `Point::haversine_distance`
const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub fn start_point() -> Point {
    Point::new(START_LAT, START_LNG)
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

pub fn at_sec(sec: f64) -> DateTime<Utc> {
    base_time() + Duration::milliseconds((sec * 1000.0).round() as i64)
}

/// Moves `origin` by the given meters. A pure north/south offset is exact
/// under haversine.
pub fn offset_point(origin: Point, north_m: f64, east_m: f64) -> Point {
    let latitude = origin.latitude + (north_m / EARTH_RADIUS_M).to_degrees();
    let longitude = origin.longitude
        + (east_m / (EARTH_RADIUS_M * origin.latitude.to_radians().cos())).to_degrees();
    Point::new(latitude, longitude)
}

pub fn raw_data(point: Point, time: DateTime<Utc>) -> RawData {
    RawData {
        point,
        altitude: 30.0,
        speed: 10.0,
        course: Some(0.0),
        accuracy: 5.0,
        timestamp_ms: time.timestamp_millis(),
    }
}

pub fn raw_data_with_speed(point: Point, time: DateTime<Utc>, speed: f64) -> RawData {
    RawData {
        speed,
        ..raw_data(point, time)
    }
}

pub fn sub_folder(temp_dir: &TempDir, sub: &str) -> String {
    let path = temp_dir.path().join(sub);
    fs::create_dir_all(&path).unwrap();
    path.into_os_string().into_string().unwrap()
}
