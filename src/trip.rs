use chrono::{DateTime, Utc};
use itertools::Itertools;
use uuid::Uuid;

use crate::gps_processor::{Point, RawData};

const MPS_TO_KMH: f64 = 3.6;

#[derive(Clone, Debug, PartialEq)]
pub struct TrackPoint {
    pub id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub course: Option<f64>,
    pub horizontal_accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl TrackPoint {
    pub fn of_raw_data(raw_data: &RawData) -> Self {
        TrackPoint {
            id: Uuid::new_v4(),
            latitude: raw_data.point.latitude,
            longitude: raw_data.point.longitude,
            altitude: raw_data.altitude,
            speed: raw_data.non_negative_speed(),
            course: raw_data.course,
            horizontal_accuracy: raw_data.accuracy,
            // a timestamp out of chrono's range is not worth dropping the fix for
            timestamp: raw_data.timestamp().unwrap_or_else(Utc::now),
        }
    }

    pub fn point(&self) -> Point {
        Point {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed * MPS_TO_KMH
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct TripStats {
    pub distance_m: f64,
    pub max_speed_mps: f64,
    pub average_speed_mps: f64,
}

impl TripStats {
    /// Walks the whole point sequence. Deltas above `outlier_jump_m` are
    /// treated as position jumps and left out of the distance.
    pub fn of_track_points(
        track_points: &[TrackPoint],
        elapsed_sec: f64,
        outlier_jump_m: f64,
    ) -> Self {
        let distance_m: f64 = track_points
            .iter()
            .tuple_windows()
            .map(|(prev, curr)| prev.point().haversine_distance(&curr.point()))
            .filter(|delta| *delta <= outlier_jump_m)
            .sum();
        let max_speed_mps = track_points
            .iter()
            .map(|p| p.speed)
            .fold(0.0, f64::max);
        TripStats {
            distance_m,
            max_speed_mps,
            average_speed_mps: average_speed(distance_m, elapsed_sec),
        }
    }
}

pub fn average_speed(distance_m: f64, elapsed_sec: f64) -> f64 {
    if elapsed_sec > 0.0 {
        distance_m / elapsed_sec
    } else {
        0.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Trip {
    pub id: Uuid,
    pub start: DateTime<Utc>,
    // `None` means the trip is still being recorded
    pub end: Option<DateTime<Utc>>,
    pub distance_m: f64,
    pub max_speed_mps: f64,
    pub average_speed_mps: f64,
    pub track_points: Vec<TrackPoint>,
}

impl Trip {
    pub fn new(start: DateTime<Utc>) -> Self {
        Trip {
            id: Uuid::new_v4(),
            start,
            end: None,
            distance_m: 0.0,
            max_speed_mps: 0.0,
            average_speed_mps: 0.0,
            track_points: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.end.is_none()
    }

    pub fn stats(&self) -> TripStats {
        TripStats {
            distance_m: self.distance_m,
            max_speed_mps: self.max_speed_mps,
            average_speed_mps: self.average_speed_mps,
        }
    }

    pub fn set_stats(&mut self, stats: TripStats) {
        self.distance_m = stats.distance_m;
        self.max_speed_mps = stats.max_speed_mps;
        self.average_speed_mps = stats.average_speed_mps;
    }

    // Active trips are measured up to `now`.
    pub fn elapsed_sec(&self, now: DateTime<Utc>) -> f64 {
        let end = self.end.unwrap_or(now);
        (end - self.start).num_milliseconds() as f64 / 1000.0
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_m / 1000.0
    }

    pub fn max_speed_kmh(&self) -> f64 {
        self.max_speed_mps * MPS_TO_KMH
    }

    pub fn average_speed_kmh(&self) -> f64 {
        self.average_speed_mps * MPS_TO_KMH
    }

    pub fn formatted_duration(&self, now: DateTime<Utc>) -> String {
        format_duration(self.elapsed_sec(now))
    }
}

pub fn format_duration(elapsed_sec: f64) -> String {
    let total_seconds = elapsed_sec.max(0.0) as i64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::format_duration;

    #[test]
    fn duration_format() {
        assert_eq!(format_duration(0.0), "00:00");
        assert_eq!(format_duration(59.9), "00:59");
        assert_eq!(format_duration(5025.0), "1:23:45");
        assert_eq!(format_duration(-3.0), "00:00");
    }
}
