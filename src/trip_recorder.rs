use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::TrackingConfig;
use crate::gps_processor::{Point, RawData};
use crate::trip::{average_speed, TrackPoint, Trip, TripStats};

/// What happened to a single fix while recording.
#[derive(Clone, Debug, PartialEq)]
pub struct FixRecord {
    pub track_point: TrackPoint,
    pub distance_delta_m: f64,
    // `false` when the delta looked like a position jump
    pub counted: bool,
}

struct ActiveTrip {
    trip: Trip,
    last_point: Option<Point>,
}

enum RecorderState {
    Idle,
    Recording(ActiveTrip),
}

pub struct TripRecorder {
    outlier_jump_m: f64,
    state: RecorderState,
}

impl TripRecorder {
    pub fn new(config: &TrackingConfig) -> Self {
        TripRecorder {
            outlier_jump_m: config.outlier_jump_m,
            state: RecorderState::Idle,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording(_))
    }

    pub fn active_trip(&self) -> Option<&Trip> {
        match &self.state {
            RecorderState::Idle => None,
            RecorderState::Recording(active) => Some(&active.trip),
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<Trip> {
        if self.is_recording() {
            bail!("A trip is already being recorded");
        }
        let trip = Trip::new(now);
        info!("[trip_recorder] trip started: id={}", trip.id);
        self.state = RecorderState::Recording(ActiveTrip {
            trip: trip.clone(),
            last_point: None,
        });
        Ok(trip)
    }

    /// Freezes the active trip. The final numbers are recomputed from the
    /// whole point sequence rather than trusted from the running totals.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<Trip> {
        let active = match std::mem::replace(&mut self.state, RecorderState::Idle) {
            RecorderState::Idle => return None,
            RecorderState::Recording(active) => active,
        };
        let mut trip = active.trip;
        trip.end = Some(now);
        // Jumps above the outlier threshold stay excluded here too, unlike a
        // plain pairwise sum, so the stored total equals the running one.
        let stats =
            TripStats::of_track_points(&trip.track_points, trip.elapsed_sec(now), self.outlier_jump_m);
        trip.set_stats(stats);
        info!(
            "[trip_recorder] trip finished: id={}, points={}, distance_m={:.1}, max_speed_mps={:.2}",
            trip.id,
            trip.track_points.len(),
            trip.distance_m,
            trip.max_speed_mps
        );
        Some(trip)
    }

    /// Returns `None` while idle.
    pub fn on_fix(&mut self, raw_data: &RawData, now: DateTime<Utc>) -> Option<FixRecord> {
        let outlier_jump_m = self.outlier_jump_m;
        let active = match &mut self.state {
            RecorderState::Idle => return None,
            RecorderState::Recording(active) => active,
        };

        let track_point = TrackPoint::of_raw_data(raw_data);
        let trip = &mut active.trip;
        trip.track_points.push(track_point.clone());

        let (distance_delta_m, counted) = match &active.last_point {
            None => (0.0, true),
            Some(last) => {
                let delta = last.haversine_distance(&raw_data.point);
                if delta > outlier_jump_m {
                    info!(
                        "[trip_recorder] ignoring jump of {:.0}m in distance total",
                        delta
                    );
                    (delta, false)
                } else {
                    trip.distance_m += delta;
                    (delta, true)
                }
            }
        };
        active.last_point = Some(raw_data.point);

        trip.max_speed_mps = trip.max_speed_mps.max(raw_data.non_negative_speed());
        trip.average_speed_mps = average_speed(trip.distance_m, trip.elapsed_sec(now));

        Some(FixRecord {
            track_point,
            distance_delta_m,
            counted,
        })
    }
}
