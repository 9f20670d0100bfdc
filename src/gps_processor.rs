use crate::config::TrackingConfig;
use anyhow::Result;
use chrono::{DateTime, Utc};
use strum_macros::EnumIter;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

impl Point {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Point {
            latitude,
            longitude,
        }
    }

    // spherical earth, good enough for intra-city distances.
    pub fn haversine_distance(&self, other: &Point) -> f64 {
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.latitude.to_radians().cos()
                * other.latitude.to_radians().cos()
                * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
        EARTH_RADIUS_M * c
    }

    pub fn lerp(&self, other: &Point, t: f64) -> Point {
        Point {
            latitude: self.latitude + (other.latitude - self.latitude) * t,
            longitude: self.longitude + (other.longitude - self.longitude) * t,
        }
    }
}

/// One fix as reported by the positioning source (real or simulated).
///
/// `speed` follows the sensor convention: a negative value means unknown.
/// `course` is `None` when the sensor reports its "unknown" sentinel.
#[derive(Clone, Debug, PartialEq)]
pub struct RawData {
    pub point: Point,
    pub altitude: f64,
    pub speed: f64,
    pub course: Option<f64>,
    pub accuracy: f64,
    pub timestamp_ms: i64,
}

impl RawData {
    /// Maps the `-1` course sentinel used by sensor drivers to `None`.
    pub fn course_of_sensor_value(course: f64) -> Option<f64> {
        if course < 0.0 || !course.is_finite() {
            None
        } else {
            Some(course)
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }

    /// Reported speed with the "unknown" sentinel clamped away.
    pub fn non_negative_speed(&self) -> f64 {
        self.speed.max(0.0)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum RejectReason {
    NegativeAccuracy = -1,
    InaccurateFix = -2,
    StaleFix = -3,
    ImplausibleSpeed = -4,
}

impl RejectReason {
    pub fn describe(&self) -> &'static str {
        match self {
            RejectReason::NegativeAccuracy => "negative accuracy",
            RejectReason::InaccurateFix => "accuracy above ceiling",
            RejectReason::StaleFix => "fix too old",
            RejectReason::ImplausibleSpeed => "implausible speed",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValidationResult {
    Accept,
    // rejections are expected sensor noise, not failures.
    Reject(RejectReason),
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationResult::Accept)
    }

    pub fn to_int(&self) -> i8 {
        match self {
            ValidationResult::Accept => 0,
            ValidationResult::Reject(reason) => *reason as i8,
        }
    }

    pub fn of_int(i: i8) -> Result<Self> {
        match i {
            0 => Ok(ValidationResult::Accept),
            -1 => Ok(ValidationResult::Reject(RejectReason::NegativeAccuracy)),
            -2 => Ok(ValidationResult::Reject(RejectReason::InaccurateFix)),
            -3 => Ok(ValidationResult::Reject(RejectReason::StaleFix)),
            -4 => Ok(ValidationResult::Reject(RejectReason::ImplausibleSpeed)),
            _ => bail!("Invalid int for `ValidationResult` {}", i),
        }
    }
}


/// Accepts or rejects raw fixes. Holds no state besides its thresholds.
#[derive(Clone, Debug)]
pub struct GpsPreprocessor {
    max_accuracy_m: f64,
    max_fix_age_ms: i64,
    max_speed_mps: f64,
}

#[derive(Debug, Default, PartialEq)]
pub struct BatchOutcome {
    pub accepted: Vec<RawData>,
    pub rejected: Vec<(RawData, RejectReason)>,
}

impl BatchOutcome {
    pub fn rejected_count(&self, reason: RejectReason) -> usize {
        self.rejected.iter().filter(|(_, r)| *r == reason).count()
    }
}

impl GpsPreprocessor {
    pub fn new(config: &TrackingConfig) -> Self {
        GpsPreprocessor {
            max_accuracy_m: config.max_accuracy_m,
            max_fix_age_ms: (config.max_fix_age_s * 1000.0).round() as i64,
            max_speed_mps: config.max_speed_mps,
        }
    }

    pub fn validate(&self, raw_data: &RawData, now: DateTime<Utc>) -> ValidationResult {
        if raw_data.accuracy < 0.0 {
            return ValidationResult::Reject(RejectReason::NegativeAccuracy);
        }
        if raw_data.accuracy > self.max_accuracy_m {
            return ValidationResult::Reject(RejectReason::InaccurateFix);
        }
        // NOTE: cached fixes get replayed by some sensors when the session
        // starts, the age check keeps them out of the track.
        let age_ms = now.timestamp_millis().saturating_sub(raw_data.timestamp_ms);
        if age_ms >= self.max_fix_age_ms {
            return ValidationResult::Reject(RejectReason::StaleFix);
        }
        if raw_data.non_negative_speed() > self.max_speed_mps {
            return ValidationResult::Reject(RejectReason::ImplausibleSpeed);
        }
        ValidationResult::Accept
    }

    // Every fix is judged on its own and input order is kept.
    pub fn preprocess_batch(
        &self,
        raw_data_list: impl IntoIterator<Item = RawData>,
        now: DateTime<Utc>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for raw_data in raw_data_list {
            match self.validate(&raw_data, now) {
                ValidationResult::Accept => outcome.accepted.push(raw_data),
                ValidationResult::Reject(reason) => {
                    debug!(
                        "[gps_processor] rejected fix: reason={}, accuracy={}, speed={}, timestamp_ms={}",
                        reason.describe(),
                        raw_data.accuracy,
                        raw_data.speed,
                        raw_data.timestamp_ms
                    );
                    outcome.rejected.push((raw_data, reason));
                }
            }
        }
        outcome
    }
}
