use crate::gps_processor::{Point, RawData};

// Floor on the reported accuracy so a perfect fix cannot lock the variance at 0.
const MIN_ACCURACY_M: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterState {
    pub latitude: f64,
    pub longitude: f64,
    pub variance: f64,
}

/// Scalar Kalman smoothing of latitude and longitude as two independent
/// channels. Only meant for calmer display positions; trip statistics are
/// accumulated from raw fixes.
#[derive(Clone, Debug, Default)]
pub struct PositionFilter {
    state: Option<FilterState>,
}

impl PositionFilter {
    pub fn new() -> Self {
        PositionFilter { state: None }
    }

    pub fn state(&self) -> Option<FilterState> {
        self.state
    }

    // `None` while no fix has been seen yet.
    pub fn variance(&self) -> Option<f64> {
        self.state.map(|s| s.variance)
    }

    pub fn reset(&mut self) {
        self.state = None;
    }

    pub fn process(&mut self, raw_data: &RawData) -> RawData {
        let accuracy = raw_data.accuracy.max(MIN_ACCURACY_M);
        let measurement_variance = accuracy * accuracy;

        let state = match self.state {
            None => FilterState {
                latitude: raw_data.point.latitude,
                longitude: raw_data.point.longitude,
                variance: measurement_variance,
            },
            Some(prev) => {
                let k = prev.variance / (prev.variance + measurement_variance);
                FilterState {
                    latitude: prev.latitude + k * (raw_data.point.latitude - prev.latitude),
                    longitude: prev.longitude + k * (raw_data.point.longitude - prev.longitude),
                    variance: prev.variance * (1.0 - k),
                }
            }
        };
        self.state = Some(state);

        RawData {
            point: Point {
                latitude: state.latitude,
                longitude: state.longitude,
            },
            accuracy: state.variance.sqrt(),
            ..raw_data.clone()
        }
    }
}
