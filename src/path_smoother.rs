use splines::{Interpolation, Key, Spline};
use std::ops::Range;

use crate::gps_processor::Point;

pub struct PathSmoother {}

impl PathSmoother {
    // main func to turn a polyline into a visually smooth curve.
    // `(n-1) * segments_per_point + 1` points come out, ending exactly on the
    // last input point.
    pub fn smooth(points: &[Point], segments_per_point: usize) -> Vec<Point> {
        // a Catmull-Rom segment needs 4 control points, with fewer we skip
        // smoothing rather than guess.
        if points.len() < 4 || segments_per_point == 0 {
            return points.to_vec();
        }
        let mut smoothed =
            PathSmoother::smooth_segments(points, segments_per_point, 0..points.len() - 1);
        smoothed.push(points[points.len() - 1]);
        smoothed
    }

    /// Evaluates only the segments in `segments` (segment `i` runs from
    /// `points[i]` to `points[i + 1]`), without the closing point. Only the
    /// control points around the range are touched, so the cost does not
    /// depend on the length of `points`.
    pub fn smooth_segments(
        points: &[Point],
        segments_per_point: usize,
        segments: Range<usize>,
    ) -> Vec<Point> {
        let n = points.len();
        let start = segments.start;
        let end = segments.end.min(n.saturating_sub(1));
        if start >= end || segments_per_point == 0 {
            return Vec::new();
        }

        // segment i needs [i-1, i+2]
        let first = start.saturating_sub(1);
        let last = (end + 1).min(n - 1);

        let combine = |t: usize, v: f64| Key::new(t as f64, v, Interpolation::<_, f64>::CatmullRom);
        let mut vec_key_lat: Vec<Key<f64, f64>> = (first..=last)
            .map(|i| combine(i, points[i].latitude))
            .collect();
        let mut vec_key_lon: Vec<Key<f64, f64>> = (first..=last)
            .map(|i| combine(i, points[i].longitude))
            .collect();

        // out of range neighbours reuse the first/last point
        if start == 0 {
            vec_key_lat.insert(0, Key::new(-1., points[0].latitude, Interpolation::default()));
            vec_key_lon.insert(0, Key::new(-1., points[0].longitude, Interpolation::default()));
        }
        if end + 1 > n - 1 {
            vec_key_lat.push(Key::new(
                n as f64,
                points[n - 1].latitude,
                Interpolation::default(),
            ));
            vec_key_lon.push(Key::new(
                n as f64,
                points[n - 1].longitude,
                Interpolation::default(),
            ));
        }

        let spline_lat = Spline::from_vec(vec_key_lat);
        let spline_lon = Spline::from_vec(vec_key_lon);

        let mut smoothed = Vec::with_capacity((end - start) * segments_per_point);
        for i in start..end {
            for j in 0..segments_per_point {
                let t = i as f64 + j as f64 / segments_per_point as f64;
                smoothed.push(Point {
                    latitude: spline_lat.sample(t).unwrap_or(points[i].latitude),
                    longitude: spline_lon.sample(t).unwrap_or(points[i].longitude),
                });
            }
        }
        smoothed
    }
}
