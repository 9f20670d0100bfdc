use chrono::{DateTime, Utc};

use crate::config::TrackingConfig;
use crate::gps_processor::Point;
use crate::path_smoother::PathSmoother;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Animation {
    start: Point,
    target: Point,
    start_time: DateTime<Utc>,
}

pub fn ease_out_quad(t: f64) -> f64 {
    1.0 - (1.0 - t) * (1.0 - t)
}

/// Two-tier track buffer for display: durable `confirmed_points` plus an
/// `animated_head` that eases toward the latest reported coordinate.
///
/// Smoothing output of the leading segments is cached. Confirmed points only
/// ever get appended, so segment `i` can no longer change once `i + 2` is a
/// confirmed index; each tick then only re-evaluates the last couple of
/// segments around the head.
pub struct TrackAnimator {
    animation_duration_s: f64,
    confirm_threshold_m: f64,
    segments_per_point: usize,
    confirmed_points: Vec<Point>,
    animated_head: Option<Point>,
    animation: Option<Animation>,
    stable_smoothed: Vec<Point>,
    stable_segments: usize,
}

impl TrackAnimator {
    pub fn new(config: &TrackingConfig) -> Self {
        TrackAnimator {
            animation_duration_s: config.animation_duration_s,
            confirm_threshold_m: config.confirm_threshold_m,
            segments_per_point: config.segments_per_point,
            confirmed_points: Vec::new(),
            animated_head: None,
            animation: None,
            stable_smoothed: Vec::new(),
            stable_segments: 0,
        }
    }

    pub fn confirmed_points(&self) -> &[Point] {
        &self.confirmed_points
    }

    pub fn animated_head(&self) -> Option<Point> {
        self.animated_head
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    pub fn add_point(&mut self, point: Point, now: DateTime<Utc>) {
        let last_confirmed = self.confirmed_points.last().copied();
        let head = match (last_confirmed, self.animated_head) {
            (Some(last_confirmed), Some(head)) => {
                // promote the head to a durable vertex once it moved far enough
                if last_confirmed.haversine_distance(&head) > self.confirm_threshold_m {
                    self.confirmed_points.push(head);
                }
                head
            }
            _ => {
                self.confirmed_points.push(point);
                self.animated_head = Some(point);
                self.animation = None;
                return;
            }
        };
        self.animation = Some(Animation {
            start: head,
            target: point,
            start_time: now,
        });
    }

    /// Advances the head. Returns `false` when there is nothing to animate.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        let animation = match self.animation {
            None => return false,
            Some(animation) => animation,
        };
        let elapsed_s = (now - animation.start_time)
            .num_microseconds()
            .unwrap_or(i64::MAX) as f64
            / 1_000_000.0;
        let progress = (elapsed_s / self.animation_duration_s).clamp(0.0, 1.0);
        if progress >= 1.0 {
            self.animated_head = Some(animation.target);
            self.animation = None;
        } else {
            self.animated_head = Some(
                animation
                    .start
                    .lerp(&animation.target, ease_out_quad(progress)),
            );
        }
        true
    }

    pub fn display_points(&self) -> Vec<Point> {
        let mut points = self.confirmed_points.clone();
        points.extend(self.animated_head);
        points
    }

    /// Same result as `PathSmoother::smooth(&self.display_points(), ..)`.
    pub fn smooth_display_points(&mut self) -> Vec<Point> {
        let spp = self.segments_per_point;
        let confirmed_len = self.confirmed_points.len();
        let display_len = confirmed_len + self.animated_head.iter().count();
        if display_len < 4 || spp == 0 {
            return self.display_points();
        }

        let stable_limit = confirmed_len.saturating_sub(2);
        if self.stable_segments < stable_limit {
            let extension = PathSmoother::smooth_segments(
                &self.confirmed_points,
                spp,
                self.stable_segments..stable_limit,
            );
            self.stable_smoothed.extend(extension);
            self.stable_segments = stable_limit;
        }

        // The tail window starts at least one point before the first unstable
        // segment, so its clamped leading segment(s) are dropped and come from
        // the cache instead. `display_len >= 4` keeps `stable_segments >= 1`.
        let window_start = (self.stable_segments - 1).min(display_len - 4);
        let mut window: Vec<Point> = self.confirmed_points[window_start..].to_vec();
        window.extend(self.animated_head);
        let tail = PathSmoother::smooth(&window, spp);
        let skip = (self.stable_segments - window_start) * spp;

        let mut smoothed = Vec::with_capacity(self.stable_smoothed.len() + tail.len() - skip);
        smoothed.extend_from_slice(&self.stable_smoothed);
        smoothed.extend_from_slice(&tail[skip..]);
        smoothed
    }

    // Freezes the head where it is, the track stays displayable.
    pub fn halt(&mut self) {
        self.animation = None;
    }

    pub fn reset(&mut self) {
        self.confirmed_points.clear();
        self.animated_head = None;
        self.animation = None;
        self.stable_smoothed.clear();
        self.stable_segments = 0;
    }
}
