pub mod test_utils;

use rand::{rngs::StdRng, Rng, SeedableRng};
use roadtrip_core::config::TrackingConfig;
use roadtrip_core::gps_processor::Point;
use roadtrip_core::path_smoother::PathSmoother;
use roadtrip_core::track_animator::{ease_out_quad, TrackAnimator};
use test_utils::*;

fn animator() -> TrackAnimator {
    TrackAnimator::new(&TrackingConfig::default())
}

fn assert_close(a: Point, b: Point) {
    assert!(a.haversine_distance(&b) < 1e-6, "{:?} vs {:?}", a, b);
}

#[test]
fn easing() {
    assert_eq!(ease_out_quad(0.0), 0.0);
    assert_eq!(ease_out_quad(0.5), 0.75);
    assert_eq!(ease_out_quad(1.0), 1.0);
}

#[test]
fn first_point_is_immediate() {
    let mut animator = animator();
    assert!(animator.animated_head().is_none());
    assert!(animator.display_points().is_empty());

    let p = start_point();
    animator.add_point(p, at_sec(0.0));
    assert_eq!(animator.animated_head(), Some(p));
    assert_eq!(animator.confirmed_points(), &[p]);
    assert!(!animator.is_animating());
    assert!(!animator.tick(at_sec(0.1)));
    assert_eq!(animator.display_points(), vec![p, p]);
}

#[test]
fn head_eases_toward_target() {
    let mut animator = animator();
    let p0 = start_point();
    let p1 = offset_point(p0, 40.0, 0.0);
    animator.add_point(p0, at_sec(0.0));
    animator.add_point(p1, at_sec(1.0));
    assert!(animator.is_animating());

    assert!(animator.tick(at_sec(1.0)));
    assert_close(animator.animated_head().unwrap(), p0);

    // half of 150ms
    assert!(animator.tick(at_sec(1.075)));
    assert_close(animator.animated_head().unwrap(), p0.lerp(&p1, 0.75));

    assert!(animator.tick(at_sec(1.15)));
    assert_eq!(animator.animated_head(), Some(p1));
    assert!(!animator.is_animating());
    assert!(!animator.tick(at_sec(1.2)));
    assert_eq!(animator.animated_head(), Some(p1));
}

#[test]
fn late_tick_lands_on_target() {
    let mut animator = animator();
    let p0 = start_point();
    let p1 = offset_point(p0, 10.0, 10.0);
    animator.add_point(p0, at_sec(0.0));
    animator.add_point(p1, at_sec(1.0));
    assert!(animator.tick(at_sec(5.0)));
    assert_eq!(animator.animated_head(), Some(p1));
}

#[test]
fn head_is_promoted_after_moving() {
    let mut animator = animator();
    let p0 = start_point();
    let p1 = offset_point(p0, 30.0, 0.0);
    let p2 = offset_point(p1, 30.0, 0.0);

    animator.add_point(p0, at_sec(0.0));
    // head still sits on the only confirmed point
    animator.add_point(p1, at_sec(1.0));
    assert_eq!(animator.confirmed_points(), &[p0]);
    animator.tick(at_sec(2.0));

    animator.add_point(p2, at_sec(2.0));
    assert_eq!(animator.confirmed_points(), &[p0, p1]);
    assert_eq!(animator.display_points(), vec![p0, p1, p1]);
}

#[test]
fn small_moves_are_not_promoted() {
    let mut animator = animator();
    let p0 = start_point();
    animator.add_point(p0, at_sec(0.0));
    for i in 1..10 {
        let p = offset_point(p0, i as f64 * 0.05, 0.0);
        animator.add_point(p, at_sec(i as f64));
        animator.tick(at_sec(i as f64 + 1.0));
    }
    assert_eq!(animator.confirmed_points(), &[p0]);
}

#[test]
fn retarget_mid_animation() {
    let mut animator = animator();
    let p0 = start_point();
    let p1 = offset_point(p0, 100.0, 0.0);
    let p2 = offset_point(p0, 100.0, 100.0);
    animator.add_point(p0, at_sec(0.0));
    animator.add_point(p1, at_sec(1.0));
    animator.tick(at_sec(1.075));
    let mid = animator.animated_head().unwrap();

    // the half way head is > 1m away from p0, so it becomes a vertex
    animator.add_point(p2, at_sec(1.075));
    assert_eq!(animator.confirmed_points(), &[p0, mid]);
    animator.tick(at_sec(1.075));
    assert_close(animator.animated_head().unwrap(), mid);
    animator.tick(at_sec(2.0));
    assert_eq!(animator.animated_head(), Some(p2));
}

#[test]
fn halt_and_reset() {
    let mut animator = animator();
    let p0 = start_point();
    let p1 = offset_point(p0, 50.0, 0.0);
    animator.add_point(p0, at_sec(0.0));
    animator.add_point(p1, at_sec(1.0));
    animator.tick(at_sec(1.05));
    let head = animator.animated_head();

    animator.halt();
    assert!(!animator.is_animating());
    assert!(!animator.tick(at_sec(3.0)));
    assert_eq!(animator.animated_head(), head);

    animator.reset();
    assert!(animator.animated_head().is_none());
    assert!(animator.confirmed_points().is_empty());
    assert!(animator.smooth_display_points().is_empty());
}

#[test]
fn smooth_display_points_match_full_smoothing() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut animator = animator();
    let mut point = start_point();
    let mut t = 0.0;
    for _ in 0..200 {
        point = offset_point(
            point,
            rng.random_range(-5.0..25.0),
            rng.random_range(-20.0..20.0),
        );
        animator.add_point(point, at_sec(t));
        let ticks = rng.random_range(0..4);
        for _ in 0..ticks {
            t += rng.random_range(0.01..0.1);
            animator.tick(at_sec(t));
            let cached = animator.smooth_display_points();
            let full = PathSmoother::smooth(&animator.display_points(), 5);
            assert_eq!(cached.len(), full.len());
            for (a, b) in cached.iter().zip(full.iter()) {
                assert!((a.latitude - b.latitude).abs() < 1e-9);
                assert!((a.longitude - b.longitude).abs() < 1e-9);
            }
        }
        t += 1.0;
    }
    assert!(animator.confirmed_points().len() > 100);
}

#[test]
fn smooth_display_points_short_track() {
    let mut animator = animator();
    let p0 = start_point();
    animator.add_point(p0, at_sec(0.0));
    assert_eq!(animator.smooth_display_points(), vec![p0, p0]);
}
