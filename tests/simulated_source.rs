#[macro_use]
extern crate assert_float_eq;

pub mod test_utils;

use chrono::Utc;
use roadtrip_core::config::TrackingConfig;
use roadtrip_core::simulated_source::{SimulatedSource, SimulationDriver, DEFAULT_START};
use roadtrip_core::tracking_session::{SessionEvent, TrackingSession};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use test_utils::*;

fn source() -> SimulatedSource {
    let mut source = SimulatedSource::new(start_point(), &TrackingConfig::default());
    source.start(at_sec(0.0));
    source
}

#[test]
fn rests_without_input() {
    let mut source = source();
    for i in 1..10 {
        let raw_data = source.tick(at_sec(i as f64 * 0.5));
        assert_eq!(raw_data.point, start_point());
        assert_eq!(raw_data.speed, 0.0);
    }
}

#[test]
fn emitted_fix_shape() {
    let mut source = source();
    source.set_control(0.0, 1.0);
    let raw_data = source.tick(at_sec(0.5));
    assert_eq!(raw_data.accuracy, 5.0);
    assert_eq!(raw_data.altitude, 0.0);
    assert_eq!(raw_data.course, Some(0.0));
    assert_eq!(raw_data.timestamp_ms, at_sec(0.5).timestamp_millis());
}

#[test]
fn course_follows_control() {
    let mut source = source();
    source.set_control(1.0, 0.0);
    assert_float_absolute_eq!(source.course(), 90.0, 1e-9);
    source.set_control(0.0, -1.0);
    assert_float_absolute_eq!(source.course(), 180.0, 1e-9);
    source.set_control(-1.0, 0.0);
    assert_float_absolute_eq!(source.course(), 270.0, 1e-9);
    source.set_control(-0.5, 0.5);
    assert_float_absolute_eq!(source.course(), 315.0, 1e-9);
    source.set_control(0.0, 1.0);
    assert_float_absolute_eq!(source.course(), 0.0, 1e-9);

    // releasing the stick keeps the direction
    source.set_control(1.0, 0.0);
    source.set_control(0.0, 0.0);
    assert_float_absolute_eq!(source.course(), 90.0, 1e-9);
}

#[test]
fn control_is_clamped() {
    let mut source = source();
    source.set_control(3.0, -7.0);
    assert_eq!(source.control(), (1.0, -1.0));
    source.set_control(f64::NAN, 0.5);
    assert_eq!(source.control(), (0.0, 0.5));
}

#[test]
fn accelerates_up_to_max_speed() {
    let mut source = source();
    source.set_control(0.0, 1.0);
    let expected = [2.5, 5.0, 7.5, 10.0, 12.5, 15.0, 16.67, 16.67];
    for (i, speed) in expected.iter().enumerate() {
        source.tick(at_sec((i + 1) as f64 * 0.5));
        assert_float_absolute_eq!(source.speed(), *speed, 1e-9);
    }

    // diagonal input is capped at full deflection
    source.set_control(1.0, 1.0);
    source.tick(at_sec(10.0));
    assert_float_absolute_eq!(source.speed(), 16.67, 1e-9);
}

#[test]
fn partial_control_gives_partial_speed() {
    let mut source = source();
    source.set_control(0.0, 0.5);
    source.tick(at_sec(10.0));
    assert_float_absolute_eq!(source.speed(), 16.67 * 0.5, 1e-9);
}

#[test]
fn decelerates_to_rest() {
    let mut source = source();
    source.set_control(0.0, 1.0);
    source.tick(at_sec(10.0));
    assert_float_absolute_eq!(source.speed(), 16.67, 1e-9);

    source.set_control(0.0, 0.0);
    let mut t = 10.0;
    let mut last_speed = source.speed();
    while source.speed() > 0.0 {
        t += 0.5;
        source.tick(at_sec(t));
        let expected = (last_speed - 4.0).max(0.0);
        assert_float_absolute_eq!(source.speed(), expected, 1e-9);
        last_speed = source.speed();
    }
    assert_eq!(t, 12.5);

    let rest = source.point();
    for i in 1..10 {
        let raw_data = source.tick(at_sec(t + i as f64));
        assert_eq!(raw_data.point, rest);
    }
}

#[test]
fn moves_along_course() {
    let mut source = source();
    source.set_control(0.0, 1.0);
    source.tick(at_sec(10.0));
    let before = source.point();
    source.tick(at_sec(11.0));
    let after = source.point();
    assert_float_absolute_eq!(
        after.latitude - before.latitude,
        16.67 / 111_320.0,
        1e-12
    );
    assert_float_absolute_eq!(after.longitude, before.longitude, 1e-12);

    source.set_control(1.0, 0.0);
    source.tick(at_sec(12.0));
    let east = source.point();
    let expected = 16.67 / (111_320.0 * after.latitude.to_radians().cos());
    assert_float_absolute_eq!(east.longitude - after.longitude, expected, 1e-12);
    assert_float_absolute_eq!(east.latitude, after.latitude, 1e-12);
}

#[test]
fn default_start() {
    assert_eq!(DEFAULT_START.latitude, 45.0355);
    assert_eq!(DEFAULT_START.longitude, 38.9753);
}

#[test]
fn driver_feeds_session_until_stopped() {
    let mut session = TrackingSession::new(TrackingConfig::default()).unwrap();
    let source = SimulatedSource::new(start_point(), session.config());
    let driver =
        SimulationDriver::start(source, Duration::from_millis(10), session.sender()).unwrap();
    driver.set_control(0.0, 1.0);
    thread::sleep(Duration::from_millis(200));
    let source = driver.stop().unwrap();
    assert!(source.speed() > 0.0);

    assert!(session.process_pending(Utc::now()) > 0);
    assert!(session.last_location().is_some());

    thread::sleep(Duration::from_millis(50));
    assert_eq!(session.process_pending(Utc::now()), 0);
}

#[test]
fn driver_keeps_ticking_while_joystick_moves() {
    let mut session = TrackingSession::new(TrackingConfig::default()).unwrap();
    let fixes = Arc::new(Mutex::new(0));
    let fixes_clone = fixes.clone();
    session.subscribe(Box::new(move |event| {
        if let SessionEvent::LocationUpdated { .. } = event {
            *fixes_clone.lock().unwrap() += 1;
        }
    }));

    let source = SimulatedSource::new(start_point(), session.config());
    let driver =
        SimulationDriver::start(source, Duration::from_millis(100), session.sender()).unwrap();
    // a dragged joystick reports far more often than the tick rate
    for _ in 0..50 {
        driver.set_control(0.0, 1.0);
        thread::sleep(Duration::from_millis(20));
    }
    let source = driver.stop().unwrap();
    assert!(source.speed() > 0.0);

    session.process_pending(Utc::now());
    assert!(*fixes.lock().unwrap() >= 5);
}
