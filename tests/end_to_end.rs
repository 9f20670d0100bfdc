pub mod test_utils;

use chrono::Utc;
use roadtrip_core::api::api;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tempdir::TempDir;
use test_utils::*;

// The api is process wide state, so everything runs in one test.
#[test]
fn basic() {
    assert!(api::start_trip().is_err());

    let temp_dir = TempDir::new("end_to_end-basic").unwrap();
    println!("temp dir: {:?}", temp_dir.path());
    let config_file = temp_dir.path().join("config.json");
    std::fs::write(&config_file, r#"{ "sim_tick_interval_s": 0.02 }"#).unwrap();

    api::init(
        sub_folder(&temp_dir, "support/"),
        sub_folder(&temp_dir, "cache/"),
        Some(config_file.to_str().unwrap().to_string()),
    )
    .unwrap();
    // second call is a no-op
    api::init(
        sub_folder(&temp_dir, "support/"),
        sub_folder(&temp_dir, "cache/"),
        None,
    )
    .unwrap();

    let (log_sender, log_receiver) = mpsc::channel();
    api::set_log_sink(log_sender);

    // real sensor
    let trip = api::start_trip().unwrap();
    let mut point = start_point();
    let mut batch = Vec::new();
    for _ in 0..20 {
        point = offset_point(point, 15.0, 0.0);
        batch.push(raw_data(point, Utc::now()));
    }
    api::on_location_update(batch).unwrap();
    api::on_heading_update(350.0).unwrap();
    api::on_heading_update(10.0).unwrap();
    api::on_map_heading_update(45.0).unwrap();
    assert!(api::animation_tick().unwrap());

    let state = api::render_state().unwrap();
    assert!(state.is_recording);
    assert_eq!(state.current_location, Some(point));
    assert_eq!(state.continuous_heading, Some(370.0));
    assert_eq!(state.continuous_map_heading, Some(45.0));
    assert!((state.distance_m - 285.0).abs() < 1.0);
    assert!(!state.smooth_display_points.is_empty());

    // simulation takes over from the last real location
    api::start_simulation().unwrap();
    assert!(api::start_simulation().is_err());
    assert!(api::is_simulating().unwrap());
    api::set_joystick(0.0, 1.0).unwrap();
    for _ in 0..20 {
        thread::sleep(Duration::from_millis(20));
        api::animation_tick().unwrap();
    }

    let finished = api::stop_trip().unwrap().unwrap();
    assert!(!api::is_simulating().unwrap());
    assert!(api::set_joystick(1.0, 0.0).is_err());
    assert_eq!(finished.id, trip.id);
    assert!(finished.track_points.len() > 20);
    assert!(finished.distance_m > 285.0);
    assert!(api::stop_trip().unwrap().is_none());
    assert!(!api::render_state().unwrap().is_recording);

    api::flush_storage().unwrap();
    let trips = api::list_trips().unwrap();
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].id, trip.id);
    let detail = api::trip_detail(trip.id.to_string()).unwrap().unwrap();
    assert_eq!(detail.track_points.len(), finished.track_points.len());
    assert_eq!(detail.distance_m, finished.distance_m);
    assert!(api::trip_detail("not a uuid".to_string()).is_err());

    api::toggle_raw_data_mode(true).unwrap();
    assert!(api::get_raw_data_mode().unwrap());
    api::on_location_update(vec![raw_data(point, Utc::now())]).unwrap();
    api::process_pending().unwrap();
    api::flush_storage().unwrap();
    assert_eq!(api::list_all_raw_data().unwrap().len(), 1);
    api::toggle_raw_data_mode(false).unwrap();

    api::delete_trip(trip.id.to_string()).unwrap();
    assert!(api::list_trips().unwrap().is_empty());

    // lines are forwarded by a dispatcher thread
    let mut found = false;
    while let Ok(line) = log_receiver.recv_timeout(Duration::from_secs(2)) {
        if line.contains("trip finished") {
            found = true;
            break;
        }
    }
    assert!(found);

    let zip_path = temp_dir.path().join("logs.zip");
    api::export_logs(zip_path.to_str().unwrap().to_string()).unwrap();
    assert!(zip_path.exists());
}
