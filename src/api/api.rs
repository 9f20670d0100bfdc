use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use crate::config::TrackingConfig;
use crate::gps_processor::RawData;
use crate::logs;
use crate::simulated_source::{SimulatedSource, SimulationDriver, DEFAULT_START};
use crate::storage::{self, Storage};
use crate::tracking_session::{FixSender, InboundEvent, RenderState, SessionEvent, TrackingSession};
use crate::trip::Trip;

// Lock order: `simulation` is never held while locking `session`.
struct MainState {
    cache_dir: String,
    storage: Arc<Storage>,
    fix_sender: FixSender,
    session: Mutex<TrackingSession>,
    simulation: Mutex<Option<SimulationDriver>>,
}

static MAIN_STATE: OnceLock<MainState> = OnceLock::new();

/// `config_file` is an optional JSON `TrackingConfig`; missing fields keep
/// their defaults.
pub fn init(support_dir: String, cache_dir: String, config_file: Option<String>) -> Result<()> {
    if MAIN_STATE.get().is_some() {
        warn!("`init` is called multiple times");
        return Ok(());
    }

    logs::init(&cache_dir)?;

    let config = match config_file {
        None => TrackingConfig::default(),
        Some(path) => TrackingConfig::load(path)?,
    };
    let storage = Arc::new(Storage::init(support_dir)?);
    let mut session = TrackingSession::new(config)?;
    session.set_sink(storage.clone());
    let fix_sender = session.sender();

    let state = MainState {
        cache_dir,
        storage,
        fix_sender,
        session: Mutex::new(session),
        simulation: Mutex::new(None),
    };
    if MAIN_STATE.set(state).is_err() {
        warn!("`init` raced with another `init`");
    } else {
        info!("initialized");
    }
    Ok(())
}

fn get() -> Result<&'static MainState> {
    MAIN_STATE
        .get()
        .ok_or_else(|| anyhow!("main state is not initialized"))
}

pub fn subscribe(subscriber: Box<dyn FnMut(&SessionEvent) + Send>) -> Result<()> {
    get()?.session.lock().unwrap().subscribe(subscriber);
    Ok(())
}

pub fn start_trip() -> Result<Trip> {
    get()?.session.lock().unwrap().start_trip(Utc::now())
}

/// Also ends a running simulation. Returns `None` if nothing was recorded.
pub fn stop_trip() -> Result<Option<Trip>> {
    let state = get()?;
    stop_simulation()?;
    let mut session = state.session.lock().unwrap();
    // fixes queued before the stop still belong to the trip
    session.process_pending(Utc::now());
    Ok(session.stop_trip(Utc::now()))
}

// The following three only queue work, they never wait on the session.
pub fn on_location_update(raw_data_list: Vec<RawData>) -> Result<()> {
    get()?.fix_sender.send_fixes(raw_data_list)
}

pub fn on_heading_update(heading: f64) -> Result<()> {
    get()?.fix_sender.send(InboundEvent::Heading(heading))
}

pub fn on_map_heading_update(heading: f64) -> Result<()> {
    get()?.fix_sender.send(InboundEvent::MapHeading(heading))
}

pub fn process_pending() -> Result<usize> {
    Ok(get()?.session.lock().unwrap().process_pending(Utc::now()))
}

/// Meant to be called on every display frame.
pub fn animation_tick() -> Result<bool> {
    let mut session = get()?.session.lock().unwrap();
    let now = Utc::now();
    session.process_pending(now);
    Ok(session.animation_tick(now))
}

pub fn render_state() -> Result<RenderState> {
    Ok(get()?.session.lock().unwrap().render_state(Utc::now()))
}

pub fn start_simulation() -> Result<()> {
    let state = get()?;
    let (start, config) = {
        let session = state.session.lock().unwrap();
        let start = session
            .last_location()
            .map(|raw_data| raw_data.point)
            .unwrap_or(DEFAULT_START);
        (start, session.config().clone())
    };

    let mut simulation = state.simulation.lock().unwrap();
    if simulation.is_some() {
        bail!("Simulation is already running");
    }
    let source = SimulatedSource::new(start, &config);
    *simulation = Some(SimulationDriver::start(
        source,
        Duration::from_secs_f64(config.sim_tick_interval_s),
        state.fix_sender.clone(),
    )?);
    Ok(())
}

pub fn set_joystick(x: f64, y: f64) -> Result<()> {
    match get()?.simulation.lock().unwrap().as_ref() {
        None => bail!("Simulation is not running"),
        Some(driver) => {
            driver.set_control(x, y);
            Ok(())
        }
    }
}

pub fn is_simulating() -> Result<bool> {
    Ok(get()?.simulation.lock().unwrap().is_some())
}

pub fn stop_simulation() -> Result<()> {
    let driver = get()?.simulation.lock().unwrap().take();
    if let Some(driver) = driver {
        driver.stop();
    }
    Ok(())
}

pub fn list_trips() -> Result<Vec<Trip>> {
    get()?.storage.list_trips()
}

pub fn trip_detail(trip_id: String) -> Result<Option<Trip>> {
    get()?.storage.get_trip(&Uuid::parse_str(&trip_id)?)
}

pub fn delete_trip(trip_id: String) -> Result<()> {
    let id = Uuid::parse_str(&trip_id)?;
    let state = get()?;
    if state.session.lock().unwrap().active_trip().map(|t| t.id) == Some(id) {
        bail!("Cannot delete the trip being recorded");
    }
    state.storage.delete_trip(&id)
}

pub fn flush_storage() -> Result<()> {
    get()?.storage.flush()
}

pub fn list_all_raw_data() -> Result<Vec<storage::RawDataFile>> {
    get()?.storage.list_all_raw_data()
}

pub fn get_raw_data_mode() -> Result<bool> {
    Ok(get()?.storage.get_raw_data_mode())
}

pub fn toggle_raw_data_mode(enable: bool) -> Result<()> {
    get()?.storage.toggle_raw_data_mode(enable)
}

pub fn set_log_sink(sink: std::sync::mpsc::Sender<String>) {
    logs::set_log_sink(sink)
}

pub fn export_logs(target_file_path: String) -> Result<()> {
    logs::export(&get()?.cache_dir, &target_file_path)
}
