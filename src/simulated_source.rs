use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::TrackingConfig;
use crate::gps_processor::{Point, RawData};
use crate::tracking_session::{FixSender, InboundEvent};

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;
// below this the simulated position stays put
const MIN_MOTION_SPEED_MPS: f64 = 0.1;
const SIMULATED_ACCURACY_M: f64 = 5.0;
// heading derived from course is only meaningful while actually moving
const HEADING_FEED_MIN_SPEED_MPS: f64 = 0.5;

/// Used when no real fix has been seen before the simulation starts.
pub const DEFAULT_START: Point = Point {
    latitude: 45.0355,
    longitude: 38.9753,
};

/// Joystick driven kinematic model. Produces fixes shaped like the ones of
/// a real sensor, so nothing downstream needs to know about it.
#[derive(Clone, Debug)]
pub struct SimulatedSource {
    max_speed_mps: f64,
    accel_mps2: f64,
    decel_mps2: f64,
    point: Point,
    speed: f64,
    course: f64,
    control: (f64, f64),
    last_tick: Option<DateTime<Utc>>,
}

impl SimulatedSource {
    pub fn new(start: Point, config: &TrackingConfig) -> Self {
        SimulatedSource {
            max_speed_mps: config.sim_max_speed_mps,
            accel_mps2: config.sim_accel_mps2,
            decel_mps2: config.sim_decel_mps2,
            point: start,
            speed: 0.0,
            course: 0.0,
            control: (0.0, 0.0),
            last_tick: None,
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        self.last_tick = Some(now);
    }

    pub fn point(&self) -> Point {
        self.point
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn course(&self) -> f64 {
        self.course
    }

    pub fn control(&self) -> (f64, f64) {
        self.control
    }

    /// `x` points east and `y` north, each clamped to [-1, 1].
    pub fn set_control(&mut self, x: f64, y: f64) {
        let x = if x.is_finite() { x.clamp(-1.0, 1.0) } else { 0.0 };
        let y = if y.is_finite() { y.clamp(-1.0, 1.0) } else { 0.0 };
        self.control = (x, y);
        // a released stick keeps the last direction
        if x != 0.0 || y != 0.0 {
            self.course = x.atan2(y).to_degrees().rem_euclid(360.0);
        }
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> RawData {
        let dt = match self.last_tick {
            // the first tick only anchors the clock
            None => 0.0,
            Some(last) => ((now - last).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0).max(0.0),
        };
        self.last_tick = Some(now);

        let (x, y) = self.control;
        let magnitude = (x * x + y * y).sqrt().min(1.0);
        let target_speed = self.max_speed_mps * magnitude;
        if target_speed > self.speed {
            self.speed = target_speed.min(self.speed + self.accel_mps2 * dt);
        } else {
            self.speed = target_speed.max(self.speed - self.decel_mps2 * dt);
        }

        if self.speed > MIN_MOTION_SPEED_MPS {
            let distance = self.speed * dt;
            let course_rad = self.course.to_radians();
            let meters_per_degree_lon = METERS_PER_DEGREE_LAT * self.point.latitude.to_radians().cos();
            self.point = Point {
                latitude: self.point.latitude + distance * course_rad.cos() / METERS_PER_DEGREE_LAT,
                longitude: self.point.longitude + distance * course_rad.sin() / meters_per_degree_lon,
            };
        }

        RawData {
            point: self.point,
            altitude: 0.0,
            speed: self.speed,
            course: Some(self.course),
            accuracy: SIMULATED_ACCURACY_M,
            timestamp_ms: now.timestamp_millis(),
        }
    }
}

enum DriverCommand {
    SetControl(f64, f64),
    Stop,
}

/// Runs a `SimulatedSource` on its own thread and pushes every fix into the
/// session inbox, the same way a real sensor callback would.
pub struct SimulationDriver {
    command_sender: mpsc::Sender<DriverCommand>,
    handle: Option<JoinHandle<SimulatedSource>>,
}

impl SimulationDriver {
    pub fn start(
        mut source: SimulatedSource,
        tick_interval: Duration,
        fix_sender: FixSender,
    ) -> Result<Self> {
        let (command_sender, command_receiver) = mpsc::channel::<DriverCommand>();
        source.start(Utc::now());
        let handle = thread::Builder::new()
            .name("simulation".to_string())
            .spawn(move || {
                // ticks follow a fixed schedule, commands never push it back
                let mut next_tick = Instant::now() + tick_interval;
                loop {
                    let timeout = next_tick.saturating_duration_since(Instant::now());
                    match command_receiver.recv_timeout(timeout) {
                        Ok(DriverCommand::SetControl(x, y)) => source.set_control(x, y),
                        Ok(DriverCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => (),
                    }
                    if Instant::now() < next_tick {
                        continue;
                    }
                    next_tick += tick_interval;
                    let raw_data = source.tick(Utc::now());
                    let speed = raw_data.speed;
                    let course = source.course();
                    if fix_sender.send(InboundEvent::Fixes(vec![raw_data])).is_err() {
                        warn!("[simulated_source] session is gone, stopping simulation");
                        break;
                    }
                    if speed > HEADING_FEED_MIN_SPEED_MPS {
                        let _ = fix_sender.send(InboundEvent::Heading(course));
                    }
                }
                source
            })?;
        info!(
            "[simulated_source] simulation started, tick interval {:?}",
            tick_interval
        );
        Ok(SimulationDriver {
            command_sender,
            handle: Some(handle),
        })
    }

    pub fn set_control(&self, x: f64, y: f64) {
        // the thread only goes away through `stop`
        let _ = self.command_sender.send(DriverCommand::SetControl(x, y));
    }

    /// Stops ticking and hands back the source in its final state. No fix is
    /// produced after this returns.
    pub fn stop(mut self) -> Option<SimulatedSource> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<SimulatedSource> {
        let handle = self.handle.take()?;
        let _ = self.command_sender.send(DriverCommand::Stop);
        match handle.join() {
            Ok(source) => {
                info!("[simulated_source] simulation stopped");
                Some(source)
            }
            Err(_) => {
                error!("[simulated_source] simulation thread panicked");
                None
            }
        }
    }
}

impl Drop for SimulationDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
