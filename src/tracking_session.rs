use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::{mpsc, Arc};
use uuid::Uuid;

use crate::config::TrackingConfig;
use crate::gps_processor::{
    BatchOutcome, GpsPreprocessor, Point, RawData, RejectReason, ValidationResult,
};
use crate::heading::HeadingUnwrapper;
use crate::kalman_filter::PositionFilter;
use crate::track_animator::TrackAnimator;
use crate::trip::{TrackPoint, Trip, TripStats};
use crate::trip_recorder::TripRecorder;

const MPS_TO_KMH: f64 = 3.6;

/// Where the persisted copy of trips goes. Calls must return quickly: they
/// happen on the fix-processing path.
pub trait TripSink: Send + Sync {
    fn trip_started(&self, trip: &Trip);
    fn point_appended(&self, trip_id: &Uuid, track_point: &TrackPoint, stats: TripStats);
    fn trip_finalized(&self, trip: &Trip);
    // every incoming fix, accepted or not
    fn raw_fix(&self, _raw_data: &RawData, _result: ValidationResult) {}
}

pub enum InboundEvent {
    Fixes(Vec<RawData>),
    Heading(f64),
    MapHeading(f64),
}

/// Hand-off point for sources living on other threads. Sending never blocks;
/// the owner of the session picks events up in `process_pending`.
#[derive(Clone)]
pub struct FixSender {
    sender: mpsc::Sender<InboundEvent>,
}

impl FixSender {
    pub fn send(&self, event: InboundEvent) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|_| anyhow!("Tracking session is gone"))
    }

    pub fn send_fixes(&self, raw_data_list: Vec<RawData>) -> Result<()> {
        self.send(InboundEvent::Fixes(raw_data_list))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HeadingSource {
    Device,
    Map,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    LocationUpdated {
        raw_data: RawData,
        filtered: RawData,
    },
    FixRejected {
        raw_data: RawData,
        reason: RejectReason,
    },
    TripStarted {
        trip_id: Uuid,
        start: DateTime<Utc>,
    },
    TripUpdated {
        trip_id: Uuid,
        stats: TripStats,
        point_count: usize,
    },
    TripFinished(Trip),
    HeadingUpdated {
        source: HeadingSource,
        continuous: f64,
    },
}

/// Everything the render layer needs for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderState {
    pub smooth_display_points: Vec<Point>,
    pub continuous_heading: Option<f64>,
    pub continuous_map_heading: Option<f64>,
    pub current_location: Option<Point>,
    pub filtered_location: Option<Point>,
    pub current_speed_kmh: f64,
    pub altitude_m: f64,
    pub distance_m: f64,
    pub distance_km: f64,
    pub max_speed_mps: f64,
    pub average_speed_mps: f64,
    pub formatted_duration: String,
    pub is_recording: bool,
}

type Subscriber = Box<dyn FnMut(&SessionEvent) + Send>;

/// Single owner of all per-session state. Every mutation goes through
/// `&mut self`, other threads only ever talk to it through a `FixSender`.
pub struct TrackingSession {
    config: TrackingConfig,
    preprocessor: GpsPreprocessor,
    position_filter: PositionFilter,
    heading: HeadingUnwrapper,
    map_heading: HeadingUnwrapper,
    recorder: TripRecorder,
    animator: TrackAnimator,
    last_location: Option<RawData>,
    filtered_location: Option<RawData>,
    inbox_sender: mpsc::Sender<InboundEvent>,
    inbox: mpsc::Receiver<InboundEvent>,
    subscribers: Vec<Subscriber>,
    sink: Option<Arc<dyn TripSink>>,
}

fn notify(subscribers: &mut [Subscriber], event: SessionEvent) {
    for subscriber in subscribers.iter_mut() {
        subscriber(&event);
    }
}

impl TrackingSession {
    pub fn new(config: TrackingConfig) -> Result<Self> {
        config.validate()?;
        let (inbox_sender, inbox) = mpsc::channel();
        Ok(TrackingSession {
            preprocessor: GpsPreprocessor::new(&config),
            position_filter: PositionFilter::new(),
            heading: HeadingUnwrapper::new(),
            map_heading: HeadingUnwrapper::new(),
            recorder: TripRecorder::new(&config),
            animator: TrackAnimator::new(&config),
            last_location: None,
            filtered_location: None,
            inbox_sender,
            inbox,
            subscribers: Vec::new(),
            sink: None,
            config,
        })
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn sender(&self) -> FixSender {
        FixSender {
            sender: self.inbox_sender.clone(),
        }
    }

    pub fn set_sink(&mut self, sink: Arc<dyn TripSink>) {
        self.sink = Some(sink);
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn FnMut(&SessionEvent) + Send>) {
        self.subscribers.push(subscriber);
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn active_trip(&self) -> Option<&Trip> {
        self.recorder.active_trip()
    }

    pub fn last_location(&self) -> Option<&RawData> {
        self.last_location.as_ref()
    }

    pub fn animator(&self) -> &TrackAnimator {
        &self.animator
    }

    /// Applies everything other threads queued up so far. Returns the number
    /// of events handled.
    pub fn process_pending(&mut self, now: DateTime<Utc>) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.inbox.try_recv() {
            match event {
                InboundEvent::Fixes(raw_data_list) => {
                    self.on_location_update(raw_data_list, now);
                }
                InboundEvent::Heading(raw) => {
                    self.on_heading_update(raw);
                }
                InboundEvent::MapHeading(raw) => {
                    self.on_map_heading_update(raw);
                }
            }
            handled += 1;
        }
        handled
    }

    pub fn on_location_update(
        &mut self,
        raw_data_list: Vec<RawData>,
        now: DateTime<Utc>,
    ) -> BatchOutcome {
        let outcome = self.preprocessor.preprocess_batch(raw_data_list, now);
        for (raw_data, reason) in &outcome.rejected {
            if let Some(sink) = &self.sink {
                sink.raw_fix(raw_data, ValidationResult::Reject(*reason));
            }
            notify(
                &mut self.subscribers,
                SessionEvent::FixRejected {
                    raw_data: raw_data.clone(),
                    reason: *reason,
                },
            );
        }
        for raw_data in &outcome.accepted {
            if let Some(sink) = &self.sink {
                sink.raw_fix(raw_data, ValidationResult::Accept);
            }
            self.on_accepted_fix(raw_data, now);
        }
        outcome
    }

    fn on_accepted_fix(&mut self, raw_data: &RawData, now: DateTime<Utc>) {
        // filtered output is for display only, the trip is built from raw fixes
        let filtered = self.position_filter.process(raw_data);
        self.last_location = Some(raw_data.clone());
        self.filtered_location = Some(filtered.clone());

        if let Some(record) = self.recorder.on_fix(raw_data, now) {
            self.animator.add_point(raw_data.point, now);
            if let Some(trip) = self.recorder.active_trip() {
                let stats = trip.stats();
                if let Some(sink) = &self.sink {
                    sink.point_appended(&trip.id, &record.track_point, stats);
                }
                let event = SessionEvent::TripUpdated {
                    trip_id: trip.id,
                    stats,
                    point_count: trip.track_points.len(),
                };
                notify(&mut self.subscribers, event);
            }
        }

        notify(
            &mut self.subscribers,
            SessionEvent::LocationUpdated {
                raw_data: raw_data.clone(),
                filtered,
            },
        );
    }

    pub fn on_heading_update(&mut self, raw: f64) -> f64 {
        let continuous = self.heading.update(raw);
        notify(
            &mut self.subscribers,
            SessionEvent::HeadingUpdated {
                source: HeadingSource::Device,
                continuous,
            },
        );
        continuous
    }

    pub fn on_map_heading_update(&mut self, raw: f64) -> f64 {
        let continuous = self.map_heading.update(raw);
        notify(
            &mut self.subscribers,
            SessionEvent::HeadingUpdated {
                source: HeadingSource::Map,
                continuous,
            },
        );
        continuous
    }

    pub fn start_trip(&mut self, now: DateTime<Utc>) -> Result<Trip> {
        let trip = self.recorder.start(now)?;
        self.position_filter.reset();
        self.animator.reset();
        if let Some(sink) = &self.sink {
            sink.trip_started(&trip);
        }
        notify(
            &mut self.subscribers,
            SessionEvent::TripStarted {
                trip_id: trip.id,
                start: trip.start,
            },
        );
        Ok(trip)
    }

    /// `None` when no trip was being recorded.
    pub fn stop_trip(&mut self, now: DateTime<Utc>) -> Option<Trip> {
        let trip = self.recorder.stop(now)?;
        self.position_filter.reset();
        self.animator.halt();
        if let Some(sink) = &self.sink {
            sink.trip_finalized(&trip);
        }
        notify(&mut self.subscribers, SessionEvent::TripFinished(trip.clone()));
        Some(trip)
    }

    pub fn animation_tick(&mut self, now: DateTime<Utc>) -> bool {
        self.animator.tick(now)
    }

    pub fn render_state(&mut self, now: DateTime<Utc>) -> RenderState {
        let current_speed_mps = self
            .last_location
            .as_ref()
            .map(|l| l.non_negative_speed())
            .unwrap_or(0.0);
        let current_speed_kmh = if current_speed_mps < self.config.stationary_speed_mps {
            0.0
        } else {
            current_speed_mps * MPS_TO_KMH
        };

        let (stats, formatted_duration) = match self.recorder.active_trip() {
            Some(trip) => (trip.stats(), trip.formatted_duration(now)),
            None => (TripStats::default(), "00:00".to_string()),
        };

        RenderState {
            smooth_display_points: self.animator.smooth_display_points(),
            continuous_heading: self.heading.current(),
            continuous_map_heading: self.map_heading.current(),
            current_location: self.last_location.as_ref().map(|l| l.point),
            filtered_location: self.filtered_location.as_ref().map(|l| l.point),
            current_speed_kmh,
            altitude_m: self
                .last_location
                .as_ref()
                .map(|l| l.altitude)
                .unwrap_or(0.0),
            distance_m: stats.distance_m,
            distance_km: stats.distance_m / 1000.0,
            max_speed_mps: stats.max_speed_mps,
            average_speed_mps: stats.average_speed_mps,
            formatted_duration,
            is_recording: self.recorder.is_recording(),
        }
    }
}
