use anyhow::Result;
use chrono::Utc;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

use crate::gps_processor::{RawData, ValidationResult};
use crate::main_db::{MainDb, Setting};
use crate::tracking_session::TripSink;
use crate::trip::{TrackPoint, Trip, TripStats};

const WRITE_ATTEMPTS: u32 = 3;
const WRITE_RETRY_BACKOFF: Duration = Duration::from_millis(50);

pub struct RawDataFile {
    pub name: String,
    pub path: String,
}

/* This is an optional feature that should be off by default: storing every
   incoming fix (accepted or not) with its validation result. It is designed
   for advanced user or debugging. It stores data in a simple csv format and
   will be using a new file every time the recorder is enabled.
*/
struct RawDataRecorder {
    dir: PathBuf,
    file: Option<File>,
}

impl RawDataRecorder {
    fn init(support_dir: &str) -> Result<RawDataRecorder> {
        let dir = Path::new(support_dir).join("raw_data/");
        std::fs::create_dir_all(&dir)?;
        Ok(RawDataRecorder { dir, file: None })
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(ref mut file) = self.file {
            file.flush()?;
        }
        Ok(())
    }

    fn open_file(&self) -> Result<File> {
        let timestamp_sec = Utc::now().timestamp();
        let mut i = 0;
        let filename = loop {
            let filename = self.dir.join(format!("gps-{}-{}.csv", timestamp_sec, i));
            if std::fs::metadata(&filename).is_err() {
                break filename;
            }
            i += 1;
        };
        let mut file = File::create(filename)?;
        file.write_all(
            "timestamp_ms,latitude,longitude,accuracy,altitude,speed,course,validation\n"
                .as_bytes(),
        )?;
        Ok(file)
    }

    fn record(&mut self, raw_data: &RawData, result: ValidationResult) -> Result<()> {
        if self.file.is_none() {
            self.file = Some(self.open_file()?);
        }
        if let Some(ref mut file) = self.file {
            file.write_all(
                format!(
                    "{},{},{},{},{},{},{},{}\n",
                    raw_data.timestamp_ms,
                    raw_data.point.latitude,
                    raw_data.point.longitude,
                    raw_data.accuracy,
                    raw_data.altitude,
                    raw_data.speed,
                    raw_data.course.map(|x| x.to_string()).unwrap_or_default(),
                    result.to_int()
                )
                .as_bytes(),
            )?;
        }
        Ok(())
    }
}

enum WriteOp {
    TripStarted(Trip),
    PointAppended {
        trip_id: Uuid,
        track_point: TrackPoint,
        stats: TripStats,
    },
    TripFinalized(Trip),
    Flush(mpsc::Sender<()>),
}

impl WriteOp {
    fn describe(&self) -> String {
        match self {
            WriteOp::TripStarted(trip) => format!("trip_started(id={})", trip.id),
            WriteOp::PointAppended {
                trip_id,
                track_point,
                ..
            } => format!("point_appended(trip={}, point={})", trip_id, track_point.id),
            WriteOp::TripFinalized(trip) => format!("trip_finalized(id={})", trip.id),
            WriteOp::Flush(_) => "flush".to_string(),
        }
    }
}

fn apply_write(main_db: &mut MainDb, op: &WriteOp) -> Result<()> {
    main_db.with_txn(|txn| match op {
        WriteOp::TripStarted(trip) => txn.create_trip(trip),
        WriteOp::PointAppended {
            trip_id,
            track_point,
            stats,
        } => {
            txn.append_track_point(trip_id, track_point)?;
            txn.update_trip_stats(trip_id, *stats)
        }
        WriteOp::TripFinalized(trip) => txn.finalize_trip(trip),
        WriteOp::Flush(_) => Ok(()),
    })
}

// Failures end up in the log only, the in-memory trip is the source of truth
// for the running session.
fn run_writer(mut main_db: MainDb, receiver: mpsc::Receiver<WriteOp>) {
    while let Ok(op) = receiver.recv() {
        if let WriteOp::Flush(reply) = &op {
            if let Err(error) = main_db.flush() {
                warn!("[storage] flush failed: {}", error);
            }
            let _ = reply.send(());
            continue;
        }

        let mut attempt = 1;
        loop {
            match apply_write(&mut main_db, &op) {
                Ok(()) => break,
                Err(error) if attempt < WRITE_ATTEMPTS => {
                    warn!(
                        "[storage] {} failed (attempt {}/{}): {}",
                        op.describe(),
                        attempt,
                        WRITE_ATTEMPTS,
                        error
                    );
                    thread::sleep(WRITE_RETRY_BACKOFF * attempt);
                    attempt += 1;
                }
                Err(error) => {
                    error!("[storage] giving up on {}: {}", op.describe(), error);
                    break;
                }
            }
        }
    }
    debug!("[storage] writer stopped");
}

pub struct Storage {
    support_dir: String,
    // for queries and settings, writes of the recording go through the writer
    pub main_db: Mutex<MainDb>,
    raw_data_recorder: Mutex<Option<RawDataRecorder>>, // `None` means disabled
    write_sender: Mutex<Option<mpsc::Sender<WriteOp>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl Storage {
    pub fn init(support_dir: String) -> Result<Self> {
        // the writer opens first so it is the one running migrations
        let writer_db = MainDb::open(&support_dir)?;
        let mut main_db = MainDb::open(&support_dir)?;
        let raw_data_recorder = if main_db.get_setting_with_default(Setting::RawDataMode, false)
        {
            Some(RawDataRecorder::init(&support_dir)?)
        } else {
            None
        };

        let (write_sender, write_receiver) = mpsc::channel();
        let writer = thread::Builder::new()
            .name("storage-writer".to_string())
            .spawn(move || run_writer(writer_db, write_receiver))?;

        Ok(Storage {
            support_dir,
            main_db: Mutex::new(main_db),
            raw_data_recorder: Mutex::new(raw_data_recorder),
            write_sender: Mutex::new(Some(write_sender)),
            writer: Mutex::new(Some(writer)),
        })
    }

    fn enqueue(&self, op: WriteOp) {
        let sender = self.write_sender.lock().unwrap();
        let sent = match sender.as_ref() {
            Some(sender) => sender.send(op).map_err(|e| e.0),
            None => Err(op),
        };
        if let Err(op) = sent {
            error!("[storage] writer is gone, dropping {}", op.describe());
        }
    }

    pub fn toggle_raw_data_mode(&self, enable: bool) -> Result<()> {
        let mut raw_data_recorder = self.raw_data_recorder.lock().unwrap();
        if enable {
            if raw_data_recorder.is_none() {
                *raw_data_recorder = Some(RawDataRecorder::init(&self.support_dir)?);
                debug!("[storage] raw data mod enabled");
                let mut main_db = self.main_db.lock().unwrap();
                main_db.set_setting(Setting::RawDataMode, true)?;
            }
        } else if raw_data_recorder.is_some() {
            debug!("[storage] raw data mod disabled");
            // `drop` should do the right thing and release all resources.
            *raw_data_recorder = None;
            let mut main_db = self.main_db.lock().unwrap();
            main_db.set_setting(Setting::RawDataMode, false)?;
        }
        Ok(())
    }

    pub fn get_raw_data_mode(&self) -> bool {
        let raw_data_recorder = self.raw_data_recorder.lock().unwrap();
        raw_data_recorder.is_some()
    }

    pub fn list_all_raw_data(&self) -> Result<Vec<RawDataFile>> {
        let dir = Path::new(&self.support_dir).join("raw_data/");
        let mut result = Vec::new();
        if !dir.exists() {
            return Ok(result);
        }
        for entry in std::fs::read_dir(dir)? {
            let file = entry?;
            let filename = file.file_name().to_string_lossy().to_string();
            if filename.ends_with(".csv") {
                result.push(RawDataFile {
                    name: filename,
                    path: file.path().to_string_lossy().to_string(),
                })
            }
        }
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    pub fn list_trips(&self) -> Result<Vec<Trip>> {
        let mut main_db = self.main_db.lock().unwrap();
        main_db.with_txn(|txn| txn.list_trips())
    }

    pub fn get_trip(&self, id: &Uuid) -> Result<Option<Trip>> {
        let mut main_db = self.main_db.lock().unwrap();
        main_db.with_txn(|txn| txn.get_trip(id))
    }

    pub fn delete_trip(&self, id: &Uuid) -> Result<()> {
        let mut main_db = self.main_db.lock().unwrap();
        main_db.with_txn(|txn| txn.delete_trip(id))
    }

    /// Blocks until every write queued so far has been applied.
    pub fn flush(&self) -> Result<()> {
        debug!("[storage] flushing");
        let (reply_sender, reply_receiver) = mpsc::channel();
        self.enqueue(WriteOp::Flush(reply_sender));
        reply_receiver
            .recv()
            .map_err(|_| anyhow!("Storage writer stopped before flushing"))?;

        let mut raw_data_recorder = self.raw_data_recorder.lock().unwrap();
        if let Some(ref mut x) = *raw_data_recorder {
            x.flush()?;
        }
        Ok(())
    }
}

impl TripSink for Storage {
    fn trip_started(&self, trip: &Trip) {
        self.enqueue(WriteOp::TripStarted(trip.clone()));
    }

    fn point_appended(&self, trip_id: &Uuid, track_point: &TrackPoint, stats: TripStats) {
        self.enqueue(WriteOp::PointAppended {
            trip_id: *trip_id,
            track_point: track_point.clone(),
            stats,
        });
    }

    fn trip_finalized(&self, trip: &Trip) {
        // points are already queued one by one, the header is enough here
        let mut header = trip.clone();
        header.track_points = Vec::new();
        self.enqueue(WriteOp::TripFinalized(header));
    }

    fn raw_fix(&self, raw_data: &RawData, result: ValidationResult) {
        let mut raw_data_recorder = self.raw_data_recorder.lock().unwrap();
        if let Some(ref mut x) = *raw_data_recorder {
            if let Err(error) = x.record(raw_data, result) {
                warn!("[storage] failed to record raw data: {}", error);
            }
        }
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        // closing the channel lets the writer drain what is left and exit
        if let Ok(mut sender) = self.write_sender.lock() {
            sender.take();
        }
        if let Ok(mut writer) = self.writer.lock() {
            if let Some(handle) = writer.take() {
                if handle.join().is_err() {
                    error!("[storage] writer thread panicked");
                }
            }
        }
    }
}
