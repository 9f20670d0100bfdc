use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::cmp::Ordering;
use std::error::Error;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::trip::{TrackPoint, Trip, TripStats};
use crate::utils;

/* The main database keeps every recorded trip.

`trip` holds one row per trip with its final (or, while recording, running)
statistics. `end_ms` is NULL for a trip that is still being recorded or was
interrupted before it could be finalized.

`track_point` is append-only. `seq` is auto incremented and gives the
recording order of the points within a trip.
*/

#[allow(clippy::type_complexity)]
fn open_db_and_run_migration(
    support_dir: &str,
    file_name: &str,
    migrations: &[&dyn Fn(&Transaction) -> Result<()>],
) -> Result<Connection> {
    debug!("open and run migration for {}", file_name);
    let mut conn = rusqlite::Connection::open(Path::new(support_dir).join(file_name))?;
    let tx = conn.transaction()?;

    let version = utils::db::init_metadata_and_get_version(&tx)? as usize;
    let target_version = migrations.len();
    debug!(
        "current version = {}, target_version = {}",
        version, target_version
    );
    match version.cmp(&target_version) {
        Ordering::Equal => (),
        Ordering::Less => {
            for (i, migration) in migrations.iter().enumerate().skip(version) {
                info!("running migration for version: {}", i + 1);
                migration(&tx)?;
            }
            utils::db::set_version_in_metadata(&tx, target_version as i32)?;
        }
        Ordering::Greater => {
            bail!(
                "version too high: current version = {}, target_version = {}",
                version,
                target_version
            );
        }
    }
    tx.commit()?;
    Ok(conn)
}

fn datetime_of_ms(timestamp_ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(timestamp_ms)
        .ok_or_else(|| anyhow!("Invalid timestamp in db: {}", timestamp_ms))
}

struct TripRow {
    id: String,
    start_ms: i64,
    end_ms: Option<i64>,
    distance_m: f64,
    max_speed_mps: f64,
    average_speed_mps: f64,
}

impl TripRow {
    const COLUMNS: &'static str = "id, start_ms, end_ms, distance_m, max_speed_mps, average_speed_mps";

    fn of_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(TripRow {
            id: row.get(0)?,
            start_ms: row.get(1)?,
            end_ms: row.get(2)?,
            distance_m: row.get(3)?,
            max_speed_mps: row.get(4)?,
            average_speed_mps: row.get(5)?,
        })
    }

    fn into_trip(self) -> Result<Trip> {
        Ok(Trip {
            id: Uuid::parse_str(&self.id)?,
            start: datetime_of_ms(self.start_ms)?,
            end: self.end_ms.map(datetime_of_ms).transpose()?,
            distance_m: self.distance_m,
            max_speed_mps: self.max_speed_mps,
            average_speed_mps: self.average_speed_mps,
            track_points: Vec::new(),
        })
    }
}

pub struct Txn<'a> {
    db_txn: rusqlite::Transaction<'a>,
}

impl Txn<'_> {
    pub fn create_trip(&mut self, trip: &Trip) -> Result<()> {
        info!("Creating trip: id={}", trip.id);
        let sql = "INSERT INTO trip (id, start_ms, end_ms, distance_m, max_speed_mps, average_speed_mps) VALUES (?1, ?2, ?3, ?4, ?5, ?6);";
        self.db_txn.execute(
            sql,
            (
                trip.id.as_hyphenated().to_string(),
                trip.start.timestamp_millis(),
                trip.end.map(|x| x.timestamp_millis()),
                trip.distance_m,
                trip.max_speed_mps,
                trip.average_speed_mps,
            ),
        )?;
        Ok(())
    }

    pub fn append_track_point(&mut self, trip_id: &Uuid, track_point: &TrackPoint) -> Result<()> {
        let sql = "INSERT INTO track_point (id, trip_id, latitude, longitude, altitude, speed, course, horizontal_accuracy, timestamp_ms) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);";
        self.db_txn.prepare_cached(sql)?.execute((
            track_point.id.as_hyphenated().to_string(),
            trip_id.as_hyphenated().to_string(),
            track_point.latitude,
            track_point.longitude,
            track_point.altitude,
            track_point.speed,
            track_point.course,
            track_point.horizontal_accuracy,
            track_point.timestamp.timestamp_millis(),
        ))?;
        Ok(())
    }

    pub fn update_trip_stats(&mut self, trip_id: &Uuid, stats: TripStats) -> Result<()> {
        let sql = "UPDATE trip SET distance_m = ?2, max_speed_mps = ?3, average_speed_mps = ?4 WHERE id = ?1;";
        let changes = self.db_txn.prepare_cached(sql)?.execute((
            trip_id.as_hyphenated().to_string(),
            stats.distance_m,
            stats.max_speed_mps,
            stats.average_speed_mps,
        ))?;
        if changes != 1 {
            bail!("Failed to find trip with id = {}", trip_id);
        }
        Ok(())
    }

    pub fn finalize_trip(&mut self, trip: &Trip) -> Result<()> {
        let end = trip
            .end
            .ok_or_else(|| anyhow!("Finalizing a trip without end, id = {}", trip.id))?;
        let sql = "UPDATE trip SET end_ms = ?2, distance_m = ?3, max_speed_mps = ?4, average_speed_mps = ?5 WHERE id = ?1;";
        let changes = self.db_txn.execute(
            sql,
            (
                trip.id.as_hyphenated().to_string(),
                end.timestamp_millis(),
                trip.distance_m,
                trip.max_speed_mps,
                trip.average_speed_mps,
            ),
        )?;
        if changes != 1 {
            bail!("Failed to find trip with id = {}", trip.id);
        }
        info!("Trip finalized: id={}", trip.id);
        Ok(())
    }

    /// Newest first. Track points are not loaded.
    pub fn list_trips(&self) -> Result<Vec<Trip>> {
        let mut query = self.db_txn.prepare(&format!(
            // use `id` to break tie
            "SELECT {} FROM trip ORDER BY start_ms DESC, id;",
            TripRow::COLUMNS
        ))?;
        let rows = query.query_map((), TripRow::of_row)?;
        let mut trips = Vec::new();
        for row in rows {
            trips.push(row?.into_trip()?);
        }
        Ok(trips)
    }

    pub fn get_trip(&self, id: &Uuid) -> Result<Option<Trip>> {
        let id = id.as_hyphenated().to_string();
        let row = self
            .db_txn
            .query_row(
                &format!("SELECT {} FROM trip WHERE id = ?1;", TripRow::COLUMNS),
                [&id],
                TripRow::of_row,
            )
            .optional()?;
        let mut trip = match row {
            None => return Ok(None),
            Some(row) => row.into_trip()?,
        };

        let mut query = self.db_txn.prepare(
            "SELECT id, latitude, longitude, altitude, speed, course, horizontal_accuracy, timestamp_ms FROM track_point WHERE trip_id = ?1 ORDER BY seq;",
        )?;
        let mut rows = query.query([&id])?;
        while let Some(row) = rows.next()? {
            let point_id: String = row.get(0)?;
            trip.track_points.push(TrackPoint {
                id: Uuid::parse_str(&point_id)?,
                latitude: row.get(1)?,
                longitude: row.get(2)?,
                altitude: row.get(3)?,
                speed: row.get(4)?,
                course: row.get(5)?,
                horizontal_accuracy: row.get(6)?,
                timestamp: datetime_of_ms(row.get(7)?)?,
            });
        }
        Ok(Some(trip))
    }

    pub fn delete_trip(&mut self, id: &Uuid) -> Result<()> {
        info!("Deleting trip: id={}", id);
        let id = id.as_hyphenated().to_string();
        self.db_txn
            .execute("DELETE FROM track_point WHERE trip_id = ?1;", (&id,))?;
        let changes = self
            .db_txn
            .execute("DELETE FROM trip WHERE id = ?1;", (&id,))?;
        if changes == 1 {
            Ok(())
        } else {
            Err(anyhow!("Failed to find trip with id = {}", id))
        }
    }
}

pub struct MainDb {
    conn: Connection,
}

impl MainDb {
    pub fn open(support_dir: &str) -> Result<MainDb> {
        let conn = open_db_and_run_migration(
            support_dir,
            "main.db",
            &[&|tx| {
                let sql = "
                CREATE TABLE trip (
                    id                TEXT    PRIMARY KEY
                                              NOT NULL
                                              UNIQUE,
                    start_ms          INTEGER NOT NULL,
                    end_ms            INTEGER,          -- NULL while recording
                    distance_m        REAL    NOT NULL,
                    max_speed_mps     REAL    NOT NULL,
                    average_speed_mps REAL    NOT NULL
                );
                CREATE INDEX trip_start_index ON trip (
                    start_ms DESC
                );
                CREATE TABLE track_point (
                    seq                 INTEGER PRIMARY KEY AUTOINCREMENT
                                                UNIQUE
                                                NOT NULL,
                    id                  TEXT    NOT NULL
                                                UNIQUE,
                    trip_id             TEXT    NOT NULL,
                    latitude            REAL    NOT NULL,
                    longitude           REAL    NOT NULL,
                    altitude            REAL    NOT NULL,
                    speed               REAL    NOT NULL,
                    course              REAL,
                    horizontal_accuracy REAL    NOT NULL,
                    timestamp_ms        INTEGER NOT NULL
                );
                CREATE INDEX track_point_trip_index ON track_point (
                    trip_id
                );
                CREATE TABLE setting (
                    key               TEXT    PRIMARY KEY
                                              NOT NULL
                                              UNIQUE,
                    value             TEXT
                );
                ";
                for s in sql_split::split(sql) {
                    tx.execute(&s, ())?;
                }
                Ok(())
            }],
        )?;
        Ok(MainDb { conn })
    }

    pub fn with_txn<F, O>(&mut self, f: F) -> Result<O>
    where
        F: FnOnce(&mut Txn) -> Result<O>,
    {
        let mut txn = Txn {
            db_txn: self.conn.transaction()?,
        };
        let output = f(&mut txn)?;
        txn.db_txn.commit()?;
        Ok(output)
    }

    pub fn flush(&self) -> Result<()> {
        self.conn.cache_flush()?;
        Ok(())
    }

    fn get_setting<T: FromStr>(&mut self, setting: Setting) -> Result<Option<T>>
    where
        <T as FromStr>::Err: Error + Send + Sync + 'static,
    {
        let tx = self.conn.transaction()?;
        let mut query = tx.prepare("SELECT value FROM setting WHERE key = ?1;")?;
        let result: Option<String> = query
            .query_row([setting.to_db_key()], |row| row.get(0))
            .optional()?;
        match result {
            None => Ok(None),
            Some(s) => {
                let v = FromStr::from_str(&s)?;
                Ok(Some(v))
            }
        }
    }

    pub fn get_setting_with_default<T: FromStr>(&mut self, setting: Setting, default: T) -> T
    where
        <T as FromStr>::Err: Error + Send + Sync + 'static,
    {
        match self.get_setting(setting) {
            Ok(v) => v,
            Err(error) => {
                warn!(
                    "[main_db.get_setting_with_default] setting:{:?}, error:{}",
                    setting, error
                );
                None
            }
        }
        .unwrap_or(default)
    }

    pub fn set_setting<T: ToString>(&mut self, setting: Setting, value: T) -> Result<()> {
        let tx = self.conn.transaction()?;
        let sql = "INSERT OR REPLACE INTO setting (key, value) VALUES (?1, ?2);";
        tx.execute(sql, (setting.to_db_key(), value.to_string()))?;
        tx.commit()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Setting {
    RawDataMode,
}

impl Setting {
    fn to_db_key(self) -> &'static str {
        match self {
            Self::RawDataMode => "RAW_DATA_MODE",
        }
    }
}
