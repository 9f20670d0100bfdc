#![allow(clippy::new_without_default)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

pub mod api;
pub mod config;
pub mod gps_processor;
pub mod heading;
pub mod kalman_filter;
mod logs;
pub mod main_db;
pub mod path_smoother;
pub mod simulated_source;
pub mod storage;
pub mod track_animator;
pub mod tracking_session;
pub mod trip;
pub mod trip_recorder;
mod utils;
