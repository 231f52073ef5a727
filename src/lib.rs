//! Loading, analysis and visualization of NMBS/SNCB planning and real-time
//! train data.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod fetch;
pub mod map;
pub mod output;
pub mod overview;
pub mod parser;
pub mod paths;
pub mod planning;
pub mod poll;
pub mod realtime;
pub mod stats;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}

pub use config::{Config, StalePolicy};
pub use error::{NmbsError, Result};
pub use paths::DataPaths;
