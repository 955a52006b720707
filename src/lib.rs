//! # acsystem - AC system aggregation supervisor for Venus OS
//!
//! Aggregates paralleled Victron RS multi inverter/charger units that share
//! an NMEA-2000 system instance into one virtual `com.victronenergy.acsystem.*`
//! D-Bus service, the way a physical multi-unit AC system presents as a
//! single device to the rest of Venus OS.
//!
//! ## Architecture
//!
//! - `config`: CLI flags and supervisor-wide constants
//! - `error`: the crate's error type
//! - `logging`: structured tracing setup
//! - `value`: the tagged value type flowing through the engine
//! - `paths`: path catalogues shared between members and leaders
//! - `summary`: reducers that fold member values into one published value
//! - `member`: client view of one RS unit
//! - `leader`: the published aggregate for one system instance
//! - `dbus`: the generic object-tree publisher leaders are exported through
//! - `monitor`: discovers members, groups them by system instance, owns leaders
//! - `tick`: the 1 Hz aggregation loop

pub mod config;
pub mod dbus;
pub mod error;
pub mod leader;
pub mod logging;
pub mod member;
pub mod monitor;
pub mod paths;
pub mod summary;
pub mod tick;
pub mod value;

pub use config::Cli;
pub use error::{AcSystemError, Result};
pub use monitor::SystemMonitor;
