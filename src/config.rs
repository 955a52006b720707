//! Command-line configuration for the AC system supervisor
//!
//! This module parses the process's startup flags and holds the small set
//! of constants the aggregation engine needs.

use clap::{Parser, ValueEnum};

/// Seconds after which an unreasserted ESS control write is dropped
/// and the path reverts to passthrough. See `original_source/dbus-acsystem.py`'s
/// `CONTROL_TIMEOUT`.
pub const CONTROL_TIMEOUT: u8 = 60;

/// `/ProductId` published by the acsystem leader service.
pub const AC_SYSTEM_PRODUCT_ID: u16 = 0xA140;

/// Which D-Bus bus to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BusKind {
    /// The Venus OS system bus (default in production)
    System,
    /// The session bus (used in development/testing)
    Session,
}

/// Command-line arguments, mirroring `original_source/acsystem.py`'s
/// `--dbus`/`--debug` flags.
#[derive(Debug, Parser)]
#[command(
    name = "acsystem",
    version = env!("APP_VERSION"),
    about = "Aggregates paralleled RS multi units into a single AC system"
)]
pub struct Cli {
    /// Which D-Bus bus to connect to
    #[arg(long, value_enum, default_value_t = BusKind::System)]
    pub dbus: BusKind,

    /// Enable debug-level logging
    #[arg(long)]
    pub debug: bool,
}

impl BusKind {
    /// Open a connection to the configured bus.
    pub async fn connect(self) -> zbus::Result<zbus::Connection> {
        match self {
            BusKind::System => zbus::Connection::system().await,
            BusKind::Session => zbus::Connection::session().await,
        }
    }
}
