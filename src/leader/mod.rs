//! The per-group published object: the leader aggregate.
//!
//! Grounded on `original_source/dbus-acsystem.py`'s `Service` class for the
//! published-item shape, device-info bookkeeping, and write contracts; the
//! object-tree publication mechanics this struct is wired into live in
//! [`crate::dbus`].

pub mod aggregate;
pub mod commands;
pub mod settings_client;
pub mod timeout;

pub use aggregate::LeaderAggregate;
pub use commands::{Command, WRITABLE_PATHS};
pub use settings_client::SettingsClient;
pub use timeout::{ControlTimeout, TimeoutEvent};
