//! The published D-Bus object tree for one leader's `com.victronenergy.acsystem.*`
//! service.
//!
//! `items`/`root`/`service`/`shared`/`util` each own one concern of the
//! published tree, which holds a generic path/[`crate::value::Value`] map
//! that grows as [`crate::leader::aggregate::LeaderAggregate`] discovers new
//! members and summary paths.

pub mod items;
pub mod root;
pub mod service;
pub mod shared;
pub mod util;

pub use service::DbusPublisher;
pub use shared::WriteRequest;
