//! State shared between the published `com.victronenergy.BusItem` objects
//! of one leader's object tree and the task that owns their values.
//!
//! A `paths`/`writable` map guarded by a single mutex, reachable from every
//! registered object, plus a [`WriteRequest`] channel: each write carries
//! its own reply channel rather than assuming a single global command enum,
//! since one process can host several leaders, each with its own validation
//! rules.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, oneshot};
use zbus::Connection;
use zbus::zvariant::OwnedObjectPath;

use crate::value::Value;

/// A `SetValue` call on a writable path, forwarded to whichever task owns
/// the leader for validation and fan-out.
pub struct WriteRequest {
    pub path: String,
    pub value: Value,
    /// `true` if the write was accepted; the D-Bus method returns 0/1 based
    /// on this.
    pub reply: oneshot::Sender<bool>,
}

pub struct DbusSharedState {
    pub(crate) paths: HashMap<String, Value>,
    pub(crate) writable: HashSet<String>,
    pub(crate) write_tx: mpsc::UnboundedSender<WriteRequest>,
    pub(crate) connection: Option<Connection>,
    pub(crate) root_path: OwnedObjectPath,
}

impl DbusSharedState {
    pub fn new(write_tx: mpsc::UnboundedSender<WriteRequest>, root_path: OwnedObjectPath) -> Self {
        Self {
            paths: HashMap::new(),
            writable: HashSet::new(),
            write_tx,
            connection: None,
            root_path,
        }
    }
}
