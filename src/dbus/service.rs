//! Publishes one leader's aggregate as a `com.victronenergy.acsystem.*`
//! object tree.
//!
//! Segment-by-segment `BusItem`/`TreeNode` registration in `ensure_item`,
//! diff-then-emit updates in `update_path`, and `RequestName` in
//! `request_name`, generalised to an open-ended path set that grows as
//! [`crate::leader::aggregate::LeaderAggregate`] discovers members and
//! summary paths.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use zbus::zvariant::OwnedObjectPath;
use zbus::{names::WellKnownName, Connection};

use super::items::BusItem;
use super::root::{RootBus, TreeNode};
use super::shared::{DbusSharedState, WriteRequest};
use super::util::{format_text_value, value_to_owned_value};
use crate::error::{AcSystemError, Result};
use crate::logging::{get_logger, StructuredLogger};
use crate::value::Value;

pub struct DbusPublisher {
    logger: StructuredLogger,
    service_name: String,
    connection: Option<Connection>,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
    registered_paths: HashSet<String>,
    root_path: OwnedObjectPath,
}

impl DbusPublisher {
    pub fn new(service_name: String, write_tx: tokio::sync::mpsc::UnboundedSender<WriteRequest>) -> Result<Self> {
        let root_path = OwnedObjectPath::try_from("/").map_err(|e| AcSystemError::dbus(format!("invalid root path: {e}")))?;
        Ok(Self {
            logger: get_logger("dbus"),
            service_name,
            connection: None,
            shared: Arc::new(Mutex::new(DbusSharedState::new(write_tx, root_path.clone()))),
            registered_paths: HashSet::new(),
            root_path,
        })
    }

    /// Registers the root object and claims `self.service_name` on `connection`.
    pub async fn start(&mut self, connection: Connection) -> Result<()> {
        self.request_name(&connection).await?;

        let root = RootBus { shared: Arc::clone(&self.shared) };
        connection
            .object_server()
            .at(&self.root_path, root)
            .await
            .map_err(AcSystemError::from)?;

        {
            let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
            shared.connection = Some(connection.clone());
        }
        self.connection = Some(connection);
        self.logger.info(&format!("published {}", self.service_name));
        Ok(())
    }

    /// Registers every intermediate `TreeNode` and the leaf `BusItem` for
    /// `path`, then seeds its initial value. Idempotent: already-registered
    /// segments are left alone.
    pub async fn ensure_item(&mut self, path: &str, initial_value: Value, writable: bool) -> Result<()> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for i in 1..=segments.len() {
            let subpath = format!("/{}", segments[..i].join("/"));
            if self.registered_paths.contains(&subpath) {
                continue;
            }
            let obj_path = OwnedObjectPath::try_from(subpath.as_str())
                .map_err(|e| AcSystemError::dbus(format!("invalid object path '{subpath}': {e}")))?;
            let Some(connection) = &self.connection else {
                return Err(AcSystemError::dbus("publisher not started"));
            };
            if i == segments.len() {
                let item = BusItem::new(subpath.clone(), Arc::clone(&self.shared));
                connection
                    .object_server()
                    .at(&obj_path, item)
                    .await
                    .map_err(|e| AcSystemError::dbus(format!("register BusItem {subpath}: {e}")))?;
            } else {
                let node = TreeNode::new(subpath.clone(), Arc::clone(&self.shared));
                connection
                    .object_server()
                    .at(&obj_path, node)
                    .await
                    .map_err(|e| AcSystemError::dbus(format!("register TreeNode {subpath}: {e}")))?;
            }
            self.registered_paths.insert(subpath);
        }

        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        shared.paths.entry(path.to_string()).or_insert(initial_value);
        if writable {
            shared.writable.insert(path.to_string());
        }
        Ok(())
    }

    /// Publishes a new value for `path`, registering it first if unseen,
    /// and emits both the leaf's `PropertiesChanged` and the root's batched
    /// `ItemsChanged`. A no-op if the value is unchanged.
    pub async fn update_path(&mut self, path: &str, value: Value) -> Result<()> {
        {
            let shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
            if shared.paths.get(path) == Some(&value) {
                return Ok(());
            }
        }
        self.ensure_item(path, value.clone(), false).await?;
        {
            let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
            shared.paths.insert(path.to_string(), value.clone());
        }

        let Some(connection) = &self.connection else {
            return Ok(());
        };

        let obj_path = OwnedObjectPath::try_from(path)
            .map_err(|e| AcSystemError::dbus(format!("invalid object path '{path}': {e}")))?;
        let item_ctx = zbus::object_server::SignalEmitter::new(connection, obj_path)
            .map_err(|e| AcSystemError::dbus(format!("SignalEmitter::new: {e}")))?;
        let mut changes: HashMap<&str, zbus::zvariant::OwnedValue> = HashMap::new();
        changes.insert("Value", value_to_owned_value(&value));
        changes.insert("Text", text_owned_value(&value));
        let _ = BusItem::properties_changed(&item_ctx, changes).await;

        let root_ctx = zbus::object_server::SignalEmitter::new(connection, self.root_path.clone())
            .map_err(|e| AcSystemError::dbus(format!("root SignalEmitter::new: {e}")))?;
        let mut inner: HashMap<&str, zbus::zvariant::OwnedValue> = HashMap::new();
        inner.insert("Value", value_to_owned_value(&value));
        inner.insert("Text", text_owned_value(&value));
        let mut outer: HashMap<&str, HashMap<&str, zbus::zvariant::OwnedValue>> = HashMap::new();
        outer.insert(path, inner);
        let _ = RootBus::items_changed(&root_ctx, outer).await;
        Ok(())
    }

    async fn request_name(&self, connection: &Connection) -> Result<()> {
        use zbus::fdo::{DBusProxy, RequestNameFlags};
        let proxy = DBusProxy::new(connection).await.map_err(AcSystemError::from)?;
        let name = WellKnownName::try_from(self.service_name.as_str())
            .map_err(|e| AcSystemError::dbus(format!("invalid well-known name: {e}")))?;
        proxy
            .request_name(name, RequestNameFlags::ReplaceExisting.into())
            .await
            .map_err(AcSystemError::from)?;
        Ok(())
    }
}

fn text_owned_value(value: &Value) -> zbus::zvariant::OwnedValue {
    zbus::zvariant::OwnedValue::try_from(zbus::zvariant::Value::from(format_text_value(value)))
        .unwrap_or_else(|_| zbus::zvariant::OwnedValue::from(0i64))
}
