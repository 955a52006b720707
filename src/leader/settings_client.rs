//! Thin client for `com.victronenergy.settings`.
//!
//! Grounded on `original_source/dbus-acsystem.py`'s `wait_for_settings`
//! (a 5 second `asyncio.wait_for` around `settings.add_settings(...)` and
//! the initial `GetValue` round trip) and `_set_customname`/`itemsChanged`
//! (the one setting this crate persists and the one direction — settings
//! service to leader — the original propagates through its `SettingsMonitor`
//! callback).

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio_stream::StreamExt;
use zbus::Connection;

use crate::error::{AcSystemError, Result};
use crate::logging::{get_logger_with_context, LogContext, StructuredLogger};
use crate::value::Value;

const SETTINGS_SERVICE: &str = "com.victronenergy.settings";
const SETTINGS_ROOT_PATH: &str = "/Settings";
const SETTINGS_INTERFACE: &str = "com.victronenergy.Settings";
const BUS_ITEM_INTERFACE: &str = "com.victronenergy.BusItem";
const SETTINGS_TIMEOUT: Duration = Duration::from_secs(5);

/// `/Settings/AcSystem/<instance>/CustomName`, the one setting this group
/// itself owns (every other gating setting, e.g. alarm enables, is read
/// from the global settings tree).
fn custom_name_path(system_instance: u8) -> String {
    format!("/Settings/AcSystem/{system_instance}/CustomName")
}

/// Cached view of whatever settings this leader has read or written,
/// refreshed from the bus at admission time, kept current by direct writes
/// through [`Self::set_custom_name`], and by the background watcher that
/// relays external changes into [`Self::take_pending_customname`].
pub struct SettingsClient {
    system_instance: u8,
    connection: StdMutex<Option<Connection>>,
    cache: Arc<StdMutex<HashMap<String, Value>>>,
    /// Latest value observed on the bus for the custom-name setting that
    /// the leader hasn't yet folded into its own `/CustomName` item.
    /// Drained once per tick so an external `localsettings` edit reaches
    /// the published item without this client needing to reach into the
    /// leader's item table directly.
    pending_customname: Arc<StdMutex<Option<Value>>>,
    logger: StructuredLogger,
}

impl SettingsClient {
    pub fn new(system_instance: u8) -> Self {
        Self {
            system_instance,
            connection: StdMutex::new(None),
            cache: Arc::new(StdMutex::new(HashMap::new())),
            pending_customname: Arc::new(StdMutex::new(None)),
            logger: get_logger_with_context(LogContext::new("settings_client")),
        }
    }

    /// Binds the client to a live connection, registers the custom-name
    /// setting, seeds the cache for it plus every gating setting the
    /// summary registry references, and starts the background watcher for
    /// external changes. Registration and seeding together time out after
    /// five seconds, matching the source's `wait_for_settings`.
    pub async fn init(&self, connection: &Connection) -> Result<()> {
        *self.connection.lock().unwrap_or_else(|e| e.into_inner()) = Some(connection.clone());

        tokio::time::timeout(SETTINGS_TIMEOUT, self.register_and_seed(connection))
            .await
            .map_err(|_| AcSystemError::timeout("settings service did not respond within 5s"))??;

        self.spawn_watcher(connection.clone());
        Ok(())
    }

    async fn register_and_seed(&self, connection: &Connection) -> Result<()> {
        self.add_settings(connection).await;

        let mut paths: Vec<String> = crate::summary::SUMMARY_REGISTRY
            .iter()
            .filter_map(|d| d.gating_setting.map(str::to_string))
            .collect();
        paths.push(custom_name_path(self.system_instance));

        self.seed(connection, &paths).await
    }

    /// `settings.add_settings(Setting("/Settings/AcSystem/<instance>/CustomName", "", alias=...))`:
    /// one root-level `AddSettings` call on `/Settings` that creates the key
    /// with an empty default if `localsettings` doesn't already have it.
    /// Non-fatal: the follow-up `GetValue` still succeeds whether this
    /// registers a fresh key or confirms an existing one.
    async fn add_settings(&self, connection: &Connection) {
        let path = custom_name_path(self.system_instance);
        let proxy = match zbus::Proxy::new(connection, SETTINGS_SERVICE, SETTINGS_ROOT_PATH, SETTINGS_INTERFACE).await {
            Ok(p) => p,
            Err(e) => {
                self.logger.debug(&format!("AddSettings proxy failed: {e}"));
                return;
            }
        };
        let mut entry: HashMap<&str, zbus::zvariant::Value> = HashMap::new();
        entry.insert("path", zbus::zvariant::Value::from(path.as_str()));
        entry.insert("default", zbus::zvariant::Value::from(""));
        if let Err(e) = proxy.call_method("AddSettings", &(vec![entry],)).await {
            self.logger.debug(&format!("AddSettings({path}) failed: {e}"));
        }
    }

    async fn seed(&self, connection: &Connection, paths: &[String]) -> Result<()> {
        for path in paths {
            let value = match Self::read(connection, path).await {
                Ok(v) => v,
                Err(e) => {
                    self.logger.debug(&format!("settings path {path} unavailable: {e}"));
                    Value::Absent
                }
            };
            self.cache.lock().unwrap_or_else(|e| e.into_inner()).insert(path.clone(), value);
        }
        Ok(())
    }

    async fn read(connection: &Connection, path: &str) -> Result<Value> {
        let proxy = zbus::Proxy::new(connection, SETTINGS_SERVICE, path, BUS_ITEM_INTERFACE)
            .await
            .map_err(AcSystemError::from)?;
        let ov: zbus::zvariant::OwnedValue = proxy.call("GetValue", &()).await.map_err(AcSystemError::from)?;
        Ok(crate::dbus::util::owned_value_to_value(&ov))
    }

    /// Subscribes to the settings service's root `ItemsChanged` signal (the
    /// same aggregated-batch convention this crate's own published trees
    /// use) and records any change to the custom-name path as pending,
    /// mirroring `dbus-acsystem.py::Service.itemsChanged`'s
    /// `self.customname = values[...]` relay.
    fn spawn_watcher(&self, connection: Connection) {
        let cache = Arc::clone(&self.cache);
        let pending = Arc::clone(&self.pending_customname);
        let path = custom_name_path(self.system_instance);
        let logger = self.logger.clone();
        tokio::spawn(async move {
            let proxy = match zbus::Proxy::new(&connection, SETTINGS_SERVICE, "/", BUS_ITEM_INTERFACE).await {
                Ok(p) => p,
                Err(e) => {
                    logger.error(&format!("subscribing to settings ItemsChanged failed: {e}"));
                    return;
                }
            };
            let mut stream = match proxy.receive_signal("ItemsChanged").await {
                Ok(s) => s,
                Err(e) => {
                    logger.error(&format!("receive_signal(ItemsChanged) on settings failed: {e}"));
                    return;
                }
            };
            while let Some(msg) = stream.next().await {
                let batch: HashMap<String, HashMap<String, zbus::zvariant::OwnedValue>> =
                    match msg.body().deserialize() {
                        Ok(b) => b,
                        Err(e) => {
                            logger.warn(&format!("malformed settings ItemsChanged payload: {e}"));
                            continue;
                        }
                    };
                let Some(fields) = batch.get(&path) else { continue };
                let Some(v) = fields.get("Value") else { continue };
                let value = crate::dbus::util::owned_value_to_value(v);
                cache.lock().unwrap_or_else(|e| e.into_inner()).insert(path.clone(), value.clone());
                *pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(value);
            }
        });
    }

    /// Last value observed for `path`, or `Value::Absent` if never seeded
    /// or not a settings path this client tracks.
    pub fn cached_value(&self, path: &str) -> Value {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
            .unwrap_or(Value::Absent)
    }

    /// Takes whatever external custom-name change the watcher has observed
    /// since the last call, if any. Meant to be drained once per tick by
    /// the leader so its `/CustomName` item stays current with
    /// `localsettings` (spec §4.5's settings-to-leader direction).
    pub fn take_pending_customname(&self) -> Option<Value> {
        self.pending_customname.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// The group's display name, falling back to empty when unset — the
    /// caller decides the `"RS system (<instance>)"` presentation fallback.
    pub fn custom_name(&self) -> String {
        self.cached_value(&custom_name_path(self.system_instance))
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    /// Fire-and-forget persist: updates the cache immediately so
    /// subsequent reads are consistent, and writes through to the settings
    /// service in the background.
    pub fn set_custom_name(&self, name: &str) {
        let path = custom_name_path(self.system_instance);
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.clone(), Value::Text(name.to_string()));

        let Some(connection) = self.connection.lock().unwrap_or_else(|e| e.into_inner()).clone() else {
            return;
        };
        let name = name.to_string();
        let logger = self.logger.clone();
        tokio::spawn(async move {
            let result: Result<()> = async {
                let proxy = zbus::Proxy::new(&connection, SETTINGS_SERVICE, path.as_str(), BUS_ITEM_INTERFACE)
                    .await
                    .map_err(AcSystemError::from)?;
                let ov = crate::dbus::util::value_to_owned_value(&Value::Text(name));
                let _: i32 = proxy.call("SetValue", &(ov,)).await.map_err(AcSystemError::from)?;
                Ok(())
            }
            .await;
            if let Err(e) = result {
                logger.warn(&format!("persisting CustomName failed: {e}"));
            }
        });
    }
}
