//! Client view of one RS unit (`com.victronenergy.multi`) on the bus.
//!
//! Grounded on `original_source/rsservice.py`'s `RsItem`/`RsService` (the
//! `wait_for_valid` one-shot latch, the typed accessor list, and
//! `fetch_ac_max_limits`), adapted from `aiovelib.client`'s polling/caching
//! model to a `zbus::Proxy` subscribed to `ItemsChanged`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, Notify};
use tokio_stream::StreamExt;
use zbus::Connection;

use crate::dbus::util::{owned_value_to_value, value_to_owned_value};
use crate::error::{AcSystemError, Result};
use crate::logging::{get_logger_with_context, LogContext, StructuredLogger};
use crate::paths::ESSENTIAL_PATHS;
use crate::value::Value;

const BUS_ITEM_INTERFACE: &str = "com.victronenergy.BusItem";

/// Firmware versions at or above this report dynamic-ESS paths.
pub const DYNAMIC_ESS_FIRMWARE_THRESHOLD: i64 = 0x1171_3;

/// All observed paths a member proxy subscribes to, beyond the per-phase
/// measurement grid (see [`ac_measurement_paths`]). Mirrors
/// `rsservice.py::RsService.paths`.
pub const OBSERVED_PATHS: &[&str] = &[
    "/ProductId",
    "/FirmwareVersion",
    "/DeviceInstance",
    "/Devices/0/Gateway",
    "/Devices/0/Nad",
    "/N2kSystemInstance",
    "/State",
    "/Mode",
    "/Ac/ActiveIn/ActiveInput",
    "/Ess/AcPowerSetpoint",
    "/Ess/InverterPowerSetpoint",
    "/Ess/DisableFeedIn",
    "/Ess/UseInverterPowerSetpoint",
    "/Ac/Control/IgnoreAcIn1",
    "/Settings/Ess/MinimumSocLimit",
    "/Settings/Ess/Mode",
    "/Settings/Ac/In/CurrentLimitEnergyMeter",
    "/Dc/0/Voltage",
    "/Dc/0/Current",
    "/Dc/0/Power",
    "/Soc",
    "/Ac/In/1/CurrentLimit",
    "/Ac/In/2/CurrentLimit",
    "/Ac/In/1/Type",
    "/Ac/In/2/Type",
    "/Ac/In/1/CurrentLimitIsAdjustable",
    "/Ac/In/2/CurrentLimitIsAdjustable",
];

/// Per-phase × per-input AC measurement paths (the P/I/V/F grid).
pub fn ac_measurement_paths() -> Vec<String> {
    let mut out = Vec::new();
    for phase in 1..=3 {
        for input in 1..=2 {
            for unit in ["P", "I", "V", "F"] {
                out.push(format!("/Ac/In/{input}/L{phase}/{unit}"));
            }
        }
        for unit in ["P", "I", "V", "F"] {
            out.push(format!("/Ac/Out/L{phase}/{unit}"));
        }
    }
    out
}

/// A client view of one RS unit.
pub struct MemberProxy {
    pub service_name: String,
    connection: Connection,
    cache: StdMutex<HashMap<String, Value>>,
    valid: Notify,
    max_ac_currentlimit: StdMutex<[Option<f64>; 2]>,
    logger: StructuredLogger,
}

impl MemberProxy {
    pub fn new(connection: Connection, service_name: String) -> Arc<Self> {
        let logger = get_logger_with_context(
            LogContext::new("member").with_field("service", service_name.clone()),
        );
        Arc::new(Self {
            service_name,
            connection,
            cache: StdMutex::new(HashMap::new()),
            valid: Notify::new(),
            max_ac_currentlimit: StdMutex::new([None, None]),
            logger,
        })
    }

    fn get(&self, path: &str) -> Value {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
            .unwrap_or(Value::Absent)
    }

    /// Seed the cache from the member's root object and spawn a task that
    /// forwards every subsequent `ItemsChanged` batch through the returned
    /// channel, keyed by path.
    pub async fn start_watching(self: &Arc<Self>) -> Result<mpsc::UnboundedReceiver<Vec<(String, Value)>>> {
        let (tx, rx) = mpsc::unbounded_channel();

        let seed_proxy = zbus::Proxy::new(&self.connection, self.service_name.as_str(), "/", BUS_ITEM_INTERFACE)
            .await
            .map_err(AcSystemError::from)?;
        let items: HashMap<String, HashMap<String, zbus::zvariant::OwnedValue>> =
            seed_proxy.call("GetItems", &()).await.map_err(AcSystemError::from)?;
        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            for (path, fields) in &items {
                if let Some(v) = fields.get("Value") {
                    cache.insert(path.clone(), owned_value_to_value(v));
                }
            }
        }
        self.valid.notify_waiters();

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let proxy = match zbus::Proxy::new(&this.connection, this.service_name.as_str(), "/", BUS_ITEM_INTERFACE).await {
                Ok(p) => p,
                Err(e) => {
                    this.logger.error(&format!("subscribing to ItemsChanged failed: {e}"));
                    return;
                }
            };
            let mut stream = match proxy.receive_signal("ItemsChanged").await {
                Ok(s) => s,
                Err(e) => {
                    this.logger.error(&format!("receive_signal(ItemsChanged) failed: {e}"));
                    return;
                }
            };
            while let Some(msg) = stream.next().await {
                let batch: HashMap<String, HashMap<String, zbus::zvariant::OwnedValue>> =
                    match msg.body().deserialize() {
                        Ok(b) => b,
                        Err(e) => {
                            this.logger.warn(&format!("malformed ItemsChanged payload: {e}"));
                            continue;
                        }
                    };
                let mut changed = Vec::with_capacity(batch.len());
                {
                    let mut cache = this.cache.lock().unwrap_or_else(|e| e.into_inner());
                    for (path, fields) in &batch {
                        if let Some(v) = fields.get("Value") {
                            let value = owned_value_to_value(v);
                            cache.insert(path.clone(), value.clone());
                            changed.push((path.clone(), value));
                        }
                    }
                }
                this.valid.notify_waiters();
                if tx.send(changed).is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    /// Completes when every path in `paths` has first observed a
    /// non-absent value.
    pub async fn wait_for_valid(&self, paths: &[&str]) {
        loop {
            let notified = self.valid.notified();
            {
                let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                if paths
                    .iter()
                    .all(|p| cache.get(*p).is_some_and(|v| !v.is_absent()))
                {
                    return;
                }
            }
            notified.await;
        }
    }

    pub async fn wait_for_essential_paths(&self) {
        self.wait_for_valid(ESSENTIAL_PATHS).await;
    }

    async fn call_get_max(&self, path: &str) -> Result<Option<f64>> {
        let proxy = zbus::Proxy::new(&self.connection, self.service_name.as_str(), path, BUS_ITEM_INTERFACE)
            .await
            .map_err(AcSystemError::from)?;
        let ov: zbus::zvariant::OwnedValue = proxy.call("GetMax", &()).await.map_err(AcSystemError::from)?;
        Ok(owned_value_to_value(&ov).as_f64())
    }

    /// One-shot query at admission time: records each input's maximum
    /// permitted current limit.
    pub async fn fetch_ac_max_limits(&self) {
        for (idx, input) in [1usize, 2].into_iter().enumerate() {
            let path = format!("/Ac/In/{input}/CurrentLimit");
            match self.call_get_max(&path).await {
                Ok(limit) => self.max_ac_currentlimit.lock().unwrap_or_else(|e| e.into_inner())[idx] = limit,
                Err(e) => self.logger.debug(&format!("GetMax({path}) failed: {e}")),
            }
        }
    }

    /// Non-blocking, fire-and-forget write to an observed path.
    pub fn write_raw(&self, path: &str, value: Value) {
        let connection = self.connection.clone();
        let service_name = self.service_name.clone();
        let path_owned = path.to_string();
        let logger = self.logger.clone();
        tokio::spawn(async move {
            let result: Result<()> = async {
                let proxy = zbus::Proxy::new(&connection, service_name.as_str(), path_owned.as_str(), BUS_ITEM_INTERFACE)
                    .await
                    .map_err(AcSystemError::from)?;
                let ov = value_to_owned_value(&value);
                let _: i32 = proxy.call("SetValue", &(ov,)).await.map_err(AcSystemError::from)?;
                Ok(())
            }
            .await;
            if let Err(e) = result {
                logger.warn(&format!("write to {path_owned} rejected or failed: {e}"));
            }
        });
    }

    // --- typed accessors ---

    pub fn systeminstance(&self) -> Option<u8> {
        self.get("/N2kSystemInstance").as_i64().and_then(|v| u8::try_from(v).ok())
    }

    pub fn firmwareversion(&self) -> Option<i64> {
        self.get("/FirmwareVersion").as_i64()
    }

    pub fn has_dynamic_ess_support(&self) -> bool {
        self.firmwareversion().is_some_and(|v| v >= DYNAMIC_ESS_FIRMWARE_THRESHOLD)
    }

    pub fn gateway(&self) -> String {
        self.get("/Devices/0/Gateway").as_str().map(str::to_string).unwrap_or_default()
    }

    pub fn nad(&self) -> Option<i64> {
        self.get("/Devices/0/Nad").as_i64()
    }

    pub fn deviceinstance(&self) -> Option<i64> {
        self.get("/DeviceInstance").as_i64()
    }

    pub fn productid(&self) -> Value {
        self.get("/ProductId")
    }

    pub fn mode(&self) -> Value {
        self.get("/Mode")
    }

    pub fn minsoc(&self) -> Value {
        self.get("/Settings/Ess/MinimumSocLimit")
    }

    pub fn essmode(&self) -> Value {
        self.get("/Settings/Ess/Mode")
    }

    pub fn disable_feedin(&self) -> Value {
        self.get("/Ess/DisableFeedIn")
    }

    pub fn use_inverter_setpoint(&self) -> Value {
        self.get("/Ess/UseInverterPowerSetpoint")
    }

    pub fn setpoint(&self) -> Value {
        self.get("/Ess/AcPowerSetpoint")
    }

    pub fn inverter_setpoint(&self) -> Value {
        self.get("/Ess/InverterPowerSetpoint")
    }

    pub fn ignore_acin1(&self) -> Value {
        self.get("/Ac/Control/IgnoreAcIn1")
    }

    pub fn ac_currentlimit(&self, input: u8) -> Value {
        self.get(&format!("/Ac/In/{input}/CurrentLimit"))
    }

    pub fn currentlimit_is_adjustable(&self, input: u8) -> Value {
        self.get(&format!("/Ac/In/{input}/CurrentLimitIsAdjustable"))
    }

    pub fn input_type(&self, input: u8) -> Value {
        self.get(&format!("/Ac/In/{input}/Type"))
    }

    pub fn max_ac_currentlimit(&self, input: u8) -> Option<f64> {
        self.max_ac_currentlimit.lock().unwrap_or_else(|e| e.into_inner())[(input - 1) as usize]
    }

    /// Supplemented beyond rsservice.py's own accessor list.
    pub fn dc_voltage(&self) -> Value {
        self.get("/Dc/0/Voltage")
    }

    pub fn dc_current(&self) -> Value {
        self.get("/Dc/0/Current")
    }

    pub fn dc_power(&self) -> Value {
        self.get("/Dc/0/Power")
    }

    pub fn soc(&self) -> Value {
        self.get("/Soc")
    }

    pub fn value_at(&self, path: &str) -> Value {
        self.get(path)
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Directly seeds the cache for one path, bypassing the bus. Exposed
    /// for integration tests that exercise
    /// [`crate::leader::aggregate::LeaderAggregate`] against a known member
    /// snapshot without a running `com.victronenergy.multi` service on the
    /// bus to subscribe to.
    pub fn set_value_for_test(&self, path: &str, value: Value) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).insert(path.to_string(), value);
        self.valid.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ac_measurement_paths_covers_full_grid() {
        let paths = ac_measurement_paths();
        // 3 phases * (2 inputs * 4 + 4 output) = 3 * 12 = 36
        assert_eq!(paths.len(), 36);
        assert!(paths.contains(&"/Ac/In/1/L2/P".to_string()));
        assert!(paths.contains(&"/Ac/Out/L3/F".to_string()));
    }

    #[test]
    fn has_dynamic_ess_support_threshold() {
        // Below threshold
        assert!(0x1171_2_i64 < DYNAMIC_ESS_FIRMWARE_THRESHOLD);
        // At/above threshold
        assert!(DYNAMIC_ESS_FIRMWARE_THRESHOLD >= DYNAMIC_ESS_FIRMWARE_THRESHOLD);
    }
}
