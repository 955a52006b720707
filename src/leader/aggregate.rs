//! The per-group published object: the leader aggregate.
//!
//! Grounded on `original_source/dbus-acsystem.py`'s `Service` class for the
//! published-item shape, device-info bookkeeping, and per-path `_set_*`
//! write contracts, and on its `calculation_loop` for the per-tick
//! aggregation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::AC_SYSTEM_PRODUCT_ID;
use crate::member::MemberProxy;
use crate::value::{safe_add, safe_first, Value};

use super::commands::{Command, WRITABLE_PATHS};
use super::timeout::{ControlTimeout, TimeoutEvent};
use super::settings_client::SettingsClient;

/// One per `SystemInstance` with at least one member (I6).
pub struct LeaderAggregate {
    pub system_instance: u8,
    pub bus_name: String,
    pub members: HashMap<String, Arc<MemberProxy>>,
    items: HashMap<String, Value>,
    writable: HashSet<String>,
    /// `/Devices/<nad>/{Service,Instance}` bookkeeping; blanked (not
    /// removed) when the owning member departs, per
    /// `dbus-acsystem.py::_remove_device_info`.
    device_nads: HashSet<i64>,
    pub control_timeout: ControlTimeout,
    pub settings: SettingsClient,
}

impl LeaderAggregate {
    /// `com.victronenergy.acsystem.<gateway>_sys<instance>`.
    pub fn bus_name_for(gateway: &str, system_instance: u8) -> String {
        format!(
            "com.victronenergy.acsystem.{}_sys{system_instance}",
            gateway.replace(':', "_")
        )
    }

    pub fn new(system_instance: u8, first_member: Arc<MemberProxy>) -> Self {
        let bus_name = Self::bus_name_for(&first_member.gateway(), system_instance);
        let mut leader = Self {
            system_instance,
            bus_name,
            members: HashMap::new(),
            items: HashMap::new(),
            writable: WRITABLE_PATHS.iter().map(|p| (*p).to_string()).collect(),
            device_nads: HashSet::new(),
            control_timeout: ControlTimeout::new(),
            settings: SettingsClient::new(system_instance),
        };
        leader.seed_compulsory_items();
        leader.add_member(first_member);
        leader
    }

    fn seed_compulsory_items(&mut self) {
        self.items.insert("/ProductId".into(), Value::Int(i64::from(AC_SYSTEM_PRODUCT_ID)));
        self.items.insert("/ProductName".into(), Value::Text("AC system".into()));
        self.items.insert(
            "/DeviceInstance".into(),
            Value::Int(i64::from(self.system_instance)),
        );
        self.items.insert("/Mgmt/ProcessName".into(), Value::Text(env!("CARGO_PKG_NAME").into()));
        self.items.insert(
            "/Mgmt/ProcessVersion".into(),
            Value::Text(env!("CARGO_PKG_VERSION").into()),
        );
        self.items.insert("/Mgmt/Connection".into(), Value::Text("local".into()));
        self.items.insert("/Connected".into(), Value::Int(1)); // I4
        self.items.insert("/CustomName".into(), Value::Text(String::new()));
        // OptionalAlarm's documented initial value, ahead of the first tick.
        self.items.insert("/Alarms/GridLost".into(), Value::Int(0));
    }

    pub fn get_item(&self, path: &str) -> Value {
        self.items.get(path).cloned().unwrap_or(Value::Absent)
    }

    pub fn set_item(&mut self, path: &str, value: Value) {
        self.items.insert(path.to_string(), value);
    }

    pub fn is_writable(&self, path: &str) -> bool {
        self.writable.contains(path)
    }

    pub fn snapshot_items(&self) -> HashMap<String, Value> {
        self.items.clone()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// `"RS system (<instance>)"` when `/CustomName` hasn't been set,
    /// mirroring the convention the source's UI layer applies for empty
    /// custom names.
    pub fn display_name(&self) -> String {
        match self.get_item("/CustomName") {
            Value::Text(name) if !name.is_empty() => name,
            _ => format!("RS system ({})", self.system_instance),
        }
    }

    /// Member list sorted by device instance, lowest first — the
    /// deterministic iteration order `First` reducers and device-info
    /// bookkeeping rely on.
    pub fn ordered_members(&self) -> Vec<Arc<MemberProxy>> {
        let mut members: Vec<Arc<MemberProxy>> = self.members.values().cloned().collect();
        members.sort_by_key(|m| m.deviceinstance().unwrap_or(i64::MAX));
        members
    }

    /// `dbus-acsystem.py::_add_device_info` / `RsService::add_service`.
    pub fn add_member(&mut self, member: Arc<MemberProxy>) {
        if let Some(nad) = member.nad() {
            self.device_nads.insert(nad);
            self.items.insert(
                format!("/Devices/{nad}/Service"),
                Value::Text(member.service_name.clone()),
            );
            self.items.insert(
                format!("/Devices/{nad}/Instance"),
                member.deviceinstance().map_or(Value::Absent, Value::Int),
            );
        }
        self.members.insert(member.service_name.clone(), member);
        self.refresh_capability_summaries();
    }

    /// `dbus-acsystem.py::_remove_device_info`: blank, don't delete — the
    /// published object tree has no removal primitive once an object is
    /// registered.
    pub fn remove_member(&mut self, service_name: &str) -> bool {
        let Some(member) = self.members.remove(service_name) else {
            return false;
        };
        if let Some(nad) = member.nad() {
            self.items.insert(format!("/Devices/{nad}/Service"), Value::Absent);
            self.items.insert(format!("/Devices/{nad}/Instance"), Value::Absent);
        }
        self.refresh_capability_summaries();
        true
    }

    fn refresh_capability_summaries(&mut self) {
        for def in crate::summary::SUMMARY_REGISTRY {
            self.update_summary(def.path);
        }
    }

    /// Recompute a single summary path via its registered reducer
    /// on member updates and per-tick recomputation alike.
    pub fn update_summary(&mut self, path: &str) {
        let Some(def) = crate::summary::lookup(path) else {
            return;
        };
        let members = self.ordered_members();
        let values: Vec<Value> = members.iter().map(|m| m.value_at(path)).collect();
        let gating = def.gating_setting.map(|s| self.settings.cached_value(s));
        let result = crate::summary::summarise(def, &values, gating.as_ref());
        self.items.insert(path.to_string(), result);
    }

    /// Validates and fans out one write.
    /// Returns whether the write was accepted.
    pub fn apply_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Mode(v) => {
                let Some(mode) = v.as_i64() else { return false };
                if !matches!(mode, 1 | 2 | 3 | 4 | 251) {
                    return false;
                }
                self.set_item("/Mode", v.clone());
                self.fanout_write("/Mode", v);
                true
            }
            Command::AcCurrentLimit { input, value } => {
                let path = format!("/Ac/In/{input}/CurrentLimitIsAdjustable");
                if self.get_item(&path).as_i64() != Some(1) {
                    return false;
                }
                let Some(limit) = value.as_f64() else { return false };
                if limit < 0.0 {
                    return false;
                }
                let target = format!("/Ac/In/{input}/CurrentLimit");
                self.set_item(&target, value.clone());
                self.fanout_write(&target, value);
                true
            }
            Command::AcInputType { input, value } => {
                let target = format!("/Ac/In/{input}/Type");
                self.set_item(&target, value.clone());
                self.fanout_write(&target, value);
                true
            }
            Command::MinSoc(v) => {
                let Some(pct) = v.as_f64() else { return false };
                if !(0.0..=100.0).contains(&pct) {
                    return false;
                }
                self.set_item("/Settings/Ess/MinimumSocLimit", v.clone());
                self.fanout_write("/Settings/Ess/MinimumSocLimit", v);
                true
            }
            Command::EssMode(v) => {
                let Some(mode) = v.as_i64() else { return false };
                if !(0..=3).contains(&mode) {
                    return false;
                }
                self.set_item("/Settings/Ess/Mode", v.clone());
                self.fanout_write("/Settings/Ess/Mode", v);
                true
            }
            Command::DisableFeedIn(v) => {
                let Some(flag) = v.as_i64() else { return false };
                if !(0..=1).contains(&flag) {
                    return false;
                }
                self.set_item("/Ess/DisableFeedIn", v.clone());
                self.fanout_write("/Ess/DisableFeedIn", v);
                self.control_timeout.reset();
                true
            }
            Command::AcPowerSetpoint(v) => {
                let Some(total) = v.as_f64() else { return false };
                let phases = self.active_phase_count();
                if phases == 0 {
                    return false;
                }
                self.set_item("/Ess/AcPowerSetpoint", v);
                let per_phase = total / f64::from(phases);
                for member in self.ordered_members() {
                    member.write_raw("/Ess/AcPowerSetpoint", Value::Double(per_phase));
                }
                self.control_timeout.reset();
                true
            }
            Command::InverterPowerSetpoint(v) => {
                let Some(total) = v.as_f64() else { return false };
                let members = self.ordered_members();
                if members.is_empty() {
                    return false;
                }
                self.set_item("/Ess/InverterPowerSetpoint", v);
                let per_member = total / members.len() as f64;
                for member in &members {
                    member.write_raw("/Ess/InverterPowerSetpoint", Value::Double(per_member));
                }
                self.control_timeout.reset();
                true
            }
            Command::UseInverterPowerSetpoint(v) => {
                self.set_item("/Ess/UseInverterPowerSetpoint", v.clone());
                self.fanout_write("/Ess/UseInverterPowerSetpoint", v);
                true
            }
            Command::IgnoreAcIn1(v) => {
                self.set_item("/Ac/Control/IgnoreAcIn1", v.clone());
                self.fanout_write("/Ac/Control/IgnoreAcIn1", v);
                true
            }
            Command::CurrentLimitEnergyMeter(v) => {
                self.set_item("/Settings/Ac/In/CurrentLimitEnergyMeter", v.clone());
                self.fanout_write("/Settings/Ac/In/CurrentLimitEnergyMeter", v);
                true
            }
            Command::AlarmLevel { path, value } => {
                self.set_item(&path, value.clone());
                self.fanout_write(&path, value);
                true
            }
            Command::CustomName(v) => {
                let Some(name) = v.as_str() else { return false };
                self.settings.set_custom_name(name);
                self.set_item("/CustomName", v);
                true
            }
        }
    }

    fn fanout_write(&self, path: &str, value: Value) {
        for member in self.members.values() {
            member.write_raw(path, value.clone());
        }
    }

    fn active_phase_count(&self) -> u8 {
        (1..=3)
            .filter(|phase| !self.get_item(&format!("/Ac/Out/L{phase}/P")).is_absent())
            .count() as u8
    }

    /// Recomputes every aggregated AC measurement and derived state path
    /// from the members' current cached values
    /// (`dbus-acsystem.py::calculation_loop`).
    ///
    /// `/Ac/Out/P` is accumulated exactly once per phase rather than once
    /// per phase-per-input, fixing the double-accumulation the source's
    /// inner-loop placement would otherwise repeat.
    pub fn recompute_aggregates(&mut self) {
        let members = self.ordered_members();
        let mut out_p_total = Value::Absent;
        let mut in_p_totals: [Value; 2] = [Value::Absent, Value::Absent];

        for phase in 1..=3u8 {
            for (idx, input) in [1u8, 2].into_iter().enumerate() {
                let p = Self::collect(&members, &format!("/Ac/In/{input}/L{phase}/P"), safe_add);
                let i = Self::collect(&members, &format!("/Ac/In/{input}/L{phase}/I"), safe_add);
                let v = Self::collect(&members, &format!("/Ac/In/{input}/L{phase}/V"), safe_first);
                let f = Self::collect(&members, &format!("/Ac/In/{input}/L{phase}/F"), safe_first);
                self.items.insert(format!("/Ac/In/{input}/L{phase}/P"), p.clone());
                self.items.insert(format!("/Ac/In/{input}/L{phase}/I"), i);
                self.items.insert(format!("/Ac/In/{input}/L{phase}/V"), v);
                self.items.insert(format!("/Ac/In/{input}/L{phase}/F"), f);
                in_p_totals[idx] = safe_add([in_p_totals[idx].clone(), p]);
            }

            let out_p = Self::collect(&members, &format!("/Ac/Out/L{phase}/P"), safe_add);
            let out_i = Self::collect(&members, &format!("/Ac/Out/L{phase}/I"), safe_add);
            let out_v = Self::collect(&members, &format!("/Ac/Out/L{phase}/V"), safe_first);
            let out_f = Self::collect(&members, &format!("/Ac/Out/L{phase}/F"), safe_first);
            self.items.insert(format!("/Ac/Out/L{phase}/P"), out_p.clone());
            self.items.insert(format!("/Ac/Out/L{phase}/I"), out_i);
            self.items.insert(format!("/Ac/Out/L{phase}/V"), out_v);
            self.items.insert(format!("/Ac/Out/L{phase}/F"), out_f);
            out_p_total = safe_add([out_p_total, out_p]);
        }

        for (idx, input) in [1u8, 2].into_iter().enumerate() {
            self.items.insert(format!("/Ac/In/{input}/P"), in_p_totals[idx].clone());
        }
        self.items.insert("/Ac/Out/P".to_string(), out_p_total);

        let number_of_inputs = in_p_totals.iter().filter(|v| !v.is_absent()).count();
        self.items.insert("/Ac/NumberOfAcInputs".to_string(), Value::Int(number_of_inputs as i64));

        let number_of_phases = self.active_phase_count();
        self.items.insert("/Ac/NumberOfPhases".to_string(), Value::Int(i64::from(number_of_phases)));

        self.update_active_input();
        self.update_summary("/State");
    }

    /// `/Ac/ActiveIn/ActiveInput`: the maximum active-input value across
    /// members (0, 1, or 240); if any member's value is absent or outside
    /// that set, publish `0xF0` ("disconnected") rather than interpret the
    /// absence as a communication fault.
    fn update_active_input(&mut self) {
        let members = self.ordered_members();
        if members.is_empty() {
            self.items.insert("/Ac/ActiveIn/ActiveInput".to_string(), Value::Absent);
            return;
        }
        let mut max: Option<i64> = None;
        for member in &members {
            let v = member.value_at("/Ac/ActiveIn/ActiveInput");
            match v.as_i64() {
                Some(n) if matches!(n, 0 | 1 | 240) => {
                    max = Some(max.map_or(n, |m| m.max(n)));
                }
                _ => {
                    max = None;
                    break;
                }
            }
        }
        self.items.insert("/Ac/ActiveIn/ActiveInput".to_string(), Value::Int(max.unwrap_or(0xF0)));
    }

    fn collect(
        members: &[Arc<MemberProxy>],
        path: &str,
        reducer: fn(std::vec::IntoIter<Value>) -> Value,
    ) -> Value {
        let values: Vec<Value> = members.iter().map(|m| m.value_at(path)).collect();
        reducer(values.into_iter())
    }

    /// Advances the control-timeout state machine one second, folds in any
    /// external `/CustomName` change the settings watcher observed since
    /// the last tick, zeroes ESS setpoints on control-timeout expiry, then
    /// recomputes every aggregate.
    pub fn tick(&mut self) {
        if let Some(name) = self.settings.take_pending_customname() {
            self.set_item("/CustomName", name);
        }
        if self.control_timeout.tick() == TimeoutEvent::JustExpired {
            self.set_item("/Ess/AcPowerSetpoint", Value::Double(0.0));
            self.set_item("/Ess/InverterPowerSetpoint", Value::Double(0.0));
            self.set_item("/Ess/DisableFeedIn", Value::Int(0));
            self.set_item("/Ess/UseInverterPowerSetpoint", Value::Int(0));
            for member in self.members.values() {
                member.write_raw("/Ess/AcPowerSetpoint", Value::Double(0.0));
                member.write_raw("/Ess/InverterPowerSetpoint", Value::Double(0.0));
                member.write_raw("/Ess/DisableFeedIn", Value::Int(0));
                member.write_raw("/Ess/UseInverterPowerSetpoint", Value::Int(0));
            }
        }
        self.recompute_aggregates();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbus::Connection;

    /// A peer-to-peer connection pair over a unix socket: exercises
    /// everything `MemberProxy` needs (it is a valid `Connection`) without
    /// a system or session bus daemon present, the way zbus's own test
    /// suite drives its client/server pairs.
    async fn p2p_connection() -> Connection {
        let (a, _b) = tokio::net::UnixStream::pair().expect("unix socketpair");
        zbus::connection::Builder::unix_stream(a)
            .p2p()
            .build()
            .await
            .expect("p2p connection for tests")
    }

    async fn member(service_name: &str) -> Arc<MemberProxy> {
        // Constructed without start_watching: every accessor reads
        // Value::Absent until the cache is seeded, which is exactly what
        // these aggregate-only tests want to control directly.
        MemberProxy::new(p2p_connection().await, service_name.to_string())
    }

    #[tokio::test]
    async fn display_name_falls_back_when_unset() {
        let m = member("com.victronenergy.multi.ttyUSB1").await;
        let leader = LeaderAggregate::new(0, m);
        assert_eq!(leader.display_name(), "RS system (0)");
    }

    #[tokio::test]
    async fn mode_rejects_unknown_value() {
        let m = member("com.victronenergy.multi.ttyUSB1").await;
        let mut leader = LeaderAggregate::new(0, m);
        assert!(!leader.apply_command(Command::Mode(Value::Int(99))));
        assert!(leader.apply_command(Command::Mode(Value::Int(3))));
        assert_eq!(leader.get_item("/Mode"), Value::Int(3));
    }

    #[tokio::test]
    async fn current_limit_rejected_when_not_adjustable() {
        let m = member("com.victronenergy.multi.ttyUSB1").await;
        let mut leader = LeaderAggregate::new(0, m);
        assert!(!leader.apply_command(Command::AcCurrentLimit { input: 1, value: Value::Double(16.0) }));
        leader.set_item("/Ac/In/1/CurrentLimitIsAdjustable", Value::Int(1));
        assert!(leader.apply_command(Command::AcCurrentLimit { input: 1, value: Value::Double(16.0) }));
    }

    #[tokio::test]
    async fn minsoc_rejects_out_of_range() {
        let m = member("com.victronenergy.multi.ttyUSB1").await;
        let mut leader = LeaderAggregate::new(0, m);
        assert!(!leader.apply_command(Command::MinSoc(Value::Double(150.0))));
        assert!(leader.apply_command(Command::MinSoc(Value::Double(20.0))));
    }

    #[tokio::test]
    async fn ac_power_setpoint_resets_control_timeout() {
        let m = member("com.victronenergy.multi.ttyUSB1").await;
        let mut leader = LeaderAggregate::new(0, m);
        leader.set_item("/Ac/Out/L1/P", Value::Double(1.0));
        assert!(leader.control_timeout.is_idle());
        assert!(leader.apply_command(Command::AcPowerSetpoint(Value::Double(900.0))));
        assert!(!leader.control_timeout.is_idle());
    }

    #[tokio::test]
    async fn remove_member_blanks_device_info_without_deleting() {
        let m = member("com.victronenergy.multi.ttyUSB1").await;
        let mut leader = LeaderAggregate::new(0, m);
        assert!(leader.remove_member("com.victronenergy.multi.ttyUSB1"));
        assert!(leader.is_empty());
    }
}
