//! Writable-path catalogue and the tagged command each maps to.
//!
//! Grounded on `original_source/dbus-acsystem.py`'s per-path `_set_*`
//! methods, collapsed into one enum so
//! [`super::aggregate::LeaderAggregate::apply_command`] validates and fans
//! each write out from a single match rather than a method-per-path.

use crate::value::Value;

/// Paths a client may write; validated and fanned out by
/// [`super::aggregate::LeaderAggregate::apply_command`].
pub const WRITABLE_PATHS: &[&str] = &[
    "/Mode",
    "/Ac/In/1/CurrentLimit",
    "/Ac/In/2/CurrentLimit",
    "/Ac/In/1/Type",
    "/Ac/In/2/Type",
    "/Settings/Ess/MinimumSocLimit",
    "/Settings/Ess/Mode",
    "/Ess/DisableFeedIn",
    "/Ess/AcPowerSetpoint",
    "/Ess/InverterPowerSetpoint",
    "/Ess/UseInverterPowerSetpoint",
    "/Ac/Control/IgnoreAcIn1",
    "/Settings/Ac/In/CurrentLimitEnergyMeter",
    "/Settings/AlarmLevel/HighTemperature",
    "/Settings/AlarmLevel/HighVoltage",
    "/Settings/AlarmLevel/HighVoltageAcOut",
    "/Settings/AlarmLevel/LowSoc",
    "/Settings/AlarmLevel/LowVoltage",
    "/Settings/AlarmLevel/LowVoltageAcOut",
    "/Settings/AlarmLevel/Overload",
    "/Settings/AlarmLevel/Ripple",
    "/Settings/AlarmLevel/ShortCircuit",
    "/CustomName",
];

/// One write request, already split from its raw path/value pair.
/// `AlarmLevel` and similar pass-through settings keep their path since
/// they all share the identical "store and fan out" contract.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Mode(Value),
    AcCurrentLimit { input: u8, value: Value },
    AcInputType { input: u8, value: Value },
    MinSoc(Value),
    EssMode(Value),
    DisableFeedIn(Value),
    AcPowerSetpoint(Value),
    InverterPowerSetpoint(Value),
    UseInverterPowerSetpoint(Value),
    IgnoreAcIn1(Value),
    CurrentLimitEnergyMeter(Value),
    AlarmLevel { path: String, value: Value },
    CustomName(Value),
}

impl Command {
    /// Maps a writable path and its incoming value to a tagged command, or
    /// `None` if the path isn't one `apply_command` understands (shouldn't
    /// happen for a path already in [`WRITABLE_PATHS`]).
    pub fn from_path(path: &str, value: Value) -> Option<Self> {
        Some(match path {
            "/Mode" => Self::Mode(value),
            "/Ac/In/1/CurrentLimit" => Self::AcCurrentLimit { input: 1, value },
            "/Ac/In/2/CurrentLimit" => Self::AcCurrentLimit { input: 2, value },
            "/Ac/In/1/Type" => Self::AcInputType { input: 1, value },
            "/Ac/In/2/Type" => Self::AcInputType { input: 2, value },
            "/Settings/Ess/MinimumSocLimit" => Self::MinSoc(value),
            "/Settings/Ess/Mode" => Self::EssMode(value),
            "/Ess/DisableFeedIn" => Self::DisableFeedIn(value),
            "/Ess/AcPowerSetpoint" => Self::AcPowerSetpoint(value),
            "/Ess/InverterPowerSetpoint" => Self::InverterPowerSetpoint(value),
            "/Ess/UseInverterPowerSetpoint" => Self::UseInverterPowerSetpoint(value),
            "/Ac/Control/IgnoreAcIn1" => Self::IgnoreAcIn1(value),
            "/Settings/Ac/In/CurrentLimitEnergyMeter" => Self::CurrentLimitEnergyMeter(value),
            "/CustomName" => Self::CustomName(value),
            p if p.starts_with("/Settings/AlarmLevel/") => {
                Self::AlarmLevel { path: p.to_string(), value }
            }
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_writable_path_maps_to_a_command() {
        for path in WRITABLE_PATHS {
            assert!(
                Command::from_path(path, Value::Int(1)).is_some(),
                "no Command mapping for writable path {path}"
            );
        }
    }

    #[test]
    fn alarm_level_paths_carry_their_own_path() {
        let cmd = Command::from_path("/Settings/AlarmLevel/LowSoc", Value::Double(10.0));
        assert_eq!(
            cmd,
            Some(Command::AlarmLevel {
                path: "/Settings/AlarmLevel/LowSoc".to_string(),
                value: Value::Double(10.0)
            })
        );
    }

    #[test]
    fn unknown_path_maps_to_none() {
        assert_eq!(Command::from_path("/State", Value::Int(1)), None);
    }
}
