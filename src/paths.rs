//! Path catalogs shared between the member proxy and the leader aggregate.
//!
//! Grounded on `original_source/rsservice.py`'s `synchronised_paths` and
//! `alarm_settings` tuples (unioned, per spec) and its `paths` set.

/// Paths that must become valid before a member is admitted to a leader.
/// Exact order/set from `rsservice.py::wait_for_essential_paths`.
pub const ESSENTIAL_PATHS: &[&str] = &[
    "/N2kSystemInstance",
    "/FirmwareVersion",
    "/Mode",
    "/Ac/In/1/CurrentLimit",
    "/Settings/Ess/MinimumSocLimit",
    "/Settings/Ess/Mode",
    "/Ess/DisableFeedIn",
];

/// Paths kept identical across every member of a leader (synchronised_paths
/// union alarm_settings from `rsservice.py`).
pub const SYNCHRONISED_PATHS: &[&str] = &[
    "/Ac/In/1/CurrentLimit",
    "/Ac/In/2/CurrentLimit",
    "/Ac/In/1/Type",
    "/Ac/In/2/Type",
    "/Settings/Ess/MinimumSocLimit",
    "/Settings/Ac/In/CurrentLimitEnergyMeter",
    "/Settings/Ess/Mode",
    "/Ac/Control/IgnoreAcIn1",
    "/Pv/Disable",
    "/Ess/DisableDischarge",
    "/Ess/DisableCharge",
    "/Settings/AlarmLevel/HighTemperature",
    "/Settings/AlarmLevel/HighVoltage",
    "/Settings/AlarmLevel/HighVoltageAcOut",
    "/Settings/AlarmLevel/LowSoc",
    "/Settings/AlarmLevel/LowVoltage",
    "/Settings/AlarmLevel/LowVoltageAcOut",
    "/Settings/AlarmLevel/Overload",
    "/Settings/AlarmLevel/Ripple",
    "/Settings/AlarmLevel/ShortCircuit",
];

/// `true` if every member of a leader must be kept in lockstep on this path.
pub fn is_synchronised(path: &str) -> bool {
    SYNCHRONISED_PATHS.contains(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn essential_paths_match_rsservice() {
        assert_eq!(ESSENTIAL_PATHS.len(), 7);
        assert!(ESSENTIAL_PATHS.contains(&"/N2kSystemInstance"));
        assert!(ESSENTIAL_PATHS.contains(&"/Ess/DisableFeedIn"));
    }

    #[test]
    fn synchronised_paths_include_alarm_levels() {
        assert!(is_synchronised("/Settings/AlarmLevel/LowSoc"));
        assert!(is_synchronised("/Ac/In/1/CurrentLimit"));
        assert!(!is_synchronised("/Ac/Out/L1/P"));
    }
}
