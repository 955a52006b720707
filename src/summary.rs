//! Summary reducers and the static path → reducer registry.
//!
//! Grounded on `original_source/summary.py` (`SummaryAll`/`SummaryAny`/
//! `SummaryMax`/`SummaryFirst`/`SettingMixin`/`SummaryOptionalAlarm`) and the
//! registry built in `original_source/rsservice.py::RsService.summaries`.

use crate::value::Value;

/// Which reducer a summary path is computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReducerKind {
    All,
    Any,
    Max,
    /// `First`, publishing an int-typed item.
    FirstInt,
    /// `First`, publishing a double-typed item (`rsservice.py` passes
    /// `DoubleItem` for `/Ess/ActiveSocLimit`).
    FirstDouble,
    DeviceState,
    /// Gated by a boolean setting; behaves as `Max` when the setting is 1,
    /// else always publishes 0.
    OptionalAlarm,
}

/// One entry of the static summary registry.
#[derive(Debug, Clone, Copy)]
pub struct SummaryDef {
    pub path: &'static str,
    pub reducer: ReducerKind,
    /// Only set for `OptionalAlarm`: the settings path gating this alarm.
    pub gating_setting: Option<&'static str>,
}

/// The full summary-path registry. Order does not matter; every path
/// appears at most once.
pub static SUMMARY_REGISTRY: &[SummaryDef] = &[
    SummaryDef {
        path: "/Ac/In/1/CurrentLimitIsAdjustable",
        reducer: ReducerKind::All,
        gating_setting: None,
    },
    SummaryDef {
        path: "/Ac/In/2/CurrentLimitIsAdjustable",
        reducer: ReducerKind::All,
        gating_setting: None,
    },
    SummaryDef {
        path: "/Capabilities/HasAcPassthroughSupport",
        reducer: ReducerKind::All,
        gating_setting: None,
    },
    SummaryDef {
        path: "/Ess/Sustain",
        reducer: ReducerKind::Any,
        gating_setting: None,
    },
    SummaryDef {
        path: "/Alarms/PhaseRotation",
        reducer: ReducerKind::Max,
        gating_setting: None,
    },
    SummaryDef {
        path: "/Alarms/HighTemperature",
        reducer: ReducerKind::Max,
        gating_setting: None,
    },
    SummaryDef {
        path: "/Alarms/Overload",
        reducer: ReducerKind::Max,
        gating_setting: None,
    },
    SummaryDef {
        path: "/Ess/ActiveSocLimit",
        reducer: ReducerKind::FirstDouble,
        gating_setting: None,
    },
    SummaryDef {
        path: "/State",
        reducer: ReducerKind::DeviceState,
        gating_setting: None,
    },
    SummaryDef {
        path: "/Alarms/GridLost",
        reducer: ReducerKind::OptionalAlarm,
        gating_setting: Some("/Settings/Alarm/System/GridLost"),
    },
    // Supplemented: worst-case SOC is a meaningful read across paralleled
    // units even though the original does not summarise it.
    SummaryDef {
        path: "/Soc",
        reducer: ReducerKind::Max,
        gating_setting: None,
    },
];

/// Look up a summary path's definition.
pub fn lookup(path: &str) -> Option<&'static SummaryDef> {
    SUMMARY_REGISTRY.iter().find(|d| d.path == path)
}

/// `true` if `path` is computed by a registered reducer rather than kept
/// synchronised or ignored.
pub fn is_summary_path(path: &str) -> bool {
    lookup(path).is_some()
}

fn all_reduce(values: &[Value]) -> Value {
    Value::Int(i64::from(values.iter().all(Value::is_truthy)))
}

fn any_reduce(values: &[Value]) -> Value {
    Value::Int(i64::from(values.iter().any(Value::is_truthy)))
}

fn max_reduce(values: &[Value]) -> Value {
    values
        .iter()
        .filter(|v| !v.is_absent())
        .cloned()
        .reduce(|a, b| {
            if b.partial_cmp(&a) == Some(std::cmp::Ordering::Greater) {
                b
            } else {
                a
            }
        })
        .unwrap_or(Value::Absent)
}

fn first_reduce(values: &[Value]) -> Value {
    values.first().cloned().unwrap_or(Value::Absent)
}

/// `/State` priority fold: agreement wins outright; otherwise the first
/// priority code present beats the minimum of whatever remains.
fn device_state_fold(values: &[Value]) -> Value {
    const FAULT: i64 = 2;
    const BLOCKED: i64 = 0xFA;
    const INVERTING: i64 = 9;
    const PASSTHRU: i64 = 8;
    const ASSISTING: i64 = 10;
    const PRIORITY: [i64; 5] = [FAULT, BLOCKED, INVERTING, PASSTHRU, ASSISTING];

    let present: Vec<i64> = values.iter().filter_map(Value::as_i64).collect();
    if present.is_empty() {
        return Value::Absent;
    }
    if present.iter().all(|v| *v == present[0]) {
        return Value::Int(present[0]);
    }
    for code in PRIORITY {
        if present.contains(&code) {
            return Value::Int(code);
        }
    }
    Value::Int(*present.iter().min().unwrap_or(&present[0]))
}

/// Compute a summary value. `values` must already be in the deterministic
/// (lowest device-instance-first) member order `First` relies on.
/// `gating_value` is the current value of `gating_setting`, required only
/// for `OptionalAlarm`.
pub fn summarise(def: &SummaryDef, values: &[Value], gating_value: Option<&Value>) -> Value {
    match def.reducer {
        ReducerKind::All => all_reduce(values),
        ReducerKind::Any => any_reduce(values),
        ReducerKind::Max => max_reduce(values),
        ReducerKind::FirstInt | ReducerKind::FirstDouble => first_reduce(values),
        ReducerKind::DeviceState => device_state_fold(values),
        ReducerKind::OptionalAlarm => {
            let gated_on = gating_value.map(Value::is_truthy).unwrap_or(false);
            if gated_on {
                max_reduce(values)
            } else {
                Value::Int(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_true_only_when_every_member_truthy() {
        assert_eq!(
            all_reduce(&[Value::Int(1), Value::Int(1)]),
            Value::Int(1)
        );
        assert_eq!(
            all_reduce(&[Value::Int(1), Value::Int(0)]),
            Value::Int(0)
        );
    }

    #[test]
    fn any_is_true_when_one_member_truthy() {
        assert_eq!(
            any_reduce(&[Value::Int(0), Value::Int(1)]),
            Value::Int(1)
        );
        assert_eq!(
            any_reduce(&[Value::Int(0), Value::Int(0)]),
            Value::Int(0)
        );
    }

    #[test]
    fn max_ignores_absent() {
        let v = max_reduce(&[Value::Absent, Value::Int(3), Value::Int(9)]);
        assert_eq!(v.as_i64(), Some(9));
        assert!(max_reduce(&[Value::Absent, Value::Absent]).is_absent());
    }

    #[test]
    fn device_state_agreement_wins() {
        let v = device_state_fold(&[Value::Int(9), Value::Int(9)]);
        assert_eq!(v.as_i64(), Some(9));
    }

    #[test]
    fn device_state_priority_fold_picks_inverting_over_bulk() {
        // S7: two members with /State = {9 (INVERTING), 3 (bulk)}.
        let v = device_state_fold(&[Value::Int(9), Value::Int(3)]);
        assert_eq!(v.as_i64(), Some(9));
    }

    #[test]
    fn device_state_falls_back_to_minimum_outside_priority_list() {
        // Neither 3 nor 5 is in the priority list; minimum wins.
        let v = device_state_fold(&[Value::Int(5), Value::Int(3)]);
        assert_eq!(v.as_i64(), Some(3));
    }

    #[test]
    fn optional_alarm_returns_zero_when_setting_off() {
        let def = lookup("/Alarms/GridLost").unwrap();
        let v = summarise(def, &[Value::Int(1)], Some(&Value::Int(0)));
        assert_eq!(v.as_i64(), Some(0));
    }

    #[test]
    fn optional_alarm_behaves_as_max_when_setting_on() {
        let def = lookup("/Alarms/GridLost").unwrap();
        let v = summarise(def, &[Value::Int(1), Value::Int(2)], Some(&Value::Int(1)));
        assert_eq!(v.as_i64(), Some(2));
    }

    #[test]
    fn registry_covers_named_and_supplemented_paths() {
        assert!(is_summary_path("/State"));
        assert!(is_summary_path("/Ac/In/1/CurrentLimitIsAdjustable"));
        assert!(is_summary_path("/Soc"));
        assert!(!is_summary_path("/Ac/Out/L1/P"));
    }
}
