use zbus::zvariant::{OwnedValue, Value as ZVariantValue};

use crate::value::Value;

/// Render a [`Value`] the way Venus OS's `GetText` convention expects.
pub(crate) fn format_text_value(val: &Value) -> String {
    match val {
        Value::Int(i) => i.to_string(),
        Value::Double(d) => format!("{d:.2}"),
        Value::Text(s) => s.clone(),
        Value::Absent => "---".to_string(),
    }
}

/// Convert our domain [`Value`] to the zvariant type zbus puts on the wire.
/// `Absent` has no wire representation in the `com.victronenergy.BusItem`
/// convention; callers publish an empty array for it, mirroring `aiovelib`'s
/// treatment of `None`.
pub(crate) fn value_to_owned_value(val: &Value) -> OwnedValue {
    match val {
        Value::Int(i) => OwnedValue::from(*i),
        Value::Double(d) => OwnedValue::from(*d),
        Value::Text(s) => OwnedValue::try_from(ZVariantValue::from(s.as_str()))
            .unwrap_or_else(|_| OwnedValue::from(0i64)),
        Value::Absent => OwnedValue::try_from(Vec::<i32>::new()).unwrap_or_else(|_| OwnedValue::from(0i64)),
    }
}

/// The inverse of [`value_to_owned_value`].
pub(crate) fn owned_value_to_value(v: &OwnedValue) -> Value {
    if let Ok(i) = <i64 as TryFrom<&OwnedValue>>::try_from(v) {
        return Value::Int(i);
    }
    if let Ok(u) = <u64 as TryFrom<&OwnedValue>>::try_from(v) {
        return Value::Int(u as i64);
    }
    if let Ok(f) = <f64 as TryFrom<&OwnedValue>>::try_from(v) {
        return Value::Double(f);
    }
    if let Ok(s) = <&str as TryFrom<&OwnedValue>>::try_from(v) {
        return Value::Text(s.to_string());
    }
    Value::Absent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_text_matches_venus_conventions() {
        assert_eq!(format_text_value(&Value::Int(5)), "5");
        assert_eq!(format_text_value(&Value::Double(3.14159)), "3.14");
        assert_eq!(format_text_value(&Value::Text("hi".into())), "hi");
        assert_eq!(format_text_value(&Value::Absent), "---");
    }

    #[test]
    fn owned_value_roundtrips_primitives() {
        let ov = value_to_owned_value(&Value::Int(-5));
        assert_eq!(owned_value_to_value(&ov), Value::Int(-5));

        let ov = value_to_owned_value(&Value::Double(2.5));
        assert_eq!(owned_value_to_value(&ov), Value::Double(2.5));

        let ov = value_to_owned_value(&Value::Text("abc".into()));
        assert_eq!(owned_value_to_value(&ov), Value::Text("abc".into()));
    }
}
