//! S5 — current-limit writes are gated by member capability (spec.md §8).

mod common;

use std::time::Duration;

use acsystem::leader::{Command, LeaderAggregate};
use acsystem::value::Value;
use common::recording_member;

#[tokio::test]
async fn current_limit_rejected_when_not_adjustable_and_no_member_sees_it() {
    let values = [
        ("/N2kSystemInstance", Value::Int(1)),
        ("/Ac/In/1/CurrentLimitIsAdjustable", Value::Int(0)),
    ];
    let (m, writes) = recording_member("com.victronenergy.multi.ttyUSB0", 0, &values, &["/Ac/In/1/CurrentLimit"]).await;

    let mut leader = LeaderAggregate::new(1, m);
    // `add_member` already refreshed the capability summary from the
    // single member's (non-adjustable) value.
    assert_eq!(leader.get_item("/Ac/In/1/CurrentLimitIsAdjustable").as_i64(), Some(0));

    assert!(!leader.apply_command(Command::AcCurrentLimit { input: 1, value: Value::Double(16.0) }));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(writes.lock().unwrap().is_empty());
}
