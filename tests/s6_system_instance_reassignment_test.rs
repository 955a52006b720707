//! S6 — a member's system-instance change moves it from one leader to
//! another, destroying the now-empty source leader (spec.md §8, I5/I6).

mod common;

use std::sync::Arc;

use acsystem::leader::LeaderAggregate;
use acsystem::value::Value;
use common::member;

#[tokio::test]
async fn reassigned_member_leaves_old_leader_empty_and_joins_new_one() {
    let m = member("com.victronenergy.multi.ttyUSB0", 0, &[("/N2kSystemInstance", Value::Int(3))]).await;

    let mut leader3 = LeaderAggregate::new(3, Arc::clone(&m));
    assert_eq!(leader3.bus_name, "com.victronenergy.acsystem._sys3");
    assert_eq!(leader3.member_count(), 1);

    assert!(leader3.remove_member(&m.service_name));
    assert!(leader3.is_empty()); // I6: monitor would tear this leader down now

    m.set_value_for_test("/N2kSystemInstance", Value::Int(4));
    let leader4 = LeaderAggregate::new(4, Arc::clone(&m));
    assert_eq!(leader4.bus_name, "com.victronenergy.acsystem._sys4");
    assert_eq!(leader4.member_count(), 1);
}
