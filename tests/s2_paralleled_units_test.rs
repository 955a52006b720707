//! S2 — two units paralleled across three phases (spec.md §8).

mod common;

use acsystem::leader::LeaderAggregate;
use acsystem::value::Value;
use common::member;

#[tokio::test]
async fn two_units_sum_power_and_count_three_phases() {
    let values = [
        ("/N2kSystemInstance", Value::Int(7)),
        ("/Ac/Out/L1/P", Value::Double(800.0)),
        ("/Ac/Out/L2/P", Value::Double(800.0)),
        ("/Ac/Out/L3/P", Value::Double(800.0)),
    ];
    let m1 = member("com.victronenergy.multi.ttyUSB0", 0, &values).await;
    let m2 = member("com.victronenergy.multi.ttyUSB1", 1, &values).await;

    let mut leader = LeaderAggregate::new(7, m1);
    leader.add_member(m2);
    leader.tick();

    assert_eq!(leader.get_item("/Ac/NumberOfPhases").as_i64(), Some(3));
    assert_eq!(leader.get_item("/Ac/Out/P").as_f64(), Some(4800.0));
    assert_eq!(leader.get_item("/Ac/Out/L1/P").as_f64(), Some(1600.0));
}
