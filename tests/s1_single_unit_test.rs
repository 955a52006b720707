//! S1 — single unit, single phase (spec.md §8).

mod common;

use acsystem::leader::LeaderAggregate;
use acsystem::value::Value;
use common::member;

#[tokio::test]
async fn single_unit_single_phase_publishes_expected_aggregates() {
    let m = member(
        "com.victronenergy.multi.ttyUSB0",
        0,
        &[
            ("/N2kSystemInstance", Value::Int(5)),
            ("/Ac/Out/L1/P", Value::Double(1200.0)),
        ],
    )
    .await;

    let mut leader = LeaderAggregate::new(5, m);
    assert_eq!(leader.bus_name, "com.victronenergy.acsystem._sys5");

    leader.tick();

    assert_eq!(leader.get_item("/Ac/Out/P").as_f64(), Some(1200.0));
    assert_eq!(leader.get_item("/Ac/NumberOfPhases").as_i64(), Some(1));
    assert_eq!(leader.get_item("/Ac/NumberOfAcInputs").as_i64(), Some(0));
}
